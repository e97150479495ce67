//! Model-based testing.
//!
//! [`Operation`]s describe what the application, the network and the gateway
//! can do; [`SimWorld`] applies them to a real connection manager wired to a
//! scripted gateway and exposes the resulting observable state.

mod operation;
mod world;

pub use operation::{ModelRoomId, Operation};
pub use world::{OpenRecord, SimWorld};
