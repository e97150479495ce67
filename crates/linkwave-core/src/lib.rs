//! Sans-IO connection manager for the linkwave realtime gateway.
//!
//! [`ConnectionManager`] is a pure state machine: it never touches a socket
//! or a clock. Callers feed it transport events and the current time and
//! execute the [`ManagerAction`]s it returns. The tokio runtime in
//! `linkwave-client` and the simulation harness drive the same code.
//!
//! # Components
//!
//! - [`manager`]: connection state, reconnect, heartbeat, liveness
//! - [`codec`]: JSON / STOMP / SockJS framing behind one interface
//! - [`queue`]: FIFO of envelopes sent while disconnected
//! - [`subscription`]: topic table with session-scoped STOMP IDs
//! - [`dispatch`]: event-kind keyed handler registry
//! - [`config`]: typed configuration with defaults and validation
//! - [`env`]: time and randomness abstraction

#![forbid(unsafe_code)]

pub mod backoff;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod manager;
pub mod queue;
pub mod subscription;

pub use config::{
    MAX_RECONNECT_DELAY, ManagerConfig, ReconnectPolicy, StompConfig, TransportConfig,
    TransportKind,
};
pub use dispatch::{Dispatcher, Handler, HandlerId};
pub use env::{Environment, MonotonicInstant};
pub use error::ManagerError;
pub use manager::{ConnectionManager, ConnectionState, ManagerAction, SendOutcome};
pub use linkwave_proto as proto;
