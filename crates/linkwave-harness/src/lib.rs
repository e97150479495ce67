//! Deterministic simulation harness for linkwave connection testing.
//!
//! Virtual-time implementations of the `Environment` and `Driver` traits,
//! plus a scripted gateway that speaks every supported wire dialect, for
//! deterministic, reproducible tests of reconnects, heartbeats and
//! subscriptions without a network.
//!
//! # Model-Based Testing
//!
//! The `model` module wires a real `ConnectionManager` to a [`SimGateway`]
//! and applies randomly generated [`Operation`]s to it.
//!
//! # Invariant Testing
//!
//! After every step the world is reduced to a [`SystemSnapshot`] and checked
//! against [`InvariantRegistry::standard()`]. See [`invariants`] for the
//! individual properties.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_gateway;

pub use invariants::{
    FifoDelivery, Invariant, InvariantRegistry, InvariantResult, LifecycleAlternates,
    QueueDrainedWhenConnected, RetryBudget, SingleSubscriptionPerTopic, SystemSnapshot,
    TopicSnapshot, Violation,
};
pub use model::{ModelRoomId, OpenRecord, Operation, SimWorld};
pub use sim_driver::{DriverCall, SimDriver, SimDriverError, SimRemote};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_gateway::{Dialect, OpenOutcome, SimGateway};
