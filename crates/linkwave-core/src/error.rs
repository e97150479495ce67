//! Errors returned by the connection manager.
//!
//! Transport failures are never errors here: they are inputs
//! (`handle_closed`) that drive the reconnect path. What remains are caller
//! mistakes, either a bad configuration or an operation the selected
//! transport cannot perform.

use thiserror::Error;

use crate::config::TransportKind;

/// Errors from [`ConnectionManager`](crate::ConnectionManager) operations and
/// configuration validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// Topic subscriptions need a STOMP transport.
    #[error("topic subscriptions are not supported by the {transport} transport")]
    TopicsUnsupported {
        /// Transport the manager was configured with
        transport: TransportKind,
    },

    /// Empty or whitespace topic.
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    /// Configuration rejected by `ManagerConfig::validate`.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ManagerError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig { field, reason: reason.into() }
    }
}
