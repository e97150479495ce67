//! Client error types.

use linkwave_core::ManagerError;
use thiserror::Error;

/// Errors raised by the WebSocket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URL cannot be turned into a WebSocket request.
    #[error("invalid endpoint {url}: {reason}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// The cookie value is not a legal HTTP header value.
    #[error("invalid cookie header")]
    InvalidCookie,

    /// No socket is open for the requested generation.
    #[error("no open socket for generation {0}")]
    NotOpen(u64),

    /// The socket task has already exited.
    #[error("socket task for generation {0} is gone")]
    Closed(u64),
}

/// Errors surfaced by [`crate::ChatHandle`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection manager rejected the request.
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// The runtime task has stopped; the handle is no longer usable.
    #[error("connection runtime has shut down")]
    RuntimeGone,
}
