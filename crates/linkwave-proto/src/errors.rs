//! Protocol error types.
//!
//! Every decoder in this crate returns [`ProtocolError`] instead of panicking.
//! Callers treat any error as "drop this frame": a malformed frame never
//! closes a connection by itself.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding gateway frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text is not valid JSON
    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// JSON frame has neither a `type` nor an `event` discriminator
    #[error("frame has no type discriminator")]
    MissingType,

    /// Discriminator names an event this client does not understand
    #[error("unknown event type: {0}")]
    UnknownType(String),

    /// Recognized event is missing a required field
    #[error("{event}: missing field `{field}`")]
    MissingField {
        /// Event tag being decoded
        event: String,
        /// Name of the absent field
        field: &'static str,
    },

    /// Field is present but holds a value outside its domain
    #[error("{event}: invalid value for `{field}`")]
    InvalidField {
        /// Event tag being decoded
        event: String,
        /// Name of the offending field
        field: &'static str,
    },

    /// STOMP frame is structurally invalid
    #[error("malformed stomp frame: {0}")]
    MalformedStomp(String),

    /// STOMP command is not one of the 1.2 commands
    #[error("unknown stomp command: {0}")]
    UnknownCommand(String),

    /// SockJS frame has an unknown prefix or a broken body
    #[error("malformed sockjs frame: {0}")]
    MalformedSockJs(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}
