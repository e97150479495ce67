//! Line client errors.

use linkwave_client::{ClientError, SpawnError};
use thiserror::Error;

/// Errors that end the line client.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad configuration or session cookie.
    #[error("startup failed: {0}")]
    Startup(#[from] SpawnError),

    /// The runtime refused a request or stopped while starting up.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Reading stdin failed.
    #[error("reading input: {0}")]
    Input(#[from] std::io::Error),

    /// The runtime task panicked or was cancelled.
    #[error("runtime task failed: {0}")]
    Runtime(#[from] tokio::task::JoinError),
}
