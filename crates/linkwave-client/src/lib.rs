//! Async client for the linkwave realtime gateway.
//!
//! Wraps the sans-IO [`linkwave_core::ConnectionManager`] in a tokio task:
//!
//! - [`Runtime`]: event loop over handle commands, socket events and timers
//! - [`ChatHandle`]: cloneable API used by the application
//! - [`WsDriver`]: WebSocket transport (tokio-tungstenite)
//! - [`SystemEnv`]: tokio clock and OS randomness
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use linkwave_client::{ManagerConfig, proto::EventKind};
//!
//! let config = ManagerConfig::json("wss://chat.example/ws");
//! let (chat, _task) = linkwave_client::spawn(config, None)?;
//! chat.on(EventKind::ChatMessage, |event| println!("{event:?}")).await?;
//! chat.connect()?;
//! chat.send_chat("alice", "hello").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

use tokio::task::JoinHandle;

mod driver;
mod error;
mod handle;
mod runtime;
mod system_env;
mod transport;

pub use driver::{Driver, TransportEvent, TransportEventKind};
pub use error::{ClientError, TransportError};
pub use handle::ChatHandle;
pub use linkwave_core::{
    ConnectionState, HandlerId, ManagerConfig, ReconnectPolicy, SendOutcome, StompConfig,
    TransportConfig, TransportKind, proto,
};
pub use runtime::Runtime;
pub use system_env::SystemEnv;
pub use transport::WsDriver;

/// Errors from [`spawn`].
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] linkwave_core::ManagerError),

    /// The transport could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Start a WebSocket connection runtime on the current tokio runtime.
///
/// `cookie` is sent as the `Cookie` header of every upgrade request. The
/// connection stays idle until [`ChatHandle::connect`] is called.
///
/// # Errors
///
/// - `SpawnError::Config` if `config` fails validation
/// - `SpawnError::Transport` if `cookie` is not a valid header value
pub fn spawn(
    config: ManagerConfig,
    cookie: Option<&str>,
) -> Result<(ChatHandle, JoinHandle<()>), SpawnError> {
    let driver = WsDriver::new(cookie)?;
    let (runtime, handle) = Runtime::new(driver, SystemEnv::new(), config)?;
    let task = tokio::spawn(runtime.run());
    Ok((handle, task))
}
