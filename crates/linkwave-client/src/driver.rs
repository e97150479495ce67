//! Driver trait for abstracting transport I/O.
//!
//! The [`Driver`] trait decouples the [`crate::Runtime`] from the socket
//! implementation. Production uses [`crate::WsDriver`] over tokio-tungstenite;
//! the simulation harness plugs in a scripted driver so the same runtime code
//! runs against a fake gateway.
//!
//! Every socket is tagged with the generation number the connection manager
//! assigned in `OpenTransport`, and every [`TransportEvent`] echoes it back.

use std::future::Future;

/// What happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The socket finished opening.
    Opened,
    /// A text frame arrived.
    Text(String),
    /// An open socket closed.
    Closed(String),
    /// The socket never opened.
    Failed(String),
}

/// Transport event tagged with its socket generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Generation passed to [`Driver::open`]
    pub generation: u64,
    /// What happened
    pub kind: TransportEventKind,
}

impl TransportEvent {
    /// Socket of `generation` is open.
    pub fn opened(generation: u64) -> Self {
        Self { generation, kind: TransportEventKind::Opened }
    }

    /// Text frame on `generation`.
    pub fn text(generation: u64, text: impl Into<String>) -> Self {
        Self { generation, kind: TransportEventKind::Text(text.into()) }
    }

    /// Socket of `generation` closed.
    pub fn closed(generation: u64, reason: impl Into<String>) -> Self {
        Self { generation, kind: TransportEventKind::Closed(reason.into()) }
    }

    /// Socket of `generation` could not be opened.
    pub fn failed(generation: u64, reason: impl Into<String>) -> Self {
        Self { generation, kind: TransportEventKind::Failed(reason.into()) }
    }
}

/// Abstracts socket I/O for the connection runtime.
///
/// `open`, `transmit` and `close` must not block: connecting and writing
/// happen in the background and their outcome is reported through
/// [`Driver::next_event`].
pub trait Driver: Send + 'static {
    /// Driver-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Start opening a socket to `url` for `generation`.
    ///
    /// Any socket of an older generation is abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot even be started (bad URL).
    /// Failures while connecting arrive later as a `Failed` event.
    fn open(&mut self, generation: u64, url: &str) -> Result<(), Self::Error>;

    /// Queue a text frame on the socket of `generation`.
    ///
    /// # Errors
    ///
    /// Returns an error if that socket is not open.
    fn transmit(&mut self, generation: u64, text: String) -> Result<(), Self::Error>;

    /// Close the socket of `generation`, if it is still current.
    fn close(&mut self, generation: u64);

    /// Wait for the next transport event.
    ///
    /// Returns `None` once the driver can never produce another event.
    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send;
}
