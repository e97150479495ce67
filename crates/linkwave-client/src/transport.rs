//! WebSocket transport over tokio-tungstenite.
//!
//! Each `open` spawns one socket task. The task connects, then forwards
//! inbound text frames as [`TransportEvent`]s and writes whatever the driver
//! queues on its outbound channel. Dropping the outbound sender (or sending a
//! close frame) ends the task, which always reports a final `Closed` event,
//! or `Failed` if the socket never opened.

use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderValue, header::COOKIE},
    },
};

use crate::{
    driver::{Driver, TransportEvent},
    error::TransportError,
};

/// Reason reported when the driver itself closes a socket.
const CLOSED_BY_CLIENT: &str = "closed by client";

struct Socket {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

/// Production [`Driver`]: one WebSocket at a time.
pub struct WsDriver {
    cookie: Option<HeaderValue>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    socket: Option<Socket>,
}

impl WsDriver {
    /// Create a driver that sends `cookie` (if any) with every upgrade
    /// request.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidCookie` if the cookie is not a valid header
    pub fn new(cookie: Option<&str>) -> Result<Self, TransportError> {
        let cookie = cookie
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| TransportError::InvalidCookie)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self { cookie, events_tx, events_rx, socket: None })
    }

    /// Generation of the socket currently owned by the driver.
    pub fn current_generation(&self) -> Option<u64> {
        self.socket.as_ref().map(|s| s.generation)
    }

    fn request(&self, url: &str) -> Result<Request, TransportError> {
        let mut request = url.into_client_request().map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(cookie) = &self.cookie {
            request.headers_mut().insert(COOKIE, cookie.clone());
        }
        Ok(request)
    }

    fn abandon(&mut self) {
        if let Some(socket) = self.socket.take() {
            tracing::debug!(generation = socket.generation, "abandoning socket");
            socket.task.abort();
        }
    }
}

impl Drop for WsDriver {
    fn drop(&mut self) {
        self.abandon();
    }
}

impl Driver for WsDriver {
    type Error = TransportError;

    fn open(&mut self, generation: u64, url: &str) -> Result<(), Self::Error> {
        self.abandon();
        let request = self.request(url)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let events = self.events_tx.clone();
        let task = tokio::spawn(run_socket(generation, request, outbound_rx, events));

        self.socket = Some(Socket { generation, outbound: outbound_tx, task });
        Ok(())
    }

    fn transmit(&mut self, generation: u64, text: String) -> Result<(), Self::Error> {
        let socket = self
            .socket
            .as_ref()
            .filter(|s| s.generation == generation)
            .ok_or(TransportError::NotOpen(generation))?;
        socket.outbound.send(Message::Text(text)).map_err(|_| TransportError::Closed(generation))
    }

    fn close(&mut self, generation: u64) {
        let Some(socket) = self.socket.take_if(|s| s.generation == generation) else {
            return;
        };
        // The task writes the close frame, sees the channel end and exits.
        if socket.outbound.send(Message::Close(None)).is_err() {
            socket.task.abort();
        }
    }

    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send {
        self.events_rx.recv()
    }
}

async fn run_socket(
    generation: u64,
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let stream = match connect_async(request).await {
        Ok((stream, response)) => {
            tracing::debug!(generation, status = %response.status(), "websocket upgraded");
            stream
        },
        Err(e) => {
            tracing::warn!(generation, error = %e, "websocket connect failed");
            let _ = events.send(TransportEvent::failed(generation, e.to_string()));
            return;
        },
    };
    if events.send(TransportEvent::opened(generation)).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(Message::Close(frame)) => {
                    let _ = write.send(Message::Close(frame)).await;
                    break CLOSED_BY_CLIENT.to_string();
                },
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        break format!("write failed: {e}");
                    }
                },
                None => break CLOSED_BY_CLIENT.to_string(),
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(TransportEvent::text(generation, text)).is_err() {
                        break "driver dropped".to_string();
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "server closed".to_string(),
                        |f| format!("server closed: {} {}", f.code, f.reason),
                    );
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Pong is written by tungstenite on the next flush.
                    tracing::trace!(generation, "websocket ping/pong");
                },
                Some(Ok(other)) => {
                    tracing::debug!(generation, len = other.len(), "ignoring non-text frame");
                },
                Some(Err(e)) => break format!("read failed: {e}"),
                None => break "stream ended".to_string(),
            },
        }
    };

    tracing::debug!(generation, %reason, "socket task exiting");
    let _ = events.send(TransportEvent::closed(generation, reason));
}
