//! Cloneable control handle for a running [`crate::Runtime`].

use linkwave_core::{
    ConnectionState, Handler, HandlerId, SendOutcome,
    proto::{EventKind, InboundEvent, OutboundEnvelope},
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{error::ClientError, runtime::Command};

/// Handle to the connection runtime.
///
/// Cheap to clone; every clone talks to the same connection. Once the
/// runtime has stopped every method returns [`ClientError::RuntimeGone`].
#[derive(Debug, Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionState>,
}

impl ChatHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        status: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { commands, status }
    }

    /// Open the connection. No-op if already connecting or connected.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub fn connect(&self) -> Result<(), ClientError> {
        self.submit(Command::Connect)
    }

    /// Close the connection, dropping queued envelopes and subscriptions.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.submit(Command::Disconnect)
    }

    /// Send an envelope now, or queue it until the connection is up.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn send(&self, envelope: OutboundEnvelope) -> Result<SendOutcome, ClientError> {
        self.request(|reply| Command::Send { envelope, reply }).await
    }

    /// Send a direct chat message.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn send_chat(&self, to: &str, body: &str) -> Result<SendOutcome, ClientError> {
        self.send(OutboundEnvelope::chat(to, body)).await
    }

    /// Send a chat message to a room.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn send_room_chat(
        &self,
        room_id: &str,
        body: &str,
    ) -> Result<SendOutcome, ClientError> {
        self.send(OutboundEnvelope::room_chat(room_id, body)).await
    }

    /// Tell `to` that we started typing.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn start_typing(&self, to: &str) -> Result<SendOutcome, ClientError> {
        self.send(OutboundEnvelope::typing_start(to)).await
    }

    /// Tell `to` that we stopped typing.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn stop_typing(&self, to: &str) -> Result<SendOutcome, ClientError> {
        self.send(OutboundEnvelope::typing_stop(to)).await
    }

    /// Mark messages in `room_id` up to `message_id` as read.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn mark_read(
        &self,
        room_id: &str,
        message_id: &str,
    ) -> Result<SendOutcome, ClientError> {
        self.send(OutboundEnvelope::read_up_to(room_id, message_id)).await
    }

    /// Announce that this user is still online.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn presence_heartbeat(&self) -> Result<SendOutcome, ClientError> {
        self.send(OutboundEnvelope::presence_heartbeat()).await
    }

    /// Subscribe to a room topic (STOMP only).
    ///
    /// # Errors
    ///
    /// - `ClientError::Manager` if the transport has no topics or the topic
    ///   is empty
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn subscribe(&self, topic: impl Into<String>) -> Result<(), ClientError> {
        let topic = topic.into();
        self.request(|reply| Command::Subscribe { topic, reply }).await?.map_err(Into::into)
    }

    /// Drop a room topic subscription (STOMP only).
    ///
    /// # Errors
    ///
    /// Same as [`ChatHandle::subscribe`].
    pub async fn unsubscribe(&self, topic: impl Into<String>) -> Result<(), ClientError> {
        let topic = topic.into();
        self.request(|reply| Command::Unsubscribe { topic, reply }).await?.map_err(Into::into)
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Handlers run on the runtime task and must not block.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn on<F>(&self, kind: EventKind, handler: F) -> Result<HandlerId, ClientError>
    where
        F: FnMut(&InboundEvent) + Send + 'static,
    {
        let handler: Handler = Box::new(handler);
        self.request(|reply| Command::On { kind, handler, reply }).await
    }

    /// Remove a handler. Returns `false` if it was not registered.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime has stopped
    pub async fn off(&self, id: HandlerId) -> Result<bool, ClientError> {
        self.request(|reply| Command::Off { id, reply }).await
    }

    /// Last published connection state.
    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Receiver that observes every state change.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    /// Wait until the connection reaches `state`.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime stops first
    pub async fn wait_for(&self, state: ConnectionState) -> Result<(), ClientError> {
        let mut status = self.status.clone();
        status.wait_for(|current| *current == state).await.map_err(|_| ClientError::RuntimeGone)?;
        Ok(())
    }

    /// Disconnect and stop the runtime task.
    ///
    /// # Errors
    ///
    /// - `ClientError::RuntimeGone` if the runtime had already stopped
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    fn submit(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::RuntimeGone)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply, response) = oneshot::channel();
        self.submit(command(reply))?;
        response.await.map_err(|_| ClientError::RuntimeGone)
    }
}
