//! Generic runtime driving the connection manager.
//!
//! The runtime owns the [`ConnectionManager`], the [`Dispatcher`] and a
//! [`Driver`], and multiplexes three inputs in one `select!` loop:
//!
//! - commands from [`ChatHandle`]s
//! - transport events from the driver
//! - the manager's next timer deadline
//!
//! Every input produces manager actions, which are executed in order before
//! the next input is taken. Handlers therefore observe events in the order
//! the manager emitted them, and never concurrently.

use std::{collections::VecDeque, ops::ControlFlow};

use linkwave_core::{
    ConnectionManager, ConnectionState, Dispatcher, Environment, Handler, HandlerId,
    ManagerAction, ManagerConfig, ManagerError, SendOutcome,
    proto::{EventKind, OutboundEnvelope},
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    driver::{Driver, TransportEvent, TransportEventKind},
    handle::ChatHandle,
};

/// Request from a [`ChatHandle`] to the runtime task.
pub(crate) enum Command {
    Connect,
    Disconnect,
    Send { envelope: OutboundEnvelope, reply: oneshot::Sender<SendOutcome> },
    Subscribe { topic: String, reply: oneshot::Sender<Result<(), ManagerError>> },
    Unsubscribe { topic: String, reply: oneshot::Sender<Result<(), ManagerError>> },
    On { kind: EventKind, handler: Handler, reply: oneshot::Sender<HandlerId> },
    Off { id: HandlerId, reply: oneshot::Sender<bool> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Event loop tying a [`Driver`] and an [`Environment`] to the manager.
///
/// # Type Parameters
///
/// - `D`: transport driver
/// - `E`: clock and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    env: E,
    manager: ConnectionManager<E::Instant>,
    dispatcher: Dispatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionState>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    /// Create a runtime and the handle that controls it.
    ///
    /// Nothing happens until [`Runtime::run`] is polled and the handle asks
    /// for a connection.
    ///
    /// # Errors
    ///
    /// - `ManagerError::InvalidConfig` if the configuration is rejected
    pub fn new(
        driver: D,
        env: E,
        config: ManagerConfig,
    ) -> Result<(Self, ChatHandle), ManagerError> {
        let manager = ConnectionManager::new(config, env.random_u64())?;
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(manager.state());

        let runtime =
            Self { driver, env, manager, dispatcher: Dispatcher::new(), commands, status };
        Ok((runtime, ChatHandle::new(commands_tx, status_rx)))
    }

    /// Run until [`ChatHandle::shutdown`] is called or every handle is
    /// dropped. The connection is closed on the way out.
    pub async fn run(mut self) {
        let shutdown = loop {
            let deadline = self.manager.next_deadline();
            let env = self.env.clone();
            let timer = async move {
                match deadline {
                    Some(deadline) => env.sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("all handles dropped");
                        break None;
                    };
                    if let ControlFlow::Break(reply) = self.handle_command(command) {
                        break Some(reply);
                    }
                },
                Some(event) = self.driver.next_event() => self.handle_event(event),
                () = timer => {
                    let now = self.env.now();
                    let actions = self.manager.tick(now);
                    self.execute(actions);
                },
            }
        };

        let now = self.env.now();
        let actions = self.manager.disconnect(now);
        self.execute(actions);
        if let Some(reply) = shutdown {
            let _ = reply.send(());
        }
        tracing::debug!("runtime stopped");
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<oneshot::Sender<()>> {
        let now = self.env.now();
        match command {
            Command::Connect => {
                let actions = self.manager.connect(now);
                self.execute(actions);
            },
            Command::Disconnect => {
                let actions = self.manager.disconnect(now);
                self.execute(actions);
            },
            Command::Send { envelope, reply } => {
                let (outcome, actions) = self.manager.send(envelope, now);
                self.execute(actions);
                let _ = reply.send(outcome);
            },
            Command::Subscribe { topic, reply } => {
                let result = self.manager.subscribe(&topic, now).map(|a| self.execute(a));
                let _ = reply.send(result);
            },
            Command::Unsubscribe { topic, reply } => {
                let result = self.manager.unsubscribe(&topic, now).map(|a| self.execute(a));
                let _ = reply.send(result);
            },
            Command::On { kind, handler, reply } => {
                let _ = reply.send(self.dispatcher.on(kind, handler));
            },
            Command::Off { id, reply } => {
                let _ = reply.send(self.dispatcher.off(id));
            },
            Command::Shutdown { reply } => return ControlFlow::Break(reply),
        }
        ControlFlow::Continue(())
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let now = self.env.now();
        let TransportEvent { generation, kind } = event;
        let actions = match kind {
            TransportEventKind::Opened => self.manager.handle_opened(generation, now),
            TransportEventKind::Text(text) => self.manager.handle_text(generation, &text, now),
            TransportEventKind::Closed(reason) => {
                self.manager.handle_closed(generation, &reason, now)
            },
            TransportEventKind::Failed(reason) => {
                let reason = format!("open failed: {reason}");
                self.manager.handle_closed(generation, &reason, now)
            },
        };
        self.execute(actions);
    }

    /// Execute manager actions in order, feeding immediate transport
    /// failures back into the manager.
    fn execute(&mut self, actions: Vec<ManagerAction>) {
        let mut pending: VecDeque<ManagerAction> = actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                ManagerAction::OpenTransport { generation, url } => {
                    if let Err(e) = self.driver.open(generation, &url) {
                        tracing::warn!(generation, error = %e, "transport open failed");
                        let now = self.env.now();
                        let reason = e.to_string();
                        pending.extend(self.manager.handle_closed(generation, &reason, now));
                    }
                },
                ManagerAction::Transmit { generation, text } => {
                    if let Err(e) = self.driver.transmit(generation, text) {
                        tracing::debug!(generation, error = %e, "transmit dropped");
                    }
                },
                ManagerAction::CloseTransport { generation, reason } => {
                    tracing::debug!(generation, %reason, "closing transport");
                    self.driver.close(generation);
                },
                ManagerAction::ReconnectScheduled { attempt, delay } => {
                    tracing::info!(attempt, ?delay, "reconnect scheduled");
                },
                ManagerAction::Emit(event) => {
                    self.dispatcher.dispatch(&event);
                },
                ManagerAction::GaveUp { attempts } => {
                    tracing::warn!(attempts, "reconnect budget exhausted, staying disconnected");
                },
            }
        }

        let state = self.manager.state();
        self.status.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}
