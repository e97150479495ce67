//! Simulated world: one connection manager wired to one scripted gateway.
//!
//! The world plays the driver's role synchronously. Every action the manager
//! returns is executed against the [`SimGateway`] on the spot, and whatever
//! the gateway answers is fed straight back into the manager, so a whole
//! connect-handshake-flush exchange completes within one call. Time only
//! moves through [`SimWorld::advance`], which fires manager deadlines in
//! order on the virtual clock.

use std::{collections::VecDeque, time::Duration};

use linkwave_core::{
    ConnectionManager, ConnectionState, Dispatcher, Environment, HandlerId, ManagerAction,
    ManagerConfig, ManagerError, SendOutcome, TransportKind,
};
use linkwave_proto::{EventKind, InboundEvent, OutboundEnvelope, envelope::CHAT_SEND};
use serde_json::{Value, json};

use super::operation::Operation;
use crate::{
    invariants::{InvariantRegistry, SystemSnapshot, Violation},
    sim_env::{SimEnv, SimInstant},
    sim_gateway::{OpenOutcome, SimGateway},
};

/// One `OpenTransport` the manager asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRecord {
    /// Virtual time of the request.
    pub at: SimInstant,
    /// Generation of the new transport.
    pub generation: u64,
    /// Requested URL.
    pub url: String,
}

/// Manager, gateway and clock under one roof.
#[derive(Debug)]
pub struct SimWorld {
    env: SimEnv,
    manager: ConnectionManager<SimInstant>,
    gateway: SimGateway,
    dispatcher: Dispatcher,
    registry: InvariantRegistry,
    events: Vec<InboundEvent>,
    lifecycle: Vec<EventKind>,
    opens: Vec<OpenRecord>,
    reconnect_delays: Vec<Duration>,
    give_ups: u32,
    dropped_transmits: usize,
    next_seq: u64,
}

impl SimWorld {
    /// World whose gateway speaks the dialect of `config`.
    ///
    /// # Errors
    ///
    /// - `ManagerError::InvalidConfig` if `config` does not validate
    pub fn new(config: ManagerConfig, seed: u64) -> Result<Self, ManagerError> {
        let gateway = SimGateway::for_config(&config);
        Self::with_gateway(config, gateway, seed)
    }

    /// World with a preconfigured gateway.
    ///
    /// # Errors
    ///
    /// - `ManagerError::InvalidConfig` if `config` does not validate
    pub fn with_gateway(
        config: ManagerConfig,
        gateway: SimGateway,
        seed: u64,
    ) -> Result<Self, ManagerError> {
        let env = SimEnv::with_seed(seed);
        let manager = ConnectionManager::new(config, env.random_u64())?;
        Ok(Self {
            env,
            manager,
            gateway,
            dispatcher: Dispatcher::new(),
            registry: InvariantRegistry::standard(),
            events: Vec::new(),
            lifecycle: Vec::new(),
            opens: Vec::new(),
            reconnect_delays: Vec::new(),
            give_ups: 0,
            dropped_transmits: 0,
            next_seq: 0,
        })
    }

    /// The connection manager.
    pub fn manager(&self) -> &ConnectionManager<SimInstant> {
        &self.manager
    }

    /// Manager state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// The gateway.
    pub fn gateway(&self) -> &SimGateway {
        &self.gateway
    }

    /// The gateway, for failure injection.
    pub fn gateway_mut(&mut self) -> &mut SimGateway {
        &mut self.gateway
    }

    /// Current virtual time.
    pub fn now(&self) -> SimInstant {
        self.env.now()
    }

    /// Every event the manager emitted, in order.
    pub fn events(&self) -> &[InboundEvent] {
        &self.events
    }

    /// Every open the manager requested, in order.
    pub fn opens(&self) -> &[OpenRecord] {
        &self.opens
    }

    /// Delays of every scheduled reconnect, in order.
    pub fn reconnect_delays(&self) -> &[Duration] {
        &self.reconnect_delays
    }

    /// Times the manager gave up.
    pub fn give_ups(&self) -> u32 {
        self.give_ups
    }

    /// Transmits addressed to a socket the gateway no longer holds.
    pub fn dropped_transmits(&self) -> usize {
        self.dropped_transmits
    }

    /// Register an event handler.
    pub fn on(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&InboundEvent) + Send + 'static,
    ) -> HandlerId {
        self.dispatcher.on(kind, Box::new(handler))
    }

    /// Call `connect()`.
    pub fn connect(&mut self) {
        let actions = self.manager.connect(self.env.now());
        self.execute(actions);
    }

    /// Call `disconnect()`.
    pub fn disconnect(&mut self) {
        let actions = self.manager.disconnect(self.env.now());
        self.execute(actions);
    }

    /// Send an envelope.
    pub fn send(&mut self, envelope: OutboundEnvelope) -> SendOutcome {
        let (outcome, actions) = self.manager.send(envelope, self.env.now());
        self.execute(actions);
        outcome
    }

    /// Send the next numbered chat message; returns its sequence number.
    pub fn send_numbered(&mut self) -> (u64, SendOutcome) {
        self.next_seq += 1;
        let seq = self.next_seq;
        (seq, self.send(OutboundEnvelope::chat("u2", &format!("m{seq}"))))
    }

    /// Subscribe to a topic.
    ///
    /// # Errors
    ///
    /// Whatever `ConnectionManager::subscribe` rejects.
    pub fn subscribe(&mut self, topic: &str) -> Result<(), ManagerError> {
        let actions = self.manager.subscribe(topic, self.env.now())?;
        self.execute(actions);
        Ok(())
    }

    /// Unsubscribe from a topic.
    ///
    /// # Errors
    ///
    /// Whatever `ConnectionManager::unsubscribe` rejects.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<(), ManagerError> {
        let actions = self.manager.unsubscribe(topic, self.env.now())?;
        self.execute(actions);
        Ok(())
    }

    /// Drop the live socket from the network side.
    pub fn drop_connection(&mut self, reason: &str) {
        let Some(generation) = self.gateway.generation() else {
            return;
        };
        self.gateway.close();
        let actions = self.manager.handle_closed(generation, reason, self.env.now());
        self.execute(actions);
    }

    /// Deliver a raw server frame on the live socket.
    ///
    /// Silently dropped when there is no socket.
    pub fn deliver(&mut self, text: &str) {
        let Some(generation) = self.gateway.generation() else {
            return;
        };
        let actions = self.manager.handle_text(generation, text, self.env.now());
        self.execute(actions);
    }

    /// Publish a room message; returns how many copies the client was sent.
    pub fn publish_room(&mut self, room: &str, body: &str) -> usize {
        let frames = self.gateway.publish_room(room, body);
        let count = frames.len();
        for frame in frames {
            self.deliver(&frame);
        }
        count
    }

    /// Push a typed JSON event.
    pub fn push_event(&mut self, event: &Value) {
        if let Some(frame) = self.gateway.push_event(event) {
            self.deliver(&frame);
        }
    }

    /// Send a STOMP `ERROR` frame. No-op on the JSON dialect.
    pub fn server_error(&mut self, message: &str) {
        if let Some(frame) = self.gateway.error_frame(message) {
            self.deliver(&frame);
        }
    }

    /// Advance virtual time by `by`, firing every deadline on the way.
    pub fn advance(&mut self, by: Duration) {
        let target = self.env.now() + by;
        while let Some(deadline) = self.manager.next_deadline() {
            if deadline > target {
                break;
            }
            self.env.advance_to(deadline);
            let actions = self.manager.tick(self.env.now());
            if actions.is_empty() && self.manager.next_deadline() == Some(deadline) {
                tracing::warn!(?deadline, "deadline did not fire");
                break;
            }
            self.execute(actions);
        }
        self.env.advance_to(target);
    }

    /// Apply one model operation.
    ///
    /// # Errors
    ///
    /// Topic operations on the JSON transport return
    /// `ManagerError::TopicsUnsupported`.
    pub fn apply(&mut self, op: &Operation) -> Result<(), ManagerError> {
        match op {
            Operation::Connect => self.connect(),
            Operation::Disconnect => self.disconnect(),
            Operation::Send => {
                self.send_numbered();
            },
            Operation::Subscribe { room } => self.subscribe(&room.to_string())?,
            Operation::Unsubscribe { room } => self.unsubscribe(&room.to_string())?,
            Operation::DropConnection => self.drop_connection("connection reset"),
            Operation::RefuseOpens { count } => {
                self.gateway.refuse_next_opens(u32::from(*count % 8));
            },
            Operation::StallNextOpen => self.gateway.stall_next_opens(1),
            Operation::Silence => self.gateway.fall_silent(),
            Operation::ServerError => self.server_error("broker unavailable"),
            Operation::Publish { room } => {
                let body = json!({ "id": format!("r{room}"), "from": "u2", "body": "hello" });
                self.publish_room(&room.to_string(), &body.to_string());
            },
            Operation::PushEvent => {
                self.push_event(&json!({ "type": "typing.start", "payload": { "from": "u2" } }));
            },
            Operation::Garbage => self.deliver("{\"type\":\"no.such.event\"}"),
            Operation::AdvanceTime { millis } => {
                self.advance(Duration::from_millis(u64::from(*millis)));
            },
        }
        Ok(())
    }

    /// Whether the manager speaks STOMP.
    pub fn supports_topics(&self) -> bool {
        self.manager.config().transport.kind() != TransportKind::Json
    }

    /// Sequence numbers of chat messages, as the gateway received them.
    pub fn delivered(&self) -> Vec<u64> {
        self.gateway
            .received()
            .iter()
            .filter(|envelope| envelope.kind == CHAT_SEND)
            .filter_map(|envelope| envelope.payload.get("body")?.as_str()?.strip_prefix('m'))
            .filter_map(|seq| seq.parse().ok())
            .collect()
    }

    /// Observable state of manager and gateway.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::from_manager(&self.manager)
            .with_lifecycle(self.lifecycle.clone())
            .with_delivered(self.delivered())
            .with_gateway_subscriptions(self.gateway.subscriptions())
    }

    /// Run the standard invariants.
    ///
    /// # Errors
    ///
    /// Every violated invariant.
    pub fn check(&self) -> Result<(), Vec<Violation>> {
        self.registry.check_all(&self.snapshot())
    }

    /// Run the standard invariants, panicking on failure.
    pub fn assert_invariants(&self, context: &str) {
        self.registry.assert_all(&self.snapshot(), context);
    }

    fn execute(&mut self, actions: Vec<ManagerAction>) {
        let mut queue: VecDeque<ManagerAction> = actions.into();

        while let Some(action) = queue.pop_front() {
            let now = self.env.now();
            match action {
                ManagerAction::OpenTransport { generation, url } => {
                    self.opens.push(OpenRecord { at: now, generation, url });
                    match self.gateway.accept(generation) {
                        OpenOutcome::Accepted(frames) => {
                            queue.extend(self.manager.handle_opened(generation, now));
                            for frame in frames {
                                queue.extend(self.manager.handle_text(generation, &frame, now));
                            }
                        },
                        OpenOutcome::Refused(reason) => {
                            let reason = format!("open failed: {reason}");
                            queue.extend(self.manager.handle_closed(generation, &reason, now));
                        },
                        OpenOutcome::Stalled => {},
                    }
                },
                ManagerAction::Transmit { generation, text } => {
                    if self.gateway.generation() != Some(generation) {
                        self.dropped_transmits += 1;
                        continue;
                    }
                    for reply in self.gateway.receive(&text) {
                        queue.extend(self.manager.handle_text(generation, &reply, now));
                    }
                },
                ManagerAction::CloseTransport { generation, reason } => {
                    if self.gateway.generation() == Some(generation) {
                        self.gateway.close();
                    }
                    // The socket's own close report arrives after the fact.
                    queue.extend(self.manager.handle_closed(generation, &reason, now));
                },
                ManagerAction::ReconnectScheduled { delay, .. } => {
                    self.reconnect_delays.push(delay);
                },
                ManagerAction::Emit(event) => {
                    let kind = event.kind();
                    if matches!(kind, EventKind::ConnectionOpened | EventKind::ConnectionClosed) {
                        self.lifecycle.push(kind);
                    }
                    self.dispatcher.dispatch(&event);
                    self.events.push(event);
                },
                ManagerAction::GaveUp { .. } => self.give_ups += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_connect_completes_in_one_call() {
        let mut world = SimWorld::new(ManagerConfig::json("ws://gw/ws"), 1).unwrap();
        world.connect();
        assert_eq!(world.state(), ConnectionState::Connected);
        assert_eq!(world.events(), &[InboundEvent::ConnectionOpened]);
        world.assert_invariants("after connect");
    }

    #[test]
    fn stomp_handshake_runs_through_gateway() {
        let mut world = SimWorld::new(ManagerConfig::stomp("ws://gw/ws"), 1).unwrap();
        world.connect();
        assert_eq!(world.state(), ConnectionState::Connected);
        assert_eq!(world.gateway().accepted(), 1);
    }

    #[test]
    fn advance_fires_heartbeats() {
        let mut world = SimWorld::new(ManagerConfig::json("ws://gw/ws"), 1).unwrap();
        world.connect();
        let every = world.manager().config().heartbeat_interval;
        world.advance(every * 3);
        assert_eq!(world.gateway().heartbeats(), 3);
        assert_eq!(world.state(), ConnectionState::Connected);
    }

    #[test]
    fn topic_ops_fail_on_json() {
        let mut world = SimWorld::new(ManagerConfig::json("ws://gw/ws"), 1).unwrap();
        assert!(!world.supports_topics());
        assert!(world.apply(&Operation::Subscribe { room: 1 }).is_err());
    }
}
