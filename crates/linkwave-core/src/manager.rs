//! Realtime connection manager.
//!
//! Owns one logical connection to the chat gateway: connection state,
//! reconnect backoff, the pending queue, topic subscriptions, heartbeats and
//! liveness. Uses the action pattern: methods take time as input and return
//! [`ManagerAction`]s for the driver to execute. No I/O happens here.
//!
//! # State Machine
//!
//! ```text
//!                 connect()                 opened / CONNECTED
//! ┌──────────────┐────────>┌────────────┐──────────────────────>┌───────────┐
//! │ Disconnected │         │ Connecting │                       │ Connected │
//! └──────────────┘<────────└────────────┘<───────┐              └───────────┘
//!    ^    ^  budget spent       │ close/timeout  │ timer fires        │
//!    │    │                     v                │                    │ close/timeout
//!    │    └──────────────┌──────────────┐────────┘                    │
//!    │                   │ Reconnecting │<────────────────────────────┘
//!    │ disconnect()      └──────────────┘
//!    └─────────────────── (from any state)
//! ```
//!
//! # Transport generations
//!
//! Every `OpenTransport` carries a fresh generation number and every
//! transport input echoes it back. Inputs for an older generation belong to a
//! socket the manager has already abandoned and are ignored, so a connect
//! that completes after `disconnect()` cannot resurrect the connection.
//!
//! # Invariants
//!
//! - While `Connected` the pending queue is empty: the flush happens in the
//!   same call that enters `Connected`.
//! - `send()` either transmits or queues, never both.
//! - `ConnectionOpened` and `ConnectionClosed` events alternate, starting
//!   with `ConnectionOpened`.
//! - At most one live subscription ID per topic.

use std::time::Duration;

use linkwave_proto::{
    Control, Inbound, InboundEvent, OutboundEnvelope, stomp::negotiate_heartbeat,
};

use crate::{
    backoff::reconnect_delay,
    codec::{Codec, OpenStep, WireInput},
    config::{ManagerConfig, TransportKind},
    env::MonotonicInstant,
    error::ManagerError,
    queue::PendingQueue,
    subscription::SubscriptionTable,
};

/// Reason reported when the caller disconnects.
pub const CLIENT_DISCONNECT: &str = "client disconnect";

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport and no reconnect pending.
    Disconnected,
    /// Transport opening or handshake in progress.
    Connecting,
    /// Session usable; sends go straight to the wire.
    Connected,
    /// Waiting for the backoff timer before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Lower-case name for logs and status lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions returned by the connection manager.
///
/// The driver (tokio runtime or simulation harness) executes them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerAction {
    /// Open a new transport to `url`, tagged with `generation`.
    OpenTransport {
        /// Generation the transport must report back with
        generation: u64,
        /// Endpoint to connect to
        url: String,
    },

    /// Write a text frame on the transport of `generation`.
    Transmit {
        /// Target transport
        generation: u64,
        /// Wire text
        text: String,
    },

    /// Close the transport of `generation`.
    CloseTransport {
        /// Target transport
        generation: u64,
        /// Why the manager is closing it
        reason: String,
    },

    /// A reconnect attempt is scheduled. Informational.
    ReconnectScheduled {
        /// 1-based retry number
        attempt: u32,
        /// Delay before the retry
        delay: Duration,
    },

    /// Deliver this event to registered handlers.
    Emit(InboundEvent),

    /// The retry budget is exhausted; the manager stays `Disconnected` until
    /// the next explicit `connect()`.
    GaveUp {
        /// Retries made before giving up
        attempts: u32,
    },
}

/// Where a sent envelope went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transmitted immediately.
    Sent,
    /// Appended to the pending queue.
    Queued,
}

/// Connection manager state machine.
///
/// Generic over the instant type so the same code runs on tokio time and on
/// the harness's virtual clock.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I: MonotonicInstant> {
    config: ManagerConfig,
    codec: Codec,
    state: ConnectionState,
    /// Generation of the current (or last) transport.
    generation: u64,
    /// Retries since the last successful connect.
    attempts: u32,
    gave_up: bool,
    queue: PendingQueue,
    subscriptions: SubscriptionTable,
    /// Seed for per-attempt SockJS paths.
    entropy: u64,
    /// Socket of the current generation reported open.
    transport_open: bool,
    connect_deadline: Option<I>,
    reconnect_at: Option<I>,
    last_inbound: Option<I>,
    last_outbound: Option<I>,
    heartbeat_every: Option<Duration>,
    idle_after: Option<Duration>,
}

impl<I: MonotonicInstant> ConnectionManager<I> {
    /// Create a manager in [`ConnectionState::Disconnected`].
    ///
    /// `entropy` seeds the random parts of SockJS URLs.
    ///
    /// # Errors
    ///
    /// - `ManagerError::InvalidConfig` if `config.validate()` fails
    pub fn new(config: ManagerConfig, entropy: u64) -> Result<Self, ManagerError> {
        config.validate()?;
        let codec = Codec::new(&config.transport, config.heartbeat_interval);
        Ok(Self {
            config,
            codec,
            state: ConnectionState::Disconnected,
            generation: 0,
            attempts: 0,
            gave_up: false,
            queue: PendingQueue::new(),
            subscriptions: SubscriptionTable::new(),
            entropy,
            transport_open: false,
            connect_deadline: None,
            reconnect_at: None,
            last_inbound: None,
            last_outbound: None,
            heartbeat_every: None,
            idle_after: None,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Envelopes waiting for a connection.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Pending envelopes, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &OutboundEnvelope> {
        self.queue.iter()
    }

    /// Requested topics and their live subscription IDs.
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Retries since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the retry budget ran out.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    /// Generation of the current (or last) transport.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Open a connection.
    ///
    /// No-op while `Connecting` or `Connected`. From `Disconnected` the
    /// retry budget is reset. From `Reconnecting` the backoff timer is
    /// cancelled and the attempt starts now, keeping the retry count.
    pub fn connect(&mut self, now: I) -> Vec<ManagerAction> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                tracing::debug!(state = %self.state, "connect ignored");
                Vec::new()
            },
            ConnectionState::Disconnected => {
                self.attempts = 0;
                self.gave_up = false;
                self.open(now)
            },
            ConnectionState::Reconnecting => {
                self.reconnect_at = None;
                self.open(now)
            },
        }
    }

    /// Close the connection and forget subscriptions and queued envelopes.
    ///
    /// Idempotent. Never schedules a reconnect.
    pub fn disconnect(&mut self, _now: I) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        let previous = self.state;

        if previous == ConnectionState::Connected
            && let Some(text) = self.codec.encode_disconnect()
        {
            actions.push(ManagerAction::Transmit { generation: self.generation, text });
        }
        if matches!(previous, ConnectionState::Connecting | ConnectionState::Connected) {
            actions.push(ManagerAction::CloseTransport {
                generation: self.generation,
                reason: CLIENT_DISCONNECT.to_string(),
            });
        }

        let dropped = self.queue.len();
        self.queue.clear();
        self.subscriptions.clear();
        self.reset_session();
        self.reconnect_at = None;

        if previous != ConnectionState::Disconnected {
            self.generation += 1;
            self.state = ConnectionState::Disconnected;
            tracing::info!(from = %previous, dropped, "disconnected by client");
        }
        if previous == ConnectionState::Connected {
            actions.push(ManagerAction::Emit(InboundEvent::ConnectionClosed {
                reason: CLIENT_DISCONNECT.to_string(),
            }));
        }

        actions
    }

    /// Send an envelope, or queue it until the connection is usable.
    pub fn send(
        &mut self,
        envelope: OutboundEnvelope,
        now: I,
    ) -> (SendOutcome, Vec<ManagerAction>) {
        if self.state == ConnectionState::Connected {
            debug_assert!(self.queue.is_empty());
            let text = self.codec.encode_envelope(&envelope);
            (SendOutcome::Sent, vec![self.transmit(text, now)])
        } else {
            tracing::debug!(kind = %envelope.kind, state = %self.state, "queueing envelope");
            self.queue.push(envelope);
            (SendOutcome::Queued, Vec::new())
        }
    }

    /// Subscribe to a topic (STOMP only).
    ///
    /// While not connected the topic is recorded and subscribed once the
    /// handshake completes. Subscribing again replaces the live subscription.
    ///
    /// # Errors
    ///
    /// - `ManagerError::TopicsUnsupported` on the JSON transport
    /// - `ManagerError::InvalidTopic` for an empty topic
    pub fn subscribe(&mut self, topic: &str, now: I) -> Result<Vec<ManagerAction>, ManagerError> {
        let destination = self.destination(topic)?;

        if self.state != ConnectionState::Connected {
            self.subscriptions.record(topic, destination);
            return Ok(Vec::new());
        }

        let (stale, fresh) = self.subscriptions.activate(topic, destination.clone());
        let mut texts = Vec::with_capacity(2);
        if let Some(stale) = stale
            && let Some(text) = self.codec.encode_unsubscribe(&stale)
        {
            texts.push(text);
        }
        texts.extend(self.codec.encode_subscribe(&fresh, &destination));
        tracing::debug!(topic, id = %fresh, %destination, "subscribing");

        Ok(texts.into_iter().map(|text| self.transmit(text, now)).collect())
    }

    /// Drop a topic subscription (STOMP only). Unknown topics are a no-op.
    ///
    /// # Errors
    ///
    /// - `ManagerError::TopicsUnsupported` on the JSON transport
    /// - `ManagerError::InvalidTopic` for an empty topic
    pub fn unsubscribe(&mut self, topic: &str, now: I) -> Result<Vec<ManagerAction>, ManagerError> {
        self.destination(topic)?;

        let Some(entry) = self.subscriptions.remove(topic) else {
            return Ok(Vec::new());
        };
        let Some(id) = entry.id.filter(|_| self.state == ConnectionState::Connected) else {
            return Ok(Vec::new());
        };
        tracing::debug!(topic, %id, "unsubscribing");
        let text = self.codec.encode_unsubscribe(&id);
        Ok(text.map(|text| self.transmit(text, now)).into_iter().collect())
    }

    /// The transport of `generation` finished opening.
    pub fn handle_opened(&mut self, generation: u64, now: I) -> Vec<ManagerAction> {
        if self.is_stale(generation) || self.transport_open {
            tracing::debug!(generation, current = self.generation, "ignoring stale open");
            return Vec::new();
        }

        self.transport_open = true;
        self.last_inbound = Some(now);

        match self.codec.on_open() {
            OpenStep::Ready => self.complete_connect(None, now),
            OpenStep::Handshake(text) => vec![self.transmit(text, now)],
            OpenStep::Wait => Vec::new(),
        }
    }

    /// A text frame arrived on the transport of `generation`.
    pub fn handle_text(&mut self, generation: u64, text: &str, now: I) -> Vec<ManagerAction> {
        if self.is_stale(generation) || !self.transport_open {
            tracing::debug!(generation, current = self.generation, "ignoring stale frame");
            return Vec::new();
        }

        self.last_inbound = Some(now);
        let mut actions = Vec::new();

        for input in self.codec.decode(text) {
            match input {
                WireInput::SessionOpen => {
                    if self.state == ConnectionState::Connecting
                        && let Some(text) = self.codec.handshake()
                    {
                        actions.push(self.transmit(text, now));
                    }
                },
                WireInput::Connected { server_heartbeat } => {
                    if self.state == ConnectionState::Connecting {
                        actions.extend(self.complete_connect(Some(server_heartbeat), now));
                    }
                },
                WireInput::Delivery { subscription: Some(id), .. }
                    if !self.subscriptions.accepts(&id) =>
                {
                    tracing::debug!(%id, "dropping message for retired subscription");
                },
                WireInput::Inbound(inbound) | WireInput::Delivery { inbound, .. } => match inbound {
                    Inbound::Event(event) => actions.push(ManagerAction::Emit(event)),
                    Inbound::Control(Control::Pong) => tracing::trace!("pong"),
                    Inbound::Control(Control::ConnectionAck) => {
                        tracing::debug!("gateway acknowledged session");
                    },
                    Inbound::Control(Control::Ack { event }) => {
                        tracing::trace!(%event, "gateway ack");
                    },
                },
                WireInput::Heartbeat | WireInput::Ignored => {},
                WireInput::ServerError(message) => {
                    tracing::warn!(%message, "gateway sent ERROR");
                    actions.extend(self.fail(format!("server error: {message}"), now));
                    break;
                },
                WireInput::ServerClose(reason) => {
                    actions.extend(self.fail(reason, now));
                    break;
                },
                WireInput::Invalid(err) => {
                    tracing::warn!(error = %err, "dropping undecodable frame");
                },
            }
        }

        actions
    }

    /// The transport of `generation` closed or failed to open.
    pub fn handle_closed(&mut self, generation: u64, reason: &str, now: I) -> Vec<ManagerAction> {
        if self.is_stale(generation) {
            tracing::debug!(generation, current = self.generation, "ignoring stale close");
            return Vec::new();
        }
        tracing::info!(generation, %reason, state = %self.state, "transport closed");
        self.lose_connection(reason.to_string(), now)
    }

    /// Fire due timers: reconnect, connect timeout, idle timeout, heartbeat.
    pub fn tick(&mut self, now: I) -> Vec<ManagerAction> {
        match self.state {
            ConnectionState::Disconnected => Vec::new(),
            ConnectionState::Reconnecting => match self.reconnect_at {
                Some(at) if now >= at => {
                    self.reconnect_at = None;
                    self.open(now)
                },
                _ => Vec::new(),
            },
            ConnectionState::Connecting => match self.connect_deadline {
                Some(deadline) if now >= deadline => {
                    let timeout = self.config.connect_timeout;
                    self.fail(format!("connect timeout after {timeout:?}"), now)
                },
                _ => Vec::new(),
            },
            ConnectionState::Connected => {
                if let Some(deadline) = self.idle_deadline()
                    && now >= deadline
                {
                    let silent = self.last_inbound.map_or(Duration::ZERO, |last| now - last);
                    return self.fail(format!("idle timeout after {silent:?}"), now);
                }
                match self.heartbeat_deadline() {
                    Some(deadline) if now >= deadline => {
                        vec![self.transmit(self.codec.heartbeat(), now)]
                    },
                    _ => Vec::new(),
                }
            },
        }
    }

    /// Earliest instant at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        match self.state {
            ConnectionState::Disconnected => None,
            ConnectionState::Reconnecting => self.reconnect_at,
            ConnectionState::Connecting => self.connect_deadline,
            ConnectionState::Connected => {
                match (self.idle_deadline(), self.heartbeat_deadline()) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            },
        }
    }

    fn open(&mut self, now: I) -> Vec<ManagerAction> {
        self.generation += 1;
        self.reset_session();
        self.state = ConnectionState::Connecting;
        self.connect_deadline = Some(now + self.config.connect_timeout);

        let url = self.codec.open_url(&self.config.url, mix(self.entropy, self.generation));
        tracing::info!(
            generation = self.generation,
            attempt = self.attempts,
            %url,
            "opening transport"
        );
        vec![ManagerAction::OpenTransport { generation: self.generation, url }]
    }

    /// Enter `Connected`: announce, re-subscribe, flush.
    fn complete_connect(
        &mut self,
        server_heartbeat: Option<(u64, u64)>,
        now: I,
    ) -> Vec<ManagerAction> {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.gave_up = false;
        self.connect_deadline = None;
        self.last_inbound = Some(now);
        self.last_outbound = Some(now);

        match server_heartbeat {
            Some(server) => {
                let offer = self.codec.heartbeat_offer();
                let (outgoing, incoming) = negotiate_heartbeat(offer, server);
                self.heartbeat_every = outgoing;
                self.idle_after = incoming.map(|every| self.config.idle_timeout.max(every * 2));
            },
            None => {
                self.heartbeat_every = Some(self.config.heartbeat_interval);
                self.idle_after = Some(self.config.idle_timeout);
            },
        }

        tracing::info!(
            generation = self.generation,
            pending = self.queue.len(),
            topics = self.subscriptions.len(),
            "connected"
        );

        let mut texts = Vec::new();
        for (id, destination) in self.subscriptions.activate_all() {
            texts.extend(self.codec.encode_subscribe(&id, &destination));
        }
        let queued: Vec<OutboundEnvelope> = self.queue.drain().collect();
        texts.extend(queued.iter().map(|envelope| self.codec.encode_envelope(envelope)));

        let mut actions = Vec::with_capacity(texts.len() + 1);
        actions.push(ManagerAction::Emit(InboundEvent::ConnectionOpened));
        actions.extend(texts.into_iter().map(|text| self.transmit(text, now)));
        actions
    }

    /// Manager-initiated close: drop the transport and take the reconnect
    /// path.
    fn fail(&mut self, reason: String, now: I) -> Vec<ManagerAction> {
        tracing::warn!(generation = self.generation, %reason, "closing transport");
        let mut actions = vec![ManagerAction::CloseTransport {
            generation: self.generation,
            reason: reason.clone(),
        }];
        actions.extend(self.lose_connection(reason, now));
        actions
    }

    fn lose_connection(&mut self, reason: String, now: I) -> Vec<ManagerAction> {
        let was_connected = self.state == ConnectionState::Connected;
        self.reset_session();
        self.subscriptions.deactivate_all();

        let mut actions = Vec::new();
        if was_connected {
            actions.push(ManagerAction::Emit(InboundEvent::ConnectionClosed { reason }));
        }

        if self.attempts < self.config.reconnect.max_attempts {
            let delay = reconnect_delay(&self.config.reconnect, self.attempts);
            self.attempts += 1;
            self.state = ConnectionState::Reconnecting;
            self.reconnect_at = Some(now + delay);
            tracing::info!(attempt = self.attempts, ?delay, "reconnect scheduled");
            actions.push(ManagerAction::ReconnectScheduled { attempt: self.attempts, delay });
        } else {
            self.state = ConnectionState::Disconnected;
            self.gave_up = true;
            tracing::warn!(attempts = self.attempts, "giving up on reconnecting");
            actions.push(ManagerAction::GaveUp { attempts: self.attempts });
        }

        actions
    }

    fn transmit(&mut self, text: String, now: I) -> ManagerAction {
        self.last_outbound = Some(now);
        ManagerAction::Transmit { generation: self.generation, text }
    }

    /// Clear per-transport state.
    fn reset_session(&mut self) {
        self.transport_open = false;
        self.connect_deadline = None;
        self.last_inbound = None;
        self.last_outbound = None;
        self.heartbeat_every = None;
        self.idle_after = None;
    }

    /// Inputs for another generation, or arriving when no transport is
    /// expected, belong to an abandoned socket.
    fn is_stale(&self, generation: u64) -> bool {
        generation != self.generation
            || !matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected)
    }

    fn idle_deadline(&self) -> Option<I> {
        Some(self.last_inbound? + self.idle_after?)
    }

    fn heartbeat_deadline(&self) -> Option<I> {
        Some(self.last_outbound? + self.heartbeat_every?)
    }

    fn destination(&self, topic: &str) -> Result<String, ManagerError> {
        if self.codec.kind() == TransportKind::Json {
            return Err(ManagerError::TopicsUnsupported { transport: TransportKind::Json });
        }
        if topic.trim().is_empty() {
            return Err(ManagerError::InvalidTopic(topic.to_string()));
        }
        self.codec
            .destination(topic)
            .ok_or(ManagerError::TopicsUnsupported { transport: self.codec.kind() })
    }
}

/// SplitMix64 step, so consecutive generations get unrelated SockJS paths.
fn mix(seed: u64, generation: u64) -> u64 {
    let mut z = seed.wrapping_add(generation.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use std::ops::{Add, Sub};

    use linkwave_proto::{StompCommand, StompFrame};

    use super::*;
    use crate::config::{MAX_RECONNECT_DELAY, ReconnectPolicy, StompConfig, TransportConfig};

    /// Millisecond test clock.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct Ms(u64);

    impl Add<Duration> for Ms {
        type Output = Ms;

        fn add(self, rhs: Duration) -> Ms {
            Ms(self.0 + rhs.as_millis() as u64)
        }
    }

    impl Sub for Ms {
        type Output = Duration;

        fn sub(self, rhs: Ms) -> Duration {
            Duration::from_millis(self.0.saturating_sub(rhs.0))
        }
    }

    fn json_manager() -> ConnectionManager<Ms> {
        let mut config = ManagerConfig::json("ws://gateway/ws");
        config.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_attempts: 3,
            max_delay: None,
        };
        ConnectionManager::new(config, 7).unwrap()
    }

    fn stomp_manager(sockjs: bool) -> ConnectionManager<Ms> {
        let mut config = ManagerConfig::stomp("ws://gateway/ws/chat");
        config.transport = TransportConfig::Stomp(StompConfig { sockjs, ..StompConfig::default() });
        ConnectionManager::new(config, 7).unwrap()
    }

    fn transmitted(actions: &[ManagerAction]) -> Vec<&str> {
        actions
            .iter()
            .filter_map(|a| match a {
                ManagerAction::Transmit { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn stomp_commands(actions: &[ManagerAction]) -> Vec<StompCommand> {
        transmitted(actions)
            .into_iter()
            .flat_map(|text| StompFrame::decode_all(text).unwrap())
            .map(|frame| frame.command)
            .collect()
    }

    /// Connect and complete the open at `now`.
    fn connected_json(now: Ms) -> ConnectionManager<Ms> {
        let mut manager = json_manager();
        manager.connect(now);
        manager.handle_opened(manager.generation(), now);
        assert_eq!(manager.state(), ConnectionState::Connected);
        manager
    }

    const CONNECTED: &str = "CONNECTED\nversion:1.2\nheart-beat:4000,4000\n\n\0";

    #[test]
    fn connect_is_idempotent() {
        let mut manager = json_manager();
        let actions = manager.connect(Ms(0));
        assert_eq!(actions, vec![ManagerAction::OpenTransport {
            generation: 1,
            url: "ws://gateway/ws".to_string()
        }]);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        assert!(manager.connect(Ms(1)).is_empty());
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn queued_sends_flush_in_order_on_connect() {
        let mut manager = json_manager();
        let first = OutboundEnvelope::chat("u2", "one");
        let second = OutboundEnvelope::chat("u2", "two");

        assert_eq!(manager.send(first.clone(), Ms(0)).0, SendOutcome::Queued);
        assert_eq!(manager.send(second.clone(), Ms(0)).0, SendOutcome::Queued);
        assert_eq!(manager.pending_len(), 2);

        manager.connect(Ms(0));
        let actions = manager.handle_opened(1, Ms(5));

        assert_eq!(actions[0], ManagerAction::Emit(InboundEvent::ConnectionOpened));
        assert_eq!(transmitted(&actions), vec![first.to_json(), second.to_json()]);
        assert_eq!(manager.pending_len(), 0);
    }

    #[test]
    fn send_while_connected_transmits() {
        let mut manager = connected_json(Ms(0));
        let envelope = OutboundEnvelope::typing_start("u2");
        let (outcome, actions) = manager.send(envelope.clone(), Ms(1));
        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(actions, vec![ManagerAction::Transmit {
            generation: 1,
            text: envelope.to_json()
        }]);
        assert_eq!(manager.pending_len(), 0);
    }

    #[test]
    fn drop_schedules_backoff_then_gives_up() {
        let mut manager = connected_json(Ms(0));

        let actions = manager.handle_closed(1, "network", Ms(10));
        assert!(actions.contains(&ManagerAction::Emit(InboundEvent::ConnectionClosed {
            reason: "network".into()
        })));

        let mut now = Ms(10);
        let mut delays = Vec::new();
        let mut last = actions;
        loop {
            match last.last() {
                Some(ManagerAction::ReconnectScheduled { delay, .. }) => {
                    let delay = *delay;
                    delays.push(delay.as_millis());
                    assert_eq!(manager.state(), ConnectionState::Reconnecting);
                    now = now + delay;
                    let open = manager.tick(now);
                    assert!(matches!(open[0], ManagerAction::OpenTransport { .. }));
                    last = manager.handle_closed(manager.generation(), "refused", now);
                },
                Some(ManagerAction::GaveUp { attempts }) => {
                    assert_eq!(*attempts, 3);
                    break;
                },
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(delays, vec![1000, 2000, 4000]);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.gave_up());
        assert_eq!(manager.next_deadline(), None);
        assert!(manager.tick(Ms(1_000_000)).is_empty());
    }

    #[test]
    #[allow(clippy::disallowed_methods)]
    fn unbounded_retries_keep_deadlines_on_the_system_clock() {
        let mut config = ManagerConfig::json("ws://gateway/ws");
        config.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            max_attempts: u32::MAX,
            max_delay: None,
        };
        let mut manager = ConnectionManager::<std::time::Instant>::new(config, 7).unwrap();
        let now = std::time::Instant::now();
        manager.connect(now);

        for _ in 0..64 {
            let actions = manager.handle_closed(manager.generation(), "refused", now);
            let Some(ManagerAction::ReconnectScheduled { delay, .. }) = actions.last() else {
                panic!("expected a scheduled reconnect, got {actions:?}");
            };
            assert!(*delay <= MAX_RECONNECT_DELAY);
            assert_eq!(manager.next_deadline(), Some(now + *delay));
            manager.connect(now);
        }
        assert_eq!(manager.attempts(), 64);
    }

    #[test]
    fn successful_reconnect_resets_attempts() {
        let mut manager = connected_json(Ms(0));
        manager.handle_closed(1, "network", Ms(0));
        assert_eq!(manager.attempts(), 1);

        manager.tick(Ms(1000));
        manager.handle_opened(manager.generation(), Ms(1001));
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.attempts(), 0);
    }

    #[test]
    fn disconnect_cancels_pending_reconnect() {
        let mut manager = connected_json(Ms(0));
        manager.handle_closed(1, "network", Ms(0));
        assert_eq!(manager.next_deadline(), Some(Ms(1000)));

        let actions = manager.disconnect(Ms(10));
        assert!(actions.is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.tick(Ms(5000)).is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_drops_queue_and_is_idempotent() {
        let mut manager = json_manager();
        manager.send(OutboundEnvelope::ping(), Ms(0));
        manager.connect(Ms(0));

        let actions = manager.disconnect(Ms(1));
        assert_eq!(actions, vec![ManagerAction::CloseTransport {
            generation: 1,
            reason: CLIENT_DISCONNECT.to_string()
        }]);
        assert_eq!(manager.pending_len(), 0);
        assert!(manager.disconnect(Ms(2)).is_empty());
    }

    #[test]
    fn late_open_after_disconnect_is_ignored() {
        let mut manager = json_manager();
        manager.connect(Ms(0));
        manager.disconnect(Ms(1));

        assert!(manager.handle_opened(1, Ms(2)).is_empty());
        assert!(manager.handle_text(1, r#"{"type":"pong"}"#, Ms(2)).is_empty());
        assert!(manager.handle_closed(1, "late", Ms(3)).is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_from_reconnecting_opens_now_and_keeps_attempts() {
        let mut manager = connected_json(Ms(0));
        manager.handle_closed(1, "network", Ms(0));

        let actions = manager.connect(Ms(10));
        assert!(matches!(actions[0], ManagerAction::OpenTransport { generation: 2, .. }));
        assert_eq!(manager.attempts(), 1);
        assert_eq!(manager.next_deadline(), Some(Ms(10) + manager.config().connect_timeout));
    }

    #[test]
    fn heartbeat_follows_interval() {
        let mut manager = connected_json(Ms(0));
        let interval = manager.config().heartbeat_interval;

        assert!(manager.tick(Ms(0) + (interval - Duration::from_millis(1))).is_empty());
        let actions = manager.tick(Ms(0) + interval);
        assert_eq!(transmitted(&actions), vec![OutboundEnvelope::ping().to_json()]);
        assert_eq!(manager.next_deadline(), Some(Ms(0) + interval * 2));
    }

    #[test]
    fn idle_connection_is_recycled() {
        let mut manager = connected_json(Ms(0));
        let idle = manager.config().idle_timeout;

        let mut now = Ms(0);
        while now < Ms(0) + idle {
            let next = manager.next_deadline().unwrap();
            now = next;
            let actions = manager.tick(now);
            if manager.state() != ConnectionState::Connected {
                assert!(matches!(actions[0], ManagerAction::CloseTransport { .. }));
                break;
            }
        }
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn inbound_frames_keep_connection_alive() {
        let mut manager = connected_json(Ms(0));
        let idle = manager.config().idle_timeout;
        let step = Duration::from_secs(10);

        let mut now = Ms(0);
        while now < Ms(0) + idle * 3 {
            now = now + step;
            manager.handle_text(1, r#"{"event":"pong"}"#, now);
            manager.tick(now);
        }
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn connect_timeout_takes_reconnect_path() {
        let mut manager = json_manager();
        manager.connect(Ms(0));
        let deadline = manager.next_deadline().unwrap();

        let actions = manager.tick(deadline);
        assert!(matches!(actions[0], ManagerAction::CloseTransport { generation: 1, .. }));
        assert!(matches!(actions[1], ManagerAction::ReconnectScheduled { attempt: 1, .. }));
    }

    #[test]
    fn events_are_emitted_and_garbage_dropped() {
        let mut manager = connected_json(Ms(0));
        let actions = manager.handle_text(1, r#"{"type":"typing.start","from":"u2"}"#, Ms(1));
        assert_eq!(actions, vec![ManagerAction::Emit(InboundEvent::TypingStarted {
            from: "u2".into(),
            room_id: None
        })]);

        assert!(manager.handle_text(1, "{not json", Ms(2)).is_empty());
        assert!(manager.handle_text(1, r#"{"type":"unknown"}"#, Ms(3)).is_empty());
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn json_transport_rejects_topics() {
        let mut manager = json_manager();
        assert_eq!(
            manager.subscribe("42", Ms(0)),
            Err(ManagerError::TopicsUnsupported { transport: TransportKind::Json })
        );
        assert!(manager.unsubscribe("42", Ms(0)).is_err());
    }

    #[test]
    fn stomp_handshake_subscribes_then_flushes() {
        let mut manager = stomp_manager(false);
        manager.subscribe("42", Ms(0)).unwrap();
        manager.send(OutboundEnvelope::room_chat("42", "hi"), Ms(0));
        manager.connect(Ms(0));

        let actions = manager.handle_opened(1, Ms(1));
        assert_eq!(stomp_commands(&actions), vec![StompCommand::Connect]);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let actions = manager.handle_text(1, CONNECTED, Ms(2));
        assert_eq!(actions[0], ManagerAction::Emit(InboundEvent::ConnectionOpened));
        assert_eq!(stomp_commands(&actions), vec![StompCommand::Subscribe, StompCommand::Send]);
        assert_eq!(manager.subscriptions().iter().next().unwrap().id.as_deref(), Some("sub-0"));
    }

    #[test]
    fn stomp_resubscribe_replaces_live_subscription() {
        let mut manager = stomp_manager(false);
        manager.connect(Ms(0));
        manager.handle_opened(1, Ms(0));
        manager.handle_text(1, CONNECTED, Ms(0));

        manager.subscribe("42", Ms(1)).unwrap();
        let actions = manager.subscribe("42", Ms(2)).unwrap();
        let frames: Vec<StompFrame> = transmitted(&actions)
            .into_iter()
            .flat_map(|t| StompFrame::decode_all(t).unwrap())
            .collect();
        assert_eq!(frames[0].command, StompCommand::Unsubscribe);
        assert_eq!(frames[0].header("id"), Some("sub-0"));
        assert_eq!(frames[1].command, StompCommand::Subscribe);
        assert_eq!(frames[1].header("id"), Some("sub-1"));
        assert_eq!(manager.subscriptions().len(), 1);

        let actions = manager.unsubscribe("42", Ms(3)).unwrap();
        assert_eq!(stomp_commands(&actions), vec![StompCommand::Unsubscribe]);
        assert!(manager.subscriptions().is_empty());
    }

    #[test]
    fn messages_for_retired_subscriptions_are_dropped() {
        let mut manager = stomp_manager(false);
        manager.connect(Ms(0));
        manager.handle_opened(1, Ms(0));
        manager.handle_text(1, CONNECTED, Ms(0));
        manager.subscribe("42", Ms(1)).unwrap();
        manager.subscribe("42", Ms(2)).unwrap();

        let message = |id: &str| {
            StompFrame::new(StompCommand::Message)
                .with_header("destination", "/topic/room.42")
                .with_header("subscription", id)
                .with_body(r#"{"id":"m1","sender":"u1","body":"hey"}"#)
                .encode()
        };
        assert!(manager.handle_text(1, &message("sub-0"), Ms(3)).is_empty());
        assert_eq!(manager.handle_text(1, &message("sub-1"), Ms(3)).len(), 1);
        assert_eq!(manager.handle_text(1, &message("user"), Ms(3)).len(), 1);

        manager.unsubscribe("42", Ms(4)).unwrap();
        assert!(manager.handle_text(1, &message("sub-1"), Ms(5)).is_empty());
    }

    #[test]
    fn stomp_error_frame_reconnects_and_resubscribes() {
        let mut manager = stomp_manager(false);
        manager.subscribe("42", Ms(0)).unwrap();
        manager.connect(Ms(0));
        manager.handle_opened(1, Ms(0));
        manager.handle_text(1, CONNECTED, Ms(0));

        let actions = manager.handle_text(1, "ERROR\nmessage:boom\n\n\0", Ms(1));
        assert!(matches!(actions[0], ManagerAction::CloseTransport { .. }));
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert!(manager.subscriptions().iter().all(|s| s.id.is_none()));

        let at = manager.next_deadline().unwrap();
        manager.tick(at);
        manager.handle_opened(2, at);
        let actions = manager.handle_text(2, CONNECTED, at);
        assert_eq!(stomp_commands(&actions), vec![StompCommand::Subscribe]);
        assert_eq!(manager.subscriptions().topics().collect::<Vec<_>>(), vec!["42"]);
    }

    #[test]
    fn stomp_disconnect_says_goodbye() {
        let mut manager = stomp_manager(false);
        manager.connect(Ms(0));
        manager.handle_opened(1, Ms(0));
        manager.handle_text(1, CONNECTED, Ms(0));
        manager.subscribe("42", Ms(0)).unwrap();

        let actions = manager.disconnect(Ms(1));
        assert_eq!(stomp_commands(&actions), vec![StompCommand::Disconnect]);
        assert!(matches!(actions[1], ManagerAction::CloseTransport { .. }));
        assert_eq!(
            actions[2],
            ManagerAction::Emit(InboundEvent::ConnectionClosed {
                reason: CLIENT_DISCONNECT.to_string()
            })
        );
        assert!(manager.subscriptions().is_empty());
    }

    #[test]
    fn stomp_heartbeat_is_negotiated() {
        let mut manager = stomp_manager(false);
        manager.connect(Ms(0));
        manager.handle_opened(1, Ms(0));
        manager.handle_text(1, "CONNECTED\nversion:1.2\nheart-beat:0,10000\n\n\0", Ms(0));

        // Server wants 10 s, we offered 4 s: the slower one wins. No server
        // heart-beats, so no idle deadline.
        assert_eq!(manager.next_deadline(), Some(Ms(10_000)));
        assert_eq!(transmitted(&manager.tick(Ms(10_000))), vec!["\n"]);
    }

    #[test]
    fn sockjs_waits_for_open_frame() {
        let mut manager = stomp_manager(true);
        let actions = manager.connect(Ms(0));
        let ManagerAction::OpenTransport { url, .. } = &actions[0] else {
            panic!("expected open");
        };
        assert!(url.ends_with("/websocket"));

        assert!(manager.handle_opened(1, Ms(1)).is_empty());
        let actions = manager.handle_text(1, "o", Ms(2));
        let texts = transmitted(&actions);
        let [text] = texts.as_slice() else {
            panic!("expected one frame");
        };
        assert!(text.starts_with(r#"["CONNECT\n"#));

        let connected = linkwave_proto::sockjs::encode_messages(&[CONNECTED]);
        let actions = manager.handle_text(1, &format!("a{connected}"), Ms(3));
        assert_eq!(actions, vec![ManagerAction::Emit(InboundEvent::ConnectionOpened)]);

        let actions = manager.handle_text(1, r#"c[3000,"Go away!"]"#, Ms(4));
        assert!(matches!(actions[0], ManagerAction::CloseTransport { .. }));
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
    }
}
