//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the connection manager and the
//! gateway at a point in time. Invariants operate on snapshots rather than
//! live state so every check sees one consistent view.

use linkwave_core::{ConnectionManager, ConnectionState, MonotonicInstant};
use linkwave_proto::EventKind;

/// One requested topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSnapshot {
    /// Topic as requested.
    pub topic: String,
    /// Live subscription ID on the current session.
    pub id: Option<String>,
}

/// Snapshot of the whole simulated system.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    /// Manager state.
    pub state: ConnectionState,
    /// Envelopes waiting in the pending queue.
    pub pending: usize,
    /// Retries since the last successful connect.
    pub attempts: u32,
    /// Configured retry budget.
    pub max_attempts: u32,
    /// Whether the manager gave up.
    pub gave_up: bool,
    /// Current transport generation.
    pub generation: u64,
    /// Requested topics in order.
    pub topics: Vec<TopicSnapshot>,
    /// `ConnectionOpened` / `ConnectionClosed` events emitted so far.
    pub lifecycle: Vec<EventKind>,
    /// Sequence numbers of chat messages as the gateway received them.
    pub delivered: Vec<u64>,
    /// Live subscriptions on the gateway as `(id, destination)`.
    pub gateway_subscriptions: Vec<(String, String)>,
}

impl Default for SystemSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl SystemSnapshot {
    /// Snapshot of a fresh, disconnected system.
    pub fn empty() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            pending: 0,
            attempts: 0,
            max_attempts: 0,
            gave_up: false,
            generation: 0,
            topics: Vec::new(),
            lifecycle: Vec::new(),
            delivered: Vec::new(),
            gateway_subscriptions: Vec::new(),
        }
    }

    /// Capture the manager side. Gateway-side fields stay empty.
    pub fn from_manager<I: MonotonicInstant>(manager: &ConnectionManager<I>) -> Self {
        Self {
            state: manager.state(),
            pending: manager.pending_len(),
            attempts: manager.attempts(),
            max_attempts: manager.config().reconnect.max_attempts,
            gave_up: manager.gave_up(),
            generation: manager.generation(),
            topics: manager
                .subscriptions()
                .iter()
                .map(|s| TopicSnapshot { topic: s.topic.clone(), id: s.id.clone() })
                .collect(),
            ..Self::empty()
        }
    }

    /// Attach the emitted lifecycle events.
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: Vec<EventKind>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Attach the gateway's delivery order.
    #[must_use]
    pub fn with_delivered(mut self, delivered: Vec<u64>) -> Self {
        self.delivered = delivered;
        self
    }

    /// Attach the gateway's live subscriptions.
    #[must_use]
    pub fn with_gateway_subscriptions(mut self, subscriptions: Vec<(String, String)>) -> Self {
        self.gateway_subscriptions = subscriptions;
        self
    }
}
