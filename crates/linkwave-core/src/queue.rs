//! FIFO buffer for envelopes sent while the connection is down.

use std::collections::{VecDeque, vec_deque};

use linkwave_proto::OutboundEnvelope;

/// Outbound envelopes waiting for a usable connection.
///
/// Unbounded: the gateway has no resume protocol, so dropping here would
/// silently lose user messages. Drained in insertion order.
#[derive(Debug, Default, Clone)]
pub struct PendingQueue {
    items: VecDeque<OutboundEnvelope>,
}

impl PendingQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail.
    pub fn push(&mut self, envelope: OutboundEnvelope) {
        self.items.push_back(envelope);
    }

    /// Remove and yield every envelope, oldest first.
    pub fn drain(&mut self) -> vec_deque::Drain<'_, OutboundEnvelope> {
        self.items.drain(..)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Queued envelopes.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queued envelopes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &OutboundEnvelope> {
        self.items.iter()
    }
}
