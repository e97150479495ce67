//! The standard connection invariants.

use std::collections::HashSet;

use linkwave_core::ConnectionState;
use linkwave_proto::EventKind;

use super::{Invariant, InvariantResult, SystemSnapshot};

/// The pending queue is empty while connected.
///
/// The flush happens in the same step that enters `Connected`, so a queued
/// envelope next to a live connection means something was stranded.
pub struct QueueDrainedWhenConnected;

impl Invariant for QueueDrainedWhenConnected {
    fn name(&self) -> &'static str {
        "queue_drained_when_connected"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if state.state == ConnectionState::Connected && state.pending > 0 {
            let pending = state.pending;
            return Err(self.violation(format!("{pending} envelopes pending while connected")));
        }
        Ok(())
    }
}

/// Retries never exceed the budget, and giving up is terminal.
pub struct RetryBudget;

impl Invariant for RetryBudget {
    fn name(&self) -> &'static str {
        "retry_budget"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let (attempts, budget) = (state.attempts, state.max_attempts);
        if attempts > budget {
            return Err(self.violation(format!("{attempts} retries with a budget of {budget}")));
        }
        if state.gave_up && state.state != ConnectionState::Disconnected {
            return Err(self.violation(format!("gave up but state is {}", state.state)));
        }
        Ok(())
    }
}

/// Opened and closed events alternate, starting with opened, and the last
/// one agrees with the connection state.
pub struct LifecycleAlternates;

impl Invariant for LifecycleAlternates {
    fn name(&self) -> &'static str {
        "lifecycle_alternates"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (index, kind) in state.lifecycle.iter().enumerate() {
            let expected = if index % 2 == 0 {
                EventKind::ConnectionOpened
            } else {
                EventKind::ConnectionClosed
            };
            if *kind != expected {
                let message = format!("event {index} is {kind}, expected {expected}");
                return Err(self.violation(message));
            }
        }

        let open = state.lifecycle.len() % 2 == 1;
        if open != (state.state == ConnectionState::Connected) {
            let (current, events) = (state.state, state.lifecycle.len());
            return Err(self.violation(format!("state {current} after {events} lifecycle events")));
        }
        Ok(())
    }
}

/// At most one live subscription per topic, and none outside a session.
pub struct SingleSubscriptionPerTopic;

impl Invariant for SingleSubscriptionPerTopic {
    fn name(&self) -> &'static str {
        "single_subscription_per_topic"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut topics = HashSet::new();
        let mut ids = HashSet::new();

        for entry in &state.topics {
            if !topics.insert(entry.topic.as_str()) {
                return Err(self.violation(format!("topic {} recorded twice", entry.topic)));
            }
            if let Some(id) = &entry.id {
                if state.state != ConnectionState::Connected {
                    let topic = &entry.topic;
                    let message = format!("topic {topic} has id {id} while {}", state.state);
                    return Err(self.violation(message));
                }
                if !ids.insert(id.as_str()) {
                    return Err(self.violation(format!("subscription id {id} used twice")));
                }
            }
        }

        let mut destinations = HashSet::new();
        for (id, destination) in &state.gateway_subscriptions {
            if !destinations.insert(destination.as_str()) {
                let message = format!("gateway has a second subscription {id} on {destination}");
                return Err(self.violation(message));
            }
        }
        Ok(())
    }
}

/// Chat messages reach the gateway in the order they were sent.
///
/// Messages dropped by `disconnect()` leave gaps; reordering never happens.
pub struct FifoDelivery;

impl Invariant for FifoDelivery {
    fn name(&self) -> &'static str {
        "fifo_delivery"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for window in state.delivered.windows(2) {
            if window[1] <= window[0] {
                let (earlier, later) = (window[0], window[1]);
                return Err(self.violation(format!("message {later} delivered after {earlier}")));
            }
        }
        Ok(())
    }
}
