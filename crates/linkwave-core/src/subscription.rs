//! Topic subscription bookkeeping for STOMP sessions.
//!
//! Topics are what the caller asked for and outlive individual sessions.
//! Subscription IDs belong to one STOMP session: they are assigned when the
//! `SUBSCRIBE` frame is sent and forgotten when the session ends, so after a
//! reconnect every topic is subscribed again under a fresh ID.

const ID_PREFIX: &str = "sub-";

/// One requested topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Topic as requested by the caller.
    pub topic: String,
    /// STOMP destination derived from the topic.
    pub destination: String,
    /// Live subscription ID, `None` until subscribed on the current session.
    pub id: Option<String>,
}

/// Topics in request order, at most one entry per topic.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionTable {
    entries: Vec<Subscription>,
    next_id: u64,
}

impl SubscriptionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `topic` without subscribing (no live session).
    pub fn record(&mut self, topic: &str, destination: String) {
        if !self.contains(topic) {
            self.entries.push(Subscription { topic: topic.to_string(), destination, id: None });
        }
    }

    /// Subscribe `topic` on the live session under a fresh ID.
    ///
    /// Returns `(stale_id, fresh_id)`; a stale ID must be unsubscribed before
    /// the fresh one is subscribed.
    pub fn activate(&mut self, topic: &str, destination: String) -> (Option<String>, String) {
        let fresh = self.allocate_id();
        match self.entries.iter_mut().find(|s| s.topic == topic) {
            Some(entry) => {
                entry.destination = destination;
                (entry.id.replace(fresh.clone()), fresh)
            },
            None => {
                self.entries.push(Subscription {
                    topic: topic.to_string(),
                    destination,
                    id: Some(fresh.clone()),
                });
                (None, fresh)
            },
        }
    }

    /// Assign fresh IDs to every topic for a new session.
    ///
    /// Returns `(id, destination)` pairs in request order.
    pub fn activate_all(&mut self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.entries.len());
        for index in 0..self.entries.len() {
            let id = self.allocate_id();
            let entry = &mut self.entries[index];
            entry.id = Some(id.clone());
            out.push((id, entry.destination.clone()));
        }
        out
    }

    /// Forget session-scoped IDs, keeping the topics.
    pub fn deactivate_all(&mut self) {
        for entry in &mut self.entries {
            entry.id = None;
        }
    }

    /// Remove `topic`, returning its entry if it was present.
    pub fn remove(&mut self, topic: &str) -> Option<Subscription> {
        let index = self.entries.iter().position(|s| s.topic == topic)?;
        Some(self.entries.remove(index))
    }

    /// Drop every topic.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether `topic` is requested.
    pub fn contains(&self, topic: &str) -> bool {
        self.entries.iter().any(|s| s.topic == topic)
    }

    /// Topic owning the live subscription `id`.
    pub fn topic_for_id(&self, id: &str) -> Option<&str> {
        self.entries.iter().find(|s| s.id.as_deref() == Some(id)).map(|s| s.topic.as_str())
    }

    /// Whether a `MESSAGE` received under `id` may be delivered.
    ///
    /// IDs issued by this table pass only while live. IDs it never issued
    /// belong to server-side subscriptions and always pass.
    pub fn accepts(&self, id: &str) -> bool {
        let issued = id
            .strip_prefix(ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .is_some_and(|n| n < self.next_id);
        !issued || self.topic_for_id(id).is_some()
    }

    /// Requested topics in order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.topic.as_str())
    }

    /// Every entry in request order.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    /// Number of requested topics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no topic is requested.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn allocate_id(&mut self) -> String {
        let id = format!("{ID_PREFIX}{}", self.next_id);
        self.next_id += 1;
        id
    }
}
