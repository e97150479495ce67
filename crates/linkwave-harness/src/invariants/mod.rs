//! Connection invariants checked after every simulated step.
//!
//! A [`SystemSnapshot`] captures what an outside observer can see of a
//! [`crate::SimWorld`]: manager state, queue depth, retry counters, live
//! topics, and the event and delivery logs. Each [`Invariant`] inspects one
//! property of that snapshot. The model-based tests and the fuzz target run
//! the [`InvariantRegistry::standard`] set after every operation, so a
//! violation points at the exact step that broke it.
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.check_all(&world.snapshot())?;
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    FifoDelivery, LifecycleAlternates, QueueDrainedWhenConnected, RetryBudget,
    SingleSubscriptionPerTopic,
};
pub use snapshot::{SystemSnapshot, TopicSnapshot};

/// Outcome of a single invariant check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which invariant failed.
    pub invariant: &'static str,
    /// What the snapshot showed.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Property of a connection that holds after every step.
pub trait Invariant: Send + Sync {
    /// Short `snake_case` name used in reports.
    fn name(&self) -> &'static str;

    /// Inspect `state`.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;

    /// Violation of this invariant with `message`.
    fn violation(&self, message: impl Into<String>) -> Violation
    where
        Self: Sized,
    {
        Violation { invariant: self.name(), message: message.into() }
    }
}

/// Ordered set of invariants.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl InvariantRegistry {
    /// Registry without invariants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection invariant:
    ///
    /// - [`QueueDrainedWhenConnected`]
    /// - [`RetryBudget`]
    /// - [`LifecycleAlternates`]
    /// - [`SingleSubscriptionPerTopic`]
    /// - [`FifoDelivery`]
    pub fn standard() -> Self {
        Self::new()
            .with(QueueDrainedWhenConnected)
            .with(RetryBudget)
            .with(LifecycleAlternates)
            .with(SingleSubscriptionPerTopic)
            .with(FifoDelivery)
    }

    /// Registry with `invariant` appended.
    #[must_use]
    pub fn with<I: Invariant + 'static>(mut self, invariant: I) -> Self {
        self.invariants.push(Box::new(invariant));
        self
    }

    /// Names of the registered invariants, in check order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.invariants.iter().map(|invariant| invariant.name())
    }

    /// Run every invariant and collect all violations.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.invariants.iter().filter_map(|invariant| invariant.check(state).err()).collect();
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Like [`InvariantRegistry::check_all`], but panics with every violation
    /// and `context` in the message.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        let Err(violations) = self.check_all(state) else { return };
        let report: Vec<String> = violations.iter().map(ToString::to_string).collect();
        panic!("{} violation(s) {context}:\n  {}", report.len(), report.join("\n  "));
    }
}
