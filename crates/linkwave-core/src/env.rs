//! Environment abstraction for deterministic testing.
//!
//! Decouples the connection logic from system resources (time, randomness).
//! Production uses tokio time and OS entropy; the simulation harness uses a
//! virtual clock and a seeded RNG so every reconnect schedule is reproducible.

use std::{
    fmt::Debug,
    ops::{Add, Sub},
    time::Duration,
};

/// Monotonic instant usable by the connection manager.
///
/// The manager stores deadlines (`now + delay`) and measures elapsed time
/// (`later - earlier`), so both directions of arithmetic are required.
pub trait MonotonicInstant:
    Copy + Ord + Debug + Send + Sync + Add<Duration, Output = Self> + Sub<Output = Duration>
{
}

impl<T> MonotonicInstant for T where
    T: Copy + Ord + Debug + Send + Sync + Add<Duration, Output = T> + Sub<Output = Duration>
{
}

/// Abstract environment providing time, randomness, and sleeping.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` is seeded deterministically in simulation
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type of this environment's clock.
    type Instant: MonotonicInstant;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleep until `deadline`.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not the manager).
    fn sleep_until(&self, deadline: Self::Instant) -> impl Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Sleep for `duration` from now.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.sleep_until(self.now() + duration)
    }
}
