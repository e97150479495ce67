//! Virtual-time environment.
//!
//! `SimEnv` implements [`Environment`] with a clock that only moves when the
//! test calls [`SimEnv::advance`], and a `ChaCha8Rng` seeded from a `u64`, so
//! every reconnect schedule and SockJS path is reproducible from the seed.
//!
//! Clones share the clock and the RNG. Sleepers wake when a clone advances
//! the clock past their deadline.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use linkwave_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::watch;

/// Instant on the virtual clock, measured from the start of the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Start of the simulation.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Instant `ms` milliseconds after the start.
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Time since the start of the simulation.
    pub const fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.checked_add(rhs).unwrap_or(Duration::MAX))
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Deterministic environment for simulation.
#[derive(Clone)]
pub struct SimEnv {
    clock: Arc<watch::Sender<SimInstant>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("now", &*self.clock.borrow()).finish_non_exhaustive()
    }
}

impl SimEnv {
    /// Environment at time zero with the RNG seeded from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let (clock, _) = watch::channel(SimInstant::ZERO);
        let rng = ChaCha8Rng::seed_from_u64(seed);
        Self { clock: Arc::new(clock), rng: Arc::new(Mutex::new(rng)) }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.clock.send_modify(|now| *now = *now + by);
    }

    /// Move the clock forward to `at`. Earlier instants are ignored.
    pub fn advance_to(&self, at: SimInstant) {
        self.clock.send_if_modified(|now| {
            if at > *now {
                *now = at;
                true
            } else {
                false
            }
        });
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        *self.clock.borrow()
    }

    fn sleep_until(&self, deadline: SimInstant) -> impl Future<Output = ()> + Send {
        let mut clock = self.clock.subscribe();
        async move {
            loop {
                if *clock.borrow_and_update() >= deadline {
                    return;
                }
                if clock.changed().await.is_err() {
                    // Every SimEnv is gone; the clock can never reach the deadline.
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        assert_eq!(a.random_u64(), b.random_u64());
        assert_ne!(a.random_u64(), SimEnv::with_seed(8).random_u64());
    }

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::with_seed(0);
        let other = env.clone();
        env.advance(Duration::from_millis(250));
        assert_eq!(other.now(), SimInstant::from_millis(250));

        other.advance_to(SimInstant::from_millis(100));
        assert_eq!(env.now(), SimInstant::from_millis(250));
    }

    #[test]
    fn instant_arithmetic_saturates() {
        let t = SimInstant::from_millis(10);
        assert_eq!(SimInstant::ZERO - t, Duration::ZERO);
        assert_eq!(t - SimInstant::ZERO, Duration::from_millis(10));
        assert_eq!((t + Duration::MAX).since_start(), Duration::MAX);
    }

    #[tokio::test]
    async fn sleeper_wakes_when_clock_passes_deadline() {
        let env = SimEnv::with_seed(0);
        let sleeper = tokio::spawn({
            let env = env.clone();
            async move { env.sleep_until(SimInstant::from_millis(5_000)).await }
        });

        env.advance(Duration::from_secs(4));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());

        env.advance(Duration::from_secs(1));
        sleeper.await.unwrap();
    }
}
