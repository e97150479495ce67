//! Clock and entropy for real connections.

use linkwave_core::Environment;

/// The tokio clock plus OS randomness.
///
/// Instants are `tokio::time::Instant`, so `#[tokio::test(start_paused)]`
/// tests drive reconnect and heartbeat timers without waiting.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG is unavailable.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Environment backed by the current tokio runtime's clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep_until(&self, deadline: Self::Instant) -> impl Future<Output = ()> + Send {
        tokio::time::sleep_until(deadline)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
