//! Exponential reconnect backoff.

use std::time::Duration;

use crate::config::{MAX_RECONNECT_DELAY, ReconnectPolicy};

/// Delay before retry number `attempt + 1`, given `attempt` earlier retries.
///
/// `base_delay * 2^attempt`, clamped to `max_delay` and never above
/// [`MAX_RECONNECT_DELAY`], so `now + delay` stays representable on any
/// clock.
pub fn reconnect_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    let ceiling = policy.max_delay.map_or(MAX_RECONNECT_DELAY, |max| max.min(MAX_RECONNECT_DELAY));
    1u32.checked_shl(attempt)
        .and_then(|factor| policy.base_delay.checked_mul(factor))
        .map_or(ceiling, |delay| delay.min(ceiling))
}
