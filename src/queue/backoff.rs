use std::time::Duration;

use rand::Rng;

use crate::models::{BackoffStrategy, RetryPolicy};

/// Delay before retry number `attempt` (1-based), without jitter.
///
/// `exponential` is `base * 2^attempt` capped at `max_delay`; `linear` is
/// `base * attempt`; `fixed` is `base`. Every strategy respects the cap.
pub fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let ms = match policy.backoff {
        BackoffStrategy::Fixed => policy.base_delay_ms,
        BackoffStrategy::Linear => policy.base_delay_ms.saturating_mul(attempt as u64),
        BackoffStrategy::Exponential => {
            let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
            policy.base_delay_ms.saturating_mul(factor)
        }
    };
    Duration::from_millis(ms.min(policy.max_delay_ms))
}

/// Perturb a delay by up to `jitter * delay` in either direction, so many
/// events failing at once do not retry in lockstep.
pub fn with_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let bound = delay.as_millis() as f64 * jitter.min(1.0);
    if bound < 1.0 {
        return delay;
    }
    let offset = rand::thread_rng().gen_range(-bound..bound);
    let ms = (delay.as_millis() as f64 + offset).max(0.0) as u64;
    Duration::from_millis(ms)
}
