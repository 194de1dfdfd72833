//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Exponential delay before retry number `retry` (1 for the first retry).
///
/// `base_ms * 2^(retry - 1)`, saturating. Retry 0 means no wait.
pub fn exponential_ms(retry: u32, base_ms: u64) -> u64 {
    if retry == 0 {
        return 0;
    }
    let factor = 2u64.saturating_pow(retry - 1);
    base_ms.saturating_mul(factor)
}

/// Calculate the backoff for `retry`, adding up to `delay * jitter_factor` of
/// uniform jitter and clamping to `max_ms` when set.
///
/// `jitter_factor` is clamped to `0.0..=1.0`; NaN means no jitter.
pub fn calculate_backoff(retry: u32, base_ms: u64, jitter_factor: f64, max_ms: Option<u64>) -> Duration {
    let delay_ms = exponential_ms(retry, base_ms);
    if delay_ms == 0 {
        return Duration::ZERO;
    }

    let jitter_factor = if jitter_factor.is_nan() {
        0.0
    } else {
        jitter_factor.clamp(0.0, 1.0)
    };
    let spread = delay_ms as f64 * jitter_factor;
    let jitter = if spread > 0.0 {
        rand::thread_rng().gen_range(0.0..=spread)
    } else {
        0.0
    };

    let total = Duration::from_millis(delay_ms) + Duration::from_secs_f64(jitter / 1000.0);
    match max_ms {
        Some(max) => total.min(Duration::from_millis(max)),
        None => total,
    }
}
