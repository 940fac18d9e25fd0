//! Exponential backoff delays.

use crate::config::RetryConfig;
use std::time::Duration;

/// Calculate the delay to wait after the given (1-based) attempt fails.
///
/// `min(initial_delay * multiplier^(attempt - 1), max_delay)`. Attempt 0 is
/// treated as attempt 1. Overflowing values clamp to `max_delay`.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = i32::try_from(attempt.max(1) - 1).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_nanos() as f64 * config.backoff_multiplier.powi(exponent);
    let max = config.max_delay.as_nanos() as f64;

    if !base.is_finite() || base >= max {
        return config.max_delay;
    }
    Duration::from_nanos(base.max(0.0).round() as u64)
}

/// Delays between consecutive attempts: `max_attempts - 1` values.
///
/// No delay follows the final attempt.
pub fn schedule(config: RetryConfig) -> impl Iterator<Item = Duration> {
    (1..config.max_attempts).map(move |attempt| calculate_delay(attempt, &config))
}
