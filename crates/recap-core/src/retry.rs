//! Retry policy and backoff calculation.
//!
//! Sync-only building blocks; the async retry loop lives in the runtime's
//! summarization worker, which has access to tokio and the cancellation
//! token.

use serde::{Deserialize, Serialize};

/// Default maximum retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Bounds for retrying a summarization attempt.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms.
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms.
    pub max_delay_ms: u64,
    /// Jitter range 0.0–1.0.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Total attempts allowed, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (zero-based), jittered by `random` in `[0, 1)`.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32, random: f64) -> u64 {
        calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        )
    }
}

/// Calculate exponential backoff delay with explicit randomness.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (random * 2 - 1) * jitter)`.
/// `random` should be a value in `[0.0, 1.0)` from a PRNG.
#[must_use]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    // Maps random [0,1) to [-jitter, +jitter]
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_jitter_is_pure_exponential() {
        assert_eq!(calculate_backoff_delay_with_random(0, 100, 10_000, 0.0, 0.7), 100);
        assert_eq!(calculate_backoff_delay_with_random(1, 100, 10_000, 0.0, 0.7), 200);
        assert_eq!(calculate_backoff_delay_with_random(3, 100, 10_000, 0.0, 0.7), 800);
    }

    #[test]
    fn capped_at_max_delay() {
        assert_eq!(calculate_backoff_delay_with_random(20, 1000, 5000, 0.0, 0.5), 5000);
    }

    #[test]
    fn jitter_bounds() {
        let low = calculate_backoff_delay_with_random(0, 1000, 60_000, 0.2, 0.0);
        let mid = calculate_backoff_delay_with_random(0, 1000, 60_000, 0.2, 0.5);
        assert_eq!(low, 800);
        assert_eq!(mid, 1000);
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let d = calculate_backoff_delay_with_random(u32::MAX, u64::MAX, u64::MAX, 0.0, 0.5);
        assert!(d > 0);
    }

    #[test]
    fn zero_base_delay_is_immediate() {
        let policy = RetryPolicy {
            base_delay_ms: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_ms(4, 0.9), 0);
    }

    #[test]
    fn max_attempts_counts_first_try() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.max_attempts(), 4);
    }
}
