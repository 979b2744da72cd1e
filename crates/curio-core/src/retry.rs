//! Declarative retry/backoff policies consumed by step invokers.

use std::time::Duration;

use crate::defaults;

/// Backoff parameters for one step kind.
///
/// Classification and metadata get the lenient policy; categorization and
/// renderables get the strict one, reflecting the relative cost and
/// flakiness of their external calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Multiplier applied per subsequent retry.
    pub base: f64,
}

impl RetryPolicy {
    /// Lenient policy: 4 attempts, delays 5 s, 30 s, 180 s.
    pub fn lenient() -> Self {
        Self {
            max_attempts: defaults::RETRY_LENIENT_MAX_ATTEMPTS,
            initial_backoff_ms: defaults::RETRY_LENIENT_INITIAL_MS,
            base: defaults::RETRY_LENIENT_BASE,
        }
    }

    /// Strict policy: 2 attempts, one 10 s retry.
    pub fn strict() -> Self {
        Self {
            max_attempts: defaults::RETRY_STRICT_MAX_ATTEMPTS,
            initial_backoff_ms: defaults::RETRY_STRICT_INITIAL_MS,
            base: defaults::RETRY_STRICT_BASE,
        }
    }

    /// Policy with no retries, for tests and fail-fast callers.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            base: 1.0,
        }
    }

    /// Backoff before retry number `attempt` (0-based: the delay after the
    /// first failure is `backoff(0)`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ms = self.initial_backoff_ms as f64 * self.base.powi(attempt as i32);
        Duration::from_millis(ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_backoff_series() {
        let p = RetryPolicy::lenient();
        assert_eq!(p.max_attempts, 4);
        assert_eq!(p.backoff(0), Duration::from_secs(5));
        assert_eq!(p.backoff(1), Duration::from_secs(30));
        assert_eq!(p.backoff(2), Duration::from_secs(180));
    }

    #[test]
    fn strict_backoff_series() {
        let p = RetryPolicy::strict();
        assert_eq!(p.max_attempts, 2);
        assert_eq!(p.backoff(0), Duration::from_secs(10));
    }

    #[test]
    fn none_policy_single_attempt() {
        let p = RetryPolicy::none();
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.backoff(0), Duration::ZERO);
    }
}
