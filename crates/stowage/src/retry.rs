//! Retry policy for backend loads.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Immutable backoff configuration for [`ResourceCache`](crate::ResourceCache) loads.
///
/// The default makes a single attempt, which is what a cache built without
/// any retry configuration does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    use_exponential_backoff: bool,
}

impl RetryPolicy {
    /// Attempts made by the default policy.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
    /// Base delay of the default policy.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
    /// Delay cap of the default policy.
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(2000);

    /// Create a policy. `max_attempts` is clamped to at least 1.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        use_exponential_backoff: bool,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            use_exponential_backoff,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Exponential backoff with the default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::new(
            max_attempts,
            Self::DEFAULT_BASE_DELAY,
            Self::DEFAULT_MAX_DELAY,
            true,
        )
    }

    /// Fixed delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, delay, false)
    }

    /// Total number of backend calls allowed for one load.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay used after the first failure.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper bound for exponential delays.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Whether delays double after each failure.
    pub fn use_exponential_backoff(&self) -> bool {
        self.use_exponential_backoff
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Exponential: `min(base * 2^(attempt - 1), max)`. Fixed: `base`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.base_delay;
        }

        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay waited before attempt number `attempt`; zero for the first one.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.delay_after(attempt - 1)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_MAX_ATTEMPTS,
            Self::DEFAULT_BASE_DELAY,
            Self::DEFAULT_MAX_DELAY,
            false,
        )
    }
}

/// Serializable form of a [`RetryPolicy`], in milliseconds.
///
/// Every field is optional in the source document and falls back to the
/// default policy.
///
/// ```json
/// { "max_attempts": 3, "base_delay_ms": 100, "max_delay_ms": 2000, "use_exponential_backoff": true }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub use_exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.use_exponential_backoff,
        )
    }
}

impl From<RetryPolicy> for RetryConfig {
    fn from(policy: RetryPolicy) -> Self {
        RetryConfig {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            use_exponential_backoff: policy.use_exponential_backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.base_delay(), Duration::from_millis(100));
        assert_eq!(policy.max_delay(), Duration::from_millis(2000));
        assert!(!policy.use_exponential_backoff());
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, false);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(50));
        for attempt in 1..5 {
            assert_eq!(policy.delay_after(attempt), Duration::from_millis(50));
        }
    }

    #[test]
    fn test_exponential_delay_before_attempt() {
        let policy = RetryPolicy::new(
            8,
            Duration::from_millis(100),
            Duration::from_millis(1000),
            true,
        );

        assert_eq!(policy.delay_before(1), Duration::ZERO);
        // min(base * 2^(i-2), max)
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
        assert_eq!(policy.delay_before(5), Duration::from_millis(800));
        assert_eq!(policy.delay_before(6), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(7), Duration::from_millis(1000));
    }

    #[test]
    fn test_exponential_delay_does_not_overflow() {
        let policy = RetryPolicy::new(
            u32::MAX,
            Duration::from_secs(u64::MAX / 4),
            Duration::from_secs(30),
            true,
        );
        assert_eq!(policy.delay_after(200), Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_json() {
        let config: RetryConfig =
            serde_json::from_str(r#"{ "max_attempts": 3, "use_exponential_backoff": true }"#)
                .unwrap();
        let policy = RetryPolicy::from(config);

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay(), Duration::from_millis(100));
        assert_eq!(policy.max_delay(), Duration::from_millis(2000));
        assert!(policy.use_exponential_backoff());
    }

    #[test]
    fn test_config_default_matches_policy_default() {
        assert_eq!(RetryPolicy::from(RetryConfig::default()), RetryPolicy::default());
    }
}
