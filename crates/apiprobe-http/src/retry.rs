//! Backoff between connect-phase retries.

use std::time::Duration;

use apiprobe_core::{HttpSettings, RetryStrategy};

/// Retry policy for transport failures that happen before a request is sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Same interval before every retry.
    Fixed {
        /// Delay before each retry.
        interval: Duration,
        /// Number of retries after the first attempt.
        max_retries: u32,
    },
    /// Delay grows by `step` on each retry.
    Linear {
        /// Delay before the first retry and increment for each later one.
        step: Duration,
        /// Number of retries after the first attempt.
        max_retries: u32,
    },
    /// Never retry.
    #[default]
    Never,
}

impl RetryPolicy {
    /// Builds the policy described by HTTP settings.
    pub fn from_settings(settings: &HttpSettings) -> Self {
        if settings.retries == 0 {
            return Self::Never;
        }
        let base = Duration::from_millis(settings.retry_backoff_ms);
        match settings.retry_strategy {
            RetryStrategy::Fixed => Self::Fixed {
                interval: base,
                max_retries: settings.retries,
            },
            RetryStrategy::Linear => Self::Linear {
                step: base,
                max_retries: settings.retries,
            },
        }
    }

    /// Delay before retry number `attempt` (0-based), or `None` once exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Fixed {
                interval,
                max_retries,
            } => (attempt < *max_retries).then_some(*interval),
            Self::Linear { step, max_retries } => {
                (attempt < *max_retries).then(|| step.saturating_mul(attempt.saturating_add(1)))
            }
            Self::Never => None,
        }
    }

    /// Upper bound on the number of retries.
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::Fixed { max_retries, .. } | Self::Linear { max_retries, .. } => *max_retries,
            Self::Never => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delays() {
        let policy = RetryPolicy::Fixed {
            interval: Duration::from_millis(100),
            max_retries: 2,
        };
        assert_eq!(policy.delay(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay(2), None);
    }

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy::Linear {
            step: Duration::from_millis(50),
            max_retries: 3,
        };
        assert_eq!(policy.delay(0), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay(2), Some(Duration::from_millis(150)));
        assert_eq!(policy.delay(3), None);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = HttpSettings::new("http://localhost");
        assert_eq!(RetryPolicy::from_settings(&settings), RetryPolicy::Never);

        settings.retries = 3;
        settings.retry_backoff_ms = 10;
        settings.retry_strategy = RetryStrategy::Linear;
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.delay(2), Some(Duration::from_millis(30)));
    }
}
