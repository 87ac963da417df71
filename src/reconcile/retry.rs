use std::time::Duration;

/// Bounded retry for one record's upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Pause before the second attempt, doubled for each one after.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Delay before `attempt` (1-based) or `None` once attempts are spent.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt <= 1 {
            return Some(Duration::ZERO);
        }
        if attempt > self.max_attempts {
            return None;
        }
        let exponent = (attempt - 2).min(16);
        Some(self.backoff.saturating_mul(1 << exponent))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// What a pass does when one record fails terminally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the whole pass. Mutations already applied stay applied.
    #[default]
    Abort,
    /// Log, remember the key in `ReconcileResult::failed_keys`, keep going.
    Continue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry_policy() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.delay_before(1), Some(Duration::ZERO));
        assert_eq!(policy.delay_before(2), None);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::attempts(4, Duration::from_millis(10));
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_before(3), Some(Duration::from_millis(20)));
        assert_eq!(policy.delay_before(4), Some(Duration::from_millis(40)));
        assert_eq!(policy.delay_before(5), None);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::attempts(0, Duration::ZERO).max_attempts, 1);
    }
}
