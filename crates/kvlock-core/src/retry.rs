use std::time::Duration;

use rand::Rng;

/// Delay schedule between lock acquisition attempts.
///
/// The base delay starts at `initial_delay` and is multiplied by `multiplier`
/// after each failed attempt, capped at `max_delay`. With `jitter` enabled the
/// actual sleep is drawn uniformly from `[base / 2, base]` so that waiters
/// released by the same unlock do not retry in lockstep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Constant delay between attempts, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
            jitter: false,
        }
    }

    /// Base delay after `attempt` failed attempts (0-indexed), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Delay to sleep after `attempt` failed attempts.
    ///
    /// Never zero unless the policy itself is configured with a zero delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let max_ms = base.as_millis() as u64;
        if !self.jitter || max_ms < 2 {
            return base;
        }
        let min_ms = max_ms / 2;
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(1), Duration::from_millis(20));
        assert_eq!(policy.delay(2), Duration::from_millis(40));
        assert_eq!(policy.delay(3), Duration::from_millis(80));
        assert_eq!(policy.delay(4), Duration::from_millis(100));
        assert_eq!(policy.delay(50), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..20 {
            let base = policy.base_delay(attempt);
            let delay = policy.delay(attempt);
            assert!(delay <= base, "attempt {}: {:?} > {:?}", attempt, delay, base);
            assert!(delay >= base / 2, "attempt {}: {:?} < {:?}", attempt, delay, base / 2);
            assert!(!delay.is_zero());
        }
    }

    #[test]
    fn test_fixed_policy() {
        let policy = RetryPolicy::fixed(Duration::from_millis(25));
        assert_eq!(policy.delay(0), Duration::from_millis(25));
        assert_eq!(policy.delay(7), Duration::from_millis(25));
    }
}
