use crate::settings::DispatchSettings;
use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff for optimistic-concurrency retries
#[derive(Debug, Clone)]
pub struct ConflictRetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl ConflictRetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            jitter: true,
        }
    }

    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self::new(
            settings.max_conflict_retries,
            settings.initial_backoff,
            settings.max_backoff,
        )
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// True if retry number `attempt` (1-based) is still allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(20);
        let base = self
            .initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter && !base.is_zero() {
            // Uniform in [base/2, base] so contenders spread out
            let half = base / 2;
            let spread = rand::thread_rng().gen_range(0..=half.as_micros() as u64);
            half + Duration::from_micros(spread)
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = ConflictRetryPolicy::new(
            5,
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .without_jitter();

        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(40));
        assert_eq!(policy.delay(4), Duration::from_millis(50));
        assert_eq!(policy.delay(30), Duration::from_millis(50));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = ConflictRetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(1));
        for _ in 0..100 {
            let delay = policy.delay(2);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_retry_bound() {
        let policy = ConflictRetryPolicy::new(2, Duration::ZERO, Duration::ZERO);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
