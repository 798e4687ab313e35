//! Retry timing for transient fetch failures

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with additive jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry, before jitter
    pub base_delay: Duration,

    /// Upper bound for backoff delays and for server-requested waits
    pub max_delay: Duration,

    /// Jitter as a fraction of the capped delay (0.0 disables it)
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            jitter_ratio: 0.1,
        }
    }

    pub fn with_jitter(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let base_ms = self.base_delay.as_millis() as u64;
        let capped_ms = base_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay.as_millis() as u64);

        let max_jitter_ms = (capped_ms as f64 * self.jitter_ratio) as u64;
        let jitter_ms = if max_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=max_jitter_ms)
        } else {
            0
        };

        Duration::from_millis(capped_ms + jitter_ms)
    }

    /// Delay before retry `retry`, preferring a server-provided Retry-After
    ///
    /// Returns None when the server asks for a longer wait than `max_delay`;
    /// the hint is never shortened.
    pub fn delay_with_hint(&self, retry: u32, retry_after: Option<Duration>) -> Option<Duration> {
        match retry_after {
            Some(hint) if hint > self.max_delay => None,
            Some(hint) => Some(hint),
            None => Some(self.delay(retry)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            jitter_ratio: 0.0,
        }
    }

    #[test]
    fn test_exponential_growth() {
        let policy = policy();
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_max_cap() {
        let policy = policy();
        assert_eq!(policy.delay(10), Duration::from_millis(1_000));
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = policy().with_jitter(0.5);
        for _ in 0..50 {
            let delay = policy.delay(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_retry_after_hint_is_honoured() {
        let policy = policy();
        assert_eq!(
            policy.delay_with_hint(1, Some(Duration::from_millis(250))),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            policy.delay_with_hint(1, Some(Duration::from_millis(1_000))),
            Some(Duration::from_millis(1_000))
        );
        assert_eq!(policy.delay_with_hint(2, None), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_retry_after_beyond_cap_is_not_retried() {
        let policy = policy();
        assert_eq!(policy.delay_with_hint(1, Some(Duration::from_secs(120))), None);
    }
}
