//! Wait policies for the statistics API fetch loop
//!
//! The upstream API allows one request per minute, so every delay here is a
//! multiple of a single base pause rather than an adaptive estimate.

use std::time::Duration;

/// Timing and ceiling configuration for the fetch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Unit for transient and malformed backoff
    pub base_pause: Duration,
    /// Fixed pause after each consumed page
    pub rate_limit_pause: Duration,
    /// Failed attempts tolerated per page for network/HTTP failures
    pub max_http_retries: u32,
    /// Failed attempts tolerated per page for malformed 200 responses
    pub max_decode_retries: u32,
    /// Largest multiplier applied to `base_pause` for transient failures
    pub max_backoff_multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_pause: Duration::from_secs(60),
            rate_limit_pause: Duration::from_secs(60),
            max_http_retries: 3,
            max_decode_retries: 3,
            max_backoff_multiplier: 4,
        }
    }
}

impl BackoffConfig {
    /// Set the base pause
    pub fn with_base_pause(mut self, pause: Duration) -> Self {
        self.base_pause = pause;
        self
    }

    /// Set the inter-page pause
    pub fn with_rate_limit_pause(mut self, pause: Duration) -> Self {
        self.rate_limit_pause = pause;
        self
    }

    /// Set both retry ceilings
    pub fn with_max_retries(mut self, http: u32, decode: u32) -> Self {
        self.max_http_retries = http;
        self.max_decode_retries = decode;
        self
    }
}

/// Decision on whether to retry a page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay
    Retry { delay: Duration },
    /// Do not retry the request
    NoRetry,
}

/// Failure counters for the page currently being requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageAttempts {
    pub transient: u32,
    pub malformed: u32,
}

impl PageAttempts {
    /// Total requests issued for this page so far
    pub fn total(&self) -> u32 {
        self.transient + self.malformed
    }
}

/// Computes the delays used by the fetch loop
#[derive(Debug, Clone, Default)]
pub struct BackoffScheduler {
    config: BackoffConfig,
}

impl BackoffScheduler {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Pause inserted after every consumed page
    pub fn rate_limit_pause(&self) -> Duration {
        self.config.rate_limit_pause
    }

    /// Delay before retry number `attempt` (1-indexed) after a transient failure
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        let multiplier = attempt.clamp(1, self.config.max_backoff_multiplier.max(1));
        self.config.base_pause * multiplier
    }

    /// Delay before retrying after a malformed 200 response
    pub fn malformed_delay(&self) -> Duration {
        self.config.base_pause
    }

    /// Record a network/HTTP failure on the current page
    pub fn on_transient_failure(&self, attempts: &mut PageAttempts) -> RetryDecision {
        attempts.transient += 1;
        if attempts.transient >= self.config.max_http_retries {
            return RetryDecision::NoRetry;
        }
        RetryDecision::Retry {
            delay: self.transient_delay(attempts.transient),
        }
    }

    /// Record a malformed response on the current page
    pub fn on_malformed_response(&self, attempts: &mut PageAttempts) -> RetryDecision {
        attempts.malformed += 1;
        if attempts.malformed >= self.config.max_decode_retries {
            return RetryDecision::NoRetry;
        }
        RetryDecision::Retry {
            delay: self.malformed_delay(),
        }
    }

    /// Upper bound on requests issued for a single page
    pub fn max_requests_per_page(&self) -> u32 {
        let http = self.config.max_http_retries.max(1);
        let decode = self.config.max_decode_retries.max(1);
        // Each counter stops the page on its own ceiling, so one of them
        // can reach its limit only after the other sits one below its own
        (http - 1) + (decode - 1) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BackoffConfig::default();
        assert_eq!(config.base_pause, Duration::from_secs(60));
        assert_eq!(config.rate_limit_pause, Duration::from_secs(60));
        assert_eq!(config.max_http_retries, 3);
        assert_eq!(config.max_decode_retries, 3);
    }

    #[test]
    fn test_transient_delay_growth_is_capped() {
        let scheduler = BackoffScheduler::default();
        assert_eq!(scheduler.transient_delay(1), Duration::from_secs(60));
        assert_eq!(scheduler.transient_delay(2), Duration::from_secs(120));
        assert_eq!(scheduler.transient_delay(4), Duration::from_secs(240));
        assert_eq!(scheduler.transient_delay(9), Duration::from_secs(240));
    }

    #[test]
    fn test_malformed_delay_is_flat() {
        let scheduler = BackoffScheduler::new(
            BackoffConfig::default().with_base_pause(Duration::from_secs(5)),
        );
        assert_eq!(scheduler.malformed_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_transient_ceiling() {
        let scheduler = BackoffScheduler::default();
        let mut attempts = PageAttempts::default();

        assert_eq!(
            scheduler.on_transient_failure(&mut attempts),
            RetryDecision::Retry { delay: Duration::from_secs(60) }
        );
        assert_eq!(
            scheduler.on_transient_failure(&mut attempts),
            RetryDecision::Retry { delay: Duration::from_secs(120) }
        );
        assert_eq!(scheduler.on_transient_failure(&mut attempts), RetryDecision::NoRetry);
        assert_eq!(attempts.transient, 3);
    }

    #[test]
    fn test_ceilings_are_counted_separately() {
        let scheduler = BackoffScheduler::default();
        let mut attempts = PageAttempts::default();

        assert!(matches!(
            scheduler.on_malformed_response(&mut attempts),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            scheduler.on_malformed_response(&mut attempts),
            RetryDecision::Retry { .. }
        ));
        // Malformed failures do not count against the HTTP ceiling
        assert!(matches!(
            scheduler.on_transient_failure(&mut attempts),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(scheduler.on_malformed_response(&mut attempts), RetryDecision::NoRetry);
        assert_eq!(attempts.total(), 4);
    }

    #[test]
    fn test_max_requests_per_page() {
        let scheduler = BackoffScheduler::default();
        assert_eq!(scheduler.max_requests_per_page(), 5);

        let scheduler = BackoffScheduler::new(BackoffConfig::default().with_max_retries(1, 1));
        assert_eq!(scheduler.max_requests_per_page(), 1);
    }
}
