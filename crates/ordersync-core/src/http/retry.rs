//! Retry logic with exponential backoff for destination requests
//!
//! Every spreadsheet operation goes through [`execute_with_retry`], which
//! retries 429/5xx and network failures with capped exponential backoff
//! plus additive jitter.

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use std::time::Duration;

use crate::http::error::HttpError;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries, before jitter
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Upper bound of the uniform jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 1.6,
            max_jitter: Duration::from_millis(900),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the jitter bound; zero disables jitter
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Create an exponential backoff instance
    pub fn create_backoff(&self) -> ExponentialBackoff {
        // Jitter is additive and applied separately
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_delay)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Decision on whether to retry a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay
    Retry { delay: Duration },
    /// Do not retry the request
    NoRetry,
}

/// Retry handler for HTTP requests
#[derive(Debug)]
pub struct RetryHandler {
    policy: RetryPolicy,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl RetryHandler {
    /// Create a new retry handler with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        let backoff = policy.create_backoff();
        Self {
            policy,
            attempts: 0,
            backoff,
        }
    }

    /// Determine if a request should be retried after it failed with `error`
    pub fn should_retry(&mut self, error: &HttpError) -> RetryDecision {
        self.attempts += 1;

        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::NoRetry;
        }
        if !error.should_retry() {
            return RetryDecision::NoRetry;
        }

        RetryDecision::Retry {
            delay: self.calculate_delay(error),
        }
    }

    /// Calculate the delay before the next retry
    fn calculate_delay(&mut self, error: &HttpError) -> Duration {
        let base = self
            .backoff
            .next_backoff()
            .unwrap_or(self.policy.max_delay);

        // A server-provided Retry-After wins, within the same cap
        let base = match error.retry_after {
            Some(secs) => Duration::from_secs(secs).min(self.policy.max_delay),
            None => base,
        };

        base + self.jitter()
    }

    fn jitter(&self) -> Duration {
        if self.policy.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let secs = rand::thread_rng().gen_range(0.0..self.policy.max_jitter.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Get the number of failed attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Execute a request with retry logic
pub async fn execute_with_retry<F, Fut, T>(
    operation: &str,
    mut request_fn: F,
    policy: &RetryPolicy,
) -> Result<T, HttpError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, HttpError>>,
{
    let mut handler = RetryHandler::new(policy.clone());

    loop {
        match request_fn().await {
            Ok(response) => return Ok(response),
            Err(error) => match handler.should_retry(&error) {
                RetryDecision::Retry { delay } => {
                    tracing::warn!(
                        operation,
                        attempt = handler.attempts(),
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::NoRetry => {
                    tracing::error!(
                        operation,
                        attempts = handler.attempts(),
                        error = %error,
                        "Request failed, not retrying"
                    );
                    return Err(error);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorClassification;
    use std::cell::Cell;

    fn error(status: u16, classification: ErrorClassification) -> HttpError {
        HttpError {
            status_code: Some(status),
            classification,
            message: "error".to_string(),
            details: None,
            retry_after: None,
        }
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.multiplier, 1.6);
    }

    #[test]
    fn test_retry_handler_max_attempts() {
        let mut handler = RetryHandler::new(RetryPolicy::new(3));
        let err = error(503, ErrorClassification::ServerError);

        assert!(matches!(handler.should_retry(&err), RetryDecision::Retry { .. }));
        assert!(matches!(handler.should_retry(&err), RetryDecision::Retry { .. }));
        // Third failure is the last allowed attempt
        assert_eq!(handler.should_retry(&err), RetryDecision::NoRetry);
        assert_eq!(handler.attempts(), 3);
    }

    #[test]
    fn test_non_retryable_errors() {
        let mut handler = RetryHandler::new(RetryPolicy::default());
        let err = error(400, ErrorClassification::ClientError);
        assert_eq!(handler.should_retry(&err), RetryDecision::NoRetry);

        let mut handler = RetryHandler::new(RetryPolicy::default());
        let err = error(403, ErrorClassification::AuthenticationError);
        assert_eq!(handler.should_retry(&err), RetryDecision::NoRetry);
    }

    #[test]
    fn test_exponential_backoff_without_jitter() {
        let policy = RetryPolicy::new(10).with_jitter(Duration::ZERO);
        let mut handler = RetryHandler::new(policy);
        let err = error(500, ErrorClassification::ServerError);

        let mut delays = Vec::new();
        for _ in 0..3 {
            if let RetryDecision::Retry { delay } = handler.should_retry(&err) {
                delays.push(delay.as_secs_f64());
            }
        }
        assert_eq!(delays.len(), 3);
        for (actual, expected) in delays.iter().zip([1.0, 1.6, 2.56]) {
            assert!((actual - expected).abs() < 0.001, "{} vs {}", actual, expected);
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(20).with_jitter(Duration::ZERO);
        let mut handler = RetryHandler::new(policy);
        let err = error(500, ErrorClassification::ServerError);

        let mut last = Duration::ZERO;
        for _ in 0..15 {
            if let RetryDecision::Retry { delay } = handler.should_retry(&err) {
                last = delay;
            }
        }
        assert!((last.as_secs_f64() - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_jitter_bounds() {
        let mut handler = RetryHandler::new(RetryPolicy::default());
        let err = error(429, ErrorClassification::RateLimitError);
        if let RetryDecision::Retry { delay } = handler.should_retry(&err) {
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_millis(1900));
        } else {
            panic!("Expected retry decision");
        }
    }

    #[test]
    fn test_retry_after_header() {
        let mut handler = RetryHandler::new(RetryPolicy::default().with_jitter(Duration::ZERO));
        let mut err = error(429, ErrorClassification::RateLimitError);
        err.retry_after = Some(10);

        assert_eq!(
            handler.should_retry(&err),
            RetryDecision::Retry { delay: Duration::from_secs(10) }
        );

        err.retry_after = Some(600);
        assert_eq!(
            handler.should_retry(&err),
            RetryDecision::Retry { delay: Duration::from_secs(30) }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_recovers() {
        let calls = Cell::new(0);
        let result = execute_with_retry(
            "clear",
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(error(503, ErrorClassification::ServerError))
                    } else {
                        Ok(n)
                    }
                }
            },
            &RetryPolicy::default(),
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_gives_up() {
        let calls = Cell::new(0);
        let result: Result<(), HttpError> = execute_with_retry(
            "write",
            || {
                calls.set(calls.get() + 1);
                async { Err(HttpError::network("connection reset")) }
            },
            &RetryPolicy::default(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 5);
    }
}
