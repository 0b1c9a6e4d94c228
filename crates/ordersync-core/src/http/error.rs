//! HTTP error classification and normalization
//!
//! Normalizes statistics-API and Google API failures into a uniform error
//! format that the retry layer can reason about.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Statuses that are safe to retry without changing the request
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Classification of HTTP errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// Client errors (4xx) - should not retry
    ClientError,
    /// 500/502/503/504 - should retry
    ServerError,
    /// Network errors - should retry
    NetworkError,
    /// Rate limiting - should retry with backoff
    RateLimitError,
    /// Authentication errors - should not retry
    AuthenticationError,
    /// Unknown errors - default to no retry
    Unknown,
}

impl ErrorClassification {
    /// Check if this error type should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::ServerError
                | ErrorClassification::NetworkError
                | ErrorClassification::RateLimitError
        )
    }
}

/// Normalized HTTP error representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpError {
    /// HTTP status code if available
    pub status_code: Option<u16>,
    /// Error classification for retry logic
    pub classification: ErrorClassification,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    pub details: Option<Value>,
    /// Retry-After header value if present
    pub retry_after: Option<u64>,
}

impl HttpError {
    /// Create from a reqwest Response
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        let body = response.text().await.unwrap_or_default();
        Self::from_parts(status, &body, retry_after)
    }

    /// Build from an already-read status and body
    pub fn from_parts(status: StatusCode, body: &str, retry_after: Option<u64>) -> Self {
        let details = serde_json::from_str::<Value>(body).ok();
        let message = Self::extract_api_message(&details, body);

        Self {
            status_code: Some(status.as_u16()),
            classification: Self::classify_status(status),
            message,
            details,
            retry_after,
        }
    }

    /// Create from a network/request error
    pub fn from_request_error(error: reqwest::Error) -> Self {
        let classification = if error.is_timeout() || error.is_connect() || error.is_request() {
            ErrorClassification::NetworkError
        } else if error.is_decode() || error.is_body() {
            // The connection dropped while the body was streaming
            ErrorClassification::NetworkError
        } else {
            ErrorClassification::Unknown
        };

        Self {
            status_code: error.status().map(|s| s.as_u16()),
            classification,
            message: error.to_string(),
            details: None,
            retry_after: None,
        }
    }

    /// A network-level failure without a response
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            classification: ErrorClassification::NetworkError,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    /// Classify HTTP status code
    pub fn classify_status(status: StatusCode) -> ErrorClassification {
        match status.as_u16() {
            401 | 403 => ErrorClassification::AuthenticationError,
            429 => ErrorClassification::RateLimitError,
            500 | 502 | 503 | 504 => ErrorClassification::ServerError,
            400..=499 => ErrorClassification::ClientError,
            _ => ErrorClassification::Unknown,
        }
    }

    /// Pull a message out of a JSON error body.
    ///
    /// Google APIs answer `{"error": {"code", "message", "status"}}`; the
    /// statistics API uses flat `{"title", "detail"}` or `{"message"}`.
    fn extract_api_message(details: &Option<Value>, body: &str) -> String {
        if let Some(json) = details {
            if let Some(error) = json.get("error") {
                if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                    return match error.get("status").and_then(|s| s.as_str()) {
                        Some(status) => format!("{} ({})", message, status),
                        None => message.to_string(),
                    };
                }
                if let Some(message) = error.as_str() {
                    return message.to_string();
                }
            }

            if let Some(detail) = json.get("detail").and_then(|d| d.as_str()) {
                return match json.get("title").and_then(|t| t.as_str()) {
                    Some(title) => format!("{}: {}", title, detail),
                    None => detail.to_string(),
                };
            }

            if let Some(message) = json.get("message").and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }

        truncate_for_log(body, 300)
    }

    /// Check if this error should trigger a retry
    pub fn should_retry(&self) -> bool {
        self.classification.is_retryable()
    }

    /// Get the error classification
    pub fn classification(&self) -> ErrorClassification {
        self.classification
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP Error [{}]: {} (classification: {:?})",
            self.status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.message,
            self.classification
        )
    }
}

impl std::error::Error for HttpError {}

/// Convert HttpError to crate Error
impl From<HttpError> for crate::Error {
    fn from(http_error: HttpError) -> Self {
        match http_error.classification {
            ErrorClassification::AuthenticationError => crate::Error::Auth {
                message: http_error.message.clone(),
                status_code: http_error.status_code,
                source: Some(http_error.into()),
            },
            _ => crate::Error::Sheets {
                message: http_error.message,
                status_code: http_error.status_code,
            },
        }
    }
}

/// Cut `text` to at most `max_chars` characters for log fragments
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
