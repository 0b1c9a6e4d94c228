//! Error types for the ordersync core library
//!
//! Per-cabinet data problems (401s, exhausted retries, a missing cursor) are
//! not errors here: they surface as a [`crate::types::StopReason`] on the
//! fetch outcome. This module covers the failures that do propagate, such as
//! configuration problems, destination failures and service-account auth.

use thiserror::Error;

/// Main error type for ordersync operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// HTTP/Network related errors
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status_code: Option<u16>,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Google credentials were refused or could not be used
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        status_code: Option<u16>,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Destination spreadsheet failures that survived retrying
    #[error("Sheets error [{}]: {message}", status_code.map(|c| c.to_string()).unwrap_or_else(|| "N/A".to_string()))]
    Sheets {
        message: String,
        status_code: Option<u16>,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error without a source
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error stems from missing or invalid configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Whether Google refused the service-account credentials
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}
