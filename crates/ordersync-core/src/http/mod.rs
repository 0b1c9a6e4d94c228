//! HTTP layer for the statistics API and Google APIs
//!
//! - Statistics client and response classification
//! - Fixed-pause backoff for the fetch loop
//! - Exponential retry for destination calls
//! - Service-account authentication
//! - Error classification shared by all of the above

pub mod auth;
pub mod backoff;
pub mod classifier;
pub mod client;
pub mod error;
pub mod retry;

pub use auth::{ServiceAccountAuth, ServiceAccountKey, TokenProvider, SPREADSHEETS_SCOPE};
pub use backoff::{BackoffConfig, BackoffScheduler, PageAttempts};
pub use classifier::{Classification, MalformedReason, RawResponse, ResponseClassifier};
pub use client::{HttpClientConfig, OrdersApi, StatisticsClient, DEFAULT_ORDERS_ENDPOINT};
pub use error::{ErrorClassification, HttpError};
pub use retry::{execute_with_retry, RetryDecision, RetryPolicy};
