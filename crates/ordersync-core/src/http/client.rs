//! Statistics API client
//!
//! Issues the raw page request and hands back status, content type and body
//! untouched. Deciding what a response means is the classifier's job.

use async_trait::async_trait;
use reqwest::{header, Client as ReqwestClient};
use std::time::Duration;
use url::Url;

use crate::http::classifier::RawResponse;
use crate::http::error::HttpError;
use crate::Result;

/// Default orders endpoint of the statistics API
pub const DEFAULT_ORDERS_ENDPOINT: &str =
    "https://statistics-api.wildberries.ru/api/v1/supplier/orders";

/// Default User-Agent sent with statistics requests
pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; ordersync/",
    env!("CARGO_PKG_VERSION"),
    "; +https://github.com/ordersync/ordersync)"
);

/// Source of order pages, one request per call
#[async_trait]
pub trait OrdersApi: Send + Sync {
    /// Request the page of orders changed at or after `date_from`.
    ///
    /// Any received response is `Ok`, whatever its status; `Err` means no
    /// response arrived (connect failure, timeout, broken body).
    async fn fetch_page(&self, token: &str, date_from: &str) -> std::result::Result<RawResponse, HttpError>;
}

/// Configuration for the statistics HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Orders endpoint
    pub endpoint: String,
    /// User-Agent header value
    pub user_agent: String,
    /// Total time allowed for one request
    pub request_timeout: Duration,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ORDERS_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// reqwest-backed [`OrdersApi`] for the statistics API
#[derive(Debug, Clone)]
pub struct StatisticsClient {
    client: ReqwestClient,
    endpoint: Url,
    user_agent: String,
}

impl StatisticsClient {
    /// Create a new client
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| crate::Error::Configuration {
            message: format!("Invalid statistics endpoint '{}': {}", config.endpoint, e),
            source: Some(e.into()),
        })?;

        let client = ReqwestClient::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| crate::Error::Http {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
                source: Some(e.into()),
            })?;

        Ok(Self {
            client,
            endpoint,
            user_agent: config.user_agent,
        })
    }

    /// Create with default configuration
    pub fn with_default_config() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The page request for `date_from`, ready to execute
    fn build_request(&self, token: &str, date_from: &str) -> reqwest::Result<reqwest::Request> {
        self.client
            .get(self.endpoint.clone())
            .query(&[("dateFrom", date_from)])
            // The statistics API expects the raw token, no Bearer prefix
            .header(header::AUTHORIZATION, token)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, self.user_agent.as_str())
            .build()
    }
}

#[async_trait]
impl OrdersApi for StatisticsClient {
    async fn fetch_page(&self, token: &str, date_from: &str) -> std::result::Result<RawResponse, HttpError> {
        let request = self
            .build_request(token, date_from)
            .map_err(HttpError::from_request_error)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(HttpError::from_request_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(HttpError::from_request_error)?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}
