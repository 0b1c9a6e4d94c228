//! Authentication for the Google Sheets API
//!
//! Exchanges a signed service-account JWT for an OAuth access token and
//! caches it until shortly before expiry. A full run at one statistics
//! request per minute easily outlives a single token.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::http::error::{ErrorClassification, HttpError};
use crate::Result;

/// OAuth scope for reading and writing spreadsheets
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens for Google API calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a valid access token, refreshing it if needed
    async fn access_token(&self) -> std::result::Result<String, HttpError>;
}

/// The fields of a service-account key file that token exchange needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Parse a service-account key from its JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::Error::Configuration {
            message: format!("Invalid service-account credentials JSON: {}", e),
            source: Some(e.into()),
        })
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Service-account token provider with an in-memory cache
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    /// Create a provider for the given key and scopes
    pub fn new(key: ServiceAccountKey, scopes: &[&str], http: reqwest::Client) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            crate::Error::Configuration {
                message: format!(
                    "Service-account private key for {} is not a valid RSA PEM: {}",
                    key.client_email, e
                ),
                source: Some(e.into()),
            }
        })?;

        Ok(Self {
            key,
            encoding_key,
            scope: scopes.join(" "),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Create a spreadsheets-scoped provider from key JSON
    pub fn from_json(json: &str, http: reqwest::Client) -> Result<Self> {
        let key = ServiceAccountKey::from_json(json)?;
        Self::new(key, &[SPREADSHEETS_SCOPE], http)
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn signed_assertion(&self) -> std::result::Result<String, HttpError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key).map_err(
            |e| HttpError {
                status_code: None,
                classification: ErrorClassification::AuthenticationError,
                message: format!("Failed to sign service-account assertion: {}", e),
                details: None,
                retry_after: None,
            },
        )
    }

    async fn exchange(&self) -> std::result::Result<CachedToken, HttpError> {
        let assertion = self.signed_assertion()?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(HttpError::from_request_error)?;

        if !response.status().is_success() {
            return Err(refused_exchange(HttpError::from_response(response).await));
        }

        let token: TokenResponse = response.json().await.map_err(HttpError::from_request_error)?;

        tracing::debug!(
            client_email = %self.key.client_email,
            expires_in = token.expires_in,
            "Obtained Google access token"
        );

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

/// Token endpoints answer refused grants with 400 `invalid_grant`, so every
/// non-retryable exchange failure counts as an authentication failure.
fn refused_exchange(mut error: HttpError) -> HttpError {
    if !error.should_retry() {
        error.classification = ErrorClassification::AuthenticationError;
        error.message = format!("Token exchange refused: {}", error.message);
    }
    error
}

#[async_trait]
impl TokenProvider for ServiceAccountAuth {
    async fn access_token(&self) -> std::result::Result<String, HttpError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let token = self.exchange().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}

impl fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.key.client_email)
            .field("scope", &self.scope)
            .finish()
    }
}
