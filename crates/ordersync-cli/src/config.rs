//! Configuration management for the CLI
//!
//! Settings are layered, later layers winning:
//! - Default values
//! - Configuration file (YAML/JSON)
//! - `.env` file, loaded into the environment at startup
//! - Environment variables
//! - Command-line arguments

use crate::error::{Error, Result};
use ordersync_core::http::client::DEFAULT_USER_AGENT;
use ordersync_core::{
    BackoffConfig, EmptyResultPolicy, FetchConfig, HttpClientConfig, RetryPolicy, RunnerConfig,
    SheetsConfig, DEFAULT_CURSOR_FIELD,
};
use ordersync_core::http::DEFAULT_ORDERS_ENDPOINT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Spreadsheet key of the credential table
pub const SOURCE_SHEET_ID_ENV: &str = "SOURCE_SHEET_ID";
/// Spreadsheet key of the destination
pub const TARGET_SHEET_ID_ENV: &str = "TARGET_SHEET_ID";
/// Service-account key JSON
pub const GOOGLE_CREDS_JSON_ENV: &str = "GOOGLE_CREDS_JSON";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spreadsheet holding `token | cabinet` rows on its first worksheet
    pub source_sheet_id: Option<String>,

    /// Spreadsheet receiving one worksheet per cabinet
    pub target_sheet_id: Option<String>,

    /// Service-account key as JSON text
    pub google_creds_json: Option<String>,

    pub fetch: FetchSettings,
    pub sink: SinkSettings,
    pub runner: RunnerSettings,
    pub logging: LoggingSettings,
}

/// Statistics API and pagination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub endpoint: String,
    pub user_agent: String,
    /// Days before today the first page starts from
    pub lookback_days: u32,
    /// Unit of retry backoff, in seconds
    pub base_pause_secs: u64,
    /// Pause after every page, in seconds
    pub rate_limit_pause_secs: u64,
    pub max_http_retries: u32,
    pub max_decode_retries: u32,
    pub request_timeout_secs: u64,
    pub cursor_field: String,
}

/// What to write when a cabinet has no orders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyResultMode {
    #[default]
    LeaveUntouched,
    Placeholder,
}

/// Destination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Attempts per spreadsheet call, the first one included
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub backoff_cap_secs: u64,
    pub empty_result: EmptyResultMode,
    pub placeholder_text: String,
    /// `RAW` or `USER_ENTERED`
    pub value_input_option: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub cabinet_pause_secs: u64,
}

/// Logging settings; `-v` flags and environment variables win over these
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    /// compact, full or json
    pub format: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            endpoint: DEFAULT_ORDERS_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            lookback_days: 14,
            base_pause_secs: backoff.base_pause.as_secs(),
            rate_limit_pause_secs: backoff.rate_limit_pause.as_secs(),
            max_http_retries: backoff.max_http_retries,
            max_decode_retries: backoff.max_decode_retries,
            request_timeout_secs: 60,
            cursor_field: DEFAULT_CURSOR_FIELD.to_string(),
        }
    }
}

impl Default for SinkSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_attempts: retry.max_attempts,
            backoff_base: retry.multiplier,
            backoff_cap_secs: retry.max_delay.as_secs(),
            empty_result: EmptyResultMode::LeaveUntouched,
            placeholder_text: "No orders for the period".to_string(),
            value_input_option: "RAW".to_string(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            cabinet_pause_secs: RunnerConfig::default().cabinet_pause.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(Error::InvalidFormat {
                    path: path.to_path_buf(),
                    expected: "YAML or JSON".to_string(),
                })
            }
        };

        Ok(config)
    }

    /// Load the first configuration file found in the default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load from `file` or the default locations, then apply the environment
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::load()?,
        };
        config.apply_env();
        Ok(config)
    }

    /// Default configuration file paths, in lookup order
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("ordersync.yaml"),
            PathBuf::from("ordersync.yml"),
            PathBuf::from("ordersync.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let ordersync_dir = config_dir.join("ordersync");
            paths.push(ordersync_dir.join("config.yaml"));
            paths.push(ordersync_dir.join("config.json"));
        }

        paths
    }

    /// Override settings from process environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Override settings from an environment lookup; blank values are ignored
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = get(SOURCE_SHEET_ID_ENV) {
            self.source_sheet_id = Some(value);
        }
        if let Some(value) = get(TARGET_SHEET_ID_ENV) {
            self.target_sheet_id = Some(value);
        }
        if let Some(value) = get(GOOGLE_CREDS_JSON_ENV) {
            self.google_creds_json = Some(value);
        }
        if let Some(value) = get("ORDERSYNC_ENDPOINT") {
            self.fetch.endpoint = value;
        }
        if let Some(days) = get("ORDERSYNC_LOOKBACK_DAYS").and_then(|v| v.parse().ok()) {
            self.fetch.lookback_days = days;
        }
    }

    /// Check that a run can start
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if is_blank(&self.source_sheet_id) {
            missing.push(SOURCE_SHEET_ID_ENV);
        }
        if is_blank(&self.target_sheet_id) {
            missing.push(TARGET_SHEET_ID_ENV);
        }
        if is_blank(&self.google_creds_json) {
            missing.push(GOOGLE_CREDS_JSON_ENV);
        }
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.fetch.max_http_retries == 0 || self.fetch.max_decode_retries == 0 {
            return Err(Error::config("fetch retry ceilings must be at least 1"));
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err(Error::config("fetch.request_timeout_secs must be at least 1"));
        }
        if self.sink.max_attempts == 0 {
            return Err(Error::config("sink.max_attempts must be at least 1"));
        }
        if self.sink.backoff_base < 1.0 {
            return Err(Error::config("sink.backoff_base must be at least 1.0"));
        }
        if self.fetch.cursor_field.trim().is_empty() {
            return Err(Error::config("fetch.cursor_field must not be empty"));
        }

        Ok(())
    }

    /// Required setting, or a configuration error naming its variable
    pub fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config(format!("{} is not set", name)))
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            endpoint: self.fetch.endpoint.clone(),
            user_agent: self.fetch.user_agent.clone(),
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
            ..Default::default()
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            lookback_days: self.fetch.lookback_days,
            cursor_field: self.fetch.cursor_field.clone(),
            backoff: BackoffConfig::default()
                .with_base_pause(Duration::from_secs(self.fetch.base_pause_secs))
                .with_rate_limit_pause(Duration::from_secs(self.fetch.rate_limit_pause_secs))
                .with_max_retries(self.fetch.max_http_retries, self.fetch.max_decode_retries),
        }
    }

    pub fn sheets_config(&self) -> SheetsConfig {
        SheetsConfig {
            value_input_option: self.sink.value_input_option.clone(),
            retry_policy: RetryPolicy::new(self.sink.max_attempts)
                .with_multiplier(self.sink.backoff_base)
                .with_max_delay(Duration::from_secs(self.sink.backoff_cap_secs)),
            ..Default::default()
        }
    }

    pub fn empty_policy(&self) -> EmptyResultPolicy {
        match self.sink.empty_result {
            EmptyResultMode::LeaveUntouched => EmptyResultPolicy::LeaveUntouched,
            EmptyResultMode::Placeholder => {
                EmptyResultPolicy::Placeholder(self.sink.placeholder_text.clone())
            }
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            cabinet_pause: Duration::from_secs(self.runner.cabinet_pause_secs),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
