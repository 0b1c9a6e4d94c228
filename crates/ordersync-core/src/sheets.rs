//! Google Sheets API v4 client
//!
//! Backs both ends of a run: the credential table is read from the first
//! worksheet of the source spreadsheet, and each cabinet gets a worksheet in
//! the destination spreadsheet. Every call goes through
//! [`execute_with_retry`], so callers only see failures that outlasted the
//! retry policy.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::credentials::{parse_credential_rows, CredentialSource};
use crate::http::auth::{ServiceAccountAuth, TokenProvider};
use crate::http::error::{ErrorClassification, HttpError};
use crate::http::retry::{execute_with_retry, RetryPolicy};
use crate::sink::{render_value, Destination, TableHandle};
use crate::types::CabinetCredential;
use crate::Result;

/// Base URL of the spreadsheets collection
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Settings for the Sheets client
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub base_url: String,
    /// `RAW` stores text as-is, `USER_ENTERED` lets Sheets parse numbers and dates
    pub value_input_option: String,
    /// Grid size for newly created worksheets
    pub new_table_rows: u32,
    pub new_table_cols: u32,
    pub retry_policy: RetryPolicy,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: SHEETS_API_BASE.to_string(),
            value_input_option: "RAW".to_string(),
            new_table_rows: 1000,
            new_table_cols: 26,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Authenticated, retrying Sheets API client
#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
    base_url: Url,
    config: SheetsConfig,
}

impl std::fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsClient")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, auth: Arc<dyn TokenProvider>, config: SheetsConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| crate::Error::Configuration {
            message: format!("Invalid Sheets API base URL '{}': {}", config.base_url, e),
            source: Some(e.into()),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(crate::Error::configuration(format!(
                "Sheets API base URL '{}' cannot hold path segments",
                config.base_url
            )));
        }

        Ok(Self {
            http,
            auth,
            base_url,
            config,
        })
    }

    /// Create a client authenticated with a service-account key JSON
    pub fn with_service_account(creds_json: &str, config: SheetsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| crate::Error::Http {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
                source: Some(e.into()),
            })?;
        let auth = ServiceAccountAuth::from_json(creds_json, http.clone())?;
        debug!(client_email = auth.client_email(), "Using service account");

        Self::new(http, Arc::new(auth), config)
    }

    /// Open a spreadsheet by key, loading its worksheet list
    #[instrument(skip(self))]
    pub async fn open(&self, spreadsheet_id: &str) -> Result<Spreadsheet> {
        let meta = self.fetch_metadata(spreadsheet_id).await?;
        info!(
            spreadsheet = %meta.title,
            worksheets = meta.sheets.len(),
            "Opened spreadsheet"
        );

        Ok(Spreadsheet {
            client: self.clone(),
            id: spreadsheet_id.to_string(),
            title: meta.title,
            sheets: meta.sheets,
        })
    }

    async fn fetch_metadata(&self, spreadsheet_id: &str) -> Result<SpreadsheetMeta> {
        let mut url = self.endpoint(&[spreadsheet_id]);
        url.query_pairs_mut()
            .append_pair("fields", "spreadsheetId,properties.title,sheets.properties(sheetId,title,index)");

        let value = self.call_with_retry("open_spreadsheet", Method::GET, url, None).await?;
        parse_metadata(value)
    }

    /// Read every value of `range` as text rows
    pub async fn read_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.endpoint(&[spreadsheet_id, "values", range]);
        let value = self.call_with_retry("read_values", Method::GET, url, None).await?;
        Ok(values_to_rows(&value))
    }

    async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<TableHandle> {
        let batch_update = format!("{}:batchUpdate", spreadsheet_id);
        let url = self.endpoint(&[batch_update.as_str()]);
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": self.config.new_table_rows,
                            "columnCount": self.config.new_table_cols,
                        }
                    }
                }
            }]
        });

        let value = self
            .call_with_retry("add_sheet", Method::POST, url, Some(&body))
            .await?;

        let properties = value
            .pointer("/replies/0/addSheet/properties")
            .cloned()
            .ok_or_else(|| crate::Error::Sheets {
                message: format!("addSheet reply for '{}' has no properties", title),
                status_code: None,
            })?;
        let properties: SheetProperties = serde_json::from_value(properties)?;

        Ok(TableHandle {
            id: properties.sheet_id,
            title: properties.title,
        })
    }

    async fn clear_values(&self, spreadsheet_id: &str, table: &TableHandle) -> Result<()> {
        let url = self.clear_url(spreadsheet_id, &table.title);
        let body = json!({});
        self.call_with_retry("clear", Method::POST, url, Some(&body))
            .await?;
        Ok(())
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        table: &TableHandle,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let url = self.update_url(spreadsheet_id, &table.title);
        let body = json!({
            "range": a1_range(&table.title, Some("A1")),
            "majorDimension": "ROWS",
            "values": rows,
        });

        self.call_with_retry("update", Method::PUT, url, Some(&body))
            .await?;
        Ok(())
    }

    /// `values/{range}:clear` for a whole worksheet
    fn clear_url(&self, spreadsheet_id: &str, title: &str) -> Url {
        let clear = format!("{}:clear", a1_range(title, None));
        self.endpoint(&[spreadsheet_id, "values", clear.as_str()])
    }

    /// `values/{range}` anchored at A1, with the configured input option
    fn update_url(&self, spreadsheet_id: &str, title: &str) -> Url {
        let range = a1_range(title, Some("A1"));
        let mut url = self.endpoint(&[spreadsheet_id, "values", range.as_str()]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", &self.config.value_input_option);
        url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn call_with_retry(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value> {
        execute_with_retry(
            operation,
            move || self.call(method.clone(), url.clone(), body),
            &self.config.retry_policy,
        )
        .await
        .map_err(crate::Error::from)
    }

    fn build_request(
        &self,
        method: Method,
        url: Url,
        token: &str,
        body: Option<&Value>,
    ) -> reqwest::Result<reqwest::Request> {
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.build()
    }

    /// One attempt, no retrying
    async fn call(&self, method: Method, url: Url, body: Option<&Value>) -> std::result::Result<Value, HttpError> {
        let token = self.auth.access_token().await?;

        debug!(method = %method, path = url.path(), "Sheets API request");
        let request = self
            .build_request(method, url, &token, body)
            .map_err(HttpError::from_request_error)?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(HttpError::from_request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::from_response(response).await);
        }

        let text = response.text().await.map_err(HttpError::from_request_error)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| HttpError {
            status_code: Some(status.as_u16()),
            classification: ErrorClassification::Unknown,
            message: format!("Sheets API returned invalid JSON: {}", e),
            details: None,
            retry_after: None,
        })
    }
}

/// An opened spreadsheet
pub struct Spreadsheet {
    client: SheetsClient,
    id: String,
    title: String,
    sheets: Vec<TableHandle>,
}

impl Spreadsheet {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Worksheets as of opening, in tab order
    pub fn worksheets(&self) -> &[TableHandle] {
        &self.sheets
    }

    /// Read every value of a worksheet
    pub async fn read_table(&self, table: &TableHandle) -> Result<Vec<Vec<String>>> {
        self.client
            .read_values(&self.id, &a1_range(&table.title, None))
            .await
    }
}

#[async_trait]
impl Destination for Spreadsheet {
    async fn get_or_create_table(&self, name: &str) -> Result<TableHandle> {
        // Worksheets may have been added since opening
        let meta = self.client.fetch_metadata(&self.id).await?;
        if let Some(existing) = meta.sheets.into_iter().find(|s| s.title == name) {
            return Ok(existing);
        }

        info!(spreadsheet = %self.title, worksheet = name, "Creating worksheet");
        self.client.add_sheet(&self.id, name).await
    }

    async fn clear(&self, table: &TableHandle) -> Result<()> {
        self.client.clear_values(&self.id, table).await
    }

    async fn write_rows(&self, table: &TableHandle, rows: Vec<Vec<String>>) -> Result<()> {
        self.client.update_values(&self.id, table, rows).await
    }
}

/// Credentials stored as `token | cabinet` rows on the first worksheet
pub struct SheetsCredentialSource {
    spreadsheet: Spreadsheet,
}

impl SheetsCredentialSource {
    pub fn new(spreadsheet: Spreadsheet) -> Self {
        Self { spreadsheet }
    }
}

#[async_trait]
impl CredentialSource for SheetsCredentialSource {
    async fn list_credentials(&self) -> Result<Vec<CabinetCredential>> {
        let first = self.spreadsheet.worksheets().first().ok_or_else(|| {
            crate::Error::configuration(format!(
                "Source spreadsheet '{}' has no worksheets",
                self.spreadsheet.title()
            ))
        })?;

        let rows = self.spreadsheet.read_table(first).await?;
        let credentials = parse_credential_rows(&rows);
        info!(
            worksheet = %first.title,
            rows = rows.len(),
            cabinets = credentials.len(),
            "Loaded cabinet credentials"
        );
        Ok(credentials)
    }
}

#[derive(Debug)]
struct SpreadsheetMeta {
    title: String,
    sheets: Vec<TableHandle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpreadsheet {
    #[serde(default)]
    properties: Option<RawSpreadsheetProperties>,
    #[serde(default)]
    sheets: Vec<RawSheet>,
}

#[derive(Debug, Deserialize)]
struct RawSpreadsheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct RawSheet {
    properties: SheetProperties,
}

/// Zero-valued fields are omitted from API responses, hence the defaults
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
    #[serde(default)]
    index: i64,
}

fn parse_metadata(value: Value) -> Result<SpreadsheetMeta> {
    let raw: RawSpreadsheet = serde_json::from_value(value)?;

    let mut sheets: Vec<SheetProperties> = raw.sheets.into_iter().map(|s| s.properties).collect();
    sheets.sort_by_key(|p| p.index);

    Ok(SpreadsheetMeta {
        title: raw.properties.map(|p| p.title).unwrap_or_default(),
        sheets: sheets
            .into_iter()
            .map(|p| TableHandle {
                id: p.sheet_id,
                title: p.title,
            })
            .collect(),
    })
}

/// A1 range for a whole worksheet, or a cell within it
pub fn a1_range(title: &str, cell: Option<&str>) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    match cell {
        Some(cell) => format!("{}!{}", quoted, cell),
        None => quoted,
    }
}

/// Convert a `ValueRange` response into text rows
fn values_to_rows(value: &Value) -> Vec<Vec<String>> {
    value
        .get("values")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(render_value).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoToken;

    #[async_trait]
    impl TokenProvider for NoToken {
        async fn access_token(&self) -> std::result::Result<String, HttpError> {
            Ok("test-token".to_string())
        }
    }

    fn client() -> SheetsClient {
        SheetsClient::new(reqwest::Client::new(), Arc::new(NoToken), SheetsConfig::default()).unwrap()
    }

    #[test]
    fn test_a1_range_quotes_titles() {
        assert_eq!(a1_range("Main store", None), "'Main store'");
        assert_eq!(a1_range("Bob's shop", Some("A1")), "'Bob''s shop'!A1");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = client().endpoint(&["abc123", "values", "'Main store'!A1"]);
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'Main%20store'!A1"
        );

        let url = client().endpoint(&["abc123:batchUpdate"]);
        assert!(url.as_str().ends_with("/spreadsheets/abc123:batchUpdate"));
    }

    #[test]
    fn test_clear_url() {
        let url = client().clear_url("abc123", "Bob's shop");
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'Bob''s%20shop':clear"
        );
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_update_url_carries_input_option() {
        let url = client().update_url("abc123", "North");
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'North'!A1?valueInputOption=RAW"
        );

        let client = SheetsClient::new(
            reqwest::Client::new(),
            Arc::new(NoToken),
            SheetsConfig {
                value_input_option: "USER_ENTERED".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        let url = client.update_url("abc123", "North");
        assert_eq!(url.query(), Some("valueInputOption=USER_ENTERED"));
    }

    #[test]
    fn test_request_uses_bearer_token_and_json_body() {
        let client = client();
        let url = client.update_url("abc123", "North");
        let body = json!({"range": "'North'!A1", "majorDimension": "ROWS", "values": [["a"]]});

        let request = client
            .build_request(Method::PUT, url.clone(), "test-token", Some(&body))
            .unwrap();

        assert_eq!(request.method(), &Method::PUT);
        assert_eq!(request.url(), &url);
        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer test-token"
        );
        assert_eq!(
            request.headers()[reqwest::header::CONTENT_TYPE],
            "application/json"
        );
        let sent: Value = serde_json::from_slice(request.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[test]
    fn test_parse_metadata_defaults_first_sheet_id() {
        let value = json!({
            "spreadsheetId": "abc123",
            "properties": {"title": "Orders"},
            "sheets": [
                {"properties": {"sheetId": 77, "title": "South", "index": 1}},
                {"properties": {"title": "North"}}
            ]
        });

        let meta = parse_metadata(value).unwrap();
        assert_eq!(meta.title, "Orders");
        assert_eq!(
            meta.sheets,
            vec![
                TableHandle { id: 0, title: "North".to_string() },
                TableHandle { id: 77, title: "South".to_string() },
            ]
        );
    }

    #[test]
    fn test_values_to_rows() {
        let value = json!({
            "range": "'Tokens'!A1:Z1000",
            "majorDimension": "ROWS",
            "values": [["token", "cabinet"], ["tok-1", "North"], [], [42, true]]
        });
        assert_eq!(
            values_to_rows(&value),
            vec![
                vec!["token".to_string(), "cabinet".to_string()],
                vec!["tok-1".to_string(), "North".to_string()],
                vec![],
                vec!["42".to_string(), "true".to_string()],
            ]
        );
    }

    #[test]
    fn test_values_to_rows_empty_sheet() {
        // Empty ranges come back without a "values" key
        let value = json!({"range": "'Tokens'!A1:Z1000", "majorDimension": "ROWS"});
        assert!(values_to_rows(&value).is_empty());
    }

    #[test]
    fn test_invalid_base_url() {
        let config = SheetsConfig {
            base_url: "mailto:nobody@example.com".to_string(),
            ..Default::default()
        };
        let result = SheetsClient::new(reqwest::Client::new(), Arc::new(NoToken), config);
        assert!(result.unwrap_err().is_configuration());
    }
}
