//! Core data types shared by the fetcher, runner and sink

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One order as returned by the statistics API.
///
/// The shape is owned by the upstream API; field order is preserved so the
/// sink can build its header row in arrival order.
pub type OrderRecord = Map<String, Value>;

/// Access token for one cabinet, paired with the destination table name
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabinetCredential {
    /// Name of the cabinet, also the destination table title
    pub cabinet_name: String,
    /// Raw statistics API token
    pub token: String,
}

impl CabinetCredential {
    pub fn new(cabinet_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            cabinet_name: cabinet_name.into(),
            token: token.into(),
        }
    }

    /// Token with everything but the last four characters masked
    pub fn masked_token(&self) -> String {
        mask_secret(&self.token)
    }
}

impl fmt::Debug for CabinetCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CabinetCredential")
            .field("cabinet_name", &self.cabinet_name)
            .field("token", &self.masked_token())
            .finish()
    }
}

/// Mask a secret for display, keeping only a short suffix
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{}", tail)
}

/// Which retry ceiling was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection failures and timeouts
    Network,
    /// 429/5xx and other non-200 statuses
    Http,
    /// 200 responses that were not a JSON array
    Malformed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network"),
            FailureKind::Http => write!(f, "http"),
            FailureKind::Malformed => write!(f, "malformed"),
        }
    }
}

/// Why pagination for a cabinet ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "kind")]
pub enum StopReason {
    /// An empty page was returned; all data was collected
    Completed,
    /// The API answered 401 for this token
    Unauthorized,
    /// A retry ceiling was hit on the current page
    RetriesExhausted(FailureKind),
    /// The last record of a page had no usable cursor value
    MissingCursor,
    /// The last record of a page did not move the cursor forward
    CursorNotAdvancing,
}

impl StopReason {
    /// Whether the fetch ran to the natural end of the data
    pub fn is_complete(&self) -> bool {
        matches!(self, StopReason::Completed)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::Unauthorized => write!(f, "unauthorized"),
            StopReason::RetriesExhausted(kind) => write!(f, "{} retries exhausted", kind),
            StopReason::MissingCursor => write!(f, "missing pagination cursor"),
            StopReason::CursorNotAdvancing => write!(f, "pagination cursor did not advance"),
        }
    }
}

/// Result of one page request after retries are resolved
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    ValidPage(Vec<OrderRecord>),
    EmptyTerminal,
    FatalAuth,
    ExhaustedRetries(FailureKind),
}

/// Everything collected for one cabinet, plus why collection stopped
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Records in arrival order across all pages
    pub records: Vec<OrderRecord>,
    pub stop: StopReason,
    /// Number of non-empty pages consumed
    pub pages: usize,
    /// Number of HTTP requests issued, retries included
    pub requests: usize,
}

/// What happened when the records were handed to the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SinkOutcome {
    /// Table contents were replaced
    Written { rows: usize },
    /// No records; the table was left as it was
    Untouched,
    /// No records; the table was replaced with a placeholder cell
    Placeholder,
    /// The destination failed after retries
    Failed { message: String },
}

/// Per-cabinet line of a run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabinetReport {
    pub cabinet_name: String,
    pub records: usize,
    pub requests: usize,
    pub stop: StopReason,
    pub sink: SinkOutcome,
}

/// Summary of a full run over all cabinets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cabinets: Vec<CabinetReport>,
}

impl RunSummary {
    pub fn total_records(&self) -> usize {
        self.cabinets.iter().map(|c| c.records).sum()
    }

    /// Cabinets whose sink step failed
    pub fn failed_sinks(&self) -> impl Iterator<Item = &CabinetReport> {
        self.cabinets
            .iter()
            .filter(|c| matches!(c.sink, SinkOutcome::Failed { .. }))
    }

    /// Cabinets that did not reach the end of their data
    pub fn incomplete(&self) -> impl Iterator<Item = &CabinetReport> {
        self.cabinets.iter().filter(|c| !c.stop.is_complete())
    }
}
