//! Response classification for statistics API pages
//!
//! Rules are checked in a fixed order: transient statuses and 401 are decided
//! from the status line alone, so error bodies are never parsed as data and
//! an invalid token never burns retries.

use serde_json::Value;
use std::fmt;

use crate::http::error::{truncate_for_log, RETRYABLE_STATUSES};
use crate::types::OrderRecord;

/// The parts of an HTTP response the classifier looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Value of the Content-Type header, if present
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// A 200 response with a JSON content type
    pub fn json(body: impl Into<String>) -> Self {
        Self::new(200, Some("application/json; charset=utf-8"), body)
    }

    /// Leading part of the body for log lines
    pub fn fragment(&self) -> String {
        truncate_for_log(&self.body, 200)
    }
}

/// Why a 200 response could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    /// Content-Type is not JSON (typically an anti-bot HTML page)
    NotJson { content_type: String },
    /// Body is empty or whitespace
    EmptyBody,
    /// Body did not parse as JSON
    Unparseable { error: String },
    /// JSON parsed but the top level is not an array
    NotAnArray { found: &'static str },
    /// An array element is not an object
    NonObjectRecord { index: usize, found: &'static str },
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::NotJson { content_type } => {
                write!(f, "expected JSON, got Content-Type '{}'", content_type)
            }
            MalformedReason::EmptyBody => write!(f, "empty response body"),
            MalformedReason::Unparseable { error } => write!(f, "invalid JSON: {}", error),
            MalformedReason::NotAnArray { found } => write!(f, "expected an array, got {}", found),
            MalformedReason::NonObjectRecord { index, found } => {
                write!(f, "record {} is {}, expected an object", index, found)
            }
        }
    }
}

/// Classification of one statistics API response
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// 429 or 500/502/503/504
    TransientHttpError { status: u16 },
    /// 401: the token is not valid for this endpoint
    FatalAuth,
    /// Any other non-200 status; retried like a transient error
    UnexpectedStatus { status: u16 },
    /// 200 that is not a usable JSON array
    MalformedResponse(MalformedReason),
    /// A page of records; empty means the data is exhausted
    ValidPage(Vec<OrderRecord>),
}

/// Stateless classifier for statistics API responses
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseClassifier;

impl ResponseClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a response according to the ordered rules
    pub fn classify(&self, response: &RawResponse) -> Classification {
        let status = response.status;

        if RETRYABLE_STATUSES.contains(&status) {
            return Classification::TransientHttpError { status };
        }
        if status == 401 {
            return Classification::FatalAuth;
        }
        if status != 200 {
            return Classification::UnexpectedStatus { status };
        }

        let content_type = response
            .content_type
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !is_json_content_type(&content_type) {
            return Classification::MalformedResponse(MalformedReason::NotJson { content_type });
        }
        if response.body.trim().is_empty() {
            return Classification::MalformedResponse(MalformedReason::EmptyBody);
        }

        let parsed: Value = match serde_json::from_str(&response.body) {
            Ok(value) => value,
            Err(e) => {
                return Classification::MalformedResponse(MalformedReason::Unparseable {
                    error: e.to_string(),
                })
            }
        };

        let items = match parsed {
            Value::Array(items) => items,
            other => {
                return Classification::MalformedResponse(MalformedReason::NotAnArray {
                    found: json_type_name(&other),
                })
            }
        };

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(record) => records.push(record),
                other => {
                    return Classification::MalformedResponse(MalformedReason::NonObjectRecord {
                        index,
                        found: json_type_name(&other),
                    })
                }
            }
        }

        Classification::ValidPage(records)
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime == "application/json" || mime.ends_with("+json")
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
