//! Publishing fetched records into a destination table
//!
//! A table is always replaced whole: clear, then one write of header plus
//! rows. An empty fetch never clears a table unless the placeholder policy
//! asks for it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

use crate::types::{OrderRecord, SinkOutcome};
use crate::Result;

/// Reference to one table (worksheet) in the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    /// Destination-specific identifier
    pub id: i64,
    pub title: String,
}

/// A tabular store that can hold one table per cabinet.
///
/// Implementations are expected to retry their own transient failures;
/// an `Err` here means retrying did not help.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Find the table called `name`, creating it if it does not exist
    async fn get_or_create_table(&self, name: &str) -> Result<TableHandle>;

    /// Remove all values from the table
    async fn clear(&self, table: &TableHandle) -> Result<()>;

    /// Write `rows` starting at the top-left cell
    async fn write_rows(&self, table: &TableHandle, rows: Vec<Vec<String>>) -> Result<()>;
}

#[async_trait]
impl<D: Destination + ?Sized> Destination for &D {
    async fn get_or_create_table(&self, name: &str) -> Result<TableHandle> {
        (**self).get_or_create_table(name).await
    }

    async fn clear(&self, table: &TableHandle) -> Result<()> {
        (**self).clear(table).await
    }

    async fn write_rows(&self, table: &TableHandle, rows: Vec<Vec<String>>) -> Result<()> {
        (**self).write_rows(table, rows).await
    }
}

/// What to do with a table when a cabinet produced no records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "text")]
pub enum EmptyResultPolicy {
    /// Keep whatever the table already holds
    LeaveUntouched,
    /// Replace the table with a single cell holding this text
    Placeholder(String),
}

impl Default for EmptyResultPolicy {
    fn default() -> Self {
        EmptyResultPolicy::LeaveUntouched
    }
}

/// Writes per-cabinet record sets into a [`Destination`]
#[derive(Debug)]
pub struct TabularSink<D> {
    destination: D,
    empty_policy: EmptyResultPolicy,
}

impl<D: Destination> TabularSink<D> {
    pub fn new(destination: D) -> Self {
        Self {
            destination,
            empty_policy: EmptyResultPolicy::default(),
        }
    }

    /// Set the policy for empty record sets
    pub fn with_empty_policy(mut self, policy: EmptyResultPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Replace the contents of the cabinet's table with `records`
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn publish(&self, cabinet_name: &str, records: &[OrderRecord]) -> Result<SinkOutcome> {
        let table = self.destination.get_or_create_table(cabinet_name).await?;

        if records.is_empty() {
            return match &self.empty_policy {
                EmptyResultPolicy::LeaveUntouched => {
                    warn!(table = %table.title, "No records for cabinet, table left unchanged");
                    Ok(SinkOutcome::Untouched)
                }
                EmptyResultPolicy::Placeholder(text) => {
                    self.destination.clear(&table).await?;
                    self.destination
                        .write_rows(&table, vec![vec![text.clone()]])
                        .await?;
                    info!(table = %table.title, "No records for cabinet, wrote placeholder");
                    Ok(SinkOutcome::Placeholder)
                }
            };
        }

        // Build everything before touching the table so a failure here
        // cannot leave it cleared
        let rows = build_rows(records);
        let written = records.len();

        self.destination.clear(&table).await?;
        self.destination.write_rows(&table, rows).await?;

        info!(table = %table.title, rows = written, "Saved orders to table");
        Ok(SinkOutcome::Written { rows: written })
    }
}

/// Header row from the first record's fields, then one row per record.
///
/// Fields missing from a record render as empty cells; fields that only
/// appear in later records are not part of the header and are dropped.
pub fn build_rows(records: &[OrderRecord]) -> Vec<Vec<String>> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let headers: Vec<String> = first.keys().cloned().collect();

    let mut extra_fields = BTreeSet::new();
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(headers.clone());

    for record in records {
        rows.push(
            headers
                .iter()
                .map(|h| record.get(h).map(render_value).unwrap_or_default())
                .collect(),
        );
        for key in record.keys() {
            if !first.contains_key(key) {
                extra_fields.insert(key.as_str());
            }
        }
    }

    if !extra_fields.is_empty() {
        warn!(
            fields = ?extra_fields,
            "Fields absent from the first record were not written"
        );
    }

    rows
}

/// Render one JSON value as cell text
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}
