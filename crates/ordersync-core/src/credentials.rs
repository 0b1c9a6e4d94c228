//! Cabinet credential source

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::warn;

use crate::types::CabinetCredential;
use crate::Result;

/// Provides the list of cabinets to process
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Read all usable credentials, in table order
    async fn list_credentials(&self) -> Result<Vec<CabinetCredential>>;
}

/// Parse a `token | cabinet name` table.
///
/// The first row is a header. Rows with an empty token are skipped silently,
/// the same as blank lines; rows that have a token but no cabinet name are
/// skipped with a warning since they have nowhere to be written.
pub fn parse_credential_rows(rows: &[Vec<String>]) -> Vec<CabinetCredential> {
    let mut credentials = Vec::new();
    let mut seen = HashSet::new();

    for (index, row) in rows.iter().enumerate().skip(1) {
        let token = row.first().map(|t| t.trim()).unwrap_or_default();
        if token.is_empty() {
            continue;
        }

        let cabinet_name = row.get(1).map(|n| n.trim()).unwrap_or_default();
        if cabinet_name.is_empty() {
            warn!(row = index + 1, "Credential row has a token but no cabinet name, skipping");
            continue;
        }

        if !seen.insert(cabinet_name.to_string()) {
            warn!(
                row = index + 1,
                cabinet = cabinet_name,
                "Duplicate cabinet name, its table will be written more than once"
            );
        }

        credentials.push(CabinetCredential::new(cabinet_name, token));
    }

    credentials
}
