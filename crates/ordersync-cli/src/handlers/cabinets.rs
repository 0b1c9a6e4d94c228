//! Cabinets command handler

use crate::config::Config;
use crate::error::Result;
use crate::output::OutputWriter;
use crate::cli::OutputFormat;
use serde_json::json;
use tracing::instrument;

/// List cabinets from the source spreadsheet with masked tokens
#[instrument(skip_all)]
pub async fn handle_cabinets(config: &Config, output: &mut OutputWriter) -> Result<()> {
    let sheets = super::sheets_client(config)?;
    let credentials = super::load_credentials(&sheets, config).await?;

    if output.format() == OutputFormat::Json {
        let listed: Vec<_> = credentials
            .iter()
            .map(|c| json!({"cabinet_name": c.cabinet_name, "token": c.masked_token()}))
            .collect();
        return output.json(&listed);
    }

    if credentials.is_empty() {
        output.warning("No cabinets found in the source spreadsheet")?;
        return Ok(());
    }

    let rows = credentials
        .iter()
        .map(|c| vec![c.cabinet_name.clone(), c.masked_token()])
        .collect();
    output.table(&["Cabinet", "Token"], rows)
}
