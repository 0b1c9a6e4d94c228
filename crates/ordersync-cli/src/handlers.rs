//! Command handlers for CLI subcommands

mod cabinets;
mod config;
mod run;

pub use cabinets::handle_cabinets;
pub use config::handle_config;
pub use run::handle_run;

use crate::config::{Config, GOOGLE_CREDS_JSON_ENV, SOURCE_SHEET_ID_ENV};
use crate::error::Result;
use ordersync_core::{CabinetCredential, CredentialSource, SheetsClient, SheetsCredentialSource};

/// Authenticated Sheets client from the configured service account
fn sheets_client(config: &Config) -> Result<SheetsClient> {
    let creds = Config::required(&config.google_creds_json, GOOGLE_CREDS_JSON_ENV)?;
    Ok(SheetsClient::with_service_account(creds, config.sheets_config())?)
}

/// Read the credential table of the source spreadsheet
async fn load_credentials(sheets: &SheetsClient, config: &Config) -> Result<Vec<CabinetCredential>> {
    let source_id = Config::required(&config.source_sheet_id, SOURCE_SHEET_ID_ENV)?;
    let source = SheetsCredentialSource::new(sheets.open(source_id).await?);
    Ok(source.list_credentials().await?)
}
