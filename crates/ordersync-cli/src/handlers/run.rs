//! Run command handler

use crate::cli::{OutputFormat, RunArgs};
use crate::config::{Config, TARGET_SHEET_ID_ENV};
use crate::error::{Error, Result};
use crate::logging::{current_run_id, redaction, timing::Timer};
use crate::output::OutputWriter;
use ordersync_core::{
    CabinetCredential, CabinetRunner, PaginatedFetcher, RunSummary, SinkOutcome,
    StatisticsClient, TabularSink,
};
use tracing::{info, instrument, warn};

/// Handle the run command
#[instrument(skip_all, fields(run_id = current_run_id().unwrap_or("unknown")))]
pub async fn handle_run(args: RunArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let mut config = config.clone();
    if let Some(days) = args.lookback_days {
        config.fetch.lookback_days = days;
    }
    config.validate()?;

    let timer = Timer::new("sync");

    // Everything up to opening the target is fatal for the whole run
    let sheets = super::sheets_client(&config)?;
    let credentials = super::load_credentials(&sheets, &config).await?;
    let credentials = select_cabinets(credentials, &args.cabinets)?;
    let target_id = Config::required(&config.target_sheet_id, TARGET_SHEET_ID_ENV)?;
    let target = sheets.open(target_id).await?;
    let statistics = StatisticsClient::new(config.http_client_config())?;

    info!(
        cabinets = credentials.len(),
        lookback_days = config.fetch.lookback_days,
        "Starting order export"
    );

    let runner = CabinetRunner::new(
        PaginatedFetcher::new(statistics, config.fetch_config()),
        TabularSink::new(target).with_empty_policy(config.empty_policy()),
        config.runner_config(),
    );
    let summary = runner.run(&credentials).await;
    timer.finish();

    for report in summary.failed_sinks() {
        if let SinkOutcome::Failed { message } = &report.sink {
            warn!(
                cabinet = %report.cabinet_name,
                error = %redaction::redact_sensitive(message),
                "Worksheet was not updated"
            );
        }
    }

    print_summary(&summary, output)
}

/// Keep only the requested cabinets, in source order
fn select_cabinets(credentials: Vec<CabinetCredential>, names: &[String]) -> Result<Vec<CabinetCredential>> {
    if names.is_empty() {
        return Ok(credentials);
    }

    let unknown: Vec<&str> = names
        .iter()
        .filter(|name| !credentials.iter().any(|c| &c.cabinet_name == *name))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(Error::invalid_args(format!(
            "unknown cabinet(s): {}",
            unknown.join(", ")
        )));
    }

    Ok(credentials
        .into_iter()
        .filter(|c| names.contains(&c.cabinet_name))
        .collect())
}

fn print_summary(summary: &RunSummary, output: &mut OutputWriter) -> Result<()> {
    if output.format() == OutputFormat::Json {
        return output.json(summary);
    }

    let rows = summary
        .cabinets
        .iter()
        .map(|report| {
            let sheet = match &report.sink {
                SinkOutcome::Written { rows } => format!("{} rows written", rows),
                SinkOutcome::Untouched => "unchanged".to_string(),
                SinkOutcome::Placeholder => "placeholder".to_string(),
                SinkOutcome::Failed { .. } => "FAILED".to_string(),
            };
            vec![
                report.cabinet_name.clone(),
                report.records.to_string(),
                report.requests.to_string(),
                report.stop.to_string(),
                sheet,
            ]
        })
        .collect();
    output.table(&["Cabinet", "Orders", "Requests", "Stopped", "Worksheet"], rows)?;

    let failed = summary.failed_sinks().count();
    let incomplete = summary.incomplete().count();
    if failed > 0 || incomplete > 0 {
        output.warning(&format!(
            "{} cabinet(s) incomplete, {} worksheet(s) not updated",
            incomplete, failed
        ))
    } else {
        output.success(&format!(
            "✓ Exported {} orders for {} cabinet(s)",
            summary.total_records(),
            summary.cabinets.len()
        ))
    }
}
