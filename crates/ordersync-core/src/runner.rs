//! Per-cabinet orchestration
//!
//! Cabinets run one after another. Nothing one cabinet does can stop the
//! next one: fetch problems end up in the [`FetchOutcome`] and sink errors
//! are caught into the report.

use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

use crate::fetcher::PaginatedFetcher;
use crate::http::client::OrdersApi;
use crate::sink::{Destination, TabularSink};
use crate::types::{CabinetCredential, CabinetReport, FetchOutcome, RunSummary, SinkOutcome};

/// Runner settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Pause between two cabinets
    pub cabinet_pause: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cabinet_pause: Duration::from_secs(2),
        }
    }
}

/// Fetches every cabinet and publishes its orders
#[derive(Debug)]
pub struct CabinetRunner<A, D> {
    fetcher: PaginatedFetcher<A>,
    sink: TabularSink<D>,
    config: RunnerConfig,
}

impl<A: OrdersApi, D: Destination> CabinetRunner<A, D> {
    pub fn new(fetcher: PaginatedFetcher<A>, sink: TabularSink<D>, config: RunnerConfig) -> Self {
        Self {
            fetcher,
            sink,
            config,
        }
    }

    pub fn fetcher(&self) -> &PaginatedFetcher<A> {
        &self.fetcher
    }

    pub fn sink(&self) -> &TabularSink<D> {
        &self.sink
    }

    /// Process `credentials` in order
    pub async fn run(&self, credentials: &[CabinetCredential]) -> RunSummary {
        let mut summary = RunSummary::default();
        info!(cabinets = credentials.len(), "Starting sync");

        for (index, credential) in credentials.iter().enumerate() {
            if index > 0 && !self.config.cabinet_pause.is_zero() {
                tokio::time::sleep(self.config.cabinet_pause).await;
            }

            let span = info_span!("cabinet", name = %credential.cabinet_name);
            let report = self.run_cabinet(credential).instrument(span).await;
            summary.cabinets.push(report);
        }

        info!(
            cabinets = summary.cabinets.len(),
            records = summary.total_records(),
            incomplete = summary.incomplete().count(),
            failed_sinks = summary.failed_sinks().count(),
            "Sync finished"
        );
        summary
    }

    async fn run_cabinet(&self, credential: &CabinetCredential) -> CabinetReport {
        info!(token = %credential.masked_token(), "Fetching orders");

        let FetchOutcome {
            records,
            stop,
            requests,
            ..
        } = self.fetcher.fetch(&credential.token).await;

        // Partial and empty results are published too
        let sink = match self.sink.publish(&credential.cabinet_name, &records).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, records = records.len(), "Failed to save orders");
                SinkOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        if !stop.is_complete() {
            warn!(%stop, records = records.len(), "Cabinet finished incomplete");
        }

        CabinetReport {
            cabinet_name: credential.cabinet_name.clone(),
            records: records.len(),
            requests,
            stop,
            sink,
        }
    }
}
