//! Ordersync Core - marketplace order export into spreadsheets
//!
//! Pulls recent orders for each seller cabinet from a paginated,
//! rate-limited statistics API and replaces one spreadsheet table per
//! cabinet with the result.
//!
//! # Main Components
//!
//! - **Fetching**: [`PaginatedFetcher`] walks the `dateFrom` cursor, retrying
//!   each page per [`BackoffConfig`]
//! - **Publishing**: [`TabularSink`] rewrites a [`Destination`] table
//! - **Orchestration**: [`CabinetRunner`] runs every cabinet in turn
//! - **Google Sheets**: [`SheetsClient`] implements the destination and the
//!   credential source
//!
//! # Example
//!
//! ```no_run
//! use ordersync_core::{
//!     CabinetCredential, CabinetRunner, Destination, FetchConfig, PaginatedFetcher,
//!     RunnerConfig, StatisticsClient, TabularSink,
//! };
//!
//! async fn sync<D: Destination>(destination: D, creds: Vec<CabinetCredential>) -> ordersync_core::Result<()> {
//!     let fetcher = PaginatedFetcher::new(StatisticsClient::with_default_config()?, FetchConfig::default());
//!     let runner = CabinetRunner::new(fetcher, TabularSink::new(destination), RunnerConfig::default());
//!     let summary = runner.run(&creds).await;
//!     println!("{} orders exported", summary.total_records());
//!     Ok(())
//! }
//! ```

pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod runner;
pub mod sheets;
pub mod sink;
pub mod types;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use types::{
    mask_secret, CabinetCredential, CabinetReport, FailureKind, FetchOutcome, OrderRecord,
    PageOutcome, RunSummary, SinkOutcome, StopReason,
};

pub use credentials::{parse_credential_rows, CredentialSource};
pub use fetcher::{initial_cursor, FetchConfig, PaginatedFetcher, DEFAULT_CURSOR_FIELD};
pub use http::{BackoffConfig, HttpClientConfig, OrdersApi, RetryPolicy, StatisticsClient};
pub use runner::{CabinetRunner, RunnerConfig};
pub use sheets::{SheetsClient, SheetsConfig, SheetsCredentialSource, Spreadsheet};
pub use sink::{Destination, EmptyResultPolicy, TableHandle, TabularSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
