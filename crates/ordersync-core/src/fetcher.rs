//! Paginated order fetching
//!
//! One state machine drives both loops: the inner loop repeats a page
//! request with the same cursor until it yields a page or a ceiling is hit,
//! the outer loop advances the cursor to the last record of each page until
//! an empty page arrives.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::http::backoff::{BackoffConfig, BackoffScheduler, PageAttempts, RetryDecision};
use crate::http::classifier::{Classification, ResponseClassifier};
use crate::http::client::OrdersApi;
use crate::types::{FailureKind, FetchOutcome, OrderRecord, PageOutcome, StopReason};

/// Default field holding the pagination cursor
pub const DEFAULT_CURSOR_FIELD: &str = "lastChangeDate";

/// Format of the initial `dateFrom` value
pub const CURSOR_DATE_FORMAT: &str = "%Y-%m-%dT00:00:00";

/// Fetch loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// How many days back the first request starts
    pub lookback_days: u32,
    /// Record field whose value becomes the next cursor
    pub cursor_field: String,
    pub backoff: BackoffConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            lookback_days: 14,
            cursor_field: DEFAULT_CURSOR_FIELD.to_string(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// First cursor of a run: midnight `lookback_days` before `now`
pub fn initial_cursor(now: NaiveDateTime, lookback_days: u32) -> String {
    let start = now.date() - ChronoDuration::days(i64::from(lookback_days));
    start.format(CURSOR_DATE_FORMAT).to_string()
}

/// Cursor value of a record, if it has a usable one.
///
/// Strings are taken verbatim and numbers as their JSON text. Null, nested
/// values and empty strings count as absent.
pub fn cursor_value(record: &OrderRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Order two cursor values.
///
/// Timestamps compare as times and numbers as numbers; anything else, or a
/// mix of kinds, falls back to plain text order.
fn compare_cursors(a: &str, b: &str) -> Ordering {
    if let (Some(a), Some(b)) = (parse_cursor_time(a), parse_cursor_time(b)) {
        return a.cmp(&b);
    }
    if let (Ok(a), Ok(b)) = (a.parse::<f64>(), b.parse::<f64>()) {
        if let Some(ordering) = a.partial_cmp(&b) {
            return ordering;
        }
    }
    a.cmp(b)
}

fn parse_cursor_time(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// One page request after its retries are resolved
#[derive(Debug)]
struct PageFetch {
    outcome: PageOutcome,
    requests: usize,
}

/// Collects every order page for one token
#[derive(Debug)]
pub struct PaginatedFetcher<A> {
    api: A,
    classifier: ResponseClassifier,
    scheduler: BackoffScheduler,
    config: FetchConfig,
}

impl<A: OrdersApi> PaginatedFetcher<A> {
    pub fn new(api: A, config: FetchConfig) -> Self {
        Self {
            api,
            classifier: ResponseClassifier::new(),
            scheduler: BackoffScheduler::new(config.backoff.clone()),
            config,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch everything changed within the lookback window
    pub async fn fetch(&self, token: &str) -> FetchOutcome {
        let cursor = initial_cursor(Local::now().naive_local(), self.config.lookback_days);
        self.fetch_from(token, cursor).await
    }

    /// Fetch everything changed at or after `cursor`
    #[instrument(skip(self, token))]
    pub async fn fetch_from(&self, token: &str, cursor: String) -> FetchOutcome {
        let mut cursor = cursor;
        let mut records: Vec<OrderRecord> = Vec::new();
        let mut pages = 0;
        let mut requests = 0;

        let stop = loop {
            let page = self.fetch_page(token, &cursor).await;
            requests += page.requests;

            let batch = match page.outcome {
                PageOutcome::EmptyTerminal => {
                    info!(total = records.len(), pages, "All orders collected");
                    break StopReason::Completed;
                }
                PageOutcome::FatalAuth => break StopReason::Unauthorized,
                PageOutcome::ExhaustedRetries(kind) => break StopReason::RetriesExhausted(kind),
                PageOutcome::ValidPage(batch) => batch,
            };

            pages += 1;
            let next = batch
                .last()
                .and_then(|last| cursor_value(last, &self.config.cursor_field));
            let received = batch.len();
            records.extend(batch);

            let Some(next) = next else {
                error!(
                    field = %self.config.cursor_field,
                    cursor = %cursor,
                    total = records.len(),
                    "Last record of the page has no cursor value, stopping"
                );
                break StopReason::MissingCursor;
            };

            if compare_cursors(&next, &cursor) != Ordering::Greater {
                error!(
                    field = %self.config.cursor_field,
                    cursor = %cursor,
                    next_cursor = %next,
                    total = records.len(),
                    "Cursor did not advance past the current one, stopping"
                );
                break StopReason::CursorNotAdvancing;
            }

            info!(
                page = pages,
                received,
                total = records.len(),
                next_cursor = %next,
                "Received orders page"
            );
            cursor = next;

            let pause = self.scheduler.rate_limit_pause();
            debug!(pause_secs = pause.as_secs(), "Waiting before next page");
            tokio::time::sleep(pause).await;
        };

        if !stop.is_complete() {
            warn!(%stop, kept = records.len(), "Fetch stopped early, keeping collected orders");
        }

        FetchOutcome {
            records,
            stop,
            pages,
            requests,
        }
    }

    /// Request one page, retrying with the same cursor
    async fn fetch_page(&self, token: &str, cursor: &str) -> PageFetch {
        let mut attempts = PageAttempts::default();
        let mut requests = 0;

        loop {
            requests += 1;
            debug!(cursor, attempt = attempts.total() + 1, "Requesting orders page");

            let (decision, kind) = match self.api.fetch_page(token, cursor).await {
                Err(e) => {
                    warn!(error = %e, attempt = attempts.transient + 1, "Orders request failed");
                    (self.scheduler.on_transient_failure(&mut attempts), FailureKind::Network)
                }
                Ok(response) => match self.classifier.classify(&response) {
                    Classification::ValidPage(batch) if batch.is_empty() => {
                        return PageFetch {
                            outcome: PageOutcome::EmptyTerminal,
                            requests,
                        };
                    }
                    Classification::ValidPage(batch) => {
                        return PageFetch {
                            outcome: PageOutcome::ValidPage(batch),
                            requests,
                        };
                    }
                    Classification::FatalAuth => {
                        error!(body = %response.fragment(), "Token rejected with 401");
                        return PageFetch {
                            outcome: PageOutcome::FatalAuth,
                            requests,
                        };
                    }
                    Classification::TransientHttpError { status }
                    | Classification::UnexpectedStatus { status } => {
                        warn!(
                            status,
                            attempt = attempts.transient + 1,
                            body = %response.fragment(),
                            "Orders request returned an error status"
                        );
                        (self.scheduler.on_transient_failure(&mut attempts), FailureKind::Http)
                    }
                    Classification::MalformedResponse(reason) => {
                        warn!(
                            %reason,
                            attempt = attempts.malformed + 1,
                            body = %response.fragment(),
                            "Orders response is not a JSON array"
                        );
                        (self.scheduler.on_malformed_response(&mut attempts), FailureKind::Malformed)
                    }
                },
            };

            match decision {
                RetryDecision::Retry { delay } => {
                    info!(delay_secs = delay.as_secs(), "Retrying page with the same cursor");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::NoRetry => {
                    error!(%kind, requests, "Retry limit reached for page");
                    return PageFetch {
                        outcome: PageOutcome::ExhaustedRetries(kind),
                        requests,
                    };
                }
            }
        }
    }
}
