//! End-to-end fetch and publish scenarios against scripted fakes
//!
//! All tests run on a paused clock, so the minute-long pauses cost nothing
//! and elapsed virtual time shows exactly how long the loop waited.


use ordersync_core::{
    CabinetCredential, CabinetRunner, EmptyResultPolicy, FailureKind, FetchConfig,
    PaginatedFetcher, RunnerConfig, SinkOutcome, StopReason, TabularSink,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use test_support::*;
use tokio::time::Instant;

const START: &str = "2024-01-01T00:00:00";

fn fetcher(api: ScriptedOrdersApi) -> PaginatedFetcher<ScriptedOrdersApi> {
    PaginatedFetcher::new(api, FetchConfig::default())
}

fn runner(
    api: ScriptedOrdersApi,
    destination: RecordingDestination,
) -> CabinetRunner<ScriptedOrdersApi, RecordingDestination> {
    CabinetRunner::new(
        fetcher(api),
        TabularSink::new(destination),
        RunnerConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn one_page_then_empty_page() {
    let api = ScriptedOrdersApi::new().script(
        "tok",
        vec![
            page(json!([order("a", "2024-01-01"), order("b", "2024-01-02")])),
            empty_page(),
        ],
    );
    let fetcher = fetcher(api);

    let outcome = fetcher.fetch_from("tok", START.to_string()).await;

    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.requests, 2);
    assert_eq!(outcome.pages, 1);
    assert_eq!(fetcher.api().cursors("tok"), vec![START, "2024-01-02"]);
}

#[tokio::test(start_paused = true)]
async fn pages_are_concatenated_in_order() {
    let api = ScriptedOrdersApi::new().script(
        "tok",
        vec![
            page(json!([order("a", "2024-01-01"), order("b", "2024-01-02")])),
            page(json!([order("b", "2024-01-02"), order("c", "2024-01-03")])),
            page(json!([order("d", "2024-01-04")])),
            empty_page(),
        ],
    );
    let fetcher = fetcher(api);

    let start = Instant::now();
    let outcome = fetcher.fetch_from("tok", START.to_string()).await;

    let srids: Vec<&str> = outcome
        .records
        .iter()
        .map(|r| r["srid"].as_str().unwrap())
        .collect();
    // The boundary record is repeated, not deduplicated
    assert_eq!(srids, vec!["a", "b", "b", "c", "d"]);
    assert_eq!(outcome.pages, 3);
    assert_eq!(
        fetcher.api().cursors("tok"),
        vec![START, "2024-01-02", "2024-01-03", "2024-01-04"]
    );
    // One rate-limit pause per consumed page
    assert_eq!(start.elapsed(), Duration::from_secs(180));
}

#[tokio::test(start_paused = true)]
async fn retries_reuse_the_cursor() {
    let api = ScriptedOrdersApi::new().script(
        "tok",
        vec![
            page(json!([order("a", "2024-01-05")])),
            status(503),
            network_error(),
            html_page(),
            page(json!([order("b", "2024-01-06")])),
            empty_page(),
        ],
    );
    let fetcher = fetcher(api);

    let start = Instant::now();
    let outcome = fetcher.fetch_from("tok", START.to_string()).await;

    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.requests, 6);
    assert_eq!(
        fetcher.api().cursors("tok"),
        vec![
            START,
            "2024-01-05",
            "2024-01-05",
            "2024-01-05",
            "2024-01-05",
            "2024-01-06"
        ]
    );
    // pages: 60 + 60; transient: 60 + 120; malformed: 60
    assert_eq!(start.elapsed(), Duration::from_secs(360));
}

#[tokio::test(start_paused = true)]
async fn three_server_errors_stop_with_empty_result() {
    let api = ScriptedOrdersApi::new().script("tok", vec![status(503), status(503), status(503)]);
    let fetcher = fetcher(api);

    let outcome = fetcher.fetch_from("tok", START.to_string()).await;

    assert_eq!(outcome.stop, StopReason::RetriesExhausted(FailureKind::Http));
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.requests, 3);
    assert_eq!(fetcher.api().cursors("tok"), vec![START, START, START]);
}

#[tokio::test(start_paused = true)]
async fn malformed_ceiling_keeps_earlier_pages() {
    let api = ScriptedOrdersApi::new().script(
        "tok",
        vec![
            page(json!([order("a", "2024-01-05")])),
            html_page(),
            html_page(),
            html_page(),
        ],
    );
    let fetcher = fetcher(api);

    let outcome = fetcher.fetch_from("tok", START.to_string()).await;

    assert_eq!(outcome.stop, StopReason::RetriesExhausted(FailureKind::Malformed));
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.requests, 4);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_stops_without_waiting() {
    let api = ScriptedOrdersApi::new().script("tok", vec![unauthorized()]);
    let fetcher = fetcher(api);

    let start = Instant::now();
    let outcome = fetcher.fetch_from("tok", START.to_string()).await;

    assert_eq!(outcome.stop, StopReason::Unauthorized);
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.requests, 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_first_request_still_reaches_sink() {
    let api = ScriptedOrdersApi::new().script("tok", vec![unauthorized()]);
    let runner = runner(api, RecordingDestination::new());

    let summary = runner
        .run(&[CabinetCredential::new("North", "tok")])
        .await;

    let report = &summary.cabinets[0];
    assert_eq!(report.stop, StopReason::Unauthorized);
    assert_eq!(report.records, 0);
    assert_eq!(report.sink, SinkOutcome::Untouched);
    assert_eq!(
        runner.sink().destination().calls(),
        vec![DestinationCall::GetOrCreate("North".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn server_errors_leave_table_untouched() {
    let api = ScriptedOrdersApi::new().script("tok", vec![status(503), status(503), status(503)]);
    let runner = runner(api, RecordingDestination::new());

    let summary = runner
        .run(&[CabinetCredential::new("North", "tok")])
        .await;

    assert_eq!(summary.cabinets[0].sink, SinkOutcome::Untouched);
    let calls = runner.sink().destination().calls();
    assert!(!calls
        .iter()
        .any(|c| matches!(c, DestinationCall::Clear(_) | DestinationCall::Write(..))));
}

#[tokio::test(start_paused = true)]
async fn placeholder_policy_replaces_empty_table() {
    let api = ScriptedOrdersApi::new();
    let sink = TabularSink::new(RecordingDestination::new())
        .with_empty_policy(EmptyResultPolicy::Placeholder("No data".to_string()));
    let runner = CabinetRunner::new(fetcher(api), sink, RunnerConfig::default());

    let summary = runner
        .run(&[CabinetCredential::new("North", "tok")])
        .await;

    assert_eq!(summary.cabinets[0].sink, SinkOutcome::Placeholder);
    assert_eq!(
        runner.sink().destination().calls(),
        vec![
            DestinationCall::GetOrCreate("North".to_string()),
            DestinationCall::Clear("North".to_string()),
            DestinationCall::Write("North".to_string(), vec![vec!["No data".to_string()]]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn partial_result_is_written_after_unauthorized() {
    let api = ScriptedOrdersApi::new().script(
        "tok",
        vec![page(json!([order("a", "2099-01-05")])), unauthorized()],
    );
    let runner = runner(api, RecordingDestination::new());

    let summary = runner
        .run(&[CabinetCredential::new("North", "tok")])
        .await;

    let report = &summary.cabinets[0];
    assert_eq!(report.stop, StopReason::Unauthorized);
    assert_eq!(report.sink, SinkOutcome::Written { rows: 1 });
    assert_eq!(
        runner.sink().destination().written("North"),
        Some(vec![
            vec!["srid".to_string(), "totalPrice".to_string(), "lastChangeDate".to_string()],
            vec!["a".to_string(), "1500".to_string(), "2099-01-05".to_string()],
        ])
    );
}

#[tokio::test(start_paused = true)]
async fn sink_failure_does_not_stop_later_cabinets() {
    let api = ScriptedOrdersApi::new()
        .script("tok-1", vec![page(json!([order("a", "2099-01-05")]))])
        .script("tok-2", vec![page(json!([order("b", "2099-01-06")]))]);
    let runner = runner(api, RecordingDestination::new().failing_on("North"));

    let start = Instant::now();
    let summary = runner
        .run(&[
            CabinetCredential::new("North", "tok-1"),
            CabinetCredential::new("South", "tok-2"),
        ])
        .await;

    assert_eq!(summary.cabinets.len(), 2);
    assert!(matches!(summary.cabinets[0].sink, SinkOutcome::Failed { .. }));
    assert_eq!(summary.cabinets[1].sink, SinkOutcome::Written { rows: 1 });
    assert_eq!(summary.failed_sinks().count(), 1);
    assert_eq!(summary.total_records(), 2);
    // one page pause per cabinet plus the pause between them
    assert_eq!(start.elapsed(), Duration::from_secs(122));
}

#[tokio::test(start_paused = true)]
async fn missing_cursor_writes_what_was_collected() {
    let api = ScriptedOrdersApi::new().script(
        "tok",
        vec![page(json!([order("a", "2024-01-05"), {"srid": "b"}]))],
    );
    let runner = runner(api, RecordingDestination::new());

    let summary = runner
        .run(&[CabinetCredential::new("North", "tok")])
        .await;

    let report = &summary.cabinets[0];
    assert_eq!(report.stop, StopReason::MissingCursor);
    assert_eq!(report.sink, SinkOutcome::Written { rows: 2 });
    assert_eq!(summary.incomplete().count(), 1);

    let rows = runner.sink().destination().written("North").unwrap();
    assert_eq!(rows[2], vec!["b".to_string(), String::new(), String::new()]);
}

#[tokio::test(start_paused = true)]
async fn stalled_cursor_keeps_collected_pages() {
    let api = ScriptedOrdersApi::new().script(
        "tok",
        vec![
            page(json!([order("a", "2024-01-02")])),
            page(json!([order("b", "2024-01-02")])),
        ],
    );
    let fetcher = fetcher(api);

    let outcome = fetcher.fetch_from("tok", START.to_string()).await;

    assert_eq!(outcome.stop, StopReason::CursorNotAdvancing);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.requests, 2);
    assert_eq!(fetcher.api().cursors("tok"), vec![START, "2024-01-02"]);
}
