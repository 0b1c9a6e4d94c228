//! Property-based tests for the pagination loop
//!
//! Random response scripts check that the loop always terminates within its
//! request bound, that the cursor only moves forward, and that the result is
//! exactly the consumed pages in order.


use ordersync_core::http::BackoffScheduler;
use ordersync_core::{BackoffConfig, FetchConfig, FetchOutcome, PaginatedFetcher, StopReason};
use proptest::prelude::*;
use serde_json::{json, Value};
use test_support::*;

#[derive(Debug, Clone)]
enum Step {
    Page(usize),
    ServerError,
    OtherStatus,
    Network,
    Html,
    Unauthorized,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (1usize..4).prop_map(Step::Page),
        2 => Just(Step::ServerError),
        1 => Just(Step::OtherStatus),
        1 => Just(Step::Network),
        2 => Just(Step::Html),
        1 => Just(Step::Unauthorized),
    ]
}

/// Turn steps into responses; page records carry increasing cursors
fn build_script(steps: &[Step]) -> (Vec<Scripted>, Vec<Vec<Value>>) {
    let mut script = Vec::new();
    let mut pages = Vec::new();
    let mut counter = 0;

    for step in steps {
        match step {
            Step::Page(size) => {
                let records: Vec<Value> = (0..*size)
                    .map(|_| {
                        counter += 1;
                        order(&format!("srid-{}", counter), &format!("2024-01-01T{:06}", counter))
                    })
                    .collect();
                script.push(page(Value::Array(records.clone())));
                pages.push(records);
            }
            Step::ServerError => script.push(status(502)),
            Step::OtherStatus => script.push(status(404)),
            Step::Network => script.push(network_error()),
            Step::Html => script.push(html_page()),
            Step::Unauthorized => script.push(unauthorized()),
        }
    }

    (script, pages)
}

fn run_script(steps: &[Step]) -> (FetchOutcome, Vec<String>, Vec<Vec<Value>>) {
    let (script, pages) = build_script(steps);
    let fetcher = PaginatedFetcher::new(
        ScriptedOrdersApi::new().script("tok", script),
        FetchConfig::default(),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let outcome = runtime.block_on(fetcher.fetch_from("tok", "2024-01-01T000000".to_string()));
    let cursors = fetcher.api().cursors("tok");

    (outcome, cursors, pages)
}

proptest! {
    #[test]
    fn fetch_terminates_within_request_bound(steps in prop::collection::vec(step_strategy(), 0..20)) {
        let (outcome, cursors, _) = run_script(&steps);

        let per_page = BackoffScheduler::new(BackoffConfig::default()).max_requests_per_page() as usize;
        prop_assert_eq!(outcome.requests, cursors.len());
        prop_assert!(outcome.requests <= (outcome.pages + 1) * per_page);
    }

    #[test]
    fn cursor_never_regresses(steps in prop::collection::vec(step_strategy(), 0..20)) {
        let (_, cursors, _) = run_script(&steps);

        for pair in cursors.windows(2) {
            prop_assert!(pair[0] <= pair[1], "cursor went from {} to {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn result_is_consumed_pages_in_order(steps in prop::collection::vec(step_strategy(), 0..20)) {
        let (outcome, _, pages) = run_script(&steps);

        let expected: Vec<Value> = pages.into_iter().take(outcome.pages).flatten().collect();
        let actual: Vec<Value> = outcome.records.into_iter().map(Value::Object).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn only_an_empty_page_completes(steps in prop::collection::vec(step_strategy(), 0..20)) {
        let (outcome, _, pages) = run_script(&steps);

        // Completion means every scripted page was consumed and the
        // exhausted script then answered with an empty page
        if outcome.stop == StopReason::Completed {
            prop_assert_eq!(outcome.pages, pages.len());
        }
        if steps.is_empty() {
            prop_assert_eq!(outcome.stop, StopReason::Completed);
            prop_assert_eq!(outcome.requests, 1);
        }
    }
}

#[test]
fn empty_script_is_single_request() {
    let (outcome, cursors, _) = run_script(&[]);
    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(cursors, vec!["2024-01-01T000000".to_string()]);
    assert_eq!(json!(outcome.records), json!([]));
}
