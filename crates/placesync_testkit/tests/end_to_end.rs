//! End-to-end tests: fetch, index, load, reconcile and dispatch against the
//! in-memory places server.

use placesync_engine::{
    Completion, LoopbackClient, Method, Operation, Outcome, RetryConfig, SaveFilter, SyncError,
    SyncEngine, SILENT_HEADER,
};
use placesync_model::Record;
use placesync_sources::{
    loader_for_path, merge_sources, LoadOptions, RecordFilter, SourceIndex,
};
use placesync_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn load_all(server: &PlacesServer, paths: &[std::path::PathBuf]) -> Vec<Record> {
    let engine = server.engine(server.config());
    let fetched = engine.fetch_all(|_, _| {}).unwrap();
    let options = LoadOptions::new();
    let index = SourceIndex::build(fetched.records.values(), &options.source_id_field);
    merge_sources(paths.iter().map(|path| {
        loader_for_path(path)
            .unwrap()
            .load(path, &options, &index)
            .unwrap()
    }))
}

#[test]
fn fetches_three_pages_of_two() {
    let server = PlacesServer::new();
    server.set_page_size(2);
    server.seed(6);
    let engine = server.engine(server.config());

    let mut progress = Vec::new();
    let fetched = engine
        .fetch_all(|loaded, total| progress.push((loaded, total)))
        .unwrap();

    assert_eq!(fetched.len(), 6);
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(server.request_count(Method::Get), 3);
    assert_eq!(engine.stats().records_fetched, 6);
}

#[test]
fn fetch_of_empty_collection() {
    let server = PlacesServer::new();
    let fetched = server.engine(server.config()).fetch_all(|_, _| {}).unwrap();
    assert!(fetched.is_empty());
    assert_eq!(fetched.total_pages, 0);
}

#[test]
fn fetch_aborts_on_error_status() {
    let server = PlacesServer::new();
    server.seed(3);
    server.force_status(Method::Get, 500);

    let err = server
        .engine(server.config())
        .fetch_all(|_, _| {})
        .unwrap_err();
    assert!(matches!(err, SyncError::UnexpectedStatus { status: 500, .. }));
}

#[test]
fn geojson_feature_matching_an_import_becomes_an_update() {
    let server = PlacesServer::new();
    server.seed(6);
    let id = server.insert_imported("42", json!({"name": "Old name"}));
    assert_eq!(id, 7);

    let dir = SourceDir::new();
    let path = dir.geojson(
        "parks.geojson",
        vec![
            feature("42", json!({"name": "New name"})),
            feature("43", json!({"name": "Brand new"})),
        ],
    );
    let records = load_all(&server, &[path]);

    let matched = &records[0];
    assert_eq!(
        matched.to_feature()["properties"]["url"],
        json!(server.place_url(7))
    );
    assert_eq!(SaveFilter::all().operation_for(matched), Some(Operation::Update));
    assert_eq!(SaveFilter::all().operation_for(&records[1]), Some(Operation::Create));
}

#[test]
fn sync_run_updates_matches_and_creates_the_rest() {
    let server = PlacesServer::new();
    let existing = server.insert_imported("a", json!({"name": "A"}));

    let dir = SourceDir::new();
    let first = dir.csv(
        "first.csv",
        &["id", "name", "lat", "lon"],
        &[&["a", "A prime", "39.95", "-75.16"], &["b", "B", "40.0", "-75.0"]],
    );
    let second = dir.geojson("second.geojson", vec![feature("b", json!({"name": "B final"}))]);

    let records = load_all(&server, &[first, second]);
    assert_eq!(records.len(), 2);

    let engine = server.engine(server.config());
    let sink = CollectingSink::new();
    let summary = engine.save(records, SaveFilter::all(), &sink).unwrap();

    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(server.len(), 2);
    assert_eq!(
        server.get(existing).unwrap().property_text("name").as_deref(),
        Some("A prime")
    );
    assert!(server
        .records()
        .iter()
        .any(|r| r.property_text("name").as_deref() == Some("B final")
            && r.property_text("_imported_id").as_deref() == Some("b")));

    // A second run finds every record and only updates.
    let dir = SourceDir::new();
    let again = dir.geojson(
        "again.geojson",
        vec![
            feature("a", json!({"name": "A"})),
            feature("b", json!({"name": "B"})),
        ],
    );
    let records = load_all(&server, &[again]);
    let sink = CollectingSink::new();
    engine.save(records, SaveFilter::all(), &sink).unwrap();

    assert_eq!(sink.for_operation(Operation::Update).len(), 2);
    assert_eq!(server.len(), 2);
}

#[test]
fn created_records_carry_their_new_identity() {
    let server = PlacesServer::new();
    let engine = server.engine(server.config());
    let sink = CollectingSink::new();

    let records = (0..5).map(|i| new_record(json!({"n": i}))).collect();
    engine.save(records, SaveFilter::all(), &sink).unwrap();

    for completion in sink.completions() {
        let id = int_id(&completion.record).unwrap();
        assert_eq!(completion.record.endpoint(), Some(server.place_url(id).as_str()));
        assert_eq!(completion.status(), Some(201));
    }
}

#[test]
fn writes_carry_protocol_headers() {
    let server = PlacesServer::new();
    let engine = server.engine(server.config().with_silent(false));
    engine
        .save(vec![new_record(json!({}))], SaveFilter::all(), &CollectingSink::new())
        .unwrap();

    let post = &server.requests()[0];
    assert_eq!(post.method, Method::Post);
    assert_eq!(post.header(SILENT_HEADER), Some("false"));
    assert_eq!(post.header("x-shareabouts-key"), Some(TEST_KEY));
    assert_eq!(post.header("x-csrftoken"), Some("123"));
    assert_eq!(post.header("cookie"), Some("csrftoken=123"));
    assert_eq!(post.header("content-type"), Some("application/json"));
}

#[test]
fn delete_of_250_runs_in_three_joined_batches() {
    let server = PlacesServer::new();
    server.seed(250);
    let counter = Arc::new(AtomicUsize::new(0));
    server.probe_completions(counter.clone());
    let engine = server.engine(server.config());
    let records = engine.fetch_all(|_, _| {}).unwrap().into_records();

    let sink = CollectingSink::with_counter(counter);
    let summary = engine.delete(records, &sink).unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.succeeded, 250);
    assert_eq!(sink.len(), 250);
    assert!(server.is_empty());

    let deletes: Vec<usize> = server
        .requests()
        .iter()
        .filter(|r| r.method == Method::Delete)
        .map(|r| r.completed_before.unwrap())
        .collect();
    let mut per_batch = [0usize; 3];
    for completed in &deletes {
        per_batch[completed / 100] += 1;
    }
    assert_eq!(per_batch, [100, 100, 50]);
    // Arrival order follows batch order.
    assert!(deletes.windows(2).all(|w| w[0] / 100 <= w[1] / 100));
}

#[test]
fn in_flight_calls_never_exceed_four_per_kind() {
    let server = PlacesServer::new();
    server.set_latency(Duration::from_millis(2));
    let ids = server.seed(60);
    let engine = server.engine(server.config());

    let mut records: Vec<Record> = engine.fetch_all(|_, _| {}).unwrap().into_records();
    records.extend((0..60).map(|i| new_record(json!({"n": i}))));
    let summary = engine
        .save(records, SaveFilter::all(), &CollectingSink::new())
        .unwrap();
    assert_eq!(summary.dispatched, 120);

    let to_delete = ids.iter().filter_map(|id| server.get(*id)).collect();
    engine.delete(to_delete, &CollectingSink::new()).unwrap();

    assert!(server.peak_in_flight(Method::Post) <= 4);
    assert!(server.peak_in_flight(Method::Put) <= 4);
    assert!(server.peak_in_flight(Method::Delete) <= 4);
    assert!(server.peak_in_flight(Method::Post) >= 1);
}

#[test]
fn delete_without_endpoint_makes_no_calls() {
    let server = PlacesServer::new();
    let id = server.insert(json!({}));
    let engine = server.engine(server.config());
    let sink = CollectingSink::new();

    let records = vec![server.get(id).unwrap(), new_record(json!({}))];
    let err = engine.delete(records, &sink).unwrap_err();

    assert!(matches!(err, SyncError::MissingEndpoint { .. }));
    assert!(sink.is_empty());
    assert_eq!(server.request_count(Method::Delete), 0);
    assert_eq!(server.len(), 1);
}

#[test]
fn error_statuses_are_reported_not_retried() {
    let server = PlacesServer::new();
    let ids = server.seed(3);
    server.force_status(Method::Delete, 500);
    let engine = server.engine(server.config());
    let sink = CollectingSink::new();

    let records = ids.iter().filter_map(|id| server.get(*id)).collect();
    let summary = engine.delete(records, &sink).unwrap();

    assert_eq!(summary.failed, 3);
    assert_eq!(server.request_count(Method::Delete), 3);
    assert!(sink
        .failures()
        .iter()
        .all(|c| c.describe_failure().starts_with("Error deleting place")));
}

#[test]
fn connection_failures_back_off_exponentially() {
    let server = PlacesServer::new();
    let id = server.insert(json!({"name": "x"}));
    let retry = RetryConfig::new()
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(30));
    let config = server.config().with_retry(retry.clone());
    let client = FlakyClient::new(LoopbackClient::new(server.clone()), 7);
    let engine = SyncEngine::new(config, client).unwrap();
    let sink = CollectingSink::new();

    let record = server.get(id).unwrap();
    engine.save(vec![record], SaveFilter::all(), &sink).unwrap();

    let completion = &sink.completions()[0];
    assert!(completion.is_success());
    assert_eq!(completion.attempts, 8);
    assert_eq!(engine.stats().retries, 7);

    let delays: Vec<u64> = (1..=7)
        .map(|n| (retry.delay_for_attempt(n).as_secs_f64() * 1000.0).round() as u64)
        .collect();
    assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

    let times = engine.client().attempt_times(&server.place_url(id));
    assert_eq!(times.len(), 8);
    for (n, pair) in times.windows(2).enumerate() {
        assert!(pair[1] - pair[0] >= retry.delay_for_attempt(n as u32 + 1));
    }
}

#[test]
fn attempt_cap_abandons_and_still_completes_once() {
    let server = PlacesServer::new();
    let config = server
        .config()
        .with_retry(server.config().retry.with_max_attempts(3));
    let client = FlakyClient::unreachable(LoopbackClient::new(server.clone()));
    let engine = SyncEngine::new(config, client).unwrap();
    let sink = CollectingSink::new();

    let records = (0..4).map(|i| new_record(json!({"n": i}))).collect();
    let summary = engine.save(records, SaveFilter::all(), &sink).unwrap();

    assert_eq!(summary.abandoned, 4);
    assert_eq!(sink.len(), 4);
    assert!(sink
        .completions()
        .iter()
        .all(|c| matches!(c.outcome, Outcome::Abandoned { attempts: 3, .. })));
    assert!(server.is_empty());
}

#[test]
fn cancel_stops_unbounded_retries() {
    let server = PlacesServer::new();
    let client = FlakyClient::unreachable(LoopbackClient::new(server.clone()));
    let engine = SyncEngine::new(server.config().with_batch_size(3), client).unwrap();
    let sink = CollectingSink::new();

    let records = (0..7).map(|i| new_record(json!({"n": i}))).collect();
    let result = std::thread::scope(|scope| {
        let run = scope.spawn(|| engine.save(records, SaveFilter::all(), &sink));
        std::thread::sleep(Duration::from_millis(50));
        engine.cancel();
        run.join().unwrap()
    });

    assert!(matches!(result, Err(SyncError::Cancelled)));
    // Only the first batch started, and each of its records completed once.
    assert_eq!(sink.len(), 3);
    assert!(sink
        .completions()
        .iter()
        .all(|c| matches!(c.outcome, Outcome::Abandoned { .. })));
    assert_eq!(engine.stats().dispatch.batches, 1);
}

#[test]
fn clear_deletes_only_matching_records() {
    let server = PlacesServer::new();
    server.insert(json!({"kind": "bench", "source": "survey"}));
    server.insert(json!({"kind": "tree", "source": "survey"}));
    server.insert(json!({"kind": "bench"}));
    let engine = server.engine(server.config());

    let filter = RecordFilter {
        present: vec!["source".into()],
        not_equal: RecordFilter::parse_pairs(["kind=tree"]).unwrap(),
        ..RecordFilter::new()
    };
    let doomed: Vec<Record> = engine
        .fetch_all(|_, _| {})
        .unwrap()
        .into_records()
        .into_iter()
        .filter(|r| filter.matches(r))
        .collect();
    assert_eq!(doomed.len(), 1);

    let sink = CollectingSink::new();
    engine.delete(doomed, &sink).unwrap();

    assert_eq!(sink.successes(), 1);
    assert_eq!(server.len(), 2);
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn every_dispatched_record_completes_exactly_once(
        creates in 0usize..40,
        updates in 0usize..40,
        batch_size in 1usize..25,
        create in any::<bool>(),
        update in any::<bool>(),
    ) {
        let server = PlacesServer::new();
        let ids = server.seed(updates);
        let engine = server.engine(server.config().with_batch_size(batch_size));

        let mut records: Vec<Record> = ids.iter().filter_map(|id| server.get(*id)).collect();
        records.extend((0..creates).map(|i| new_record(json!({"n": i}))));

        let counter = Arc::new(AtomicUsize::new(0));
        let sink = CollectingSink::with_counter(counter.clone());
        let summary = engine.save(records, SaveFilter { create, update }, &sink).unwrap();

        let expected = (if create { creates } else { 0 }) + (if update { updates } else { 0 });
        prop_assert_eq!(summary.dispatched as usize, expected);
        prop_assert_eq!(counter.load(Ordering::SeqCst), expected);
        prop_assert_eq!(server.requests().len(), expected);
        prop_assert_eq!(
            summary.batches as usize,
            expected.div_ceil(batch_size)
        );
    }

    #[test]
    fn random_batches_complete_once(records in record_batch_strategy(0, 30)) {
        let server = PlacesServer::new();
        let engine = server.engine(server.config().with_batch_size(7));
        let sink = CollectingSink::new();

        let total = records.len();
        engine.save(records, SaveFilter::all(), &sink).unwrap();

        // Synced records point at https://x/, which the server answers with 404.
        prop_assert_eq!(sink.len(), total);
        let completions: Vec<Completion> = sink.completions();
        prop_assert!(completions.iter().all(|c| c.response().is_some()));
    }
}
