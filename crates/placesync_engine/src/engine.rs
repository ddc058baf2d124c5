//! Bounded-concurrency create/update/delete dispatch.

use crate::api::PlacesApi;
use crate::completion::{Completion, CompletionSink, Operation, Outcome};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fetch::{self, FetchResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::permits::PermitPool;
use parking_lot::RwLock;
use placesync_model::Record;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while backing off; cancellation is polled in between.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Which classes of record [`SyncEngine::save`] dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveFilter {
    /// Create records that have no endpoint.
    pub create: bool,
    /// Update records that have an endpoint.
    pub update: bool,
}

impl SaveFilter {
    /// Creates and updates.
    pub fn all() -> Self {
        Self {
            create: true,
            update: true,
        }
    }

    /// Creates only.
    pub fn create_only() -> Self {
        Self {
            create: true,
            update: false,
        }
    }

    /// Updates only.
    pub fn update_only() -> Self {
        Self {
            create: false,
            update: true,
        }
    }

    /// Returns the operation for `record`, or `None` if it is filtered out.
    pub fn operation_for(&self, record: &Record) -> Option<Operation> {
        match (record.is_synced(), self.update, self.create) {
            (true, true, _) => Some(Operation::Update),
            (false, _, true) => Some(Operation::Create),
            _ => None,
        }
    }
}

impl Default for SaveFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Tally of one dispatch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Records handed to workers.
    pub dispatched: u64,
    /// Completions that succeeded.
    pub succeeded: u64,
    /// Completions with an error status.
    pub failed: u64,
    /// Records for which no response was obtained.
    pub abandoned: u64,
    /// Batches run.
    pub batches: u64,
}

impl DispatchSummary {
    fn record(&mut self, completion: &Completion) {
        self.dispatched += 1;
        if completion.is_success() {
            self.succeeded += 1;
        } else if completion.response().is_some() {
            self.failed += 1;
        } else {
            self.abandoned += 1;
        }
    }

    fn merge(&mut self, other: &DispatchSummary) {
        self.dispatched += other.dispatched;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.batches += other.batches;
    }
}

/// Statistics accumulated across an engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Records fetched from the remote collection.
    pub records_fetched: u64,
    /// Dispatch totals.
    pub dispatch: DispatchSummary,
    /// Transport failures that were retried.
    pub retries: u64,
    /// Last time a dispatch finished.
    pub last_dispatch_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Fetches and writes place records against one dataset.
///
/// Dispatch runs in batches of `batch_size` records. Every record in a batch
/// gets its own worker thread, but network calls are throttled by a permit
/// pool per operation kind, so at most `max_in_flight` creates (and as many
/// updates, and deletes) are outstanding at once. A batch is joined before
/// the next one starts.
pub struct SyncEngine<C: HttpClient> {
    config: SyncConfig,
    client: C,
    api: PlacesApi,
    create_permits: PermitPool,
    update_permits: PermitPool,
    delete_permits: PermitPool,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl<C: HttpClient> SyncEngine<C> {
    /// Creates a new engine.
    pub fn new(config: SyncConfig, client: C) -> SyncResult<Self> {
        config.validate()?;
        let api = PlacesApi::from_config(&config);
        Ok(Self {
            create_permits: PermitPool::new(config.max_in_flight),
            update_permits: PermitPool::new(config.max_in_flight),
            delete_permits: PermitPool::new(config.max_in_flight),
            config,
            client,
            api,
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels the running dispatch.
    ///
    /// Workers stop retrying and the current batch is joined. If batches
    /// remain, the dispatch returns [`SyncError::Cancelled`]; otherwise it
    /// returns the summary, with the interrupted records abandoned.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns true if [`cancel`](Self::cancel) was called since the last reset.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Fetches the whole remote collection.
    pub fn fetch_all<F>(&self, on_page: F) -> SyncResult<FetchResult>
    where
        F: FnMut(u64, u64),
    {
        let result = fetch::fetch_all(
            &self.client,
            self.api.places_url(),
            self.api.credentials(),
            on_page,
        );
        match &result {
            Ok(fetched) => self.stats.write().records_fetched += fetched.len() as u64,
            Err(e) => self.stats.write().last_error = Some(e.to_string()),
        }
        result
    }

    /// Creates records with no endpoint and updates those with one, as
    /// allowed by `filter`. Filtered-out records are skipped silently.
    pub fn save<S>(
        &self,
        records: Vec<Record>,
        filter: SaveFilter,
        sink: &S,
    ) -> SyncResult<DispatchSummary>
    where
        S: CompletionSink + ?Sized,
    {
        let jobs: Vec<(Operation, Record)> = records
            .into_iter()
            .filter_map(|record| filter.operation_for(&record).map(|op| (op, record)))
            .collect();
        tracing::info!("Saving {} places...", jobs.len());
        self.dispatch(jobs, sink)
    }

    /// Deletes records from the remote collection.
    ///
    /// Every record must have an endpoint. The whole call fails with
    /// [`SyncError::MissingEndpoint`] before any request is made otherwise.
    pub fn delete<S>(&self, records: Vec<Record>, sink: &S) -> SyncResult<DispatchSummary>
    where
        S: CompletionSink + ?Sized,
    {
        if let Some(record) = records.iter().find(|r| r.endpoint().is_none()) {
            return Err(SyncError::MissingEndpoint {
                record: record.label(),
            });
        }
        let jobs = records
            .into_iter()
            .map(|record| (Operation::Delete, record))
            .collect::<Vec<_>>();
        tracing::info!("Deleting {} places...", jobs.len());
        self.dispatch(jobs, sink)
    }

    fn dispatch<S>(
        &self,
        jobs: Vec<(Operation, Record)>,
        sink: &S,
    ) -> SyncResult<DispatchSummary>
    where
        S: CompletionSink + ?Sized,
    {
        let total = jobs.len();
        let mut summary = DispatchSummary::default();
        let mut pending = jobs.into_iter().peekable();
        let mut batch_number = 0u64;

        while pending.peek().is_some() {
            if let Err(e) = self.check_cancelled() {
                self.finish(&summary, Some(&e));
                return Err(e);
            }

            let batch: Vec<_> = pending.by_ref().take(self.config.batch_size).collect();
            batch_number += 1;
            tracing::debug!(
                "Starting batch {} ({} records, {} of {} dispatched)",
                batch_number,
                batch.len(),
                summary.dispatched,
                total
            );

            let batch_summary = self.run_batch(batch, sink);
            summary.merge(&batch_summary);
        }

        self.finish(&summary, None);
        tracing::info!(
            "Dispatched {} places: {} succeeded, {} failed, {} abandoned",
            summary.dispatched,
            summary.succeeded,
            summary.failed,
            summary.abandoned
        );
        Ok(summary)
    }

    fn run_batch<S>(&self, batch: Vec<(Operation, Record)>, sink: &S) -> DispatchSummary
    where
        S: CompletionSink + ?Sized,
    {
        let completions: Vec<Completion> = std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .into_iter()
                .map(|(operation, record)| {
                    scope.spawn(move || {
                        let completion = self.execute(operation, record);
                        sink.on_complete(completion.clone());
                        completion
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(completion) => completion,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        let mut summary = DispatchSummary {
            batches: 1,
            ..DispatchSummary::default()
        };
        for completion in &completions {
            summary.record(completion);
        }
        summary
    }

    fn finish(&self, summary: &DispatchSummary, error: Option<&SyncError>) {
        let mut stats = self.stats.write();
        stats.dispatch.merge(summary);
        stats.last_dispatch_time = Some(Instant::now());
        stats.last_error = error.map(ToString::to_string);
    }

    /// Runs one record to completion: builds the request, waits for a permit,
    /// then calls the server until a response arrives or retrying stops.
    fn execute(&self, operation: Operation, mut record: Record) -> Completion {
        let request = match self.api.request_for(operation, &record) {
            Ok(request) => request,
            Err(e) => {
                return Completion {
                    operation,
                    record,
                    outcome: Outcome::Abandoned {
                        attempts: 0,
                        reason: e.to_string(),
                    },
                    attempts: 0,
                };
            }
        };

        let (outcome, attempts) = {
            let _permit = self.permits(operation).acquire();
            self.call_with_retry(&request)
        };

        if operation == Operation::Create {
            if let Outcome::Response(response) = &outcome {
                capture_identity(&mut record, response);
            }
        }

        Completion {
            operation,
            record,
            outcome,
            attempts,
        }
    }

    fn call_with_retry(&self, request: &HttpRequest) -> (Outcome, u32) {
        let retry = &self.config.retry;
        let mut attempts = 0u32;

        loop {
            attempts = attempts.saturating_add(1);
            let error = match self.client.execute(request) {
                Ok(response) => return (Outcome::Response(response), attempts),
                Err(e) => e,
            };

            if !error.is_retryable() || !retry.allows_another(attempts) || self.is_cancelled() {
                let reason = if self.is_cancelled() {
                    format!("{} (cancelled)", error)
                } else {
                    error.to_string()
                };
                return (Outcome::Abandoned { attempts, reason }, attempts);
            }

            let delay = retry.delay_for_attempt(attempts);
            tracing::warn!(
                "{} {} failed ({}); retrying in {:?}",
                request.method.as_str(),
                request.url,
                error,
                delay
            );
            self.stats.write().retries += 1;

            if !self.sleep_unless_cancelled(delay) {
                return (
                    Outcome::Abandoned {
                        attempts,
                        reason: format!("{} (cancelled)", error),
                    },
                    attempts,
                );
            }
        }
    }

    /// Sleeps for `delay`, waking early on cancellation. Returns false if cancelled.
    fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }

    fn permits(&self, operation: Operation) -> &PermitPool {
        match operation {
            Operation::Create => &self.create_permits,
            Operation::Update => &self.update_permits,
            Operation::Delete => &self.delete_permits,
        }
    }
}

/// Copies the server-assigned identity from a create response onto `record`.
fn capture_identity(record: &mut Record, response: &HttpResponse) {
    if !response.is_success() {
        return;
    }
    match Record::from_slice(&response.body) {
        Ok(created) => match (created.identifier(), created.endpoint()) {
            (Some(identifier), Some(endpoint)) => {
                record.mark_synced(identifier.clone(), endpoint);
            }
            _ => tracing::warn!(
                "Create response for {} has no id or url; record stays unsynced",
                record.label()
            ),
        },
        Err(e) => tracing::warn!(
            "Could not read create response for {}: {}",
            record.label(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::http::{LoopbackClient, LoopbackServer, Method};
    use parking_lot::Mutex;
    use placesync_model::RemoteId;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    /// Answers creates with a fresh identity, everything else with `status`.
    struct StubServer {
        next_id: AtomicU32,
        status: u16,
    }

    impl StubServer {
        fn new(status: u16) -> Self {
            Self {
                next_id: AtomicU32::new(1),
                status,
            }
        }
    }

    impl LoopbackServer for StubServer {
        fn handle(&self, request: &HttpRequest) -> HttpResponse {
            match request.method {
                Method::Post => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    let body = json!({
                        "type": "Feature",
                        "id": id,
                        "properties": {"url": format!("https://x/places/{}", id)}
                    });
                    HttpResponse::new(201, serde_json::to_vec(&body).unwrap())
                }
                Method::Delete => HttpResponse::new(204, Vec::new()),
                _ => HttpResponse::new(self.status, Vec::new()),
            }
        }
    }

    /// Refuses the first `failures` calls with a retryable error.
    struct Refusing {
        failures: AtomicU32,
    }

    impl HttpClient for Refusing {
        fn execute(&self, _request: &HttpRequest) -> SyncResult<HttpResponse> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(SyncError::transport_retryable("connection refused"));
            }
            Ok(HttpResponse::new(200, Vec::new()))
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
    }

    fn config() -> SyncConfig {
        SyncConfig::new("https://x/places", "k").with_retry(fast_retry())
    }

    fn synced(id: i64) -> Record {
        let mut record = Record::default();
        record.mark_synced(RemoteId::Int(id), format!("https://x/places/{}", id));
        record
    }

    #[test]
    fn save_filter_routes_by_state() {
        let all = SaveFilter::all();
        assert_eq!(all.operation_for(&Record::default()), Some(Operation::Create));
        assert_eq!(all.operation_for(&synced(1)), Some(Operation::Update));

        assert_eq!(SaveFilter::update_only().operation_for(&Record::default()), None);
        assert_eq!(SaveFilter::create_only().operation_for(&synced(1)), None);

        let neither = SaveFilter {
            create: false,
            update: false,
        };
        assert_eq!(neither.operation_for(&synced(1)), None);
    }

    #[test]
    fn create_captures_identity() {
        let engine =
            SyncEngine::new(config(), LoopbackClient::new(StubServer::new(200))).unwrap();
        let store = Mutex::new(Vec::new());
        let sink = |c: Completion| store.lock().push(c);

        let summary = engine
            .save(vec![Record::default(), Record::default()], SaveFilter::all(), &sink)
            .unwrap();

        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.succeeded, 2);
        let completions = store.into_inner();
        assert!(completions.iter().all(|c| c.record.is_synced()));
        assert!(completions.iter().all(|c| c.operation == Operation::Create));
    }

    #[test]
    fn error_statuses_reach_the_sink_unretried() {
        let engine =
            SyncEngine::new(config(), LoopbackClient::new(StubServer::new(500))).unwrap();
        let store = Mutex::new(Vec::new());
        let sink = |c: Completion| store.lock().push(c);

        let summary = engine.save(vec![synced(1)], SaveFilter::all(), &sink).unwrap();

        assert_eq!(summary.failed, 1);
        let completions = store.into_inner();
        assert_eq!(completions[0].status(), Some(500));
        assert_eq!(completions[0].attempts, 1);
        assert_eq!(engine.stats().retries, 0);
    }

    #[test]
    fn delete_without_endpoint_fails_before_any_call() {
        let engine =
            SyncEngine::new(config(), LoopbackClient::new(StubServer::new(200))).unwrap();
        let store = Mutex::new(Vec::new());
        let sink = |c: Completion| store.lock().push(c);

        let err = engine
            .delete(vec![synced(1), Record::default()], &sink)
            .unwrap_err();

        assert!(matches!(err, SyncError::MissingEndpoint { .. }));
        assert!(store.into_inner().is_empty());
    }

    #[test]
    fn connection_failures_are_retried() {
        let client = Refusing {
            failures: AtomicU32::new(3),
        };
        let engine = SyncEngine::new(config(), client).unwrap();
        let store = Mutex::new(Vec::new());
        let sink = |c: Completion| store.lock().push(c);

        let summary = engine.save(vec![synced(1)], SaveFilter::all(), &sink).unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(store.into_inner()[0].attempts, 4);
        assert_eq!(engine.stats().retries, 3);
    }

    #[test]
    fn attempt_cap_abandons() {
        let client = Refusing {
            failures: AtomicU32::new(10),
        };
        let config = SyncConfig::new("https://x/places", "k")
            .with_retry(fast_retry().with_max_attempts(2));
        let engine = SyncEngine::new(config, client).unwrap();
        let store = Mutex::new(Vec::new());
        let sink = |c: Completion| store.lock().push(c);

        let summary = engine.save(vec![synced(1)], SaveFilter::all(), &sink).unwrap();

        assert_eq!(summary.abandoned, 1);
        let completions = store.into_inner();
        assert!(matches!(
            completions[0].outcome,
            Outcome::Abandoned { attempts: 2, .. }
        ));
    }

    #[test]
    fn cancelled_engine_dispatches_nothing() {
        let engine =
            SyncEngine::new(config(), LoopbackClient::new(StubServer::new(200))).unwrap();
        engine.cancel();
        let store = Mutex::new(Vec::new());
        let sink = |c: Completion| store.lock().push(c);

        let err = engine
            .save(vec![Record::default()], SaveFilter::all(), &sink)
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(store.into_inner().is_empty());

        engine.reset_cancel();
        assert!(!engine.is_cancelled());
    }

    #[test]
    fn cancel_during_last_batch_keeps_the_summary() {
        let client = Refusing {
            failures: AtomicU32::new(u32::MAX),
        };
        let engine = SyncEngine::new(config(), client).unwrap();
        let store = Mutex::new(Vec::new());
        let sink = |c: Completion| store.lock().push(c);

        let result = std::thread::scope(|scope| {
            let run = scope.spawn(|| engine.save(vec![synced(1)], SaveFilter::all(), &sink));
            std::thread::sleep(Duration::from_millis(30));
            engine.cancel();
            run.join().unwrap()
        });

        let summary = result.unwrap();
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.abandoned, 1);
        assert_eq!(store.into_inner().len(), 1);
    }

    #[test]
    fn batches_are_counted() {
        let config = config().with_batch_size(3);
        let engine =
            SyncEngine::new(config, LoopbackClient::new(StubServer::new(200))).unwrap();
        let records = (1..=7).map(synced).collect();

        let summary = engine.delete(records, &|_: Completion| {}).unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.succeeded, 7);
        assert_eq!(engine.stats().dispatch.dispatched, 7);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = config().with_batch_size(0);
        assert!(SyncEngine::new(config, LoopbackClient::new(StubServer::new(200))).is_err());
    }
}
