//! In-memory places API.
//!
//! Implements the subset of the remote API the engine talks to: paginated
//! `GET` on the collection, `POST` to create, `PUT` and `DELETE` on a
//! record's URL. Writes must carry the dataset key.

use parking_lot::Mutex;
use placesync_engine::{
    places_url, HttpRequest, HttpResponse, LoopbackClient, LoopbackServer, Method, RetryConfig,
    SyncConfig, SyncEngine, KEY_HEADER,
};
use placesync_model::{Record, RemoteId};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Host the test server pretends to live at.
pub const TEST_HOST: &str = "https://places.test";

/// Owner segment of the test dataset URL.
pub const TEST_OWNER: &str = "tester";

/// Dataset segment of the test dataset URL.
pub const TEST_DATASET: &str = "parks";

/// Dataset key the server accepts for writes.
pub const TEST_KEY: &str = "test-key";

/// One request as seen by the server.
#[derive(Debug, Clone)]
pub struct RequestLog {
    /// Method.
    pub method: Method,
    /// URL.
    pub url: String,
    /// Headers as sent.
    pub headers: Vec<(String, String)>,
    /// Value of the completion probe when the request arrived.
    pub completed_before: Option<usize>,
}

impl RequestLog {
    /// Returns the first header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct ServerState {
    places: Mutex<BTreeMap<i64, Value>>,
    next_id: AtomicI64,
    page_size: AtomicUsize,
    latency_micros: AtomicU64,
    log: Mutex<Vec<RequestLog>>,
    in_flight: Mutex<HashMap<Method, usize>>,
    peak: Mutex<HashMap<Method, usize>>,
    forced_status: Mutex<HashMap<Method, u16>>,
    completion_probe: Mutex<Option<Arc<AtomicUsize>>>,
}

/// An in-memory places collection. Clones share state.
#[derive(Clone)]
pub struct PlacesServer {
    state: Arc<ServerState>,
    places_url: String,
}

impl PlacesServer {
    /// Creates an empty server with 100 records per page.
    pub fn new() -> Self {
        let state = ServerState {
            next_id: AtomicI64::new(1),
            page_size: AtomicUsize::new(100),
            ..ServerState::default()
        };
        Self {
            state: Arc::new(state),
            places_url: places_url(TEST_HOST, TEST_OWNER, TEST_DATASET),
        }
    }

    /// The collection URL.
    pub fn places_url(&self) -> &str {
        &self.places_url
    }

    /// The accepted dataset key.
    pub fn key(&self) -> &'static str {
        TEST_KEY
    }

    /// The URL of record `id`.
    pub fn place_url(&self, id: i64) -> String {
        format!("{}/{}", self.places_url, id)
    }

    /// Sets records per page.
    pub fn set_page_size(&self, size: usize) {
        self.state.page_size.store(size.max(1), Ordering::SeqCst);
    }

    /// Makes every request take at least `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state
            .latency_micros
            .store(latency.as_micros() as u64, Ordering::SeqCst);
    }

    /// Answers every request with `method` with `status` and an empty body.
    pub fn force_status(&self, method: Method, status: u16) {
        self.state.forced_status.lock().insert(method, status);
    }

    /// Stops forcing statuses.
    pub fn clear_forced_status(&self) {
        self.state.forced_status.lock().clear();
    }

    /// Records `probe`'s value in the log as each request arrives.
    pub fn probe_completions(&self, probe: Arc<AtomicUsize>) {
        *self.state.completion_probe.lock() = Some(probe);
    }

    /// Adds a record directly, returning its id.
    pub fn insert(&self, properties: Value) -> i64 {
        self.insert_with_geometry(properties, Value::Null)
    }

    /// Adds a record with a geometry, returning its id.
    pub fn insert_with_geometry(&self, properties: Value, geometry: Value) -> i64 {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let feature = self.stored_feature(id, properties, geometry);
        self.state.places.lock().insert(id, feature);
        id
    }

    /// Adds a record imported from a local source under `source_id`.
    pub fn insert_imported(&self, source_id: &str, mut properties: Value) -> i64 {
        if let Value::Object(map) = &mut properties {
            map.insert("_imported_id".into(), Value::from(source_id));
        }
        self.insert(properties)
    }

    /// Adds `count` plain records.
    pub fn seed(&self, count: usize) -> Vec<i64> {
        (0..count)
            .map(|i| self.insert(json!({"name": format!("place {}", i)})))
            .collect()
    }

    /// Returns the stored record `id`.
    pub fn get(&self, id: i64) -> Option<Record> {
        let feature = self.state.places.lock().get(&id).cloned()?;
        Record::from_feature(feature).ok()
    }

    /// Returns every stored record in id order.
    pub fn records(&self) -> Vec<Record> {
        self.state
            .places
            .lock()
            .values()
            .filter_map(|feature| Record::from_feature(feature.clone()).ok())
            .collect()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.places.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RequestLog> {
        self.state.log.lock().clone()
    }

    /// Number of requests received with `method`.
    pub fn request_count(&self, method: Method) -> usize {
        self.state
            .log
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    /// Highest number of concurrent requests seen for `method`.
    pub fn peak_in_flight(&self, method: Method) -> usize {
        self.state.peak.lock().get(&method).copied().unwrap_or(0)
    }

    /// A config for this server with fast retries.
    pub fn config(&self) -> SyncConfig {
        SyncConfig::new(self.places_url.clone(), TEST_KEY).with_retry(
            RetryConfig::new()
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(8)),
        )
    }

    /// An engine wired to this server through a loopback client.
    pub fn engine(&self, config: SyncConfig) -> SyncEngine<LoopbackClient<PlacesServer>> {
        SyncEngine::new(config, LoopbackClient::new(self.clone())).expect("valid test config")
    }

    fn stored_feature(&self, id: i64, properties: Value, geometry: Value) -> Value {
        let mut properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        properties.remove("id");
        properties.insert("url".into(), Value::from(self.place_url(id)));
        json!({
            "type": "Feature",
            "id": id,
            "geometry": geometry,
            "properties": properties,
        })
    }

    fn route(&self, request: &HttpRequest) -> HttpResponse {
        if let Some(status) = self.state.forced_status.lock().get(&request.method) {
            return HttpResponse::new(*status, Vec::new());
        }

        let Some(rest) = request.url.strip_prefix(self.places_url.as_str()) else {
            return HttpResponse::new(404, "unknown dataset");
        };

        if request.method != Method::Get && request.header_value(KEY_HEADER) != Some(TEST_KEY) {
            return HttpResponse::new(403, "bad dataset key");
        }

        let place_id = rest
            .strip_prefix('/')
            .map(|id| id.trim_end_matches('/'))
            .and_then(|id| id.parse::<i64>().ok());

        match (request.method, place_id) {
            (Method::Get, None) => self.page(rest),
            (Method::Get, Some(id)) => self.show(id),
            (Method::Post, None) => self.create(request),
            (Method::Put, Some(id)) => self.update(id, request),
            (Method::Delete, Some(id)) => self.remove(id),
            _ => HttpResponse::new(405, "method not allowed"),
        }
    }

    fn page(&self, query: &str) -> HttpResponse {
        let number = query
            .strip_prefix("?page=")
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let size = self.state.page_size.load(Ordering::SeqCst);

        let places = self.state.places.lock();
        let features: Vec<Value> = places
            .values()
            .skip((number - 1) * size)
            .take(size)
            .cloned()
            .collect();
        let next = if number * size < places.len() {
            Value::from(format!("{}?page={}", self.places_url, number + 1))
        } else {
            Value::Null
        };
        let body = json!({
            "type": "FeatureCollection",
            "features": features,
            "metadata": {"length": places.len(), "next": next},
        });
        json_response(200, &body)
    }

    fn show(&self, id: i64) -> HttpResponse {
        match self.state.places.lock().get(&id) {
            Some(feature) => json_response(200, feature),
            None => HttpResponse::new(404, "not found"),
        }
    }

    fn create(&self, request: &HttpRequest) -> HttpResponse {
        let Some((properties, geometry)) = parse_body(request) else {
            return HttpResponse::new(400, "malformed feature");
        };
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let feature = self.stored_feature(id, properties, geometry);
        self.state.places.lock().insert(id, feature.clone());
        json_response(201, &feature)
    }

    fn update(&self, id: i64, request: &HttpRequest) -> HttpResponse {
        let Some((properties, geometry)) = parse_body(request) else {
            return HttpResponse::new(400, "malformed feature");
        };
        let mut places = self.state.places.lock();
        if !places.contains_key(&id) {
            return HttpResponse::new(404, "not found");
        }
        let feature = self.stored_feature(id, properties, geometry);
        places.insert(id, feature.clone());
        json_response(200, &feature)
    }

    fn remove(&self, id: i64) -> HttpResponse {
        match self.state.places.lock().remove(&id) {
            Some(_) => HttpResponse::new(204, Vec::new()),
            None => HttpResponse::new(404, "not found"),
        }
    }

    fn enter(&self, request: &HttpRequest) {
        let completed_before = self
            .state
            .completion_probe
            .lock()
            .as_ref()
            .map(|probe| probe.load(Ordering::SeqCst));
        self.state.log.lock().push(RequestLog {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            completed_before,
        });

        let mut in_flight = self.state.in_flight.lock();
        let now = in_flight.entry(request.method).or_insert(0);
        *now += 1;
        let mut peak = self.state.peak.lock();
        let high = peak.entry(request.method).or_insert(0);
        *high = (*high).max(*now);
    }

    fn leave(&self, request: &HttpRequest) {
        if let Some(now) = self.state.in_flight.lock().get_mut(&request.method) {
            *now = now.saturating_sub(1);
        }
    }
}

impl Default for PlacesServer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackServer for PlacesServer {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self.enter(request);
        let latency = self.state.latency_micros.load(Ordering::SeqCst);
        if latency > 0 {
            std::thread::sleep(Duration::from_micros(latency));
        }
        let response = self.route(request);
        self.leave(request);
        response
    }
}

/// Remote id of a record stored by this server.
pub fn int_id(record: &Record) -> Option<i64> {
    match record.identifier()? {
        RemoteId::Int(id) => Some(*id),
        RemoteId::Text(text) => text.parse().ok(),
    }
}

fn parse_body(request: &HttpRequest) -> Option<(Value, Value)> {
    let body: Value = serde_json::from_slice(request.body.as_deref()?).ok()?;
    let properties = body.get("properties").cloned().unwrap_or(json!({}));
    let geometry = body.get("geometry").cloned().unwrap_or(Value::Null);
    Some((properties, geometry))
}

fn json_response(status: u16, body: &Value) -> HttpResponse {
    HttpResponse::new(status, serde_json::to_vec(body).unwrap_or_default())
}
