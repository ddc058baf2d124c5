//! Connection-failure injection.

use parking_lot::Mutex;
use placesync_engine::{HttpClient, HttpRequest, HttpResponse, Method, SyncError, SyncResult};
use std::collections::HashMap;
use std::time::Instant;

type RequestKey = (Method, String, Vec<u8>);

/// Wraps a client so each distinct request fails with a retryable
/// connection error a fixed number of times before going through.
///
/// Requests are told apart by method, URL and body.
pub struct FlakyClient<C: HttpClient> {
    inner: C,
    failures: u32,
    attempts: Mutex<HashMap<RequestKey, Vec<Instant>>>,
}

impl<C: HttpClient> FlakyClient<C> {
    /// Fails every distinct request `failures` times.
    pub fn new(inner: C, failures: u32) -> Self {
        Self {
            inner,
            failures,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Never lets a request through.
    pub fn unreachable(inner: C) -> Self {
        Self::new(inner, u32::MAX)
    }

    /// The wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Attempt times for requests to `url`, across methods and bodies.
    pub fn attempt_times(&self, url: &str) -> Vec<Instant> {
        let mut times: Vec<Instant> = self
            .attempts
            .lock()
            .iter()
            .filter(|((_, u, _), _)| u == url)
            .flat_map(|(_, times)| times.iter().copied())
            .collect();
        times.sort();
        times
    }

    /// Total attempts made through this client.
    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().values().map(Vec::len).sum()
    }
}

impl<C: HttpClient> HttpClient for FlakyClient<C> {
    fn execute(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
        let key = (
            request.method,
            request.url.clone(),
            request.body.clone().unwrap_or_default(),
        );
        let attempt = {
            let mut attempts = self.attempts.lock();
            let times = attempts.entry(key).or_default();
            times.push(Instant::now());
            times.len() as u64
        };

        if attempt <= u64::from(self.failures) {
            return Err(SyncError::transport_retryable(format!(
                "connection refused (attempt {})",
                attempt
            )));
        }
        self.inner.execute(request)
    }
}
