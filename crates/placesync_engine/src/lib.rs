//! # placesync engine
//!
//! Fetches a remote places collection and writes records back to it.
//!
//! This crate provides:
//! - Paginated fetch following `metadata.next`
//! - Create/update/delete dispatch in joined batches
//! - Per-operation concurrency limits through an owned permit pool
//! - Retry of connection failures with capped exponential backoff
//! - Completion sinks (closures or channels) for per-record results
//! - HTTP client abstraction with `reqwest` and loopback implementations
//!
//! ## Key Invariants
//!
//! - Every dispatched record reaches the sink exactly once
//! - Completed HTTP responses are never retried, whatever their status
//! - A batch is joined before the next one starts
//! - Deleting a record without an endpoint fails before any request

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod completion;
mod config;
mod engine;
mod error;
mod fetch;
mod http;
mod permits;

pub use api::{PlacesApi, CSRF_HEADER, KEY_HEADER, SILENT_HEADER};
pub use completion::{ChannelSink, Completion, CompletionSink, Operation, Outcome};
pub use config::{
    places_url, RetryConfig, SyncConfig, DEFAULT_BATCH_SIZE, DEFAULT_CSRF_TOKEN,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT,
};
pub use engine::{DispatchSummary, SaveFilter, SyncEngine, SyncStats};
pub use error::{SyncError, SyncResult};
pub use fetch::{expected_page_count, fetch_all, FetchResult};
pub use http::{
    Credentials, HttpClient, HttpRequest, HttpResponse, LoopbackClient, LoopbackServer, Method,
    ReqwestClient,
};
pub use permits::{Permit, PermitPool};
