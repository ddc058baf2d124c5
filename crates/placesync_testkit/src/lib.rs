//! # placesync testkit
//!
//! Test utilities for placesync.
//!
//! This crate provides:
//! - [`PlacesServer`]: an in-memory places API behind the loopback seam
//! - [`FlakyClient`]: a client wrapper that injects connection failures
//! - [`CollectingSink`]: a completion sink that keeps everything it receives
//! - Temp-file fixtures for GeoJSON and CSV sources
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use placesync_testkit::prelude::*;
//!
//! #[test]
//! fn creates_everything() {
//!     let server = PlacesServer::new();
//!     let engine = server.engine(SyncConfig::new(server.places_url(), server.key()));
//!     let sink = CollectingSink::new();
//!     engine.save(vec![Record::default()], SaveFilter::all(), &sink).unwrap();
//!     assert_eq!(server.len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod flaky;
pub mod generators;
pub mod server;
pub mod sink;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::flaky::*;
    pub use crate::generators::*;
    pub use crate::server::*;
    pub use crate::sink::*;
    pub use placesync_engine::{
        Completion, Method, Operation, Outcome, RetryConfig, SaveFilter, SyncConfig, SyncEngine,
    };
    pub use placesync_model::{Record, RemoteId};
}

pub use fixtures::*;
pub use flaky::*;
pub use generators::*;
pub use server::*;
pub use sink::*;
