//! # placesync model
//!
//! Place record types and wire shapes shared by every placesync crate.
//!
//! This crate provides:
//! - `Record` with an explicit `SyncState` (unsynced or synced to a remote endpoint)
//! - `Geometry` for GeoJSON point, line and polygon shapes
//! - `Page` for one page of the remote places collection
//! - GeoJSON feature encoding/decoding
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod geometry;
mod page;
mod record;

pub use error::{ModelError, ModelResult};
pub use geometry::{Geometry, Position};
pub use page::{Page, PageMetadata};
pub use record::{
    scalar_text, Properties, Record, RemoteId, SyncState, DEFAULT_SOURCE_ID_FIELD, URL_PROPERTY,
};
