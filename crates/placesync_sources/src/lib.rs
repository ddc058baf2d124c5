//! # placesync sources
//!
//! Local place sources and their reconciliation with remote records.
//!
//! This crate provides:
//! - [`SourceIndex`]: remote records keyed by the source identifier they were imported with
//! - [`reconcile`]: carrying remote identity onto freshly loaded records
//! - [`GeoJsonLoader`] and [`CsvLoader`] behind the [`SourceLoader`] trait
//! - [`merge_sources`]: last-loaded-wins de-duplication across source files
//! - [`RecordFilter`]: attribute filters for selecting remote records
//!
//! ## Load pipeline
//!
//! Every loader applies the same steps to each input row or feature:
//! 1. Keep only allow-listed properties (an empty allow-list keeps all)
//! 2. Look the source identifier up in the index and inherit remote identity
//! 3. Copy renamed fields (renames are additive)
//! 4. Stamp the source identifier into the configured property
//!
//! Output order equals input order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod csv_source;
mod error;
mod filter;
mod geojson_source;
mod index;
mod options;
mod reconcile;

pub use csv_source::CsvLoader;
pub use error::{SourceError, SourceResult};
pub use filter::RecordFilter;
pub use geojson_source::GeoJsonLoader;
pub use index::SourceIndex;
pub use options::LoadOptions;
pub use reconcile::{dedupe_last_wins, merge_sources, reconcile};

use placesync_model::Record;
use std::path::Path;

/// A local file format that can be loaded into records.
pub trait SourceLoader {
    /// Short name of the format, for logging.
    fn format(&self) -> &'static str;

    /// Loads `path`, matching each record against `index`.
    fn load(
        &self,
        path: &Path,
        options: &LoadOptions,
        index: &SourceIndex,
    ) -> SourceResult<Vec<Record>>;
}

/// Picks a loader from a file extension: `.geojson`/`.json` or `.csv`.
pub fn loader_for_path(path: &Path) -> SourceResult<Box<dyn SourceLoader>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("geojson") | Some("json") => Ok(Box::new(GeoJsonLoader)),
        Some("csv") => Ok(Box::new(CsvLoader)),
        _ => Err(SourceError::UnsupportedFormat(path.to_path_buf())),
    }
}

pub(crate) fn read_source(path: &Path) -> SourceResult<String> {
    std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn log_loaded(path: &Path, records: &[Record]) {
    let seen = records.iter().filter(|r| r.is_synced()).count();
    tracing::info!(
        "{} place(s) loaded from {}, with {} having been seen before",
        records.len(),
        path.display(),
        seen
    );
}
