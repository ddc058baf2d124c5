//! Error types for source loading.

use placesync_model::ModelError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors that can occur while loading local sources.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A feature could not be decoded.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The GeoJSON document has no `features` array.
    #[error("not a feature collection: {0}")]
    NotAFeatureCollection(String),

    /// A feature or row had no usable source identifier.
    #[error("record {position} has no source identifier")]
    MissingSourceId {
        /// Zero-based position in the source.
        position: usize,
    },

    /// A `lat`/`lon` column did not hold a number.
    #[error("row {row}: invalid {field} value {value:?}")]
    InvalidCoordinate {
        /// Zero-based data row.
        row: usize,
        /// Column name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// No loader handles this file.
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(PathBuf),

    /// An attribute filter expression was not `name=value`.
    #[error("invalid filter {0:?}: expected name=value")]
    InvalidFilter(String),
}
