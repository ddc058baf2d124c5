//! Error types for the record model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while decoding or encoding records.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A feature did not have the expected GeoJSON shape.
    #[error("malformed feature: {0}")]
    MalformedFeature(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Creates a malformed feature error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFeature(message.into())
    }
}
