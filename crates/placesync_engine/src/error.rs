//! Error types for the sync engine.

use placesync_model::ModelError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A paginated read returned something other than 200.
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Protocol error (response body missing expected fields).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A record could not be decoded or encoded.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A delete was requested for a record with no remote endpoint.
    #[error("cannot delete {record}: it has no remote URL")]
    MissingEndpoint {
        /// Label of the offending record.
        record: String,
    },

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Only connection-level failures qualify. Completed HTTP responses are
    /// never errors at this layer, whatever their status.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection refused").is_retryable());
        assert!(!SyncError::transport_fatal("invalid url").is_retryable());
        assert!(!SyncError::UnexpectedStatus {
            url: "https://x".into(),
            status: 503
        }
        .is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::UnexpectedStatus {
            url: "https://x/places".into(),
            status: 500,
        };
        assert_eq!(err.to_string(), "unexpected status 500 from https://x/places");

        let err = SyncError::MissingEndpoint {
            record: "new place".into(),
        };
        assert!(err.to_string().contains("new place"));
    }
}
