//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use crate::http::Credentials;
use std::time::Duration;

/// Records per batch; a batch is joined before the next one starts.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Network calls allowed in flight at once, per operation kind.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Placeholder anti-forgery token sent as both header and cookie.
pub const DEFAULT_CSRF_TOKEN: &str = "123";

/// Per-request timeout for the network client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Builds the places collection URL for a dataset.
pub fn places_url(host: &str, owner: &str, dataset: &str) -> String {
    format!(
        "{}/api/v2/{}/datasets/{}/places",
        host.trim_end_matches('/'),
        owner,
        dataset
    )
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Places collection URL; creates are posted here.
    pub places_url: String,
    /// Private dataset key sent with every write.
    pub dataset_key: String,
    /// Optional credentials for reads.
    pub credentials: Option<Credentials>,
    /// Suppress notification side effects on the remote system.
    pub silent: bool,
    /// Anti-forgery token value.
    pub csrf_token: String,
    /// Records per batch.
    pub batch_size: usize,
    /// Maximum concurrent network calls per operation kind.
    pub max_in_flight: usize,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Request timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(places_url: impl Into<String>, dataset_key: impl Into<String>) -> Self {
        Self {
            places_url: places_url.into(),
            dataset_key: dataset_key.into(),
            credentials: None,
            silent: true,
            csrf_token: DEFAULT_CSRF_TOKEN.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the concurrency cap.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets whether writes are silent.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Sets read credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that the configuration can drive the engine.
    pub fn validate(&self) -> SyncResult<()> {
        if self.places_url.is_empty() {
            return Err(SyncError::InvalidConfig("places URL is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::InvalidConfig("batch size must be positive".into()));
        }
        if self.max_in_flight == 0 {
            return Err(SyncError::InvalidConfig(
                "in-flight limit must be positive".into(),
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(SyncError::InvalidConfig(
                "max attempts must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for retry behavior on connection failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts; `None` retries until success or cancellation.
    pub max_attempts: Option<u32>,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Creates the default unbounded policy: 1s, doubling, capped at 30s.
    pub fn new() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Caps the number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Returns true if another attempt may follow `attempts` failed ones.
    pub fn allows_another(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }

    /// Calculates the delay after the given number of failures (0 = none yet).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_secs_f64() * BACKOFF_MULTIPLIER.powi(exponent);
        Duration::from_secs_f64(base_delay.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}
