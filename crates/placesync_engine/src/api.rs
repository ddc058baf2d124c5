//! Request construction for the places API.

use crate::completion::Operation;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{Credentials, HttpRequest, Method};
use placesync_model::Record;

/// Header carrying the private dataset key.
pub const KEY_HEADER: &str = "X-Shareabouts-Key";

/// Header suppressing remote notifications.
pub const SILENT_HEADER: &str = "X-Shareabouts-Silent";

/// Anti-forgery token header.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Builds requests against one dataset's places collection.
#[derive(Debug, Clone)]
pub struct PlacesApi {
    places_url: String,
    dataset_key: String,
    silent: bool,
    csrf_token: String,
    credentials: Option<Credentials>,
}

impl PlacesApi {
    /// Creates a builder from the engine configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            places_url: config.places_url.clone(),
            dataset_key: config.dataset_key.clone(),
            silent: config.silent,
            csrf_token: config.csrf_token.clone(),
            credentials: config.credentials.clone(),
        }
    }

    /// The collection URL.
    pub fn places_url(&self) -> &str {
        &self.places_url
    }

    /// Read credentials, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Builds the request for `operation` on `record`.
    ///
    /// Updates and deletes need the record's endpoint; a record without one
    /// yields [`SyncError::MissingEndpoint`].
    pub fn request_for(&self, operation: Operation, record: &Record) -> SyncResult<HttpRequest> {
        match operation {
            Operation::Create => self.create_request(record),
            Operation::Update => self.update_request(record),
            Operation::Delete => self.delete_request(record),
        }
    }

    /// `POST` to the collection.
    pub fn create_request(&self, record: &Record) -> SyncResult<HttpRequest> {
        let request = HttpRequest::new(Method::Post, self.places_url.as_str())
            .body(record.to_body()?);
        Ok(self.with_write_headers(request))
    }

    /// `PUT` to the record's endpoint.
    pub fn update_request(&self, record: &Record) -> SyncResult<HttpRequest> {
        let endpoint = require_endpoint(record)?;
        let request = HttpRequest::new(Method::Put, endpoint).body(record.to_body()?);
        Ok(self.with_write_headers(request))
    }

    /// `DELETE` of the record's endpoint.
    pub fn delete_request(&self, record: &Record) -> SyncResult<HttpRequest> {
        let endpoint = require_endpoint(record)?;
        Ok(self.with_write_headers(HttpRequest::new(Method::Delete, endpoint)))
    }

    fn with_write_headers(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("Content-Type", "application/json")
            .header(SILENT_HEADER, if self.silent { "true" } else { "false" })
            .header(KEY_HEADER, self.dataset_key.as_str())
            .header(CSRF_HEADER, self.csrf_token.as_str())
            .header("Cookie", format!("csrftoken={}", self.csrf_token))
    }
}

fn require_endpoint(record: &Record) -> SyncResult<&str> {
    record.endpoint().ok_or_else(|| SyncError::MissingEndpoint {
        record: record.label(),
    })
}
