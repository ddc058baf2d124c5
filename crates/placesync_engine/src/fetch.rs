//! Paginated retrieval of the remote places collection.

use crate::error::{SyncError, SyncResult};
use crate::http::{Credentials, HttpClient, HttpRequest};
use placesync_model::{Page, Record, RemoteId};
use serde_json::Value;
use std::collections::BTreeMap;

/// Every remote record, keyed by remote identifier.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Records by identifier; later pages overwrite earlier duplicates.
    pub records: BTreeMap<RemoteId, Record>,
    /// Pages actually read.
    pub pages_loaded: u64,
    /// Page count estimated from the first page. Display only.
    pub total_pages: u64,
}

impl FetchResult {
    /// Number of distinct records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was fetched.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the result, returning the records in identifier order.
    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }
}

/// Estimates the page count from the first page's size and the reported total.
pub fn expected_page_count(first_page_len: usize, total_length: u64) -> u64 {
    if first_page_len == 0 {
        return 0;
    }
    total_length.div_ceil(first_page_len as u64)
}

/// Reads the whole collection at `url`, following `metadata.next`.
///
/// Any status other than 200 aborts the fetch with no partial result.
/// `on_page` receives `(pages_loaded, total_pages)` after each page.
pub fn fetch_all<C, F>(
    client: &C,
    url: &str,
    credentials: Option<&Credentials>,
    mut on_page: F,
) -> SyncResult<FetchResult>
where
    C: HttpClient + ?Sized,
    F: FnMut(u64, u64),
{
    tracing::info!("Loading places from {}...", url);

    let mut result = FetchResult::default();
    let mut total_pages: Option<u64> = None;
    let mut next = Some(url.to_string());

    while let Some(page_url) = next.take() {
        let request = HttpRequest::get(page_url.as_str()).credentials(credentials.cloned());
        let response = client.execute(&request)?;
        if response.status != 200 {
            return Err(SyncError::UnexpectedStatus {
                url: page_url,
                status: response.status,
            });
        }

        let page = Page::from_slice(&response.body)
            .map_err(|e| SyncError::Protocol(format!("malformed page from {}: {}", page_url, e)))?;

        if total_pages.is_none() {
            if page.features.is_empty() {
                total_pages = Some(0);
                break;
            }
            let length = page
                .metadata
                .length
                .unwrap_or(page.features.len() as u64);
            total_pages = Some(expected_page_count(page.features.len(), length));
        }

        let next_url = page.next_url().map(str::to_string);
        for feature in page.features {
            let identifier = feature_identifier(&feature).ok_or_else(|| {
                SyncError::Protocol(format!("feature without an id on {}", page_url))
            })?;
            let record = Record::from_feature(feature)?;
            result.records.insert(identifier, record);
        }

        result.pages_loaded += 1;
        let total = total_pages.unwrap_or_default();
        tracing::debug!("...loaded page {} of {}", result.pages_loaded, total);
        on_page(result.pages_loaded, total);

        next = next_url;
    }

    result.total_pages = total_pages.unwrap_or_default();
    tracing::info!(
        "Loaded {} places in {} page(s)",
        result.records.len(),
        result.pages_loaded
    );
    Ok(result)
}

fn feature_identifier(feature: &Value) -> Option<RemoteId> {
    feature
        .get("id")
        .and_then(RemoteId::from_value)
        .or_else(|| {
            feature
                .get("properties")
                .and_then(|p| p.get("id"))
                .and_then(RemoteId::from_value)
        })
}
