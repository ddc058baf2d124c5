//! One page of the remote places collection.

use serde::{Deserialize, Serialize};

/// A page as returned by `GET` on the places collection.
///
/// Both `features` and `metadata` are required; a response missing either
/// is malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Raw features on this page.
    pub features: Vec<serde_json::Value>,
    /// Pagination metadata.
    pub metadata: PageMetadata,
}

/// Pagination metadata for a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Total number of records in the collection.
    #[serde(default)]
    pub length: Option<u64>,
    /// URL of the next page, absent on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

impl Page {
    /// Decodes a page from a response body.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Returns the next page URL, treating an empty string as absent.
    pub fn next_url(&self) -> Option<&str> {
        self.metadata.next.as_deref().filter(|next| !next.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_last_page() {
        let page = Page::from_slice(br#"{"features": [], "metadata": {"length": 0, "next": null}}"#)
            .unwrap();
        assert!(page.features.is_empty());
        assert_eq!(page.metadata.length, Some(0));
        assert_eq!(page.next_url(), None);
    }

    #[test]
    fn empty_next_is_treated_as_absent() {
        let page =
            Page::from_slice(br#"{"features": [], "metadata": {"next": ""}}"#).unwrap();
        assert_eq!(page.next_url(), None);
    }

    #[test]
    fn missing_metadata_is_malformed() {
        assert!(Page::from_slice(br#"{"features": []}"#).is_err());
    }
}
