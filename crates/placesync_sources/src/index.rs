//! Remote records indexed by source identifier.

use placesync_model::{scalar_text, Record};
use std::collections::HashMap;

/// Remote records keyed by the value of their source-id property.
///
/// Remote records without the property cannot be correlated with local
/// sources and are left out.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    field: String,
    records: HashMap<String, Record>,
    total_seen: usize,
}

impl SourceIndex {
    /// Builds an index over `remote`, keyed by the `field` property.
    ///
    /// Numeric property values are keyed by their decimal text so they match
    /// string identifiers from CSV and GeoJSON sources. When two remote
    /// records share a key the later one wins.
    pub fn build<'a, I>(remote: I, field: &str) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut records = HashMap::new();
        let mut total_seen = 0;

        for record in remote {
            total_seen += 1;
            let Some(source_id) = record.property(field).and_then(scalar_text) else {
                continue;
            };
            let mut indexed = record.clone();
            indexed.source_identifier = Some(source_id.clone());
            records.insert(source_id, indexed);
        }

        tracing::info!(
            "Saw {} places, with {} having come from somewhere else",
            total_seen,
            records.len()
        );

        Self {
            field: field.to_string(),
            records,
            total_seen,
        }
    }

    /// Returns an empty index, for runs with no remote data.
    pub fn empty(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ..Self::default()
        }
    }

    /// The property this index is keyed by.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Looks up the remote record imported with `source_id`.
    pub fn get(&self, source_id: &str) -> Option<&Record> {
        self.records.get(source_id)
    }

    /// Number of correlated remote records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no remote record could be correlated.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of remote records examined, correlated or not.
    pub fn total_seen(&self) -> usize {
        self.total_seen
    }
}
