//! Per-load options.

use placesync_model::{Properties, DEFAULT_SOURCE_ID_FIELD};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Options shared by every source loader.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Property that receives the source identifier.
    pub source_id_field: String,
    /// Properties to keep. Empty keeps all.
    pub include_fields: BTreeSet<String>,
    /// Additive renames: the value of each key is copied to the mapped name.
    pub field_renames: BTreeMap<String, String>,
}

impl LoadOptions {
    /// Creates options with the default source-id field and no filtering.
    pub fn new() -> Self {
        Self {
            source_id_field: DEFAULT_SOURCE_ID_FIELD.to_string(),
            include_fields: BTreeSet::new(),
            field_renames: BTreeMap::new(),
        }
    }

    /// Sets the source-id field.
    pub fn with_source_id_field(mut self, field: impl Into<String>) -> Self {
        self.source_id_field = field.into();
        self
    }

    /// Sets the property allow-list.
    pub fn with_include_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a field rename.
    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.field_renames.insert(from.into(), to.into());
        self
    }

    /// Drops every property not on the allow-list.
    pub(crate) fn retain_included(&self, properties: &mut Properties) {
        if self.include_fields.is_empty() {
            return;
        }
        properties.retain(|name, _| self.include_fields.contains(name));
    }

    /// Copies renamed fields. Sources are read before any target is written,
    /// so chained renames (`a -> b`, `b -> c`) see the original values.
    pub(crate) fn apply_renames(&self, properties: &mut Properties) {
        let copies: Vec<(String, Value)> = self
            .field_renames
            .iter()
            .filter_map(|(from, to)| properties.get(from).map(|v| (to.clone(), v.clone())))
            .collect();

        for (to, value) in copies {
            properties.insert(to, value);
        }
    }

    /// Writes the source identifier into its property, keeping its JSON type.
    pub(crate) fn stamp(&self, properties: &mut Properties, source_id: Value) {
        properties.insert(self.source_id_field.clone(), source_id);
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::new()
    }
}
