//! Attribute filters over record properties.

use crate::error::{SourceError, SourceResult};
use placesync_model::{scalar_text, Record};
use std::collections::BTreeMap;

/// Selects records by their properties. All conditions must hold; an empty
/// filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Properties that must be present.
    pub present: Vec<String>,
    /// Properties that must be absent.
    pub absent: Vec<String>,
    /// Properties that must equal the given text.
    pub equal: BTreeMap<String, String>,
    /// Properties that must not equal the given text.
    pub not_equal: BTreeMap<String, String>,
}

impl RecordFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `name=value` expressions into a map.
    pub fn parse_pairs<I, S>(expressions: I) -> SourceResult<BTreeMap<String, String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        expressions
            .into_iter()
            .map(|expr| {
                let expr = expr.as_ref();
                expr.split_once('=')
                    .filter(|(name, _)| !name.is_empty())
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .ok_or_else(|| SourceError::InvalidFilter(expr.to_string()))
            })
            .collect()
    }

    /// Returns true if `record` satisfies every condition.
    ///
    /// Values compare by text, so `"3"` equals the number `3`. A missing
    /// property never equals anything.
    pub fn matches(&self, record: &Record) -> bool {
        if self.present.iter().any(|name| record.property(name).is_none()) {
            return false;
        }
        if self.absent.iter().any(|name| record.property(name).is_some()) {
            return false;
        }
        let text = |name: &str| record.property(name).and_then(scalar_text);
        if self
            .equal
            .iter()
            .any(|(name, value)| text(name).as_deref() != Some(value.as_str()))
        {
            return false;
        }
        !self
            .not_equal
            .iter()
            .any(|(name, value)| text(name).as_deref() == Some(value.as_str()))
    }
}
