//! GeoJSON feature collection source.

use crate::error::{SourceError, SourceResult};
use crate::index::SourceIndex;
use crate::options::LoadOptions;
use crate::reconcile::{dedupe_last_wins, reconcile};
use crate::{log_loaded, read_source, SourceLoader};
use placesync_model::{scalar_text, Record};
use serde_json::Value;
use std::path::Path;

/// Loads records from a GeoJSON `FeatureCollection`.
///
/// Each feature's `id` is its source identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonLoader;

impl GeoJsonLoader {
    /// Loads records from GeoJSON text.
    pub fn parse(
        &self,
        text: &str,
        options: &LoadOptions,
        index: &SourceIndex,
    ) -> SourceResult<Vec<Record>> {
        let document: Value = serde_json::from_str(text)?;
        let Value::Object(mut document) = document else {
            return Err(SourceError::NotAFeatureCollection(
                "top level is not an object".into(),
            ));
        };
        let Some(Value::Array(features)) = document.remove("features") else {
            return Err(SourceError::NotAFeatureCollection(
                "missing features array".into(),
            ));
        };

        let mut records = Vec::with_capacity(features.len());
        for (position, feature) in features.into_iter().enumerate() {
            let raw_id = feature.get("id").cloned().unwrap_or(Value::Null);
            let source_id = scalar_text(&raw_id).ok_or(SourceError::MissingSourceId { position })?;

            let mut record = Record::from_feature(feature)?;
            options.retain_included(&mut record.properties);
            reconcile(&mut record, &source_id, index);
            options.apply_renames(&mut record.properties);
            options.stamp(&mut record.properties, raw_id);

            records.push(record);
        }

        Ok(dedupe_last_wins(records))
    }
}

impl SourceLoader for GeoJsonLoader {
    fn format(&self) -> &'static str {
        "geojson"
    }

    fn load(
        &self,
        path: &Path,
        options: &LoadOptions,
        index: &SourceIndex,
    ) -> SourceResult<Vec<Record>> {
        tracing::info!("Loading places from {}...", path.display());
        let records = self.parse(&read_source(path)?, options, index)?;
        log_loaded(path, &records);
        Ok(records)
    }
}
