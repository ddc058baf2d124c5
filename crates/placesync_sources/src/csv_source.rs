//! CSV source with a header row.

use crate::error::{SourceError, SourceResult};
use crate::index::SourceIndex;
use crate::options::LoadOptions;
use crate::reconcile::{dedupe_last_wins, reconcile};
use crate::{log_loaded, read_source, SourceLoader};
use placesync_model::{Geometry, Properties, Record};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

const ID_COLUMN: &str = "id";
const LAT_COLUMN: &str = "lat";
const LON_COLUMN: &str = "lon";

/// Loads records from a CSV file with a header row.
///
/// The `id` column is the source identifier. When both `lat` and `lon`
/// columns are present they become a point geometry and are removed from
/// the properties. All other values are kept as strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvLoader;

impl CsvLoader {
    /// Loads records from any CSV reader.
    pub fn read<R: Read>(
        &self,
        reader: R,
        options: &LoadOptions,
        index: &SourceIndex,
    ) -> SourceResult<Vec<Record>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let headers = reader.headers()?.clone();

        let mut records = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let row_values = result?;
            let mut properties: Properties = headers
                .iter()
                .zip(row_values.iter())
                .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                .collect();

            let source_id = match properties.get(ID_COLUMN) {
                Some(Value::String(id)) if !id.is_empty() => id.clone(),
                _ => return Err(SourceError::MissingSourceId { position: row }),
            };

            let geometry = take_point(&mut properties, row)?;

            let mut record = Record::new(geometry, properties);
            options.retain_included(&mut record.properties);
            reconcile(&mut record, &source_id, index);
            options.apply_renames(&mut record.properties);
            options.stamp(&mut record.properties, Value::String(source_id));

            records.push(record);
        }

        Ok(dedupe_last_wins(records))
    }
}

/// Removes `lat`/`lon` and builds a point, if both columns are present.
fn take_point(properties: &mut Properties, row: usize) -> SourceResult<Option<Geometry>> {
    if !(properties.contains_key(LAT_COLUMN) && properties.contains_key(LON_COLUMN)) {
        return Ok(None);
    }
    let lon = parse_coordinate(properties.remove(LON_COLUMN), row, LON_COLUMN)?;
    let lat = parse_coordinate(properties.remove(LAT_COLUMN), row, LAT_COLUMN)?;
    Ok(Some(Geometry::point(lon, lat)))
}

fn parse_coordinate(value: Option<Value>, row: usize, field: &'static str) -> SourceResult<f64> {
    let raw = match value {
        Some(Value::String(raw)) => raw,
        other => other.map(|v| v.to_string()).unwrap_or_default(),
    };
    let parsed = raw.trim().parse::<f64>().ok().filter(|n| n.is_finite());
    parsed.ok_or(SourceError::InvalidCoordinate {
            row,
            field,
            value: raw,
        })
}

impl SourceLoader for CsvLoader {
    fn format(&self) -> &'static str {
        "csv"
    }

    fn load(
        &self,
        path: &Path,
        options: &LoadOptions,
        index: &SourceIndex,
    ) -> SourceResult<Vec<Record>> {
        tracing::info!("Loading places from {}...", path.display());
        let text = read_source(path)?;
        let records = self.read(text.as_bytes(), options, index)?;
        log_loaded(path, &records);
        Ok(records)
    }
}
