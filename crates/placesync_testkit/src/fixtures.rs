//! Source-file fixtures and record helpers.
//!
//! Provides temp directories holding GeoJSON and CSV sources, plus
//! shorthand constructors for the records tests pass around.

use placesync_model::{Record, RemoteId};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory of source files, removed on drop.
pub struct SourceDir {
    dir: TempDir,
}

impl SourceDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `contents` to `name` and returns its path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("Failed to write fixture");
        path
    }

    /// Writes a feature collection of `features` to `name`.
    pub fn geojson(&self, name: &str, features: Vec<Value>) -> PathBuf {
        self.write(name, &feature_collection(features).to_string())
    }

    /// Writes a CSV file with `header` and `rows` to `name`.
    pub fn csv(&self, name: &str, header: &[&str], rows: &[&[&str]]) -> PathBuf {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(header).expect("Failed to write header");
        for row in rows {
            writer.write_record(*row).expect("Failed to write row");
        }
        let bytes = writer.into_inner().expect("Failed to flush CSV");
        self.write(name, &String::from_utf8_lossy(&bytes))
    }
}

impl Default for SourceDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A point feature with the given id and properties.
pub fn feature(id: impl Into<Value>, properties: Value) -> Value {
    json!({
        "type": "Feature",
        "id": id.into(),
        "geometry": {"type": "Point", "coordinates": [-75.16, 39.95]},
        "properties": properties,
    })
}

/// A feature collection.
pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({"type": "FeatureCollection", "features": features})
}

/// A record persisted at `https://x/places/{id}`.
pub fn synced_record(id: i64) -> Record {
    let mut record = Record::default();
    record.mark_synced(RemoteId::Int(id), format!("https://x/places/{}", id));
    record
}

/// An unsynced record with the given properties.
pub fn new_record(properties: Value) -> Record {
    Record::from_feature(json!({"type": "Feature", "properties": properties}))
        .expect("properties must be an object")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_sources() {
        let dir = SourceDir::new();
        let geojson = dir.geojson("a.geojson", vec![feature("1", json!({"name": "x"}))]);
        let csv = dir.csv("b.csv", &["id", "name"], &[&["1", "a,b"]]);

        let text = std::fs::read_to_string(geojson).unwrap();
        assert!(text.contains("FeatureCollection"));
        let text = std::fs::read_to_string(csv).unwrap();
        assert_eq!(text, "id,name\n1,\"a,b\"\n");
    }

    #[test]
    fn record_helpers() {
        assert!(synced_record(3).is_synced());
        let record = new_record(json!({"name": "x"}));
        assert!(!record.is_synced());
        assert_eq!(record.property_text("name").as_deref(), Some("x"));
    }
}
