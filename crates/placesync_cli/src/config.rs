//! JSON configuration files.

use placesync_engine::{places_url, Credentials, SyncConfig};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Access configuration for one dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// API host, e.g. `https://shareabouts.example.com`.
    pub host: String,
    /// Dataset owner.
    pub owner: String,
    /// Dataset slug.
    pub dataset: String,
    /// Private dataset key for writes.
    pub key: String,
    /// Basic-auth user for reads.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password for reads.
    #[serde(default)]
    pub password: Option<String>,
    /// Reporting timezone. Accepted but not applied.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl DatasetConfig {
    /// Reads a dataset configuration file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        read_json(path)
    }

    /// The places collection URL.
    pub fn places_url(&self) -> String {
        places_url(&self.host, &self.owner, &self.dataset)
    }

    /// Engine configuration for this dataset.
    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(self.places_url(), self.key.clone());
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        match &self.username {
            Some(username) => {
                config.with_credentials(Credentials::new(username, self.password.clone()))
            }
            None => config,
        }
    }
}

/// Report layout for one exported set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsvReportConfig {
    /// Renames applied to non-empty source columns.
    #[serde(default)]
    pub field_map: BTreeMap<String, String>,
    /// Output columns in order. Defaults to every column, sorted.
    #[serde(default)]
    pub field_order: Option<Vec<String>>,
}

/// Report configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// Layout of the places export.
    #[serde(default)]
    pub places_csv: CsvReportConfig,
    /// Keep rows created at or after this time.
    #[serde(default)]
    pub begin_date: Option<String>,
    /// Keep rows created before this time.
    #[serde(default)]
    pub end_date: Option<String>,
    /// Reporting timezone. Accepted but not applied.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl ReportConfig {
    /// Reads a report configuration file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        read_json(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
    let value = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid configuration in {}: {}", path.display(), e))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn dataset_config_with_auth() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "ds.json",
            r#"{"host": "https://api.example.com/", "owner": "city", "dataset": "parks",
                "key": "abc", "username": "admin", "password": "pw", "timezone": "US/Eastern"}"#,
        );

        let config = DatasetConfig::load(&path).unwrap();
        let sync = config.sync_config();

        assert_eq!(
            sync.places_url,
            "https://api.example.com/api/v2/city/datasets/parks/places"
        );
        assert_eq!(sync.dataset_key, "abc");
        let credentials = sync.credentials.unwrap();
        assert_eq!(credentials.username, "admin");
        assert_eq!(credentials.password.as_deref(), Some("pw"));
        assert_eq!(config.timezone.as_deref(), Some("US/Eastern"));
        assert_eq!(sync.timeout, placesync_engine::DEFAULT_TIMEOUT);
    }

    #[test]
    fn dataset_config_without_auth() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "ds.json",
            r#"{"host": "h", "owner": "o", "dataset": "d", "key": "k"}"#,
        );
        assert!(DatasetConfig::load(&path).unwrap().sync_config().credentials.is_none());
    }

    #[test]
    fn dataset_config_timeout() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "ds.json",
            r#"{"host": "h", "owner": "o", "dataset": "d", "key": "k", "timeout_secs": 5}"#,
        );
        let sync = DatasetConfig::load(&path).unwrap().sync_config();
        assert_eq!(sync.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_key_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "ds.json", r#"{"host": "h", "owner": "o", "dataset": "d"}"#);
        let err = DatasetConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
    }

    #[test]
    fn report_config_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "report.json",
            r#"{"places_csv": {"field_map": {"created_datetime": "submitted_at"}},
                "summary_template": "ignored.html"}"#,
        );

        let report = ReportConfig::load(&path).unwrap();
        assert_eq!(report.places_csv.field_map["created_datetime"], "submitted_at");
        assert!(report.places_csv.field_order.is_none());
        assert!(report.begin_date.is_none());
    }
}
