//! Dump command implementation.
//!
//! Exports the dataset's places as a clean CSV report: nested properties
//! flattened to dotted columns, rows limited to a creation-time window,
//! columns renamed and ordered as the report configuration says.

use crate::config::{CsvReportConfig, DatasetConfig, ReportConfig};
use placesync_engine::{HttpClient, ReqwestClient, SyncEngine};
use placesync_model::{scalar_text, Record};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use tracing::info;

/// Column holding the creation timestamp used for date windows.
pub const CREATED_FIELD: &str = "created_datetime";

/// One flattened report row.
pub type Row = BTreeMap<String, String>;

/// Runs the dump command, writing CSV to standard output.
pub fn run(config: &DatasetConfig, report: &ReportConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Dumping places from {}", config.places_url());
    if let Some(timezone) = report.timezone.as_ref().or(config.timezone.as_ref()) {
        info!("Timezone {} recorded; timestamps are written as stored", timezone);
    }
    let sync_config = config.sync_config();
    let client = ReqwestClient::new(sync_config.timeout)?;
    let engine = SyncEngine::new(sync_config, client)?;
    let stdout = std::io::stdout();
    let rows = execute(&engine, report, stdout.lock())?;
    eprintln!("Wrote {} rows", rows);
    Ok(())
}

/// Fetches the dataset and writes the report to `out`. Returns the row count.
pub fn execute<C, W>(
    engine: &SyncEngine<C>,
    report: &ReportConfig,
    out: W,
) -> Result<usize, Box<dyn std::error::Error>>
where
    C: HttpClient,
    W: Write,
{
    let records = engine.fetch_all(|_, _| {})?.into_records();
    eprintln!("Transforming the data...");

    let rows: Vec<Row> = records
        .iter()
        .map(flatten)
        .filter(|row| in_window(row, report.begin_date.as_deref(), report.end_date.as_deref()))
        .map(|row| rename_fields(row, &report.places_csv))
        .collect();

    write_csv(&rows, &report.places_csv, out)?;
    Ok(rows.len())
}

/// Flattens a record into report columns: `id`, `geometry`, every property
/// (objects as `a.b`, arrays as `a.0`), and `url`.
pub fn flatten(record: &Record) -> Row {
    let mut row = Row::new();
    row.insert(
        "id".into(),
        record.identifier().map(ToString::to_string).unwrap_or_default(),
    );
    row.insert(
        "geometry".into(),
        record.geometry.as_ref().map(|g| g.to_wkt()).unwrap_or_default(),
    );
    for (name, value) in &record.properties {
        flatten_into(name.clone(), value, &mut row);
    }
    row.insert("url".into(), record.endpoint().unwrap_or_default().to_string());
    row
}

fn flatten_into(key: String, value: &Value, row: &mut Row) {
    match value {
        Value::Object(map) => {
            for (name, nested) in map {
                flatten_into(format!("{}.{}", key, name), nested, row);
            }
        }
        Value::Array(items) => {
            for (position, nested) in items.iter().enumerate() {
                flatten_into(format!("{}.{}", key, position), nested, row);
            }
        }
        scalar => {
            row.insert(key, scalar_text(scalar).unwrap_or_default());
        }
    }
}

/// Returns true if the row's creation time lies in `[begin, end)`.
///
/// Timestamps compare as text, which orders ISO 8601 values correctly. Rows
/// without a creation time are kept.
pub fn in_window(row: &Row, begin: Option<&str>, end: Option<&str>) -> bool {
    let Some(created) = row.get(CREATED_FIELD).filter(|c| !c.is_empty()) else {
        return true;
    };
    if begin.is_some_and(|begin| created.as_str() < begin) {
        return false;
    }
    !end.is_some_and(|end| created.as_str() >= end)
}

/// Moves each mapped column to its new name when it has a value.
pub fn rename_fields(mut row: Row, layout: &CsvReportConfig) -> Row {
    for (from, to) in &layout.field_map {
        let has_value = row.get(from).is_some_and(|v| !v.is_empty());
        if has_value {
            if let Some(value) = row.remove(from) {
                row.insert(to.clone(), value);
            }
        }
    }
    row
}

/// Writes rows with the configured column order, or every column sorted.
/// Columns outside the order are dropped.
pub fn write_csv<W: Write>(
    rows: &[Row],
    layout: &CsvReportConfig,
    out: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let header: Vec<String> = match &layout.field_order {
        Some(order) => order.clone(),
        None => rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&header)?;
    for row in rows {
        writer.write_record(
            header
                .iter()
                .map(|column| row.get(column).map(String::as_str).unwrap_or("")),
        )?;
    }
    writer.flush()?;
    Ok(())
}
