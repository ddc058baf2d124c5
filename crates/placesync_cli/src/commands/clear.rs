//! Clear command implementation.

use crate::config::DatasetConfig;
use crate::progress::ProgressSink;
use placesync_engine::{CompletionSink, DispatchSummary, HttpClient, ReqwestClient, SyncEngine};
use placesync_model::Record;
use placesync_sources::RecordFilter;
use tracing::info;

/// Result of a clear run.
#[derive(Debug, Default)]
pub struct ClearResult {
    /// Records that matched the filter.
    pub matched: usize,
    /// Delete tally, absent when deletion was disabled.
    pub deleted: Option<DispatchSummary>,
}

/// Runs the clear command.
pub fn run(
    config: &DatasetConfig,
    filter: &RecordFilter,
    delete: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Clearing places from {}", config.places_url());
    let sync_config = config.sync_config();
    let client = ReqwestClient::new(sync_config.timeout)?;
    let engine = SyncEngine::new(sync_config, client)?;
    let sink = ProgressSink::stderr("Deleted");

    let result = execute(&engine, filter, delete, &sink)?;
    sink.finish();

    if result.deleted.is_none() {
        println!("Done! {} places would be deleted", result.matched);
        return Ok(());
    }
    println!(
        "Done! Deleted {} of {} places",
        sink.succeeded(),
        result.matched
    );
    if sink.failed() > 0 {
        return Err(format!("{} places were not deleted", sink.failed()).into());
    }
    Ok(())
}

/// Fetches the dataset and deletes every record matching `filter`.
pub fn execute<C, S>(
    engine: &SyncEngine<C>,
    filter: &RecordFilter,
    delete: bool,
    sink: &S,
) -> Result<ClearResult, Box<dyn std::error::Error>>
where
    C: HttpClient,
    S: CompletionSink,
{
    let doomed: Vec<Record> = engine
        .fetch_all(|_, _| {})?
        .into_records()
        .into_iter()
        .filter(|record| filter.matches(record))
        .collect();

    eprintln!("Deleting the {} places...", doomed.len());
    let matched = doomed.len();

    let deleted = if delete {
        Some(engine.delete(doomed, sink)?)
    } else {
        None
    };
    Ok(ClearResult { matched, deleted })
}
