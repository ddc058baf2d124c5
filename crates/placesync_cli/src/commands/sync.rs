//! Sync command implementation.

use crate::config::DatasetConfig;
use crate::progress::ProgressSink;
use placesync_engine::{
    CompletionSink, DispatchSummary, HttpClient, Operation, ReqwestClient, SaveFilter, SyncEngine,
};
use placesync_sources::{loader_for_path, merge_sources, LoadOptions, SourceIndex};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Options for a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Create records the remote system has not seen.
    pub create: bool,
    /// Update records it has.
    pub update: bool,
    /// Suppress remote notifications.
    pub silent: bool,
    /// Load and reconcile, but do not write.
    pub dry_run: bool,
    /// Loader options shared by every source.
    pub load: LoadOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            create: true,
            update: true,
            silent: true,
            dry_run: false,
            load: LoadOptions::new(),
        }
    }
}

/// Runs the sync command.
pub fn run(
    config: &DatasetConfig,
    sources: &[PathBuf],
    options: &SyncOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Syncing {} source(s) into {}", sources.len(), config.places_url());
    let sync_config = config.sync_config().with_silent(options.silent);
    let client = ReqwestClient::new(sync_config.timeout)?;
    let engine = SyncEngine::new(sync_config, client)?;
    let sink = ProgressSink::stderr("Saved");

    let summary = execute(&engine, sources, options, &sink)?;
    sink.finish();

    match summary {
        Some(summary) => {
            println!(
                "Saved {} of {} places ({} failed, {} abandoned)",
                summary.succeeded, summary.dispatched, summary.failed, summary.abandoned
            );
            if summary.failed + summary.abandoned > 0 {
                return Err("Some places were not saved".into());
            }
        }
        None => println!("Dry run; nothing saved"),
    }
    Ok(())
}

/// Fetches, loads every source, reconciles and saves.
///
/// Returns `None` for a dry run.
pub fn execute<C, S>(
    engine: &SyncEngine<C>,
    sources: &[PathBuf],
    options: &SyncOptions,
    sink: &S,
) -> Result<Option<DispatchSummary>, Box<dyn std::error::Error>>
where
    C: HttpClient,
    S: CompletionSink,
{
    let fetched = engine.fetch_all(|loaded, total| {
        eprint!("\r...loaded page {} of {}  ", loaded, total);
        let _ = std::io::stderr().flush();
    })?;
    eprintln!();

    let index = SourceIndex::build(fetched.records.values(), &options.load.source_id_field);

    let mut batches = Vec::with_capacity(sources.len());
    for path in sources {
        eprintln!("Loading places from {}...", path.display());
        let loader = loader_for_path(path)?;
        batches.push(loader.load(path, &options.load, &index)?);
    }
    let records = merge_sources(batches);

    let filter = SaveFilter {
        create: options.create,
        update: options.update,
    };
    let (updates, creates) = records
        .iter()
        .filter_map(|r| filter.operation_for(r))
        .fold((0, 0), |(u, c), op| match op {
            Operation::Update => (u + 1, c),
            _ => (u, c + 1),
        });
    eprintln!("{} place(s) to update, {} to create", updates, creates);

    if options.dry_run {
        return Ok(None);
    }
    Ok(Some(engine.save(records, filter, sink)?))
}
