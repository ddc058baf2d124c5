//! placesync CLI
//!
//! Command-line tools for keeping a Shareabouts-style places dataset in step
//! with local GeoJSON and CSV files.
//!
//! # Commands
//!
//! - `sync` - Create and update places from one or more source files
//! - `clear` - Delete places matching attribute filters
//! - `dump` - Export places as a CSV report

mod commands;
mod config;
mod progress;

use clap::{Parser, Subcommand};
use commands::sync::SyncOptions;
use config::{DatasetConfig, ReportConfig};
use placesync_model::DEFAULT_SOURCE_ID_FIELD;
use placesync_sources::{LoadOptions, RecordFilter};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Sync local place files with a remote places dataset.
#[derive(Parser)]
#[command(name = "placesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and update places from GeoJSON or CSV files
    Sync {
        /// Dataset configuration file (JSON)
        config: PathBuf,

        /// Source files, loaded in order; later files win on shared ids
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Do not create places the dataset has not seen
        #[arg(long)]
        no_create: bool,

        /// Do not update places the dataset already has
        #[arg(long)]
        no_update: bool,

        /// Let the dataset send notifications for each write
        #[arg(long)]
        notify: bool,

        /// Load and reconcile, but do not write
        #[arg(long)]
        dry_run: bool,

        /// Property holding each place's source identifier
        #[arg(long, default_value = DEFAULT_SOURCE_ID_FIELD)]
        source_id_field: String,

        /// Only keep these source properties (comma separated)
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,

        /// Rename a source property (old=new)
        #[arg(long)]
        rename: Vec<String>,
    },

    /// Delete places matching every given filter
    Clear {
        /// Dataset configuration file (JSON)
        config: PathBuf,

        /// Only count matching places
        #[arg(long, alias = "test")]
        no_delete: bool,

        /// Property must be present
        #[arg(long)]
        has_attr: Vec<String>,

        /// Property must be absent
        #[arg(long)]
        wo_attr: Vec<String>,

        /// Property must equal a value (name=value)
        #[arg(long)]
        attr_is: Vec<String>,

        /// Property must not equal a value (name=value)
        #[arg(long)]
        attr_not: Vec<String>,
    },

    /// Export places as CSV on standard output
    Dump {
        /// Dataset configuration file (JSON)
        config: PathBuf,

        /// Report configuration file (JSON)
        report: Option<PathBuf>,

        /// Keep places created at or after this time (overrides the report)
        #[arg(long)]
        begin: Option<String>,

        /// Keep places created before this time (overrides the report)
        #[arg(long)]
        end: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync {
            config,
            sources,
            no_create,
            no_update,
            notify,
            dry_run,
            source_id_field,
            include,
            rename,
        } => {
            let dataset = DatasetConfig::load(&config)?;
            let mut load = LoadOptions::new()
                .with_source_id_field(source_id_field)
                .with_include_fields(include);
            for (from, to) in RecordFilter::parse_pairs(&rename)? {
                load = load.with_rename(from, to);
            }
            let options = SyncOptions {
                create: !no_create,
                update: !no_update,
                silent: !notify,
                dry_run,
                load,
            };
            commands::sync::run(&dataset, &sources, &options)?;
        }
        Commands::Clear {
            config,
            no_delete,
            has_attr,
            wo_attr,
            attr_is,
            attr_not,
        } => {
            let dataset = DatasetConfig::load(&config)?;
            let filter = RecordFilter {
                present: has_attr,
                absent: wo_attr,
                equal: RecordFilter::parse_pairs(&attr_is)?,
                not_equal: RecordFilter::parse_pairs(&attr_not)?,
            };
            commands::clear::run(&dataset, &filter, !no_delete)?;
        }
        Commands::Dump {
            config,
            report,
            begin,
            end,
        } => {
            let dataset = DatasetConfig::load(&config)?;
            let mut report = match report {
                Some(path) => ReportConfig::load(&path)?,
                None => ReportConfig::default(),
            };
            if begin.is_some() {
                report.begin_date = begin;
            }
            if end.is_some() {
                report.end_date = end;
            }
            commands::dump::run(&dataset, &report)?;
        }
        Commands::Version => {
            println!("placesync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
