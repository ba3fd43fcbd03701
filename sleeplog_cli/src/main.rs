use clap::{Parser, Subcommand};
use serde::Serialize;
use sleeplog_core::*;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sleeplog")]
#[command(about = "Personal sleep log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the record WAL file
    #[arg(long, global = true)]
    wal: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every record
    List,

    /// Show one record
    Get { id: String },

    /// Log a night of sleep
    Add {
        /// Calendar date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Hours slept
        #[arg(long)]
        hours: f64,

        /// good, average or poor
        #[arg(long)]
        quality: String,
    },

    /// Replace date, hours and quality of a record
    Update {
        id: String,

        #[arg(long)]
        date: String,

        #[arg(long)]
        hours: f64,

        #[arg(long)]
        quality: String,
    },

    /// Delete a record
    Delete { id: String },

    /// Change only the quality of a record
    SetQuality { id: String, quality: String },

    /// Change only the hours slept of a record
    SetHours { id: String, hours: f64 },

    /// Records for one date
    Search { date: String },

    /// Records with a given quality
    Filter { quality: String },

    /// Records dated within START..=END
    Range { start: String, end: String },

    /// Total hours slept within START..=END
    Total { start: String, end: String },

    /// One page of records
    Page {
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Records per page (defaults to display.page_size)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Delete records dated before CUTOFF
    Prune { cutoff: String },

    /// Average hours slept
    Average,

    /// Most frequent quality
    Dominant,

    /// Rewrite the WAL without stale entries
    Compact,

    /// Write all records to a CSV file
    Export {
        #[arg(long)]
        output: PathBuf,
    },
}

impl Commands {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Commands::Add { .. }
                | Commands::Update { .. }
                | Commands::Delete { .. }
                | Commands::SetQuality { .. }
                | Commands::SetHours { .. }
                | Commands::Prune { .. }
        )
    }

    /// Commands that must hold the WAL writer lock from open to exit
    fn writes(&self) -> bool {
        self.mutates() || matches!(self, Commands::Compact)
    }
}

fn main() -> ExitCode {
    // Keep stdout for results; diagnostics only when asked via RUST_LOG
    sleeplog_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let wal_path = cli.wal.unwrap_or_else(|| Config::wal_path(&data_dir));

    let mutates = cli.command.mutates();
    let store = if cli.command.writes() {
        WalStore::open_exclusive(&wal_path)?
    } else {
        WalStore::open(&wal_path)?
    };
    let mut log = SleepLog::new(store);

    match cli.command {
        Commands::List => emit(&log.get_all())?,
        Commands::Get { id } => emit(&log.get_one(&id)?)?,
        Commands::Add {
            date,
            hours,
            quality,
        } => emit(&log.add(SleepPayload::new(date, hours, quality))?)?,
        Commands::Update {
            id,
            date,
            hours,
            quality,
        } => emit(&log.update(&id, SleepPayload::new(date, hours, quality))?)?,
        Commands::Delete { id } => emit(&log.delete(&id)?)?,
        Commands::SetQuality { id, quality } => emit(&log.update_quality(&id, &quality)?)?,
        Commands::SetHours { id, hours } => emit(&log.update_hours_slept(&id, hours)?)?,
        Commands::Search { date } => emit(&log.search_by_date(&date))?,
        Commands::Filter { quality } => emit(&log.filter_by_quality(&quality)?)?,
        Commands::Range { start, end } => emit(&log.get_by_date_range(&start, &end))?,
        Commands::Total { start, end } => {
            emit(&log.get_total_hours_by_date_range(&start, &end))?
        }
        Commands::Page { page, page_size } => {
            let page_size = page_size.unwrap_or(config.display.page_size);
            emit(&log.paginate(page, page_size))?
        }
        Commands::Prune { cutoff } => emit(&log.delete_older_than(&cutoff)?)?,
        Commands::Average => emit(&log.get_average_duration()?)?,
        Commands::Dominant => emit(&log.get_dominant_quality()?)?,
        Commands::Compact => {
            let kept = log.store_mut().compact()?;
            println!("✓ Compacted WAL to {} records", kept);
            println!("  WAL: {}", log.store().path().display());
        }
        Commands::Export { output } => {
            let count = export_csv(&log.get_all(), &output)?;
            println!("✓ Exported {} records to CSV", count);
            println!("  CSV: {}", output.display());
        }
    }

    if mutates && config.storage.auto_compact {
        let threshold = config.storage.compact_threshold;
        if log.store_mut().compact_if_needed(threshold)? {
            tracing::info!("Auto-compacted WAL at {:?}", log.store().path());
        }
    }

    Ok(())
}

/// Print a command result as pretty JSON on stdout
fn emit<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}
