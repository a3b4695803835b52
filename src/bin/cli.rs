//! logvault CLI
//!
//! Offline admin tool that opens a data directory directly.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use logvault::{Config, Engine, EventKind};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

/// logvault CLI
#[derive(Parser, Debug)]
#[command(name = "logvault-cli")]
#[command(about = "Admin CLI for a logvault data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./logvault_data")]
    data_dir: PathBuf,

    /// Segment size in KB before rotation
    #[arg(long, default_value = "1024")]
    segment_kb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// List write events between two nanosecond timestamps (inclusive)
    History {
        start: u64,
        end: u64,
    },

    /// Run one compaction cycle
    Compact,

    /// Print engine and segment statistics
    Stats,
}

#[derive(Serialize)]
struct HistoryLine {
    timestamp: u64,
    key: String,
    kind: EventKind,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,logvault=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .segment_max_bytes(args.segment_kb * 1024)
        .background_compaction(false)
        .build();

    let engine = Engine::open(config)?;

    match args.command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => {
                engine.close()?;
                return Err(format!("key not found: {}", key).into());
            }
        },
        Commands::Put { key, value } => {
            let timestamp = engine.put(key.as_bytes(), value.as_bytes())?;
            println!("{}", timestamp);
        }
        Commands::Delete { key } => {
            let timestamp = engine.delete(key.as_bytes())?;
            println!("{}", timestamp);
        }
        Commands::History { start, end } => {
            let events: Vec<HistoryLine> = engine
                .history(start, end)?
                .into_iter()
                .map(|event| HistoryLine {
                    timestamp: event.timestamp,
                    key: String::from_utf8_lossy(&event.key).into_owned(),
                    kind: event.kind,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        Commands::Compact => {
            let stats = engine.compact()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Stats => {
            let report = serde_json::json!({
                "engine": engine.stats(),
                "segments": engine.segments(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    engine.close()?;
    Ok(())
}
