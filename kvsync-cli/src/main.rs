use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kvsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use kvsync_core::metrics::init_metrics;
use kvsync_core::storage::FileStore;
use kvsync_core::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "kvsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the stored collections
    #[arg(short, long, default_value = ".kvsync")]
    dir: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show version, size and sync state of a stored collection
    Inspect {
        /// Storage key
        key: String,
    },
    /// Push pending items of a collection once
    Sync {
        /// Storage key
        key: String,
    },
    /// Make failed or exhausted items eligible for sync again
    ResetFailed {
        /// Storage key
        key: String,
    },
    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default configuration to a file
    Init {
        #[arg(default_value = "kvsync.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Print,
}

fn log_config(args: &Args, config: &Config) -> Result<LogConfig> {
    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = &args.log_level {
        log_config.level = level.parse::<LogLevel>().unwrap_or_else(|e| {
            eprintln!("{}, using 'info'", e);
            LogLevel::Info
        });
    }
    if args.json_logs {
        log_config = log_config.json_format(true);
    }
    Ok(log_config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    init_logging_with_config(log_config(&args, &config)?)?;
    init_metrics();

    info!("kvsync CLI started");

    match args.command {
        Some(Command::Inspect { key }) => {
            let store = FileStore::open(&args.dir).await?;
            let summary = commands::inspect(&store, &key, &config).await?;
            if !summary.present {
                warn!(key = %key, "Key not found");
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Some(Command::Sync { key }) => {
            let store = Arc::new(FileStore::open(&args.dir).await?);
            let result = commands::sync_once(store, &key, &config).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Some(Command::ResetFailed { key }) => {
            let store = FileStore::open(&args.dir).await?;
            let reset = commands::reset_failed(&store, &key).await?;
            println!("{} item(s) reset", reset);
        }
        Some(Command::Config(ConfigCommand::Init { path, force })) => {
            commands::config_init(&path, force)?;
        }
        Some(Command::Config(ConfigCommand::Print)) => {
            println!("{}", commands::config_render(&config)?);
        }
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    info!("kvsync CLI finished");

    Ok(())
}
