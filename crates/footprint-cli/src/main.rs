//! footprint - Building footprint acquisition and country partitioning
//!
//! Mirrors provider building-footprint shards into an object store as
//! GeoParquet, then cuts the corpus into per-country File Geodatabase
//! archives that fit a size ceiling.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use footprint_core::{ProgressContext, RunConfig, is_shutdown_requested};
use log::LevelFilter;

mod cmd;
mod config;

use config::Overrides;

/// Exit status after SIGINT/SIGTERM
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "footprint")]
#[command(about = "Building footprint acquisition and country partitioning")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./footprint.toml or ~/.config/footprint/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Maximum shards processed at once
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Largest deliverable archive, in bytes
    #[arg(long, global = true)]
    max_size: Option<u64>,

    /// Restrict to these ISO3 codes (repeatable, comma-separated)
    #[arg(long = "country", global = true, value_delimiter = ',')]
    countries: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Download provider shards and upload them as GeoParquet
    Acquire(cmd::acquire::AcquireArgs),
    /// Cut the stored corpus into per-country archives
    Partition(cmd::partition::PartitionArgs),
    /// Acquire then partition every enabled provider
    Run(cmd::run::RunArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug; progress bars show activity
    //   non-TTY: info unless --debug; logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let level = if cli.debug {
        LevelFilter::Debug
    } else if is_tty {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    footprint_core::init_logging(level, multi);

    if let Err(e) = footprint_core::install_signal_handlers() {
        log::warn!("Failed to install signal handlers: {e}");
    }

    let result = run(cli, &progress);
    if is_shutdown_requested() {
        log::warn!("Interrupted; in-flight work was allowed to finish");
        return ExitCode::from(EXIT_INTERRUPTED);
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, progress: &footprint_core::SharedProgress) -> Result<()> {
    let overrides = Overrides {
        concurrency: cli.concurrency,
        max_size: cli.max_size,
        countries: cli.countries,
    };
    let config = config::load(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Command::Acquire(args) => cmd::acquire::run(args, &config, progress),
        Command::Partition(args) => cmd::partition::run(args, &config, progress),
        Command::Run(args) => cmd::run::run(args, &config, progress),
        Command::Config => {
            print_config(&config);
            Ok(())
        }
    }
}

fn print_config(config: &RunConfig) {
    let or_default = |v: Option<String>| v.unwrap_or_else(|| "default".to_string());
    let list = |codes: &[String]| {
        if codes.is_empty() {
            "-".to_string()
        } else {
            codes.join(", ")
        }
    };
    let encodings: Vec<_> = config.encodings().iter().map(|e| e.name()).collect();
    let providers: Vec<_> = config
        .providers
        .enabled()
        .iter()
        .map(|p| p.name())
        .collect();

    cmd::report::print_summary(
        "Setting",
        &[
            ("Work directory", config.work_dir.display().to_string()),
            ("Concurrency", config.concurrency.to_string()),
            ("Max size", format!("{} bytes", config.max_size)),
            ("Encodings", encodings.join(", ")),
            (
                "Retry",
                format!(
                    "{} attempts, {}s apart",
                    config.retry.attempts, config.retry.wait_secs
                ),
            ),
            (
                "Read timeout",
                format!("{}s", config.http.read_timeout_secs),
            ),
            ("Providers", providers.join(", ")),
            ("Include", list(&config.countries.include)),
            ("Exclude", list(&config.countries.exclude)),
            ("Store", config.store.url.clone()),
            ("Query root", config.store.query_root()),
            (
                "Engine memory",
                or_default(config.engine.memory_limit.clone()),
            ),
            (
                "Engine threads",
                or_default(config.engine.threads.map(|t| t.to_string())),
            ),
            ("Admin-0", config.reference.admin0.clone()),
            ("Admin-1", config.reference.admin1.clone()),
            ("GDAL", config.tools.gdal.display().to_string()),
            ("zip", config.tools.zip.display().to_string()),
        ],
    );
}
