//! reel-send - Repost daemon
//!
//! Runs repost cycles once or on a fixed interval, printing one outcome line
//! per cycle to stdout.

use clap::{Parser, ValueEnum};
use libreelcast::config::{resolve_config_path, RunMode};
use libreelcast::error::ConfigError;
use libreelcast::logging::{LogFormat, LoggingConfig};
use libreelcast::{Config, CycleOutcome, ReelcastError, RepostPipeline, Result, Scheduler, Shutdown};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "reel-send")]
#[command(version)]
#[command(about = "Repost short-form videos without reposting twice")]
#[command(long_about = "\
reel-send - Repost daemon

DESCRIPTION:
    Each cycle picks a configured creator at random, lists their reels,
    takes the newest one not yet in the repost ledger, downloads it, brands
    it with ffmpeg, captions it, and publishes it. The reel is recorded in
    the ledger only after the publisher confirmed the post.

USAGE:
    # Write a starter configuration
    reel-send --init

    # Run a single cycle
    reel-send --once

    # Run every 45 minutes, JSON outcomes on stdout
    reel-send --interval 45m --format json

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (the current stage finishes first)

CONFIGURATION:
    Configuration file: ~/.config/reelcast/config.toml (or $REELCAST_CONFIG)
    Ledger location:    ~/.local/share/reelcast/progress.json

EXIT CODES (run-once):
    0   - Published, or no new content
    1   - A cycle stage failed
    2   - Configuration error
    3   - Authentication challenge (log in again)
    4   - Ledger could not be read or written
    130 - Interrupted
")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "REELCAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit with its outcome
    #[arg(long)]
    once: bool,

    /// Delay between cycles (overrides config), e.g. "30m"
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Stop after this many cycles
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,

    /// Outcome output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Log output format on stderr (text, json, pretty)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    init: bool,

    /// Seed for creator selection (reproducible runs)
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, "info", cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => resolve_config_path()?,
    };

    if cli.init {
        write_default_config(&config_path)?;
        println!("{}", config_path.display());
        return Ok(0);
    }

    let config = Config::load_from_path(&config_path)?;

    let mode = if cli.once {
        RunMode::Once
    } else {
        config.scheduling.mode
    };
    let interval = match cli.interval {
        Some(interval) => interval,
        None => config.scheduling.interval()?,
    };

    let shutdown = Shutdown::new();
    setup_signal_handlers(shutdown.clone())?;

    let mut pipeline = RepostPipeline::from_config(&config)?.with_shutdown(shutdown);
    if let Some(seed) = cli.seed {
        pipeline = pipeline.with_seed(seed);
    }

    let scheduler = Scheduler::new(mode, interval).with_max_cycles(cli.cycles);
    info!(
        mode = ?scheduler.mode(),
        interval = %humantime::format_duration(scheduler.interval()),
        creators = config.creators().len(),
        "reel-send starting"
    );

    let format = cli.format;
    let summary = scheduler
        .run(&mut pipeline, |outcome| print_outcome(outcome, format))
        .await;

    info!(
        cycles = summary.cycles,
        published = summary.published,
        no_new_content = summary.no_new_content,
        failed = summary.failed,
        "reel-send stopped"
    );

    Ok(match mode {
        RunMode::Once => summary.exit_code(),
        RunMode::Loop => match summary.last_outcome {
            Some(CycleOutcome::Interrupted { .. }) => 130,
            _ => 0,
        },
    })
}

fn print_outcome(outcome: &CycleOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", outcome),
        OutputFormat::Json => match serde_json::to_string(outcome) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Error: could not encode outcome: {}", e),
        },
    }
}

fn write_default_config(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        return Err(ReelcastError::InvalidInput(format!(
            "{} already exists; remove it first to regenerate",
            path.display()
        )));
    }

    let content = Config::default_config().to_toml_string()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(ConfigError::ReadError)?;
    }
    std::fs::write(path, content).map_err(ConfigError::ReadError)?;
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Shutdown) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| ReelcastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, finishing the current stage...");
            shutdown.trigger();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Shutdown) -> Result<()> {
    Ok(())
}
