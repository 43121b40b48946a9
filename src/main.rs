//! # Directolor Bridge
//!
//! Drive Directolor motorized blinds from the command line.
//!
//! Reads operator commands from standard input and hands them to the
//! scheduler, whose worker owns the radio.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use directolor::config::Config;
use directolor::console::{OperatorCommand, HELP};
use directolor::radio::dry_run::DryRunRadio;
use directolor::scheduler::Scheduler;

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Parser)]
#[command(name = "directolor", version, about = "Drive Directolor blinds over the air")]
struct Cli {
    /// Configuration file [default: config/default.toml when present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overriding the configured level
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Load the configuration named on the command line
///
/// Without an explicit path the default file is optional and built-in
/// defaults are used when it is missing.
fn load_config(path: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !fallback.exists() {
                return Ok((Config::default(), None));
            }
            fallback
        }
    };
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok((config, Some(path)))
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over `level`. The returned guard flushes the log file
/// and must be held until exit.
fn init_logging(level: &str, file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", file))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Main entry point for the Directolor bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration and set up logging
///    - Build the scheduler and spawn its worker on the dry-run radio
///
/// 2. **Main Loop**
///    - Parse each line of standard input as an operator command
///    - Print the outcome
///    - Handle Ctrl+C, `quit` or end of input followed by Ctrl+C
///
/// 3. **Graceful Shutdown**
///    - Signal the worker, which powers the radio down
///    - Wait for it to finish
///
/// # Examples
///
/// ```bash
/// cargo run --release -- --config config/default.toml
/// ```
///
/// ```text
/// INFO directolor: Directolor v0.1.0 starting...
/// INFO directolor::scheduler::worker: Scheduler worker running (7 remotes, 3 attempts x 513 repeats)
/// open 1 1,3
/// queued open for remote 1 mask 0b000101
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config.as_deref())?;

    let level = cli.log_level.as_deref().unwrap_or(config.logging.level.as_str());
    let _log_guard = init_logging(level, config.logging.file.as_deref())?;

    info!("Directolor v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => warn!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH),
    }

    let (scheduler, worker) = Scheduler::from_config(DryRunRadio::new(), &config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    for (index, remote) in config.remotes.iter().enumerate() {
        info!("Remote {} '{}' = {}", index + 1, remote.name, remote.identity);
    }
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let line = match line.context("Failed to read standard input")? {
                    Some(line) => line,
                    None => {
                        info!("Input closed, press Ctrl+C to exit");
                        stdin_open = false;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let command = match line.parse::<OperatorCommand>() {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };

                // Submissions wait for queue space, so keep Ctrl+C live
                tokio::select! {
                    reply = command.execute(&scheduler) => match reply {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => println!("error: {}", e),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                        break;
                    }
                }

                if command == OperatorCommand::Quit {
                    info!("Quit requested, shutting down...");
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let pending = scheduler.pending().len();
    if pending > 0 {
        warn!("Dropping {} pending commands", pending);
    }

    // The worker may already be gone if it panicked
    let _ = shutdown_tx.send(true);
    worker_handle.await.context("Scheduler worker failed")?;

    Ok(())
}
