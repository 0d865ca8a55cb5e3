//! continuous-fuzz CLI entry point.
//!
//! Provides `run` for continuous fuzzing cycles and `once` for a single
//! clone, fuzz, and persist pass.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use continuous_fuzz::config::FuzzConfig;
use continuous_fuzz::logging;
use continuous_fuzz::scheduler::run_cycles;
use continuous_fuzz::worker::{CorpusCycle, CycleHandler};

/// Continuous fuzzing for Go projects.
///
/// Configuration comes from environment variables (optionally via `.env`)
/// and `fuzz.toml`: PROJECT_SRC_PATH, GIT_STORAGE_REPO and FUZZ_PKG are
/// required; FUZZ_TIME, FUZZ_NUM_PROCESSES, FUZZ_RESULTS_PATH,
/// FUZZ_CYCLE_SECS, FUZZ_WORKSPACE_DIR and FUZZ_GO_BIN are optional.
#[derive(Parser)]
#[command(name = "continuous-fuzz", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run fuzzing cycles until interrupted.
    Run,
    /// Run a single fuzzing pass and exit.
    Once,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match FuzzConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            logging::init_cli();
            error!(error = %format!("{e:#}"), "failed to load configuration");
            std::process::exit(1);
        }
    };

    let root = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(root.clone()));

    match cli.command {
        Command::Run => {
            let _logging_guard = logging::init_production(&config.paths().logs_dir)?;
            info!(config = ?config, "continuous fuzzing started");

            let handler: Arc<dyn CycleHandler> = Arc::new(CorpusCycle::new(Arc::clone(&config)));
            let cycle_duration = Duration::from_secs(config.cycle_duration_secs);
            let cycles = run_cycles(root, cycle_duration, handler).await;
            info!(cycles, "continuous fuzzing stopped");
            Ok(())
        }
        Command::Once => {
            logging::init_cli();
            let handler = CorpusCycle::new(Arc::clone(&config));

            let result = handler.run_cycle(&root.child_token()).await;
            handler.cleanup().await;
            result.context("fuzzing process failed")
        }
    }
}

/// Cancel `root` on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_on_signal(root: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("received shutdown signal, initiating graceful shutdown");
    root.cancel();
}
