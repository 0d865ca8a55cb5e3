//! Logging setup for the `run` and `once` subcommands.
//!
//! Fuzzer output is logged line by line under [`FUZZER_OUTPUT_TARGET`],
//! inside a `fuzz` span carrying `package` and `fuzz_target`. In production
//! those lines go to the rotated JSON file only; the console keeps the
//! orchestration events (cycles, clones, failures, cleanup). One-shot runs
//! print everything to stderr.
//!
//! Verbosity follows `RUST_LOG` (default `info`); `fuzzer_output=off`
//! silences the per-line output entirely.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// File name prefix for rotated log files.
pub const LOG_FILE_PREFIX: &str = "continuous-fuzz.log";

/// Tracing target for lines read from a fuzz process.
pub const FUZZER_OUTPUT_TARGET: &str = "fuzzer_output";

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Keeps the file writer flushing until dropped.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Whether events from `target` belong on the production console.
pub fn is_console_target(target: &str) -> bool {
    target != FUZZER_OUTPUT_TARGET
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Logging for continuous runs.
///
/// Writes JSON to `{logs_dir}/continuous-fuzz.log.YYYY-MM-DD`, one line per
/// event with the enclosing fuzz span attached, and a human-readable stderr
/// stream without raw fuzzer output.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter_fn(|meta| is_console_target(meta.target())));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(LoggingGuard { _guard: guard })
}

/// Stderr-only logging for `once`, fuzzer output included.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}
