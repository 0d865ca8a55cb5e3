//! Fuzz target discovery and execution.
//!
//! A [`FuzzRunner`] walks the configured packages, lists each package's
//! fuzz targets, and runs them one at a time. Targets never run in
//! parallel; the only concurrency inside a run is the pair of output
//! readers attached to the running process.

pub mod discover;
pub mod executor;
pub mod stream;

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::Context;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{FuzzConfig, WorkspacePaths};

/// One discovered fuzz entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuzzTarget {
    /// Package path relative to the project root.
    pub package: String,
    /// Target function name, e.g. `FuzzParse`.
    pub name: String,
}

/// Errors from discovering or running fuzz targets.
#[derive(Debug, Error)]
pub enum FuzzError {
    /// The Go toolchain could not be started.
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        /// Command line that failed.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A piped output stream was not available on the child.
    #[error("{0} pipe not captured")]
    MissingPipe(&'static str),
    /// `go test -list` exited with a failure status.
    #[error("go test failed for {package:?}: {status} (output: {stderr:?})")]
    ListFailed {
        /// Package being listed.
        package: String,
        /// Exit status of the listing command.
        status: ExitStatus,
        /// Trimmed stderr of the listing command.
        stderr: String,
    },
    /// The fuzz run failed and was not canceled.
    #[error("fuzz execution failed for {target}: {status}")]
    Exit {
        /// Target that failed.
        target: String,
        /// Exit status reported by the process.
        status: ExitStatus,
    },
    /// The surrounding scope was canceled before the operation finished.
    #[error("operation canceled")]
    Canceled,
    /// Filesystem or process I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs Go fuzz targets for one project checkout.
#[derive(Debug, Clone)]
pub struct FuzzRunner {
    go_binary: PathBuf,
    project_dir: PathBuf,
    corpus_dir: PathBuf,
    results_dir: PathBuf,
    fuzz_time_secs: u64,
    num_processes: usize,
}

impl FuzzRunner {
    /// Create a runner.
    ///
    /// `project_dir` holds the cloned project, `corpus_dir` the corpus
    /// checkout laid out as `<package>/testdata/fuzz/<target>/<id>`, and
    /// `results_dir` receives `<target>_failure.log` files.
    pub fn new(
        go_binary: impl Into<PathBuf>,
        project_dir: PathBuf,
        corpus_dir: PathBuf,
        results_dir: PathBuf,
        fuzz_time_secs: u64,
        num_processes: usize,
    ) -> Self {
        Self {
            go_binary: go_binary.into(),
            project_dir,
            corpus_dir,
            results_dir,
            fuzz_time_secs,
            num_processes,
        }
    }

    /// Build a runner from loaded configuration.
    pub fn from_config(config: &FuzzConfig, paths: &WorkspacePaths) -> Self {
        Self::new(
            config.go_binary.clone(),
            paths.project_dir.clone(),
            paths.corpus_dir.clone(),
            paths.results_dir.clone(),
            config.fuzz_time_secs,
            config.num_processes,
        )
    }

    /// Directory of `package` inside the project checkout.
    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.project_dir.join(package)
    }

    /// Absolute corpus directory for `package`.
    ///
    /// The Go toolchain runs inside the package directory, so relative
    /// paths are resolved against the current working directory first.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined.
    pub fn corpus_root(&self, package: &str) -> Result<PathBuf, FuzzError> {
        let relative = self.corpus_dir.join(package).join("testdata").join("fuzz");
        Ok(absolute(&relative)?)
    }

    /// Discover and run every target of every package in order.
    ///
    /// Stops quietly once `cancel` fires. The first discovery or execution
    /// failure aborts the remaining work.
    ///
    /// # Errors
    ///
    /// Returns the first non-cancellation failure, annotated with the
    /// package (and target) it came from.
    pub async fn run_fuzzing(
        &self,
        packages: &[String],
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        for package in packages {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let names = match self.list_targets(package, cancel).await {
                Ok(names) => names,
                Err(FuzzError::Canceled) => return Ok(()),
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to list targets for package {package:?}"))
                }
            };

            for name in names {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let target = FuzzTarget {
                    package: package.clone(),
                    name,
                };
                self.execute_target(&target, cancel).await.with_context(|| {
                    format!("fuzzing failed for {:?}/{:?}", target.package, target.name)
                })?;
            }
        }

        info!(packages = packages.len(), "fuzzing pass complete");
        Ok(())
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}
