//! Cycle workers: the work done inside one scheduler cycle.
//!
//! The scheduler only sees the [`CycleHandler`] trait. [`CorpusCycle`] is
//! the production handler: clone, fuzz, then persist the corpus and wipe
//! the workspace.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{FuzzConfig, WorkspacePaths};
use crate::fuzz::FuzzRunner;
use crate::{git, workspace};

/// Work performed for each scheduler cycle.
#[async_trait]
pub trait CycleHandler: Send + Sync + 'static {
    /// Run one cycle's worth of work until done or `cancel` fires.
    ///
    /// Cancellation is an ordinary way to finish and should return `Ok`.
    async fn run_cycle(&self, cancel: &CancellationToken) -> anyhow::Result<()>;

    /// Persist results and reset state. Only called after `run_cycle` has
    /// returned.
    async fn cleanup(&self);
}

/// Raises a one-shot completion signal when dropped.
///
/// Held for the whole worker task so the signal fires on return, error,
/// cancellation, and panic alike.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: Option<oneshot::Sender<()>>,
}

impl CompletionSignal {
    /// Wrap the sending half of a completion channel.
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self { tx: Some(tx) }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            // The receiver may already be gone during shutdown.
            let _ = tx.send(());
        }
    }
}

/// Start `handler` on a background task bound to `cancel`.
///
/// The returned receiver resolves exactly once, after the worker has fully
/// stopped. Worker errors are logged here and never reach the caller.
pub fn spawn_worker(
    handler: Arc<dyn CycleHandler>,
    cancel: CancellationToken,
) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let _done = CompletionSignal::new(tx);
        info!(
            start_time = %chrono::Utc::now().to_rfc2822(),
            "starting fuzzing worker"
        );

        if cancel.is_cancelled() {
            info!("fuzzing worker cycle canceled");
            return;
        }

        if let Err(e) = handler.run_cycle(&cancel).await {
            error!(error = %format!("{e:#}"), "fuzzing process failed");
        }
    });

    rx
}

/// Production cycle: clone repositories, fuzz every package, push corpus.
#[derive(Debug)]
pub struct CorpusCycle {
    config: Arc<FuzzConfig>,
    paths: WorkspacePaths,
    runner: FuzzRunner,
}

impl CorpusCycle {
    /// Build the cycle handler from loaded configuration.
    pub fn new(config: Arc<FuzzConfig>) -> Self {
        let paths = config.paths();
        let runner = FuzzRunner::from_config(&config, &paths);
        Self {
            config,
            paths,
            runner,
        }
    }
}

#[async_trait]
impl CycleHandler for CorpusCycle {
    async fn run_cycle(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        git::clone_repositories(&self.config, &self.paths, cancel).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        self.runner
            .run_fuzzing(&self.config.fuzz_pkgs, cancel)
            .await
    }

    async fn cleanup(&self) {
        if self.paths.corpus_dir.join(".git").exists() {
            if let Err(e) = git::commit_and_push(&self.config.git, &self.paths.corpus_dir).await {
                error!(error = %format!("{e:#}"), "failed to commit/push results");
            }
        } else {
            info!("no corpus checkout to persist");
        }
        workspace::cleanup_workspace(&self.paths.root).await;
    }
}
