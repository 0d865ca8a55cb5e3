//! Tests for cycle workers and the production corpus cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use continuous_fuzz::config::FuzzConfig;
use continuous_fuzz::worker::{spawn_worker, CompletionSignal, CorpusCycle, CycleHandler};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Counting {
    runs: AtomicUsize,
}

#[async_trait]
impl CycleHandler for Counting {
    async fn run_cycle(&self, _cancel: &CancellationToken) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&self) {}
}

#[tokio::test]
async fn canceled_worker_skips_cycle_and_signals() {
    let handler = Arc::new(Counting::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let done = spawn_worker(handler.clone(), cancel);
    tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .expect("completion signal")
        .expect("sender fired");

    assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn worker_signals_after_cycle_returns() {
    let handler = Arc::new(Counting::default());

    let done = spawn_worker(handler.clone(), CancellationToken::new());
    tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .expect("completion signal")
        .expect("sender fired");

    assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn completion_signal_fires_on_drop() {
    let (tx, rx) = oneshot::channel();
    let signal = CompletionSignal::new(tx);
    drop(signal);
    rx.await.expect("signal sent on drop");
}

fn config_in(dir: &std::path::Path) -> FuzzConfig {
    FuzzConfig {
        project_src_path: dir.join("no-such-project").display().to_string(),
        git_storage_repo: dir.join("no-such-corpus").display().to_string(),
        fuzz_results_path: dir.join("results"),
        fuzz_pkgs: vec!["pkg".to_owned()],
        workspace_dir: dir.join("out"),
        ..FuzzConfig::default()
    }
}

#[tokio::test]
async fn cleanup_without_checkout_removes_workspace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Arc::new(config_in(dir.path()));
    let paths = config.paths();
    std::fs::create_dir_all(paths.project_dir.join("pkg")).expect("mkdir project");
    std::fs::create_dir_all(&paths.corpus_dir).expect("mkdir corpus");

    CorpusCycle::new(config).cleanup().await;

    assert!(!paths.root.exists());
}

#[tokio::test]
async fn unreachable_repositories_fail_the_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cycle = CorpusCycle::new(Arc::new(config_in(dir.path())));

    let result = cycle.run_cycle(&CancellationToken::new()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn canceled_cycle_is_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cycle = CorpusCycle::new(Arc::new(config_in(dir.path())));
    let cancel = CancellationToken::new();
    cancel.cancel();

    cycle
        .run_cycle(&cancel)
        .await
        .expect("canceled cycle returns Ok");
}
