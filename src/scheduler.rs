//! Continuous fuzzing cycles.
//!
//! Each cycle gets a child of the root cancellation token and a background
//! worker. The scheduler waits for the cycle duration or root shutdown,
//! cancels the cycle, waits for the worker's completion signal, and only
//! then runs cleanup. Cleanup never overlaps a running worker.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::worker::{spawn_worker, CycleHandler};

/// Run fuzzing cycles until `root` is canceled.
///
/// Returns the number of cycles that were started.
pub async fn run_cycles(
    root: CancellationToken,
    cycle_duration: Duration,
    handler: Arc<dyn CycleHandler>,
) -> u64 {
    let mut cycles: u64 = 0;

    loop {
        if root.is_cancelled() {
            info!("shutdown requested, exiting fuzzing cycles");
            return cycles;
        }

        cycles = cycles.saturating_add(1);
        info!(cycle = cycles, duration_secs = cycle_duration.as_secs(), "starting fuzzing cycle");

        let cycle_scope = root.child_token();
        let done = spawn_worker(Arc::clone(&handler), cycle_scope.clone());

        let shutdown = tokio::select! {
            () = tokio::time::sleep(cycle_duration) => {
                info!(cycle = cycles, "cycle duration complete, initiating cleanup");
                false
            }
            () = root.cancelled() => {
                info!(cycle = cycles, "shutdown initiated during fuzzing cycle, performing final cleanup");
                true
            }
        };

        cycle_scope.cancel();
        // An error only means the sender was dropped, which also marks completion.
        let _ = done.await;
        handler.cleanup().await;

        if shutdown {
            info!(cycles, "fuzzing cycles stopped");
            return cycles;
        }
    }
}
