//! Scratch workspace cleanup between cycles.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info};

/// Upper bound on how long removing the workspace may take.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Remove the workspace directory.
///
/// A missing directory counts as clean. Failures and timeouts are logged,
/// never returned, so the next cycle always gets to start.
pub async fn cleanup_workspace(root: &Path) {
    match tokio::time::timeout(CLEANUP_TIMEOUT, tokio::fs::remove_dir_all(root)).await {
        Ok(Ok(())) => info!(path = %root.display(), "workspace cleaned up"),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Ok(Err(e)) => error!(path = %root.display(), error = %e, "cleanup failed"),
        Err(_) => error!(
            path = %root.display(),
            timeout_secs = CLEANUP_TIMEOUT.as_secs(),
            "cleanup timed out"
        ),
    }
}
