//! Fuzz target discovery via `go test -list`.

use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{FuzzError, FuzzRunner};

/// Prefix every Go fuzz target name starts with.
pub const TARGET_PREFIX: &str = "Fuzz";

/// Select fuzz target names from `go test -list` output, in encounter order.
pub fn filter_targets(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(TARGET_PREFIX))
        .map(str::to_owned)
        .collect()
}

impl FuzzRunner {
    /// List the fuzz targets defined in `package`.
    ///
    /// An empty list is logged as a warning and returned as `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`FuzzError::Spawn`] if the listing command cannot start,
    /// [`FuzzError::ListFailed`] on a non-zero exit, and
    /// [`FuzzError::Canceled`] if `cancel` fires first.
    pub async fn list_targets(
        &self,
        package: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, FuzzError> {
        info!(package, "discovering fuzz targets");

        let pkg_path = self.package_dir(package);
        let mut cmd = Command::new(&self.go_binary);
        cmd.args(["test", "-list=^Fuzz", "."])
            .current_dir(&pkg_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FuzzError::Canceled),
            output = cmd.output() => output.map_err(|source| FuzzError::Spawn {
                command: format!("{} test -list=^Fuzz .", self.go_binary.display()),
                source,
            })?,
        };

        if !output.status.success() {
            return Err(FuzzError::ListFailed {
                package: package.to_owned(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let targets = filter_targets(&String::from_utf8_lossy(&output.stdout));
        if targets.is_empty() {
            warn!(package, "no valid fuzz targets found");
        }
        Ok(targets)
    }
}
