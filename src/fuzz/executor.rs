//! Running a single fuzz target under `go test -fuzz`.

use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::stream::stream_output;
use super::{FuzzError, FuzzRunner, FuzzTarget};
use crate::detector::FailureDetector;

impl FuzzRunner {
    /// Arguments passed to the Go toolchain for one fuzz run.
    pub fn fuzz_args(&self, target: &str, corpus_path: &std::path::Path) -> Vec<String> {
        vec![
            "test".to_owned(),
            format!("-fuzz=^{target}$"),
            format!("-test.fuzzcachedir={}", corpus_path.display()),
            format!("-fuzztime={}s", self.fuzz_time_secs),
            format!("-parallel={}", self.num_processes),
        ]
    }

    /// Run `target` to completion, feeding stdout through a [`FailureDetector`].
    ///
    /// Both output streams are drained concurrently and fully before the
    /// process is awaited. When `cancel` fires the process is killed and its
    /// non-zero exit is treated as an intentional stop.
    ///
    /// # Errors
    ///
    /// Returns [`FuzzError::Spawn`] if the process cannot start and
    /// [`FuzzError::Exit`] when it fails without having been canceled.
    pub async fn execute_target(
        &self,
        target: &FuzzTarget,
        cancel: &CancellationToken,
    ) -> Result<(), FuzzError> {
        info!(package = %target.package, fuzz_target = %target.name, "executing fuzz target");

        let corpus_path = self.corpus_root(&target.package)?;
        let args = self.fuzz_args(&target.name, &corpus_path);

        let mut cmd = std::process::Command::new(&self.go_binary);
        cmd.args(&args)
            .current_dir(self.package_dir(&target.package))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // `go test` runs the compiled test binary as a grandchild; a group of
        // its own lets cancellation reach it.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

        let mut child = Command::from(cmd)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FuzzError::Spawn {
                command: format!("{} {}", self.go_binary.display(), args.join(" ")),
                source,
            })?;
        let pgid = child.id();

        let stdout = child.stdout.take().ok_or(FuzzError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(FuzzError::MissingPipe("stderr"))?;

        let mut detector =
            FailureDetector::new(target.name.clone(), corpus_path, self.results_dir.clone());

        let primary = async {
            stream_output(stdout, "stdout", |line| {
                if let Err(e) = detector.process_line(line) {
                    warn!(error = %e, "error processing fuzzer output line");
                }
            })
            .await;
            detector.finish();
        };
        let secondary = async {
            stream_output(stderr, "stderr", |_| {}).await;
        };

        let span = info_span!("fuzz", package = %target.package, fuzz_target = %target.name);
        let readers = async {
            tokio::join!(primary, secondary);
        }
        .instrument(span);
        tokio::pin!(readers);

        let mut killed = false;
        tokio::select! {
            () = &mut readers => {}
            () = cancel.cancelled() => {
                info!(fuzz_target = %target.name, "cancellation requested, stopping fuzz process");
                kill(&mut child, pgid, &target.name).await;
                killed = true;
                readers.await;
            }
        }

        let status = tokio::select! {
            status = child.wait() => status,
            () = cancel.cancelled(), if !killed => {
                kill(&mut child, pgid, &target.name).await;
                child.wait().await
            }
        };

        self.reconcile_exit(target, status, cancel)
    }

    fn reconcile_exit(
        &self,
        target: &FuzzTarget,
        status: std::io::Result<ExitStatus>,
        cancel: &CancellationToken,
    ) -> Result<(), FuzzError> {
        match status {
            Ok(status) if status.success() => {
                info!(
                    package = %target.package,
                    fuzz_target = %target.name,
                    "fuzz target completed successfully"
                );
                Ok(())
            }
            _ if cancel.is_cancelled() => {
                info!(
                    package = %target.package,
                    fuzz_target = %target.name,
                    "fuzz target stopped by cancellation"
                );
                Ok(())
            }
            Ok(status) => Err(FuzzError::Exit {
                target: target.name.clone(),
                status,
            }),
            Err(e) => Err(FuzzError::Io(e)),
        }
    }
}

/// Kill the fuzz process and, on unix, every process in its group.
async fn kill(child: &mut Child, pgid: Option<u32>, target: &str) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pgid {
            let group = format!("-{pgid}");
            match Command::new("kill")
                .args(["-s", "KILL", "--", group.as_str()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
            {
                Ok(status) if !status.success() => {
                    warn!(fuzz_target = %target, pgid, %status, "failed to signal fuzz process group");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(fuzz_target = %target, pgid, error = %e, "failed to run kill for fuzz process group");
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;

    if let Err(e) = child.start_kill() {
        warn!(fuzz_target = %target, error = %e, "failed to signal fuzz process");
    }
}
