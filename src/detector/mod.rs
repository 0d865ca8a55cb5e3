//! Failure detection over live `go test -fuzz` output.
//!
//! A [`FailureDetector`] consumes the primary output stream of one fuzz
//! target line by line. Once the failure marker shows up it opens a failure
//! log, records every following line, and captures the failing input that
//! the Go toolchain reports. The log is finalized exactly once, when the
//! stream ends or the detector is dropped.

pub mod sink;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

pub use sink::{FileLogSink, LogSink, MemoryLog, MemoryLogSink, SinkError};

/// Substring that marks the start of a failure in fuzzer output.
pub const FAILURE_MARKER: &str = "--- FAIL:";

/// Matches the two lines that name a failing input:
///
/// - `failure while testing seed corpus entry: FuzzFoo/771e938e4458e983`
/// - `Failing input written to testdata/fuzz/FuzzFoo/771e938e4458e983`
static FAILING_INPUT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?:failure while testing seed corpus entry:\s*|Failing input written to\s*testdata/fuzz/)(?P<target>[^/\s]+)/(?P<id>[0-9a-f]+)",
    )
    .ok()
});

/// Mutable state for one target's output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessState {
    /// Whether the failure marker has been seen. Never reverts.
    pub seen_failure: bool,
    /// Header plus the raw bytes of the failing testcase, or a read-error
    /// placeholder.
    pub error_data: Vec<u8>,
    /// Whether a capture has been attempted. Never reverts.
    pub input_printed: bool,
}

/// A failing input reference parsed from an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailingInput<'a> {
    /// Fuzz target name, e.g. `FuzzFoo`.
    pub target: &'a str,
    /// Lowercase hex input id.
    pub id: &'a str,
}

/// Extract the `(target, id)` pair from a line naming a failing input.
pub fn parse_failure_line(line: &str) -> Option<FailingInput<'_>> {
    let caps = FAILING_INPUT_RE.as_ref()?.captures(line)?;
    let target = caps.name("target")?.as_str();
    let id = caps.name("id")?.as_str();
    Some(FailingInput { target, id })
}

/// Path of the failure log for `target` under `results_dir`.
pub fn failure_log_path(results_dir: &Path, target: &str) -> PathBuf {
    results_dir.join(format!("{target}_failure.log"))
}

/// Read `<corpus_root>/<target>/<id>` and format it for the failure log.
///
/// The input bytes are appended unchanged after a text header. A read
/// failure is folded into a placeholder rather than returned.
pub fn read_input_data(corpus_root: &Path, input: FailingInput<'_>) -> Vec<u8> {
    let relative = format!("{}/{}", input.target, input.id);
    let path = corpus_root.join(input.target).join(input.id);
    match std::fs::read(&path) {
        Ok(data) => {
            let mut record = format!("\n\n=== Failing testcase ({relative}) ===\n").into_bytes();
            record.extend_from_slice(&data);
            record
        }
        Err(e) => format!("\n<< failed to read {relative}: {e} >>\n").into_bytes(),
    }
}

/// Per-target failure state machine.
pub struct FailureDetector {
    target: String,
    corpus_root: PathBuf,
    results_dir: PathBuf,
    sink: Box<dyn LogSink>,
    state: ProcessState,
    finalized: bool,
}

impl std::fmt::Debug for FailureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureDetector")
            .field("target", &self.target)
            .field("corpus_root", &self.corpus_root)
            .field("results_dir", &self.results_dir)
            .field("state", &self.state)
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl FailureDetector {
    /// Create a detector that writes its failure log to disk.
    ///
    /// `corpus_root` is the directory holding `<target>/<id>` input files;
    /// the log goes to `<results_dir>/<target>_failure.log`.
    pub fn new(target: impl Into<String>, corpus_root: PathBuf, results_dir: PathBuf) -> Self {
        Self::with_sink(target, corpus_root, results_dir, Box::new(FileLogSink::new()))
    }

    /// Create a detector with a custom sink.
    pub fn with_sink(
        target: impl Into<String>,
        corpus_root: PathBuf,
        results_dir: PathBuf,
        sink: Box<dyn LogSink>,
    ) -> Self {
        Self {
            target: target.into(),
            corpus_root,
            results_dir,
            sink,
            state: ProcessState::default(),
            finalized: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    /// Where this target's failure log is written.
    pub fn log_path(&self) -> PathBuf {
        failure_log_path(&self.results_dir, &self.target)
    }

    /// Feed one line of primary-stream output.
    ///
    /// Errors are per-line: the detector stays usable and later lines are
    /// still recorded and parsed.
    ///
    /// # Errors
    ///
    /// Returns the first sink error hit while handling this line.
    pub fn process_line(&mut self, line: &str) -> Result<(), SinkError> {
        if !self.state.seen_failure {
            if !line.contains(FAILURE_MARKER) {
                return Ok(());
            }
            // The marker line opens the log but is not recorded itself.
            self.state.seen_failure = true;
            let path = self.log_path();
            self.sink.initialize(&path)?;
            info!(fuzz_target = %self.target, path = %path.display(), "failure log initialized");
            return Ok(());
        }

        let written = self.sink.write_line(line);

        if !self.state.input_printed {
            if let Some(input) = parse_failure_line(line) {
                self.state.error_data = read_input_data(&self.corpus_root, input);
                self.state.input_printed = true;
                info!(
                    fuzz_target = %self.target,
                    input = %format!("{}/{}", input.target, input.id),
                    "failing input captured"
                );
            }
        }

        written
    }

    /// Append the captured testcase and close the sink.
    ///
    /// Runs at most once; later calls (including the one from `Drop`) do
    /// nothing. A sink that was never opened is left untouched.
    pub fn finish(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        if !self.state.seen_failure {
            return;
        }
        if let Err(e) = self.sink.close(&self.state.error_data) {
            warn!(fuzz_target = %self.target, error = %e, "failed to finalize failure log");
        }
    }
}

impl Drop for FailureDetector {
    fn drop(&mut self) {
        self.finish();
    }
}
