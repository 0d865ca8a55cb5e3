//! Failure log sinks.
//!
//! A sink receives everything the detector records for one failing target.
//! [`FileLogSink`] is the production implementation; [`MemoryLogSink`] keeps
//! the contents in memory so tests can inspect them after the run.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors raised by a [`LogSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// The log file could not be created or truncated.
    #[error("failed to create log file {path}: {source}")]
    Create {
        /// Path that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A write to an open sink failed.
    #[error("failed to write log file: {0}")]
    Write(#[from] std::io::Error),
    /// A write was attempted before [`LogSink::initialize`] succeeded.
    #[error("log sink is not initialized")]
    NotInitialized,
}

/// Destination for a single target's failure log.
pub trait LogSink: Send {
    /// Create (or truncate) the log at `path` and prepare it for writes.
    fn initialize(&mut self, path: &Path) -> Result<(), SinkError>;

    /// Append one line of fuzzer output followed by a newline.
    fn write_line(&mut self, line: &str) -> Result<(), SinkError>;

    /// Append the formatted failing testcase, byte for byte, followed by a
    /// newline.
    fn write_error_data(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Append `error_data` and release the sink.
    ///
    /// Closing a sink that was never initialized is a no-op.
    fn close(&mut self, error_data: &[u8]) -> Result<(), SinkError>;
}

/// Writes failure logs to a file on disk.
#[derive(Debug, Default)]
pub struct FileLogSink {
    file: Option<File>,
}

impl FileLogSink {
    /// Create a sink with no open file.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogSink for FileLogSink {
    fn initialize(&mut self, path: &Path) -> Result<(), SinkError> {
        let file = File::create(path).map_err(|source| SinkError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        self.file = Some(file);
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let file = self.file.as_mut().ok_or(SinkError::NotInitialized)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn write_error_data(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let file = self.file.as_mut().ok_or(SinkError::NotInitialized)?;
        file.write_all(data)?;
        file.write_all(b"\n")?;
        Ok(())
    }

    fn close(&mut self, error_data: &[u8]) -> Result<(), SinkError> {
        if self.file.is_none() {
            return Ok(());
        }
        let result = self.write_error_data(error_data);
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        result
    }
}

/// Snapshot of what a [`MemoryLogSink`] has recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryLog {
    /// Path passed to the most recent `initialize` call.
    pub path: Option<PathBuf>,
    /// Number of times `initialize` was called.
    pub initialized: usize,
    /// Number of times `close` reached an initialized sink.
    pub closed: usize,
    /// Everything written so far.
    pub contents: Vec<u8>,
}

impl MemoryLog {
    /// Contents decoded as UTF-8, with invalid bytes replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }
}

/// In-memory sink that records calls for later inspection.
///
/// Clones share the same underlying record, so a test can keep one handle
/// while the detector owns the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
    inner: Arc<Mutex<MemoryLog>>,
    open: bool,
}

impl MemoryLogSink {
    /// Create an empty in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> MemoryLog {
        match self.inner.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut MemoryLog) -> T) -> T {
        match self.inner.lock() {
            Ok(mut log) => f(&mut *log),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }
}

impl LogSink for MemoryLogSink {
    fn initialize(&mut self, path: &Path) -> Result<(), SinkError> {
        self.open = true;
        self.with_log(|log| {
            log.path = Some(path.to_path_buf());
            log.initialized = log.initialized.saturating_add(1);
            log.contents.clear();
        });
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.write_error_data(line.as_bytes())
    }

    fn write_error_data(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if !self.open {
            return Err(SinkError::NotInitialized);
        }
        self.with_log(|log| {
            log.contents.extend_from_slice(data);
            log.contents.push(b'\n');
        });
        Ok(())
    }

    fn close(&mut self, error_data: &[u8]) -> Result<(), SinkError> {
        if !self.open {
            return Ok(());
        }
        let result = self.write_error_data(error_data);
        self.open = false;
        self.with_log(|log| log.closed = log.closed.saturating_add(1));
        result
    }
}
