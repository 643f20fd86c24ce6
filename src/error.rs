//! Error types used by the fleetvisor runtime.
//!
//! - [`ProcessError`]: launching or waiting on one managed process.
//! - [`BootstrapError`]: the one-shot cluster initialization.
//! - [`LogError`]: log sink I/O.
//! - [`RuntimeError`]: the supervisor as a whole (shutdown outcome, signals).
//!
//! Configuration errors live next to the loader in [`crate::config::ConfigError`].
//!
//! Every enum provides `as_label` for stable snake_case labels in logs.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::ShutdownReport;

/// # Errors produced while launching or observing a single process.
///
/// A `ProcessError` is fatal only for the current attempt: the monitor loop
/// reports it and retries according to the restart policy.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The executable could not be started (missing, not executable, ...).
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        /// Executable that failed to start.
        command: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A data or log directory could not be created or restricted.
    #[error("failed to prepare directory {path:?}: {source}")]
    Directory {
        /// Directory that could not be prepared.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The spawned child has no pid (already reaped).
    #[error("spawned process has no pid")]
    MissingPid,

    /// Waiting on the child failed.
    #[error("failed to wait on process: {0}")]
    Wait(#[source] io::Error),
}

impl ProcessError {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Spawn { .. } => "process_spawn_failed",
            ProcessError::Directory { .. } => "process_directory_failed",
            ProcessError::MissingPid => "process_missing_pid",
            ProcessError::Wait(_) => "process_wait_failed",
        }
    }
}

/// # Errors produced by the bootstrap coordinator.
///
/// All variants are recoverable: the marker stays in place and bootstrap
/// is retried with backoff (and again on the next supervisor start).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Not enough server processes reached the running state in time.
    #[error("quorum of {required} running servers not reached within {waited:?} (running: {running})")]
    QuorumTimeout {
        /// Servers that had to be running.
        required: usize,
        /// Servers running when the wait expired.
        running: usize,
        /// Time spent waiting.
        waited: Duration,
    },

    /// The initialization command could not be spawned.
    #[error("failed to spawn bootstrap command {command:?}: {source}")]
    Spawn {
        /// Command that failed to start.
        command: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The initialization command ran and reported failure.
    #[error("bootstrap command exited with {status}: {output}")]
    CommandFailed {
        /// Rendered exit status.
        status: String,
        /// Captured stdout/stderr (trimmed).
        output: String,
    },

    /// The initialization command did not finish in time.
    #[error("bootstrap command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// The marker file could not be inspected or removed.
    #[error("bootstrap marker {path:?}: {source}")]
    Marker {
        /// Marker path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Shutdown was requested while bootstrap was pending.
    #[error("bootstrap cancelled")]
    Canceled,
}

impl BootstrapError {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BootstrapError::QuorumTimeout { .. } => "bootstrap_quorum_timeout",
            BootstrapError::Spawn { .. } => "bootstrap_spawn_failed",
            BootstrapError::CommandFailed { .. } => "bootstrap_command_failed",
            BootstrapError::CommandTimeout(_) => "bootstrap_command_timeout",
            BootstrapError::Marker { .. } => "bootstrap_marker_failed",
            BootstrapError::Canceled => "bootstrap_canceled",
        }
    }
}

/// # Errors produced by a log sink.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LogError {
    /// Opening, writing, renaming or pruning a log file failed.
    #[error("log file {path:?}: {source}")]
    Io {
        /// File being operated on.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LogError::Io { .. } => "log_io_failed",
        }
    }
}

/// # Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Some children ignored the graceful signal and had to be killed.
    ///
    /// Not fatal: every process has still been stopped. The full report
    /// is attached so callers can see which processes needed force.
    #[error("shutdown timeout {timeout:?} exceeded; force-killed: {forced:?}")]
    ShutdownTimeout {
        /// Configured per-process shutdown timeout.
        timeout: Duration,
        /// Names of processes that required SIGKILL.
        forced: Vec<String>,
        /// Outcome for every managed process.
        report: ShutdownReport,
    },

    /// Monitor tasks did not finish even after the kill escalation.
    #[error("monitors still running {grace:?} after shutdown; stuck: {stuck:?}")]
    GraceExceeded {
        /// Total time waited.
        grace: Duration,
        /// Names of processes still considered alive.
        stuck: Vec<String>,
    },

    /// OS signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] io::Error),
}

impl RuntimeError {
    /// Returns a short stable label for logs.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::ShutdownTimeout { .. } => "runtime_shutdown_timeout",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal_failed",
        }
    }
}
