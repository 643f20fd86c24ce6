//! # Runtime handle of a launched process.
//!
//! A [`ProcessHandle`] owns the `tokio::process::Child` plus the tasks that
//! pump its stdout/stderr into the log sink. It is created by the
//! [`Launcher`](crate::process::Launcher) and owned by exactly one monitor
//! loop until the child has been reaped.
//!
//! ## Termination
//! Every child leads its own process group; stop signals go to the whole
//! group so helpers forked by a wrapper shell go down with it.
//! ```text
//! terminate(timeout):
//!   SIGTERM(-pgid) ──► wait ≤ timeout ──► exited  → StopOutcome::Graceful(outcome)
//!                                     └─► elapsed → SIGKILL(-pgid) ──► wait ≤ REAP_TIMEOUT
//!                                                                   → StopOutcome::Forced
//! ```
//! A handle dropped while its child still runs kills the group.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::ProcessError;

/// Upper bound for reaping a child after SIGKILL or for draining its output pumps.
pub(crate) const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// How a child process terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with a status code.
    Code(i32),
    /// Killed by a signal.
    Signal(i32),
}

impl ExitOutcome {
    /// Only `exit(0)` counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Code(0))
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ExitOutcome::Code(code),
            (None, Some(sig)) => ExitOutcome::Signal(sig),
            (None, None) => ExitOutcome::Code(-1),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(c) => write!(f, "code {c}"),
            ExitOutcome::Signal(s) => write!(f, "signal {s}"),
        }
    }
}

/// Result of stopping one process during shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// No child was alive when shutdown reached this process.
    NotRunning,
    /// The child exited within the shutdown timeout after SIGTERM.
    Graceful(ExitOutcome),
    /// The child ignored SIGTERM and was killed.
    Forced,
}

impl StopOutcome {
    /// True unless the child had to be killed.
    pub fn is_clean(&self) -> bool {
        !matches!(self, StopOutcome::Forced)
    }
}

/// A live child process and its output pumps.
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    started_at: Instant,
    restart_count: u32,
    last_exit: Option<ExitOutcome>,
    pumps: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    pub(crate) fn new(
        child: Child,
        pid: u32,
        restart_count: u32,
        last_exit: Option<ExitOutcome>,
        pumps: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            child,
            pid,
            started_at: Instant::now(),
            restart_count,
            last_exit,
            pumps,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Relaunches of this spec that preceded this handle.
    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Exit outcome of the previous incarnation, if any.
    pub fn last_exit(&self) -> Option<ExitOutcome> {
        self.last_exit
    }

    /// Probes the pid with signal 0.
    ///
    /// A zombie still counts as live until the monitor loop reaps it.
    pub fn is_alive(&self) -> bool {
        signal::kill(Pid::from_raw(self.pid as i32), None).is_ok()
    }

    /// Waits for the child to exit and for its output to be drained.
    pub async fn wait(&mut self) -> Result<ExitOutcome, ProcessError> {
        let status = self.child.wait().await.map_err(ProcessError::Wait)?;
        self.drain_pumps().await;
        Ok(ExitOutcome::from(status))
    }

    /// Stops the child: SIGTERM, wait up to `timeout`, then SIGKILL.
    pub async fn terminate(&mut self, timeout: Duration) -> StopOutcome {
        if let Ok(Some(status)) = self.child.try_wait() {
            self.drain_pumps().await;
            return StopOutcome::Graceful(status.into());
        }

        if let Err(err) = self.signal_group(Signal::SIGTERM) {
            tracing::debug!(pid = self.pid, %err, "SIGTERM delivery failed");
        }

        match time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.drain_pumps().await;
                StopOutcome::Graceful(status.into())
            }
            Ok(Err(err)) => {
                tracing::warn!(pid = self.pid, %err, "wait after SIGTERM failed; killing");
                self.kill().await;
                StopOutcome::Forced
            }
            Err(_elapsed) => {
                self.kill().await;
                StopOutcome::Forced
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(err) = self.signal_group(Signal::SIGKILL) {
            tracing::debug!(pid = self.pid, %err, "group SIGKILL failed; killing child only");
            if let Err(err) = self.child.start_kill() {
                tracing::debug!(pid = self.pid, %err, "SIGKILL delivery failed");
            }
        }
        if time::timeout(REAP_TIMEOUT, self.child.wait()).await.is_err() {
            tracing::error!(pid = self.pid, "process not reaped after SIGKILL");
        }
        self.drain_pumps().await;
    }

    fn signal_group(&self, sig: Signal) -> nix::Result<()> {
        signal::killpg(Pid::from_raw(self.pid as i32), sig)
    }

    /// Output pumps end at EOF; a grandchild holding the pipe open must not stall us.
    async fn drain_pumps(&mut self) {
        for pump in self.pumps.drain(..) {
            let abort = pump.abort_handle();
            if time::timeout(REAP_TIMEOUT, pump).await.is_err() {
                abort.abort();
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            tracing::warn!(pid = self.pid, "handle dropped with a live child; killing its group");
            let _ = self.signal_group(Signal::SIGKILL);
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("restart_count", &self.restart_count)
            .field("last_exit", &self.last_exit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_from_status() {
        assert_eq!(ExitOutcome::from(ExitStatus::from_raw(0)), ExitOutcome::Code(0));
        assert_eq!(ExitOutcome::from(ExitStatus::from_raw(3 << 8)), ExitOutcome::Code(3));
        assert_eq!(ExitOutcome::from(ExitStatus::from_raw(9)), ExitOutcome::Signal(9));
    }

    #[test]
    fn test_success_and_display() {
        assert!(ExitOutcome::Code(0).is_success());
        assert!(!ExitOutcome::Code(1).is_success());
        assert!(!ExitOutcome::Signal(15).is_success());
        assert_eq!(ExitOutcome::Signal(9).to_string(), "signal 9");
        assert!(!StopOutcome::Forced.is_clean());
        assert!(StopOutcome::NotRunning.is_clean());
    }
}
