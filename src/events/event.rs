//! # Runtime events emitted by the supervisor and its workers.
//!
//! [`EventKind`] groups events into:
//! - **Process lifecycle**: starting, running, exited, spawn failure, restart scheduling
//! - **Shutdown**: request, graceful/forced stop per process, overall outcome
//! - **Bootstrap**: one-shot cluster initialization progress
//! - **Logs**: rotation and pruning
//! - **Subscribers**: overflow and panics inside subscriber workers
//!
//! [`Event`] carries the metadata relevant for its kind (process name, pid,
//! exit outcome, delays, paths).
//!
//! ## Ordering guarantees
//! Each event carries a globally unique, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use fleetvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RestartScheduled)
//!     .with_process("storage#0")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::RestartScheduled);
//! assert_eq!(ev.delay_ms, Some(5_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::process::ExitOutcome;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked while handling an event (`process` = subscriber name).
    SubscriberPanicked,
    /// Subscriber queue full or closed; event dropped (`process` = subscriber name).
    SubscriberOverflow,

    // === Process lifecycle ===
    /// Launch attempt begins (`attempt`).
    ProcessStarting,
    /// Child spawned (`pid`, `attempt`).
    ProcessRunning,
    /// Child terminated on its own (`pid`, `exit`, `attempt`).
    ProcessExited,
    /// Launch failed before a child existed (`reason`, `attempt`).
    SpawnFailed,
    /// Relaunch scheduled (`delay_ms`, `attempt` = attempt that just ended).
    RestartScheduled,
    /// Restart policy forbids further launches; monitor loop ends.
    MonitorExhausted,

    // === Shutdown ===
    /// Shutdown requested (OS signal or explicit cancel).
    ShutdownRequested,
    /// Child exited after the graceful signal (`pid`, `exit`).
    ProcessStopped,
    /// Child ignored the graceful signal and was killed (`pid`).
    ProcessKilled,
    /// Every child stopped gracefully.
    AllStoppedWithin,
    /// At least one child had to be killed.
    ShutdownTimeout,
    /// Monitor tasks still running after the kill escalation.
    GraceExceeded,

    // === Bootstrap ===
    /// Bootstrap marker absent; nothing to do.
    BootstrapSkipped,
    /// Quorum reached and initialization command launched (`attempt`).
    BootstrapStarted,
    /// Initialization succeeded and the marker was removed.
    BootstrapSucceeded,
    /// Initialization attempt failed (`reason`, `attempt`); marker kept.
    BootstrapFailed,
    /// Retry budget spent for this run; marker kept for the next start.
    BootstrapAbandoned,

    // === Logs ===
    /// A log file was rolled over (`path` = rotated file).
    LogRotated,
    /// An old rotated file was deleted by retention (`path`).
    LogPruned,
    /// A log sink failed (`reason`).
    LogFailed,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Managed process name (`storage#0`), or subscriber name.
    pub process: Option<Arc<str>>,
    /// OS process id.
    pub pid: Option<u32>,
    /// Launch attempt (1-based, per process).
    pub attempt: Option<u32>,
    /// How the child terminated.
    pub exit: Option<ExitOutcome>,
    /// Delay before the next launch, in milliseconds.
    pub delay_ms: Option<u32>,
    /// Human-readable detail (errors, reasons).
    pub reason: Option<Arc<str>>,
    /// Filesystem path (rotated or pruned log file).
    pub path: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event stamped with the current time and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            pid: None,
            attempt: None,
            exit: None,
            delay_ms: None,
            reason: None,
            path: None,
        }
    }

    #[inline]
    pub fn with_process(mut self, name: impl Into<Arc<str>>) -> Self {
        self.process = Some(name.into());
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    #[inline]
    pub fn with_exit(mut self, exit: ExitOutcome) -> Self {
        self.exit = Some(exit);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_path(mut self, path: &std::path::Path) -> Self {
        self.path = Some(Arc::from(path.to_string_lossy().as_ref()));
        self
    }

    /// Creates a subscriber overflow event.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_process(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_process(subscriber)
            .with_reason(info)
    }

    /// True for events emitted by subscriber workers about themselves.
    ///
    /// These are never re-fed into the subscriber set.
    #[inline]
    pub fn is_subscriber_internal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::ProcessStarting);
        let b = Event::new(EventKind::ProcessStarting);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_saturates() {
        let ev = Event::new(EventKind::RestartScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
