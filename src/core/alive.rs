//! # Running-process tracker with sequence-based ordering.
//!
//! Keeps the authoritative view of which managed processes currently have a
//! live child, and their pids. Fed by the supervisor's bus listener.
//!
//! ```text
//! Bus ──► subscriber_listener() ──► AliveTracker::update()
//!                                        │
//!                                        ├─► HashMap<name, {last_seq, pid}>
//!                                        └─► watch<version> ──► wait_for() (bootstrap quorum)
//! ```
//!
//! ## Rules
//! - `ProcessRunning` sets the pid; `ProcessExited` / `ProcessStopped` /
//!   `ProcessKilled` / `SpawnFailed` clear it
//! - Events with `seq <= last_seq` for a process are rejected as stale
//! - Reads are eventually consistent with the bus

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::time;

use crate::events::{Event, EventKind};

#[derive(Debug, Clone, Default)]
struct ProcState {
    last_seq: u64,
    pid: Option<u32>,
}

/// Thread-safe view of running processes.
pub struct AliveTracker {
    state: RwLock<HashMap<String, ProcState>>,
    version: watch::Sender<u64>,
}

impl Default for AliveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AliveTracker {
    pub fn new() -> Self {
        let (version, _rx) = watch::channel(0);
        Self {
            state: RwLock::new(HashMap::new()),
            version,
        }
    }

    /// Applies `ev` if it is newer than the last event seen for its process.
    ///
    /// Returns `true` if the running state changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let Some(name) = ev.process.as_deref() else {
            return false;
        };
        let next = match ev.kind {
            EventKind::ProcessRunning => ev.pid,
            EventKind::ProcessExited
            | EventKind::ProcessStopped
            | EventKind::ProcessKilled
            | EventKind::SpawnFailed => None,
            _ => return false,
        };

        let changed = {
            let mut state = self.state.write().await;
            let entry = state.entry(name.to_string()).or_default();
            if ev.seq <= entry.last_seq {
                return false;
            }
            entry.last_seq = ev.seq;
            let changed = entry.pid != next;
            entry.pid = next;
            changed
        };

        if changed {
            self.version.send_modify(|v| *v += 1);
        }
        changed
    }

    /// Sorted names of processes with a live child.
    pub async fn snapshot(&self) -> Vec<String> {
        self.running().await.into_keys().collect()
    }

    /// Running processes and their pids, sorted by name.
    pub async fn running(&self) -> BTreeMap<String, u32> {
        self.state
            .read()
            .await
            .iter()
            .filter_map(|(name, st)| st.pid.map(|pid| (name.clone(), pid)))
            .collect()
    }

    /// Pid of `name`, if it is running.
    pub async fn pid_of(&self, name: &str) -> Option<u32> {
        self.state.read().await.get(name).and_then(|st| st.pid)
    }

    pub async fn is_alive(&self, name: &str) -> bool {
        self.pid_of(name).await.is_some()
    }

    /// Waits until `pred(running)` holds or `timeout` expires.
    ///
    /// Returns whether the predicate was satisfied.
    pub async fn wait_for<F>(&self, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&BTreeMap<String, u32>) -> bool,
    {
        let mut changes = self.version.subscribe();
        let wait = async {
            loop {
                if pred(&self.running().await) {
                    return;
                }
                if changes.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };
        time::timeout(timeout, wait).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(name: &str, pid: u32) -> Event {
        Event::new(EventKind::ProcessRunning)
            .with_process(name)
            .with_pid(pid)
    }

    #[tokio::test]
    async fn test_running_and_exit() {
        let tracker = AliveTracker::new();
        assert!(tracker.update(&running("storage#0", 10)).await);
        assert_eq!(tracker.pid_of("storage#0").await, Some(10));

        let exited = Event::new(EventKind::ProcessExited).with_process("storage#0");
        assert!(tracker.update(&exited).await);
        assert!(!tracker.is_alive("storage#0").await);
    }

    #[tokio::test]
    async fn test_stale_event_rejected() {
        let tracker = AliveTracker::new();
        let stale = running("storage#0", 10);
        let exited = Event::new(EventKind::ProcessExited).with_process("storage#0");

        tracker.update(&exited).await;
        assert!(!tracker.update(&stale).await);
        assert!(tracker.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_quorum() {
        let tracker = std::sync::Arc::new(AliveTracker::new());
        let t = tracker.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(20)).await;
            t.update(&running("storage#0", 1)).await;
            t.update(&running("storage#1", 2)).await;
        });

        let ok = tracker
            .wait_for(Duration::from_secs(5), |r| r.len() >= 2)
            .await;
        assert!(ok);

        let never = tracker
            .wait_for(Duration::from_millis(30), |r| r.len() >= 3)
            .await;
        assert!(!never);
    }
}
