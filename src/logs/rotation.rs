//! # Rotation policy and background worker.
//!
//! [`RotationPolicy`] holds the thresholds shared read-only by every sink.
//! [`RotationWorker`] periodically calls [`LogSink::enforce`] on all sinks
//! until the runtime token is cancelled.
//!
//! ## Sentinel values
//! - `rollover_size = 0` → never roll over
//! - `retention_size = 0` → unlimited retention (no deletion)

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::logs::LogSink;

/// Size thresholds for log rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    /// Live file size (bytes) at which it is rolled over.
    pub rollover_size: u64,
    /// Maximum total size (bytes) of rotated files kept per process.
    pub retention_size: u64,
    /// How often the background worker re-checks every sink.
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
}

impl Default for RotationPolicy {
    /// 10 MiB rollover, 100 MiB retention, checked every 10s.
    fn default() -> Self {
        Self {
            rollover_size: 10 * 1024 * 1024,
            retention_size: 100 * 1024 * 1024,
            check_interval: Duration::from_secs(10),
        }
    }
}

impl RotationPolicy {
    /// True if a live file of `size` bytes must be rolled over.
    #[inline]
    pub fn should_rotate(&self, size: u64) -> bool {
        self.rollover_size > 0 && size >= self.rollover_size
    }
}

/// Applies the rotation policy to every sink on a fixed interval.
pub struct RotationWorker {
    sinks: Vec<Arc<LogSink>>,
    interval: Duration,
    bus: Bus,
}

impl RotationWorker {
    pub fn new(sinks: Vec<Arc<LogSink>>, interval: Duration, bus: Bus) -> Self {
        Self {
            sinks,
            interval: interval.max(Duration::from_millis(10)),
            bus,
        }
    }

    /// Runs one pass over all sinks. Failures are published, never returned.
    pub async fn sweep(&self) {
        for sink in &self.sinks {
            if let Err(err) = sink.enforce().await {
                self.bus.publish(
                    Event::new(EventKind::LogFailed)
                        .with_path(sink.path())
                        .with_reason(err.to_string()),
                );
            }
        }
    }

    /// Sweeps every `interval` until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_rotate_sentinels() {
        let mut policy = RotationPolicy::default();
        policy.rollover_size = 0;
        assert!(!policy.should_rotate(u64::MAX));

        policy.rollover_size = 10;
        assert!(!policy.should_rotate(9));
        assert!(policy.should_rotate(10));
    }

    #[tokio::test]
    async fn test_worker_rotates_and_stops_on_cancel() {
        let tmp = tempfile::tempdir().unwrap();
        let bus = Bus::new(64);
        let policy = RotationPolicy {
            rollover_size: 16,
            retention_size: 0,
            check_interval: Duration::from_millis(20),
        };
        let sink = Arc::new(LogSink::new(
            "storage#0",
            tmp.path().join("storage-0.log"),
            policy,
            bus.clone(),
        ));
        std::fs::write(sink.path(), vec![b'x'; 64]).unwrap();

        let token = CancellationToken::new();
        let worker = RotationWorker::new(vec![sink.clone()], policy.check_interval, bus);
        let join = tokio::spawn(worker.run(token.clone()));

        let deadline = time::Instant::now() + Duration::from_secs(5);
        while sink.rotated_files().await.unwrap().is_empty() {
            assert!(time::Instant::now() < deadline, "worker never rotated");
            time::sleep(Duration::from_millis(10)).await;
        }

        token.cancel();
        time::timeout(Duration::from_secs(5), join)
            .await
            .unwrap()
            .unwrap();
    }
}
