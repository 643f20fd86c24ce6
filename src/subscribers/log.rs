//! # LogWriter: renders runtime events through `tracing`.
//!
//! Routine transitions are logged at `info`, restarts and failures at
//! `warn`, and anything that loses data or needs an operator at `error`.
//!
//! ```text
//! INFO  process running process="storage#0" pid=4711 attempt=1
//! WARN  process exited process="storage#0" pid=4711 exit=signal 9
//! WARN  restart scheduled process="storage#0" delay_ms=5000 after_attempt=1
//! INFO  bootstrap succeeded
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that writes every event to the `tracing` pipeline.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let process = e.process.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let exit = e.exit.map(|x| x.to_string()).unwrap_or_default();

        match e.kind {
            EventKind::ProcessStarting => {
                info!(process, attempt = e.attempt, "process starting");
            }
            EventKind::ProcessRunning => {
                info!(process, pid = e.pid, attempt = e.attempt, "process running");
            }
            EventKind::ProcessExited => {
                warn!(process, pid = e.pid, exit = %exit, "process exited");
            }
            EventKind::SpawnFailed => {
                error!(process, attempt = e.attempt, reason, "spawn failed");
            }
            EventKind::RestartScheduled => {
                warn!(
                    process,
                    delay_ms = e.delay_ms,
                    after_attempt = e.attempt,
                    "restart scheduled"
                );
            }
            EventKind::MonitorExhausted => {
                info!(process, "restart policy exhausted; not relaunching");
            }
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::ProcessStopped => {
                info!(process, pid = e.pid, exit = %exit, "process stopped");
            }
            EventKind::ProcessKilled => {
                warn!(process, pid = e.pid, "process ignored SIGTERM; killed");
            }
            EventKind::AllStoppedWithin => info!("all processes stopped gracefully"),
            EventKind::ShutdownTimeout => warn!(reason, "some processes were force-killed"),
            EventKind::GraceExceeded => error!(reason, "monitors did not finish after kill"),
            EventKind::BootstrapSkipped => info!("cluster already initialized; bootstrap skipped"),
            EventKind::BootstrapStarted => info!(attempt = e.attempt, "bootstrap started"),
            EventKind::BootstrapSucceeded => info!("bootstrap succeeded"),
            EventKind::BootstrapFailed => {
                warn!(attempt = e.attempt, delay_ms = e.delay_ms, reason, "bootstrap failed");
            }
            EventKind::BootstrapAbandoned => {
                error!(reason, "bootstrap abandoned; marker kept for next start");
            }
            EventKind::LogRotated => {
                info!(process, path = e.path.as_deref(), "log rotated");
            }
            EventKind::LogPruned => {
                info!(process, path = e.path.as_deref(), "rotated log pruned");
            }
            EventKind::LogFailed => error!(process, reason, "log sink failed"),
            // logged by the subscriber set where they happen
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {}
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
