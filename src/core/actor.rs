//! # ProcessActor: monitor/restart loop for one managed process.
//!
//! Supervises one [`ProcessSpec`] with policies:
//! - relaunch per [`RestartPolicy`],
//! - delays per [`BackoffPolicy`], with the streak reset after a healthy run,
//! - graceful stop on cancellation via [`CancellationToken`].
//!
//! ## State machine
//! ```text
//!   Starting ──► Running ──► Exited ──► RestartPending ──► Starting ...
//!      │                       │
//!      │ spawn failed          └──► Terminal (policy says no)
//!      └──────────────────────────► RestartPending / Terminal
//!
//!   cancellation: Running ──► SIGTERM ≤ shutdown_timeout ──► SIGKILL ──► Terminal
//!                 RestartPending / Starting ─────────────────────────────► Terminal
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially**: the previous child is reaped before the next launch
//! - Attempt counter **never resets**; the backoff streak does
//! - Cancellation is honoured while running (terminate) and during the restart delay

use std::sync::Arc;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::core::runner::{Attempt, AttemptCtx, run_once};
use crate::events::{Bus, Event, EventKind};
use crate::logs::LogSink;
use crate::policies::{BackoffPolicy, RestartPolicy};
use crate::process::{ExitOutcome, Launcher, ProcessSpec, StopOutcome};

/// Policies applied by one actor.
#[derive(Clone, Debug)]
pub struct ProcessActorParams {
    /// When to relaunch.
    pub restart: RestartPolicy,
    /// Delay before relaunch number `streak`.
    pub backoff: BackoffPolicy,
    /// A run at least this long resets the backoff streak.
    pub healthy_uptime: Duration,
    /// Wait after SIGTERM before escalating to SIGKILL.
    pub shutdown_timeout: Duration,
}

/// Owns the handle of one managed process for its whole lifetime.
pub struct ProcessActor {
    spec: ProcessSpec,
    name: Arc<str>,
    sink: Arc<LogSink>,
    params: ProcessActorParams,
    launcher: Launcher,
    bus: Bus,
}

impl ProcessActor {
    pub fn new(
        spec: ProcessSpec,
        sink: Arc<LogSink>,
        params: ProcessActorParams,
        launcher: Launcher,
        bus: Bus,
    ) -> Self {
        let name = Arc::from(spec.name());
        Self {
            spec,
            name,
            sink,
            params,
            launcher,
            bus,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the loop until the restart policy ends it or `token` is cancelled.
    ///
    /// Returns how the process was left: [`StopOutcome::NotRunning`] if no
    /// child was alive at the end, otherwise the result of terminating it.
    pub async fn run(self, token: CancellationToken) -> StopOutcome {
        let ctx = AttemptCtx {
            launcher: &self.launcher,
            spec: &self.spec,
            name: &self.name,
            sink: &self.sink,
            bus: &self.bus,
            shutdown_timeout: self.params.shutdown_timeout,
        };

        let mut attempt: u32 = 0;
        let mut streak: u32 = 0;
        let mut last_exit: Option<ExitOutcome> = None;

        loop {
            if token.is_cancelled() {
                return StopOutcome::NotRunning;
            }

            attempt = attempt.saturating_add(1);
            self.bus.publish(
                Event::new(EventKind::ProcessStarting)
                    .with_process(Arc::clone(&self.name))
                    .with_attempt(attempt),
            );

            let succeeded = match run_once(&ctx, attempt, last_exit, &token).await {
                Attempt::Stopped(stop) => return stop,
                Attempt::Exited { exit, uptime } => {
                    last_exit = Some(exit);
                    if uptime >= self.params.healthy_uptime {
                        streak = 0;
                    }
                    exit.is_success()
                }
                Attempt::Failed => false,
            };

            if token.is_cancelled() {
                return StopOutcome::NotRunning;
            }
            if !self.params.restart.should_restart(succeeded) {
                self.bus.publish(
                    Event::new(EventKind::MonitorExhausted)
                        .with_process(Arc::clone(&self.name))
                        .with_attempt(attempt)
                        .with_reason(self.params.restart.as_label()),
                );
                return StopOutcome::NotRunning;
            }

            let delay = self.params.backoff.next(streak);
            streak = streak.saturating_add(1);
            self.bus.publish(
                Event::new(EventKind::RestartScheduled)
                    .with_process(Arc::clone(&self.name))
                    .with_attempt(attempt)
                    .with_delay(delay),
            );

            select! {
                _ = time::sleep(delay) => {}
                _ = token.cancelled() => return StopOutcome::NotRunning,
            }
        }
    }
}
