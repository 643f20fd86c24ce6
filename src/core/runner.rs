//! # Run a single incarnation of a managed process.
//!
//! Launches the child once, then waits for it to exit or for cancellation,
//! publishing lifecycle events to [`Bus`].
//!
//! ## Event flow
//!
//! ```text
//! Spawn failure:
//!   launch() → Err → publish SpawnFailed                → Attempt::Failed
//!
//! Child exits on its own:
//!   launch() → publish ProcessRunning
//!            → wait() → publish ProcessExited           → Attempt::Exited
//!
//! Cancellation while running:
//!   launch() → publish ProcessRunning
//!            → terminate(shutdown_timeout)
//!                 ├─ Graceful → publish ProcessStopped  → Attempt::Stopped
//!                 └─ Forced   → publish ProcessKilled   → Attempt::Stopped
//! ```
//!
//! ## Rules
//! - Always publishes **exactly one** terminal event per attempt
//! - The handle is dropped only after the child has been reaped (or killed),
//!   so a replacement is never launched next to a live predecessor

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::logs::LogSink;
use crate::process::{ExitOutcome, Launcher, ProcessSpec, StopOutcome};

/// How one attempt ended.
#[derive(Debug)]
pub(crate) enum Attempt {
    /// The child terminated on its own.
    Exited { exit: ExitOutcome, uptime: Duration },
    /// No child was started, or it was lost and had to be stopped.
    Failed,
    /// Cancellation stopped the child.
    Stopped(StopOutcome),
}

/// Everything one attempt needs besides the token.
pub(crate) struct AttemptCtx<'a> {
    pub launcher: &'a Launcher,
    pub spec: &'a ProcessSpec,
    pub name: &'a Arc<str>,
    pub sink: &'a Arc<LogSink>,
    pub bus: &'a Bus,
    pub shutdown_timeout: Duration,
}

/// Executes one attempt of `ctx.spec`.
///
/// `attempt` is 1-based; `attempt - 1` is recorded as the handle's restart count.
pub(crate) async fn run_once(
    ctx: &AttemptCtx<'_>,
    attempt: u32,
    last_exit: Option<ExitOutcome>,
    token: &CancellationToken,
) -> Attempt {
    let launched = ctx
        .launcher
        .launch(ctx.spec, Arc::clone(ctx.sink), attempt - 1, last_exit)
        .await;
    let mut handle = match launched {
        Ok(h) => h,
        Err(e) => {
            ctx.bus.publish(
                Event::new(EventKind::SpawnFailed)
                    .with_process(Arc::clone(ctx.name))
                    .with_attempt(attempt)
                    .with_reason(e.to_string()),
            );
            return Attempt::Failed;
        }
    };

    let pid = handle.pid();
    ctx.bus.publish(
        Event::new(EventKind::ProcessRunning)
            .with_process(Arc::clone(ctx.name))
            .with_pid(pid)
            .with_attempt(attempt),
    );

    let waited = select! {
        res = handle.wait() => Some(res),
        _ = token.cancelled() => None,
    };

    match waited {
        Some(Ok(exit)) => {
            ctx.bus.publish(
                Event::new(EventKind::ProcessExited)
                    .with_process(Arc::clone(ctx.name))
                    .with_pid(pid)
                    .with_attempt(attempt)
                    .with_exit(exit),
            );
            Attempt::Exited {
                exit,
                uptime: handle.uptime(),
            }
        }
        Some(Err(e)) => {
            // Lost track of the child; make sure it is gone before relaunching.
            tracing::warn!(process = %ctx.name, pid, error = %e, "wait failed; stopping child");
            let stop = handle.terminate(ctx.shutdown_timeout).await;
            publish_stop(ctx, pid, stop);
            Attempt::Failed
        }
        None => {
            let stop = handle.terminate(ctx.shutdown_timeout).await;
            publish_stop(ctx, pid, stop);
            Attempt::Stopped(stop)
        }
    }
}

fn publish_stop(ctx: &AttemptCtx<'_>, pid: u32, stop: StopOutcome) {
    let ev = match stop {
        StopOutcome::Graceful(exit) => Event::new(EventKind::ProcessStopped).with_exit(exit),
        StopOutcome::Forced => Event::new(EventKind::ProcessKilled),
        StopOutcome::NotRunning => Event::new(EventKind::ProcessStopped),
    };
    ctx.bus
        .publish(ev.with_process(Arc::clone(ctx.name)).with_pid(pid));
}
