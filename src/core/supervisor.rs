//! # Supervisor: owns the fleet, its background workers and shutdown.
//!
//! The [`Supervisor`] owns the event bus, a [`SubscriberSet`], the
//! [`AliveTracker`] and the runtime configuration. It spawns one
//! [`ProcessActor`] per spec, the log rotation worker and (optionally) the
//! bootstrap coordinator, then waits for a termination signal.
//!
//! ## High-level architecture
//! ```text
//! Inputs to run():
//!   Vec<ProcessSpec>  ──►  Supervisor::run(specs)
//!
//! Preparation:
//!   - ShutdownSignals::install()           (fails fast with RuntimeError::Signal)
//!   - listener: Bus.subscribe() ─► AliveTracker::update() ─► SubscriberSet::emit()
//!   - one LogSink per spec ─► RotationWorker::run(child_token)
//!
//! Spawn:
//!   ProcessSpec[0]  ProcessSpec[1]  ...  ProcessSpec[N-1]
//!       └──► ProcessActor::new(spec, sink, params) ─► set.spawn(actor.run(child_token))
//!   BootstrapCoordinator::run(child_token)            (if configured)
//!
//! Shutdown path (signal or Supervisor::shutdown()):
//!   publish(ShutdownRequested) ─► runtime_token.cancel()
//!     └─► every actor: SIGTERM ≤ shutdown_timeout ─► SIGKILL ─► StopOutcome
//!     └─► wait_all_with_grace(shutdown_timeout + reap):
//!            ├─ all clean        → AllStoppedWithin,  Ok(report)
//!            ├─ some killed      → ShutdownTimeout,   Err(ShutdownTimeout { report })
//!            └─ still running    → GraceExceeded,     Err(GraceExceeded)
//! ```
//!
//! A supervisor runs its fleet once; build a new one to run again.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::bootstrap::{BootstrapCoordinator, ClusterBootstrapMarker};
use crate::config::{BootstrapConfig, Config};
use crate::core::actor::{ProcessActor, ProcessActorParams};
use crate::core::alive::AliveTracker;
use crate::core::shutdown::ShutdownSignals;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::logs::{LogSink, RotationPolicy, RotationWorker};
use crate::process::{Launcher, ProcessSpec, StopOutcome};
use crate::subscribers::SubscriberSet;

/// Extra time allowed after `shutdown_timeout` for kill, reap and output drain.
const GRACE_MARGIN: Duration = Duration::from_secs(15);

/// How every managed process was left at shutdown, keyed by process name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    outcomes: BTreeMap<String, StopOutcome>,
}

impl ShutdownReport {
    pub fn insert(&mut self, name: impl Into<String>, outcome: StopOutcome) {
        self.outcomes.insert(name.into(), outcome);
    }

    pub fn get(&self, name: &str) -> Option<StopOutcome> {
        self.outcomes.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.outcomes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, StopOutcome)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Names of processes that had to be killed, sorted.
    pub fn forced(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_clean())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// True if no process needed SIGKILL.
    pub fn is_clean(&self) -> bool {
        self.outcomes.values().all(StopOutcome::is_clean)
    }
}

/// Bootstrap wiring handed to the supervisor by the builder.
pub(crate) struct BootstrapPlan {
    pub cfg: BootstrapConfig,
    pub marker: ClusterBootstrapMarker,
    pub cluster_file: PathBuf,
}

/// Why the supervise phase ended.
enum Trigger {
    Signal,
    Requested,
    AllExited,
}

/// Coordinates process actors, event delivery and graceful shutdown.
pub struct Supervisor {
    pub(crate) cfg: Config,
    pub(crate) rotation: RotationPolicy,
    pub(crate) bootstrap: Option<BootstrapPlan>,
    pub(crate) bus: Bus,
    pub(crate) subs: Arc<SubscriberSet>,
    pub(crate) alive: Arc<AliveTracker>,
    pub(crate) launcher: Launcher,
    pub(crate) runtime_token: CancellationToken,
}

impl Supervisor {
    /// Returns a builder; see [`SupervisorBuilder`](crate::SupervisorBuilder).
    pub fn builder(cfg: Config) -> crate::core::builder::SupervisorBuilder {
        crate::core::builder::SupervisorBuilder::new(cfg)
    }

    /// Event bus shared with all workers.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Running-process view maintained from the bus.
    pub fn alive(&self) -> &Arc<AliveTracker> {
        &self.alive
    }

    /// Requests a graceful shutdown, as if a termination signal had arrived.
    pub fn shutdown(&self) {
        self.runtime_token.cancel();
    }

    /// Runs `specs` until a termination signal, [`shutdown`](Self::shutdown),
    /// or every monitor loop ending on its own.
    ///
    /// Returns the per-process [`ShutdownReport`]. Force-killed processes turn
    /// the result into [`RuntimeError::ShutdownTimeout`], which still carries
    /// the full report.
    pub async fn run(&self, specs: Vec<ProcessSpec>) -> Result<ShutdownReport, RuntimeError> {
        let mut signals = ShutdownSignals::install().map_err(RuntimeError::Signal)?;

        let listener_stop = CancellationToken::new();
        let listener = self.subscriber_listener(listener_stop.clone());

        let names: Vec<String> = specs.iter().map(ProcessSpec::name).collect();
        let sinks: Vec<Arc<LogSink>> = specs
            .iter()
            .map(|spec| {
                Arc::new(LogSink::new(
                    spec.name(),
                    spec.log_path(),
                    self.rotation,
                    self.bus.clone(),
                ))
            })
            .collect();

        let rotation = RotationWorker::new(sinks.clone(), self.rotation.check_interval, self.bus.clone());
        let rotation = tokio::spawn(rotation.run(self.runtime_token.child_token()));

        let mut set = JoinSet::new();
        self.spawn_actors(&mut set, specs.iter().cloned().zip(sinks));
        let bootstrap = self.spawn_bootstrap(&specs);

        let result = self.drive_shutdown(&mut set, &mut signals, &names).await;

        self.runtime_token.cancel();
        let _ = rotation.await;
        if let Some(handle) = bootstrap {
            let _ = handle.await;
        }
        listener_stop.cancel();
        let _ = listener.await;
        self.subs.shutdown().await;
        result
    }

    /// Forwards bus events to the alive tracker and the subscriber set.
    ///
    /// On `stop`, drains what is already buffered and exits.
    fn subscriber_listener(&self, stop: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let subs = Arc::clone(&self.subs);
        let alive = Arc::clone(&self.alive);

        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => ev,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event listener lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => break,
                };
                forward(&alive, &subs, &ev).await;
            }
            while let Ok(ev) = rx.try_recv() {
                forward(&alive, &subs, &ev).await;
            }
        })
    }

    fn spawn_actors(
        &self,
        set: &mut JoinSet<(String, StopOutcome)>,
        fleet: impl Iterator<Item = (ProcessSpec, Arc<LogSink>)>,
    ) {
        let params = ProcessActorParams {
            restart: self.cfg.restart,
            backoff: self.cfg.backoff(),
            healthy_uptime: self.cfg.healthy_uptime,
            shutdown_timeout: self.cfg.shutdown_timeout,
        };
        for (spec, sink) in fleet {
            let actor = ProcessActor::new(spec, sink, params.clone(), self.launcher, self.bus.clone());
            let name = actor.name().to_string();
            let child = self.runtime_token.child_token();
            set.spawn(async move { (name, actor.run(child).await) });
        }
    }

    fn spawn_bootstrap(&self, specs: &[ProcessSpec]) -> Option<JoinHandle<()>> {
        let plan = self.bootstrap.as_ref()?;
        let coordinator = BootstrapCoordinator::new(
            plan.cfg.clone(),
            plan.marker.clone(),
            plan.cluster_file.clone(),
            specs,
            Arc::clone(&self.alive),
            self.bus.clone(),
        );
        let token = self.runtime_token.child_token();
        Some(tokio::spawn(async move {
            match coordinator.run(token).await {
                Ok(outcome) => tracing::debug!(?outcome, "bootstrap coordinator finished"),
                Err(err) => tracing::debug!(error = %err, label = err.as_label(), "bootstrap coordinator ended"),
            }
        }))
    }

    /// Waits for a shutdown trigger, then stops the fleet.
    async fn drive_shutdown(
        &self,
        set: &mut JoinSet<(String, StopOutcome)>,
        signals: &mut ShutdownSignals,
        names: &[String],
    ) -> Result<ShutdownReport, RuntimeError> {
        let mut report = ShutdownReport::default();

        let trigger = tokio::select! {
            _ = signals.recv() => Trigger::Signal,
            _ = self.runtime_token.cancelled() => Trigger::Requested,
            _ = join_all(set, &mut report) => Trigger::AllExited,
        };

        if let Trigger::AllExited = trigger {
            fill_missing(&mut report, names);
            return Ok(report);
        }
        if let Trigger::Signal = trigger {
            tracing::debug!("shutdown triggered by signal");
        }

        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.runtime_token.cancel();
        self.wait_all_with_grace(set, report, names).await
    }

    /// Waits for every actor to finish its stop escalation.
    async fn wait_all_with_grace(
        &self,
        set: &mut JoinSet<(String, StopOutcome)>,
        mut report: ShutdownReport,
        names: &[String],
    ) -> Result<ShutdownReport, RuntimeError> {
        let timeout = self.cfg.shutdown_timeout;
        let grace = timeout + GRACE_MARGIN;

        if tokio::time::timeout(grace, join_all(set, &mut report)).await.is_err() {
            set.abort_all();
            let stuck: Vec<String> = names
                .iter()
                .filter(|n| !report.contains(n))
                .cloned()
                .collect();
            self.bus.publish(
                Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
            );
            return Err(RuntimeError::GraceExceeded { grace, stuck });
        }

        fill_missing(&mut report, names);
        let forced = report.forced();
        if forced.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(report)
        } else {
            self.bus.publish(
                Event::new(EventKind::ShutdownTimeout).with_reason(forced.join(",")),
            );
            Err(RuntimeError::ShutdownTimeout {
                timeout,
                forced,
                report,
            })
        }
    }
}

/// Subscriber workers report their own panics and overflows on the bus;
/// handing those back to the set would let a failing subscriber feed itself.
async fn forward(alive: &AliveTracker, subs: &SubscriberSet, ev: &Event) {
    alive.update(ev).await;
    if !ev.is_subscriber_internal() {
        subs.emit(ev);
    }
}

async fn join_all(set: &mut JoinSet<(String, StopOutcome)>, report: &mut ShutdownReport) {
    while let Some(res) = set.join_next().await {
        match res {
            Ok((name, outcome)) => report.insert(name, outcome),
            Err(err) => tracing::error!(error = %err, "process monitor task failed"),
        }
    }
}

/// A monitor that panicked has no entry; record it so the report stays complete.
fn fill_missing(report: &mut ShutdownReport, names: &[String]) {
    for name in names {
        if !report.contains(name) {
            tracing::error!(process = %name, "no stop outcome recorded");
            report.insert(name.clone(), StopOutcome::NotRunning);
        }
    }
}
