//! # fleetvisor
//!
//! **Fleetvisor** is a local multi-process supervisor. It launches a fleet of
//! sibling worker processes (database servers and backup agents) from a
//! declarative process table, restarts them when they exit, rotates their
//! logs and runs the one-time cluster initialization command.
//!
//! The worker binaries themselves are opaque: the supervisor only knows how
//! to start them, watch their exit status and stop them.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ ProcessSpec  │   │ ProcessSpec  │   │ ProcessSpec  │
//!     │  storage#0   │   │  storage#1   │   │   backup#1   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (runtime orchestrator)                                │
//! │  - Bus (broadcast events)                                         │
//! │  - AliveTracker (running pids, sequence ordered)                  │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - RotationWorker (periodic log rollover/retention)               │
//! │  - BootstrapCoordinator (one-shot, gated by marker + quorum)      │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │ ProcessActor │   │ ProcessActor │   │ ProcessActor │   │
//!     │(monitor loop)│   │(monitor loop)│   │(monitor loop)│   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ Launcher ─► child process ─► stdout/stderr ─► LogSink │
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───┬────────────────┬───┘
//!                           ▼                ▼
//!                    AliveTracker     SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Lifecycle
//! ```text
//! FleetConfig ──► prepare_layout() ──► build_table() ──► Supervisor::run()
//!
//! ProcessActor, per process:
//! loop {
//!   ├─► publish ProcessStarting{ attempt }
//!   ├─► Launcher::launch() ──► ProcessRunning{ pid } | SpawnFailed
//!   ├─► wait for exit         ──► ProcessExited{ exit }
//!   ├─► RestartPolicy::{Always, OnFailure, Never} ─► MonitorExhausted, exit
//!   ├─► delay = backoff.next(streak)   (streak resets after healthy_uptime)
//!   ├─► publish RestartScheduled{ delay }
//!   └─► sleep(delay) (cancellable)
//! }
//! on cancel: SIGTERM ─► wait ≤ shutdown_timeout ─► SIGKILL ─► StopOutcome
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                        |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------|
//! | **Process table** | Expand configured groups into one spec per instance.          | [`ProcessSpec`], [`build_table`]          |
//! | **Supervision**   | Launch, monitor, restart and stop the fleet.                  | [`Supervisor`], [`ShutdownReport`]        |
//! | **Policies**      | Restart and backoff strategies.                               | [`RestartPolicy`], [`BackoffPolicy`]      |
//! | **Bootstrap**     | First-time cluster initialization behind a marker file.       | [`BootstrapCoordinator`]                  |
//! | **Logs**          | Size-based rollover with retention.                           | [`LogSink`], [`RotationPolicy`]           |
//! | **Subscriber API**| Hook into lifecycle events.                                   | [`Subscribe`], [`LogWriter`]              |
//! | **Configuration** | TOML file with validation.                                    | [`FleetConfig`]                           |
//! | **Errors**        | Typed errors with stable labels.                              | [`ProcessError`], [`RuntimeError`]        |
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fleetvisor::{Config, LogWriter, ProcessClass, ProcessSpec, Subscribe, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.shutdown_timeout = Duration::from_secs(10);
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let sup = Supervisor::builder(cfg).with_subscribers(subs).build();
//!
//!     let spec = ProcessSpec::builder(ProcessClass::Storage, 0, "/usr/sbin/fdbserver")
//!         .port(4500)
//!         .args(["--listen_address", "public"])
//!         .data_dir("/var/lib/fleet/data/4500")
//!         .log_dir("/var/log/fleet")
//!         .build();
//!
//!     // Runs until SIGINT/SIGTERM/SIGQUIT.
//!     let report = sup.run(vec![spec]).await?;
//!     for (name, outcome) in report.iter() {
//!         println!("{name}: {outcome:?}");
//!     }
//!     Ok(())
//! }
//! ```

mod bootstrap;
mod config;
mod core;
mod error;
mod events;
mod logs;
mod policies;
mod process;
mod subscribers;

// ---- Public re-exports ----

pub use bootstrap::{
    BootstrapCoordinator, BootstrapOutcome, ClusterBootstrapMarker, Layout, LayoutError,
    cluster_descriptor, prepare_layout,
};
pub use config::{
    BootstrapConfig, ClusterConfig, Config, ConfigError, FleetConfig, LayoutConfig, ProcessGroup,
};
pub use core::{
    AliveTracker, ProcessActor, ProcessActorParams, ShutdownReport, Supervisor, SupervisorBuilder,
};
pub use error::{BootstrapError, LogError, ProcessError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use logs::{LogSink, RotationPolicy, RotationWorker};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use process::{
    ExitOutcome, LOCALITY_ENV_PREFIX, Launcher, ProcessClass, ProcessHandle, ProcessSpec,
    ProcessSpecBuilder, StopOutcome, build_table, ensure_private_dir,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
