//! # BootstrapCoordinator: one-shot cluster initialization.
//!
//! Runs as a single task next to the monitor loops. It never launches or
//! stops managed processes; it only watches the [`AliveTracker`] until
//! enough server processes are running and then drives the admin command.
//!
//! ## Rules
//! - Nothing happens unless the marker is present at start
//! - The marker is removed only after the command succeeded (or reported
//!   that the database already exists)
//! - At most `max_attempts` commands per supervisor run; the marker is kept
//!   when the budget is spent, so the next start tries again
//! - Every wait (quorum, command, retry delay) is bounded and cancellable

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::bootstrap::ClusterBootstrapMarker;
use crate::config::BootstrapConfig;
use crate::core::AliveTracker;
use crate::error::BootstrapError;
use crate::events::{Bus, Event, EventKind};
use crate::process::{ExitOutcome, ProcessSpec, render};

/// How a coordinator run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Marker absent (or bootstrap disabled); nothing to do.
    Skipped,
    /// The admin command succeeded and the marker was consumed.
    Initialized,
}

/// Drives the first-time initialization command.
pub struct BootstrapCoordinator {
    cfg: BootstrapConfig,
    marker: ClusterBootstrapMarker,
    cluster_file: PathBuf,
    servers: Vec<String>,
    alive: Arc<AliveTracker>,
    bus: Bus,
}

impl BootstrapCoordinator {
    /// `specs` is the full table; only server classes count towards the quorum.
    pub fn new(
        cfg: BootstrapConfig,
        marker: ClusterBootstrapMarker,
        cluster_file: impl Into<PathBuf>,
        specs: &[ProcessSpec],
        alive: Arc<AliveTracker>,
        bus: Bus,
    ) -> Self {
        let servers = specs
            .iter()
            .filter(|s| s.class().is_server())
            .map(ProcessSpec::name)
            .collect();
        Self {
            cfg,
            marker,
            cluster_file: cluster_file.into(),
            servers,
            alive,
            bus,
        }
    }

    /// Number of running servers required before the command runs.
    pub fn required_quorum(&self) -> usize {
        self.cfg.required_quorum(self.servers.len())
    }

    /// Runs the bootstrap to completion, exhaustion or cancellation.
    pub async fn run(self, token: CancellationToken) -> Result<BootstrapOutcome, BootstrapError> {
        if !self.cfg.enabled {
            self.bus
                .publish(Event::new(EventKind::BootstrapSkipped).with_reason("disabled"));
            return Ok(BootstrapOutcome::Skipped);
        }
        if !self.marker.is_present().await? {
            self.bus.publish(
                Event::new(EventKind::BootstrapSkipped).with_path(self.marker.path()),
            );
            return Ok(BootstrapOutcome::Skipped);
        }

        let max_attempts = self.cfg.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.attempt(attempt, &token).await {
                Ok(()) => {
                    self.marker.consume().await?;
                    self.bus.publish(
                        Event::new(EventKind::BootstrapSucceeded)
                            .with_attempt(attempt)
                            .with_path(self.marker.path()),
                    );
                    return Ok(BootstrapOutcome::Initialized);
                }
                Err(BootstrapError::Canceled) => return Err(BootstrapError::Canceled),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                self.bus.publish(
                    Event::new(EventKind::BootstrapFailed)
                        .with_attempt(attempt)
                        .with_reason(err.to_string()),
                );
                self.bus.publish(
                    Event::new(EventKind::BootstrapAbandoned)
                        .with_attempt(attempt)
                        .with_reason(err.as_label()),
                );
                return Err(err);
            }

            let delay = self.cfg.retry.next(attempt - 1);
            self.bus.publish(
                Event::new(EventKind::BootstrapFailed)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(err.to_string()),
            );

            select! {
                _ = time::sleep(delay) => {}
                _ = token.cancelled() => return Err(BootstrapError::Canceled),
            }
        }
    }

    async fn attempt(&self, attempt: u32, token: &CancellationToken) -> Result<(), BootstrapError> {
        self.wait_quorum(token).await?;
        self.bus
            .publish(Event::new(EventKind::BootstrapStarted).with_attempt(attempt));

        select! {
            res = self.run_command() => res,
            _ = token.cancelled() => Err(BootstrapError::Canceled),
        }
    }

    async fn wait_quorum(&self, token: &CancellationToken) -> Result<(), BootstrapError> {
        let required = self.required_quorum();
        if required == 0 {
            return Ok(());
        }

        let servers = &self.servers;
        let count = |running: &BTreeMap<String, u32>| {
            servers.iter().filter(|s| running.contains_key(*s)).count()
        };

        let waited = self.cfg.quorum_timeout;
        let reached = select! {
            ok = self.alive.wait_for(waited, |running| count(running) >= required) => ok,
            _ = token.cancelled() => return Err(BootstrapError::Canceled),
        };
        if reached {
            return Ok(());
        }

        Err(BootstrapError::QuorumTimeout {
            required,
            running: count(&self.alive.running().await),
            waited,
        })
    }

    /// Runs the admin command once. The child is killed if it outlives the timeout.
    async fn run_command(&self) -> Result<(), BootstrapError> {
        let mut vars = BTreeMap::new();
        vars.insert("target", self.cfg.target.clone());
        vars.insert("cluster_file", self.cluster_file.display().to_string());

        let child = Command::new(&self.cfg.command)
            .args(self.cfg.args.iter().map(|a| render(a, &vars)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BootstrapError::Spawn {
                command: self.cfg.command.clone(),
                source,
            })?;

        let output = match time::timeout(self.cfg.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(BootstrapError::Spawn {
                    command: self.cfg.command.clone(),
                    source,
                });
            }
            Err(_elapsed) => return Err(BootstrapError::CommandTimeout(self.cfg.timeout)),
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = text.trim();

        if output.status.success() || self.accepts(text) {
            tracing::debug!(output = text, "bootstrap command output");
            return Ok(());
        }
        Err(BootstrapError::CommandFailed {
            status: ExitOutcome::from(output.status).to_string(),
            output: text.to_string(),
        })
    }

    fn accepts(&self, output: &str) -> bool {
        self.cfg
            .accept_output
            .iter()
            .any(|p| !p.is_empty() && output.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::BackoffPolicy;
    use crate::process::ProcessClass;
    use std::time::Duration;

    fn specs() -> Vec<ProcessSpec> {
        vec![
            ProcessSpec::builder(ProcessClass::Storage, 0, "/bin/true").build(),
            ProcessSpec::builder(ProcessClass::Storage, 1, "/bin/true").build(),
            ProcessSpec::builder(ProcessClass::Backup, 1, "/bin/true").build(),
        ]
    }

    fn cfg(script: &str) -> BootstrapConfig {
        BootstrapConfig {
            command: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into(), "sh".into(), "{target}".into()],
            target: "configure new single memory".into(),
            timeout: Duration::from_secs(5),
            quorum_timeout: Duration::from_secs(5),
            max_attempts: 2,
            retry: BackoffPolicy::fixed(Duration::from_millis(10)),
            ..BootstrapConfig::default()
        }
    }

    async fn running(alive: &AliveTracker) {
        for (name, pid) in [("storage#0", 100), ("storage#1", 101)] {
            alive
                .update(&Event::new(EventKind::ProcessRunning).with_process(name).with_pid(pid))
                .await;
        }
    }

    async fn setup(script: &str) -> (tempfile::TempDir, ClusterBootstrapMarker, BootstrapCoordinator) {
        let tmp = tempfile::tempdir().unwrap();
        let marker = ClusterBootstrapMarker::new(tmp.path().join(".first_startup"));
        marker.create().await.unwrap();

        let alive = Arc::new(AliveTracker::new());
        running(&alive).await;
        let coord = BootstrapCoordinator::new(
            cfg(script),
            marker.clone(),
            tmp.path().join("fdb.cluster"),
            &specs(),
            alive,
            Bus::new(64),
        );
        (tmp, marker, coord)
    }

    #[tokio::test]
    async fn test_success_consumes_marker() {
        let (_tmp, marker, coord) = setup(r#"test "$1" = "configure new single memory""#).await;
        assert_eq!(coord.required_quorum(), 2);

        let outcome = coord.run(CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, BootstrapOutcome::Initialized);
        assert!(!marker.is_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_keeps_marker() {
        let (_tmp, marker, coord) = setup("echo boom >&2; exit 1").await;

        let err = coord.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "bootstrap_command_failed");
        assert!(marker.is_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_already_exists_counts_as_success() {
        let (_tmp, marker, coord) = setup("echo 'ERROR: Database already exists'; exit 1").await;

        let outcome = coord.run(CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, BootstrapOutcome::Initialized);
        assert!(!marker.is_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_absent_marker_skips() {
        let (_tmp, marker, coord) = setup("exit 1").await;
        marker.consume().await.unwrap();

        let outcome = coord.run(CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, BootstrapOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_quorum_timeout_keeps_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = ClusterBootstrapMarker::new(tmp.path().join(".first_startup"));
        marker.create().await.unwrap();

        let mut cfg = cfg("exit 0");
        cfg.quorum_timeout = Duration::from_millis(20);
        cfg.max_attempts = 1;
        let coord = BootstrapCoordinator::new(
            cfg,
            marker.clone(),
            tmp.path().join("fdb.cluster"),
            &specs(),
            Arc::new(AliveTracker::new()),
            Bus::new(64),
        );

        let err = coord.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::QuorumTimeout { required: 2, running: 0, .. }
        ));
        assert!(marker.is_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let (_tmp, marker, coord) = setup("sleep 30").await;
        let coord = BootstrapCoordinator {
            cfg: BootstrapConfig {
                timeout: Duration::from_millis(50),
                max_attempts: 1,
                ..coord.cfg.clone()
            },
            ..coord
        };

        let err = coord.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "bootstrap_command_timeout");
        assert!(marker.is_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_during_quorum_wait() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = ClusterBootstrapMarker::new(tmp.path().join(".first_startup"));
        marker.create().await.unwrap();
        let coord = BootstrapCoordinator::new(
            cfg("exit 0"),
            marker,
            tmp.path().join("fdb.cluster"),
            &specs(),
            Arc::new(AliveTracker::new()),
            Bus::new(64),
        );

        let token = CancellationToken::new();
        token.cancel();
        let err = coord.run(token).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Canceled));
    }
}
