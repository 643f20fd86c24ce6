use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{alive::AliveTracker, supervisor::BootstrapPlan, supervisor::Supervisor};
use crate::bootstrap::{ClusterBootstrapMarker, Layout};
use crate::config::{BootstrapConfig, Config, FleetConfig};
use crate::events::Bus;
use crate::logs::RotationPolicy;
use crate::process::Launcher;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`Supervisor`] with optional features.
pub struct SupervisorBuilder {
    cfg: Config,
    rotation: RotationPolicy,
    subscribers: Vec<Arc<dyn Subscribe>>,
    bootstrap: Option<BootstrapPlan>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            rotation: RotationPolicy::default(),
            subscribers: Vec::new(),
            bootstrap: None,
        }
    }

    /// Wires a whole fleet configuration plus the prepared layout.
    ///
    /// Bootstrap is attached only when `[bootstrap] enabled = true`.
    pub fn from_fleet(fleet: &FleetConfig, layout: Layout) -> Self {
        let mut builder = Self::new(fleet.supervisor.clone()).with_rotation(fleet.logs);
        if fleet.bootstrap.enabled {
            builder = builder.with_bootstrap(
                fleet.bootstrap.clone(),
                layout.marker,
                layout.cluster_file,
            );
        }
        builder
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (process lifecycle, bootstrap,
    /// log rotation) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the rollover/retention policy shared by every log sink.
    pub fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    /// Enables the one-shot bootstrap coordinator.
    pub fn with_bootstrap(
        mut self,
        cfg: BootstrapConfig,
        marker: ClusterBootstrapMarker,
        cluster_file: impl Into<PathBuf>,
    ) -> Self {
        self.bootstrap = Some(BootstrapPlan {
            cfg,
            marker,
            cluster_file: cluster_file.into(),
        });
        self
    }

    /// Builds the supervisor. Must be called inside a tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));

        Arc::new(Supervisor {
            cfg: self.cfg,
            rotation: self.rotation,
            bootstrap: self.bootstrap,
            bus,
            subs,
            alive: Arc::new(AliveTracker::new()),
            launcher: Launcher::new(),
            runtime_token: CancellationToken::new(),
        })
    }
}
