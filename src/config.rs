//! # Configuration.
//!
//! The supervisor is driven by one TOML file, parsed once at startup into a
//! [`FleetConfig`] and validated before anything is launched.
//!
//! ```toml
//! [supervisor]
//! restart = "always"          # never | on-failure | always
//! restart_delay = "5s"
//! shutdown_timeout = "120s"
//!
//! [layout]
//! data_dir = "/var/lib/fleetvisor"
//! log_dir = "/var/log/fleetvisor"
//! cluster_file = "/etc/fleetvisor/fdb.cluster"
//!
//! [cluster]
//! description = "fleet"
//! coordinator = "127.0.0.1:4500"
//!
//! [locality]
//! machine_id = "m1"
//! zone_id = "z1"
//!
//! [logs]
//! rollover_size = 10485760
//! retention_size = 104857600
//!
//! [bootstrap]
//! command = "/usr/bin/fdbcli"
//! target = "configure new single ssd"
//!
//! [[process]]
//! class = "storage"
//! command = "/usr/sbin/fdbserver"
//! args = ["--cluster_file={cluster_file}", "--public_address=127.0.0.1:{port}",
//!         "--listen_address=public", "--datadir={data_dir}", "--logdir={log_dir}"]
//! count = 2
//! base_port = 4500
//! ```
//!
//! ## Sentinel values
//! - `logs.rollover_size = 0` → never roll over
//! - `logs.retention_size = 0` → keep every rotated file
//! - `bootstrap.quorum` absent → every server process must be running

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logs::RotationPolicy;
use crate::policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
use crate::process::ProcessClass;

/// Errors raised while loading or validating configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config validation failed: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Validation(_) => "config_validation",
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

/// Complete configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    pub supervisor: Config,
    pub layout: LayoutConfig,
    pub cluster: ClusterConfig,
    /// Locality tags exported to every child as `FLEET_LOCALITY_<KEY>`.
    pub locality: BTreeMap<String, String>,
    pub logs: RotationPolicy,
    pub bootstrap: BootstrapConfig,
    #[serde(rename = "process")]
    pub processes: Vec<ProcessGroup>,
}

impl FleetConfig {
    /// Reads, parses and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Self::from_file(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and parses a TOML file without validating it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses a TOML string without validating it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Runs every field-level validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.supervisor.validate()?;
        self.layout.validate()?;
        validate_rotation(&self.logs)?;
        validate_processes(&self.processes)?;
        let servers = self
            .processes
            .iter()
            .filter(|g| g.class.is_server())
            .map(|g| g.count as usize)
            .sum();
        self.bootstrap.validate(servers)?;
        Ok(())
    }
}

/// Supervisor runtime settings (`[supervisor]`).
///
/// ## Field semantics
/// - `restart`: relaunch policy for every managed process
/// - `restart_delay`: delay before a relaunch (first step of the backoff)
/// - `backoff_factor`: growth per consecutive relaunch (`1.0` = fixed delay)
/// - `backoff_max`: cap for the relaunch delay
/// - `jitter`: randomization of the relaunch delay
/// - `healthy_uptime`: a run at least this long resets the backoff streak
/// - `shutdown_timeout`: SIGTERM → SIGKILL escalation window per process
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub restart: RestartPolicy,
    #[serde(with = "humantime_serde")]
    pub restart_delay: Duration,
    pub backoff_factor: f64,
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
    pub jitter: JitterPolicy,
    #[serde(with = "humantime_serde")]
    pub healthy_uptime: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    pub bus_capacity: usize,
}

impl Default for Config {
    /// - `restart = always`, `restart_delay = 5s`, `backoff_factor = 1.0`, `backoff_max = 5m`
    /// - `healthy_uptime = 60s`, `shutdown_timeout = 120s`, `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            restart: RestartPolicy::Always,
            restart_delay: Duration::from_secs(5),
            backoff_factor: 1.0,
            backoff_max: Duration::from_secs(300),
            jitter: JitterPolicy::None,
            healthy_uptime: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(120),
            bus_capacity: 1024,
        }
    }
}

impl Config {
    /// Backoff policy assembled from the relaunch fields.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: self.restart_delay,
            max: self.backoff_max,
            factor: self.backoff_factor,
            jitter: self.jitter,
        }
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Validates `backoff_factor`, `backoff_max` and `shutdown_timeout`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(invalid(format!(
                "supervisor.backoff_factor must be a finite number >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.backoff_max < self.restart_delay {
            return Err(invalid(
                "supervisor.backoff_max must not be shorter than supervisor.restart_delay",
            ));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(invalid("supervisor.shutdown_timeout must be positive"));
        }
        Ok(())
    }
}

/// Filesystem layout (`[layout]`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Root holding one subdirectory per process instance.
    pub data_dir: PathBuf,
    /// Directory shared by all process logs.
    pub log_dir: PathBuf,
    /// Cluster descriptor, created once and never overwritten.
    pub cluster_file: PathBuf,
    /// Bootstrap marker; defaults to `<data_dir>/.first_startup`.
    pub marker_file: Option<PathBuf>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/fleetvisor"),
            log_dir: PathBuf::from("/var/log/fleetvisor"),
            cluster_file: PathBuf::from("/etc/fleetvisor/fdb.cluster"),
            marker_file: None,
        }
    }
}

impl LayoutConfig {
    pub fn marker_path(&self) -> PathBuf {
        self.marker_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(".first_startup"))
    }

    /// Every configured path must be absolute.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let marker = self.marker_path();
        for (field, path) in [
            ("layout.data_dir", &self.data_dir),
            ("layout.log_dir", &self.log_dir),
            ("layout.cluster_file", &self.cluster_file),
            ("layout.marker_file", &marker),
        ] {
            if !path.is_absolute() {
                return Err(invalid(format!("{field} must be absolute, got {path:?}")));
            }
        }
        Ok(())
    }
}

/// Cluster identity written into a freshly created descriptor (`[cluster]`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    /// Alphanumeric/underscore description prefix.
    pub description: String,
    /// `host:port` of the coordinator.
    pub coordinator: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            description: "fleet".to_string(),
            coordinator: "127.0.0.1:4500".to_string(),
        }
    }
}

/// One-shot cluster initialization (`[bootstrap]`).
///
/// `args` may contain `{target}` and `{cluster_file}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    pub enabled: bool,
    pub command: PathBuf,
    pub args: Vec<String>,
    /// Target description handed to the admin command.
    pub target: String,
    /// Timeout for one run of the admin command.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Server processes that must be running first (`None` = all).
    pub quorum: Option<usize>,
    /// How long one attempt waits for the quorum.
    #[serde(with = "humantime_serde")]
    pub quorum_timeout: Duration,
    /// Attempts per supervisor run before giving up until the next start.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub retry: BackoffPolicy,
    /// Output fragments that mean "already initialized"; treated as success.
    pub accept_output: Vec<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: PathBuf::from("fdbcli"),
            args: vec![
                "-C".to_string(),
                "{cluster_file}".to_string(),
                "--exec".to_string(),
                "{target}".to_string(),
            ],
            target: "configure new single ssd".to_string(),
            timeout: Duration::from_secs(60),
            quorum: None,
            quorum_timeout: Duration::from_secs(300),
            max_attempts: 5,
            retry: BackoffPolicy {
                first: Duration::from_secs(5),
                max: Duration::from_secs(300),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            accept_output: vec!["Database already exists".to_string()],
        }
    }
}

impl BootstrapConfig {
    /// Quorum to wait for, given the number of configured server processes.
    pub fn required_quorum(&self, servers: usize) -> usize {
        self.quorum.unwrap_or(servers).min(servers)
    }

    /// Validates quorum bounds and attempt budget against `servers`.
    pub fn validate(&self, servers: usize) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.max_attempts == 0 {
            return Err(invalid("bootstrap.max_attempts must be at least 1"));
        }
        if servers == 0 {
            return Err(invalid("bootstrap is enabled but no server process is configured"));
        }
        match self.quorum {
            Some(0) => Err(invalid("bootstrap.quorum must be at least 1")),
            Some(q) if q > servers => Err(invalid(format!(
                "bootstrap.quorum {q} exceeds the {servers} configured server processes"
            ))),
            _ => Ok(()),
        }
    }
}

/// A group of identical processes (`[[process]]`).
///
/// Instance `i` (0-based) gets id `first_id + i` and port `base_port + i`.
/// `args` may contain `{id}`, `{port}`, `{class}`, `{data_dir}`,
/// `{log_dir}` and `{cluster_file}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessGroup {
    pub class: ProcessClass,
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub first_id: u32,
    #[serde(default)]
    pub base_port: Option<u16>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

const fn default_count() -> u32 {
    1
}

/// `retention_size` must be 0 or hold at least one rotated file.
pub fn validate_rotation(policy: &RotationPolicy) -> Result<(), ConfigError> {
    if policy.retention_size != 0 && policy.retention_size < policy.rollover_size {
        return Err(invalid(format!(
            "logs.retention_size ({}) must be 0 or at least logs.rollover_size ({})",
            policy.retention_size, policy.rollover_size
        )));
    }
    if policy.check_interval.is_zero() {
        return Err(invalid("logs.check_interval must be positive"));
    }
    Ok(())
}

/// Groups must be non-empty, with unique instance names and ports that fit.
pub fn validate_processes(groups: &[ProcessGroup]) -> Result<(), ConfigError> {
    if groups.is_empty() {
        return Err(invalid("at least one [[process]] group is required"));
    }

    let mut names = BTreeSet::new();
    let mut ports = BTreeSet::new();
    for group in groups {
        if group.count == 0 {
            return Err(invalid(format!("{} group has count = 0", group.class)));
        }
        if group.command.as_os_str().is_empty() {
            return Err(invalid(format!("{} group has an empty command", group.class)));
        }
        for i in 0..group.count {
            let id = group
                .first_id
                .checked_add(i)
                .ok_or_else(|| invalid(format!("{} group ids overflow", group.class)))?;
            if !names.insert((group.class, id)) {
                return Err(invalid(format!("duplicate process {}#{id}", group.class)));
            }
            if let Some(base) = group.base_port {
                let port = u16::try_from(u32::from(base) + i).map_err(|_| {
                    invalid(format!("{} group ports exceed 65535", group.class))
                })?;
                if !ports.insert(port) {
                    return Err(invalid(format!("port {port} assigned twice")));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [supervisor]
        restart = "always"
        restart_delay = "2s"
        shutdown_timeout = "30s"

        [layout]
        data_dir = "/srv/fleet/data"
        log_dir = "/srv/fleet/log"
        cluster_file = "/srv/fleet/fdb.cluster"

        [locality]
        machine_id = "m1"

        [logs]
        rollover_size = 1024
        retention_size = 4096

        [bootstrap]
        command = "/usr/bin/fdbcli"
        quorum = 2

        [[process]]
        class = "storage"
        command = "/usr/sbin/fdbserver"
        args = ["--public_address=127.0.0.1:{port}"]
        count = 2
        base_port = 4500

        [[process]]
        class = "backup"
        command = "/usr/lib/backup_agent"
        first_id = 1
    "#;

    #[test]
    fn test_parse_sample() {
        let cfg = FleetConfig::from_toml(SAMPLE).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.supervisor.restart_delay, Duration::from_secs(2));
        assert_eq!(cfg.supervisor.backoff().first, Duration::from_secs(2));
        assert_eq!(cfg.supervisor.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(cfg.logs.rollover_size, 1024);
        assert_eq!(cfg.logs.check_interval, Duration::from_secs(10));
        assert_eq!(cfg.processes.len(), 2);
        assert_eq!(cfg.processes[1].count, 1);
        assert_eq!(cfg.bootstrap.required_quorum(2), 2);
        assert_eq!(
            cfg.layout.marker_path(),
            PathBuf::from("/srv/fleet/data/.first_startup")
        );
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.restart, RestartPolicy::Always);
        assert_eq!(cfg.backoff().next(3), Duration::from_secs(5));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = FleetConfig::from_toml("[supervisor]\nrestart_dealy = \"5s\"").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        let mut cfg = FleetConfig::from_toml(SAMPLE).unwrap();
        cfg.processes.push(ProcessGroup {
            class: ProcessClass::Transaction,
            command: PathBuf::from("/usr/sbin/fdbserver"),
            args: Vec::new(),
            count: 1,
            first_id: 0,
            base_port: Some(4501),
            env: BTreeMap::new(),
            working_dir: None,
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_quorum_bounds() {
        let mut cfg = FleetConfig::from_toml(SAMPLE).unwrap();
        cfg.bootstrap.quorum = Some(3);
        assert!(cfg.validate().is_err());

        cfg.bootstrap.enabled = false;
        cfg.validate().unwrap();
    }

    #[test]
    fn test_retention_smaller_than_rollover_rejected() {
        let policy = RotationPolicy {
            rollover_size: 100,
            retention_size: 50,
            ..RotationPolicy::default()
        };
        assert!(validate_rotation(&policy).is_err());

        let unlimited = RotationPolicy {
            retention_size: 0,
            ..policy
        };
        validate_rotation(&unlimited).unwrap();
    }

    #[test]
    fn test_relative_layout_rejected() {
        let layout = LayoutConfig {
            data_dir: PathBuf::from("data"),
            ..LayoutConfig::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_backoff_factor_below_one_rejected() {
        let cfg = Config {
            backoff_factor: 0.5,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
