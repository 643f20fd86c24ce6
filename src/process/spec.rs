//! # Process specification.
//!
//! A [`ProcessSpec`] describes one managed instance: its class, numeric id,
//! optional listen port, command line, environment and directories. Specs
//! are built once at startup (see [`build_table`](crate::process::build_table))
//! and never change afterwards; every relaunch uses the same spec.
//!
//! ## Example
//! ```rust
//! use fleetvisor::{ProcessClass, ProcessSpec};
//!
//! let spec = ProcessSpec::builder(ProcessClass::Storage, 0, "/usr/sbin/fdbserver")
//!     .arg("--listen_address=127.0.0.1:4500")
//!     .port(4500)
//!     .data_dir("/var/lib/fleet/4500")
//!     .log_dir("/var/log/fleet")
//!     .build();
//!
//! assert_eq!(spec.name(), "storage#0");
//! assert_eq!(spec.log_path().to_str(), Some("/var/log/fleet/storage-0.log"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Role tag of a managed process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessClass {
    Storage,
    Transaction,
    Stateless,
    Backup,
}

impl ProcessClass {
    /// Database server processes count towards the bootstrap quorum; backup agents do not.
    pub fn is_server(&self) -> bool {
        !matches!(self, ProcessClass::Backup)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessClass::Storage => "storage",
            ProcessClass::Transaction => "transaction",
            ProcessClass::Stateless => "stateless",
            ProcessClass::Backup => "backup",
        }
    }
}

impl fmt::Display for ProcessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one managed process instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSpec {
    class: ProcessClass,
    id: u32,
    port: Option<u16>,
    command: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    data_dir: Option<PathBuf>,
    log_dir: PathBuf,
    working_dir: Option<PathBuf>,
}

impl ProcessSpec {
    /// Starts a builder for `class#id` running `command`.
    pub fn builder(
        class: ProcessClass,
        id: u32,
        command: impl Into<PathBuf>,
    ) -> ProcessSpecBuilder {
        ProcessSpecBuilder {
            spec: ProcessSpec {
                class,
                id,
                port: None,
                command: command.into(),
                args: Vec::new(),
                env: BTreeMap::new(),
                data_dir: None,
                log_dir: PathBuf::from("."),
                working_dir: None,
            },
        }
    }

    /// Unique name: `<class>#<id>`.
    pub fn name(&self) -> String {
        format!("{}#{}", self.class, self.id)
    }

    /// Filesystem-friendly name: `<class>-<id>`.
    pub fn stem(&self) -> String {
        format!("{}-{}", self.class, self.id)
    }

    pub fn class(&self) -> ProcessClass {
        self.class
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Per-instance data directory, if the process keeps state.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Shared log directory.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Working directory of the child; defaults to the data directory.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref().or(self.data_dir.as_deref())
    }

    /// File the supervisor captures stdout/stderr into.
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.stem()))
    }
}

/// Fluent builder for [`ProcessSpec`].
#[derive(Clone, Debug)]
pub struct ProcessSpecBuilder {
    spec: ProcessSpec,
}

impl ProcessSpecBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.spec.port = Some(port);
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.spec.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.env.insert(key.into(), value.into());
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.data_dir = Some(dir.into());
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.log_dir = dir.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.working_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> ProcessSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        let spec = ProcessSpec::builder(ProcessClass::Backup, 1, "backup_agent").build();
        assert_eq!(spec.name(), "backup#1");
        assert_eq!(spec.stem(), "backup-1");
        assert!(!spec.class().is_server());
    }

    #[test]
    fn test_working_dir_defaults_to_data_dir() {
        let spec = ProcessSpec::builder(ProcessClass::Storage, 0, "fdbserver")
            .data_dir("/data/4500")
            .build();
        assert_eq!(spec.working_dir(), Some(Path::new("/data/4500")));

        let spec = ProcessSpec::builder(ProcessClass::Storage, 0, "fdbserver")
            .data_dir("/data/4500")
            .working_dir("/tmp")
            .build();
        assert_eq!(spec.working_dir(), Some(Path::new("/tmp")));
    }
}
