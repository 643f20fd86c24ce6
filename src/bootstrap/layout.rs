//! # Data layout preparation.
//!
//! Runs once before the first launch: creates the data and log roots with
//! mode 0700 and, if the cluster descriptor does not exist yet, drops the
//! bootstrap marker and writes the descriptor.
//!
//! ```text
//! descriptor present and non-empty ─► leave both alone
//! otherwise ─► marker.create() ─► write <file>.tmp ─► fsync ─► hard_link(tmp, file)
//! ```
//!
//! The marker goes first and the descriptor appears atomically, so an
//! interrupted setup never leaves a descriptor without a marker. `hard_link`
//! fails if the target exists, so a descriptor is never overwritten, even if
//! two supervisors race on the same path. An empty descriptor can only be a
//! leftover of an interrupted write and is replaced.

use std::io::ErrorKind;
use std::path::PathBuf;

use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::bootstrap::ClusterBootstrapMarker;
use crate::config::{ClusterConfig, LayoutConfig};
use crate::error::{BootstrapError, ProcessError};
use crate::process::ensure_private_dir;

/// Result of [`prepare_layout`].
#[derive(Debug)]
pub struct Layout {
    /// Marker guarding the first-time initialization.
    pub marker: ClusterBootstrapMarker,
    /// Cluster descriptor path.
    pub cluster_file: PathBuf,
    /// True if the descriptor was created by this call.
    pub created_cluster_file: bool,
}

/// Errors from layout preparation reuse the process and bootstrap taxonomies.
#[derive(thiserror::Error, Debug)]
pub enum LayoutError {
    #[error(transparent)]
    Directory(#[from] ProcessError),
    #[error(transparent)]
    Marker(#[from] BootstrapError),
    #[error("failed to write cluster file {path:?}: {source}")]
    ClusterFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Prepares directories, the cluster descriptor and the bootstrap marker.
pub async fn prepare_layout(
    layout: &LayoutConfig,
    cluster: &ClusterConfig,
) -> Result<Layout, LayoutError> {
    ensure_private_dir(&layout.data_dir).await?;
    ensure_private_dir(&layout.log_dir).await?;

    let marker = ClusterBootstrapMarker::new(layout.marker_path());
    let created = if has_descriptor(layout).await? {
        false
    } else {
        marker.create().await?;
        write_cluster_file_once(layout, cluster).await?
    };
    if created {
        tracing::info!(path = ?layout.cluster_file, "created cluster file; bootstrap pending");
    }

    Ok(Layout {
        marker,
        cluster_file: layout.cluster_file.clone(),
        created_cluster_file: created,
    })
}

/// `<description>:<8 random alphanumerics>@<coordinator>`
pub fn cluster_descriptor(cluster: &ClusterConfig) -> String {
    let id: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{}:{}@{}", cluster.description, id, cluster.coordinator)
}

async fn has_descriptor(layout: &LayoutConfig) -> Result<bool, LayoutError> {
    let path = &layout.cluster_file;
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if !contents.trim().is_empty() => Ok(true),
        Ok(_) => {
            tracing::warn!(path = ?path, "empty cluster file left by an interrupted setup; replacing");
            match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(false),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(source) => Err(cluster_file_err(path, source)),
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(cluster_file_err(path, source)),
    }
}

/// Returns `false` if another writer put a descriptor in place first.
async fn write_cluster_file_once(
    layout: &LayoutConfig,
    cluster: &ClusterConfig,
) -> Result<bool, LayoutError> {
    let path = &layout.cluster_file;
    let file_err = |source| cluster_file_err(path, source);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(file_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(&tmp)
        .await
        .map_err(file_err)?;
    let contents = format!("{}\n", cluster_descriptor(cluster));
    let written = async {
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await
    }
    .await;
    drop(file);

    let linked = match written {
        Ok(()) => match tokio::fs::hard_link(&tmp, path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(file_err(e)),
        },
        Err(e) => Err(file_err(e)),
    };
    if let Err(err) = tokio::fs::remove_file(&tmp).await {
        tracing::debug!(path = ?tmp, %err, "could not remove temporary cluster file");
    }
    linked
}

fn cluster_file_err(path: &std::path::Path, source: std::io::Error) -> LayoutError {
    LayoutError::ClusterFile {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn layout(root: &std::path::Path) -> LayoutConfig {
        LayoutConfig {
            data_dir: root.join("data"),
            log_dir: root.join("log"),
            cluster_file: root.join("etc/fdb.cluster"),
            marker_file: None,
        }
    }

    #[tokio::test]
    async fn test_first_prepare_creates_file_and_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = layout(tmp.path());

        let prepared = prepare_layout(&cfg, &ClusterConfig::default()).await.unwrap();
        assert!(prepared.created_cluster_file);
        assert!(prepared.marker.is_present().await.unwrap());

        let contents = std::fs::read_to_string(&cfg.cluster_file).unwrap();
        assert!(contents.starts_with("fleet:"));
        assert!(contents.trim_end().ends_with("@127.0.0.1:4500"));

        let mode = std::fs::metadata(&cfg.data_dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[tokio::test]
    async fn test_existing_cluster_file_never_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = layout(tmp.path());
        std::fs::create_dir_all(cfg.cluster_file.parent().unwrap()).unwrap();
        std::fs::write(&cfg.cluster_file, "prod:abcdefgh@10.0.0.1:4500\n").unwrap();

        let prepared = prepare_layout(&cfg, &ClusterConfig::default()).await.unwrap();
        assert!(!prepared.created_cluster_file);
        assert!(!prepared.marker.is_present().await.unwrap());
        assert_eq!(
            std::fs::read_to_string(&cfg.cluster_file).unwrap(),
            "prod:abcdefgh@10.0.0.1:4500\n"
        );
    }

    #[test]
    fn test_descriptor_shape() {
        let d = cluster_descriptor(&ClusterConfig {
            description: "db".into(),
            coordinator: "10.1.1.1:4500".into(),
        });
        let (desc, rest) = d.split_once(':').unwrap();
        let (id, coord) = rest.split_once('@').unwrap();
        assert_eq!(desc, "db");
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(coord, "10.1.1.1:4500");
    }

    #[tokio::test]
    async fn test_empty_descriptor_from_interrupted_setup_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = layout(tmp.path());
        std::fs::create_dir_all(cfg.cluster_file.parent().unwrap()).unwrap();
        std::fs::write(&cfg.cluster_file, "").unwrap();

        let prepared = prepare_layout(&cfg, &ClusterConfig::default()).await.unwrap();
        assert!(prepared.created_cluster_file);
        assert!(prepared.marker.is_present().await.unwrap());
        let contents = std::fs::read_to_string(&cfg.cluster_file).unwrap();
        assert!(contents.starts_with("fleet:"));
        assert!(!tmp.path().join("etc/fdb.cluster.tmp").exists());
    }

    #[tokio::test]
    async fn test_marker_left_before_descriptor_is_completed_on_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = layout(tmp.path());
        std::fs::create_dir_all(&cfg.data_dir).unwrap();
        std::fs::write(cfg.marker_path(), "").unwrap();
        // stale temporary from a crash mid-write
        std::fs::create_dir_all(cfg.cluster_file.parent().unwrap()).unwrap();
        std::fs::write(tmp.path().join("etc/fdb.cluster.tmp"), "fleet:par").unwrap();

        let prepared = prepare_layout(&cfg, &ClusterConfig::default()).await.unwrap();
        assert!(prepared.created_cluster_file);
        assert!(prepared.marker.is_present().await.unwrap());
        let contents = std::fs::read_to_string(&cfg.cluster_file).unwrap();
        assert!(contents.trim_end().ends_with("@127.0.0.1:4500"));
    }

}
