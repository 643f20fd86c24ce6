use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;

use crate::error::BootstrapError;

/// Filesystem flag: present until the cluster has been initialized.
///
/// The marker is created together with a fresh cluster descriptor and
/// removed only after the initialization command succeeded, so a failed
/// or interrupted bootstrap is retried on the next start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterBootstrapMarker {
    path: PathBuf,
}

impl ClusterBootstrapMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_present(&self) -> Result<bool, BootstrapError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.err(source)),
        }
    }

    /// Creates the marker; an existing marker is left as is.
    pub async fn create(&self) -> Result<(), BootstrapError> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .await
            .map(drop)
            .map_err(|source| self.err(source))
    }

    /// Removes the marker. Returns `false` if it was already gone.
    pub async fn consume(&self) -> Result<bool, BootstrapError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.err(source)),
        }
    }

    fn err(&self, source: std::io::Error) -> BootstrapError {
        BootstrapError::Marker {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_consumed_at_most_once() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = ClusterBootstrapMarker::new(tmp.path().join(".first_startup"));

        assert!(!marker.is_present().await.unwrap());
        marker.create().await.unwrap();
        marker.create().await.unwrap();
        assert!(marker.is_present().await.unwrap());

        assert!(marker.consume().await.unwrap());
        assert!(!marker.consume().await.unwrap());
        assert!(!marker.is_present().await.unwrap());
    }
}
