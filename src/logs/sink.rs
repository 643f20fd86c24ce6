//! # LogSink: one size-bounded log file per managed process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::LogError;
use crate::events::{Bus, Event, EventKind};
use crate::logs::RotationPolicy;

/// Mutable state guarded by the sink lock.
struct SinkState {
    file: Option<File>,
    size: u64,
}

/// Append-only log file with size-based rollover and retention.
///
/// ### Rules
/// - All writes, rotations and prunes for one file happen under one lock.
/// - A write that brings the size to `rollover_size` or beyond triggers
///   **exactly one** rotation, after the write completes.
/// - After each rotation, rotated files are deleted oldest-first while their
///   total size exceeds `retention_size` (`0` = keep everything).
pub struct LogSink {
    process: Arc<str>,
    path: PathBuf,
    policy: RotationPolicy,
    bus: Bus,
    state: Mutex<SinkState>,
}

impl LogSink {
    /// Creates a sink; the file is opened lazily on first write.
    pub fn new(
        process: impl Into<Arc<str>>,
        path: impl Into<PathBuf>,
        policy: RotationPolicy,
        bus: Bus,
    ) -> Self {
        Self {
            process: process.into(),
            path: path.into(),
            policy,
            bus,
            state: Mutex::new(SinkState {
                file: None,
                size: 0,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the live file as tracked by the sink.
    pub async fn size(&self) -> u64 {
        self.state.lock().await.size
    }

    /// Appends `buf`, rotating afterwards if the threshold was reached.
    pub async fn write(&self, buf: &[u8]) -> Result<(), LogError> {
        let mut state = self.state.lock().await;
        let file = self.open_locked(&mut state).await?;
        file.write_all(buf)
            .await
            .map_err(|e| LogError::io(&self.path, e))?;
        state.size += buf.len() as u64;

        if self.policy.should_rotate(state.size) {
            self.rotate_locked(&mut state).await?;
        }
        Ok(())
    }

    /// Like [`write`](Self::write) but publishes failures instead of returning them.
    pub(crate) async fn write_reported(&self, buf: &[u8]) {
        if let Err(err) = self.write(buf).await {
            self.bus.publish(
                Event::new(EventKind::LogFailed)
                    .with_process(Arc::clone(&self.process))
                    .with_reason(err.to_string()),
            );
        }
    }

    /// Re-synchronizes with the file on disk and applies rotation and retention.
    ///
    /// Picks up growth the sink did not write itself (and a file that was
    /// removed or truncated behind its back).
    pub async fn enforce(&self) -> Result<(), LogError> {
        let mut state = self.state.lock().await;
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => state.size = meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                state.file = None;
                state.size = 0;
            }
            Err(e) => return Err(LogError::io(&self.path, e)),
        }

        if self.policy.should_rotate(state.size) {
            self.rotate_locked(&mut state).await
        } else {
            self.prune().await
        }
    }

    /// Forces a rollover of the live file, if it has any content.
    pub async fn rotate(&self) -> Result<(), LogError> {
        let mut state = self.state.lock().await;
        if state.size == 0 {
            return Ok(());
        }
        self.rotate_locked(&mut state).await
    }

    /// Rotated files of this sink, oldest first, as `(generation, path, size)`.
    pub async fn rotated_files(&self) -> Result<Vec<(u64, PathBuf, u64)>, LogError> {
        let Some(dir) = self.path.parent() else {
            return Ok(Vec::new());
        };
        let Some(base) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{base}.");

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LogError::io(dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LogError::io(dir, e))?
        {
            let name = entry.file_name();
            let Some(generation) = name
                .to_str()
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|g| g.parse::<u64>().ok())
            else {
                continue;
            };
            let len = entry
                .metadata()
                .await
                .map_err(|e| LogError::io(entry.path(), e))?
                .len();
            files.push((generation, entry.path(), len));
        }
        files.sort_unstable_by_key(|(generation, _, _)| *generation);
        Ok(files)
    }

    async fn open_locked<'a>(&self, state: &'a mut SinkState) -> Result<&'a mut File, LogError> {
        if state.file.is_none() {
            if let Some(dir) = self.path.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| LogError::io(dir, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| LogError::io(&self.path, e))?;
            state.size = file
                .metadata()
                .await
                .map_err(|e| LogError::io(&self.path, e))?
                .len();
            state.file = Some(file);
        }
        state
            .file
            .as_mut()
            .ok_or_else(|| LogError::io(&self.path, std::io::ErrorKind::NotFound.into()))
    }

    async fn rotate_locked(&self, state: &mut SinkState) -> Result<(), LogError> {
        if let Some(mut file) = state.file.take() {
            file.flush()
                .await
                .map_err(|e| LogError::io(&self.path, e))?;
        }

        let generation = self
            .rotated_files()
            .await?
            .last()
            .map_or(1, |(g, _, _)| g + 1);
        let rotated = rotated_path(&self.path, generation);
        tokio::fs::rename(&self.path, &rotated)
            .await
            .map_err(|e| LogError::io(&self.path, e))?;
        state.size = 0;

        self.bus.publish(
            Event::new(EventKind::LogRotated)
                .with_process(Arc::clone(&self.process))
                .with_path(&rotated),
        );

        self.prune().await
    }

    /// Deletes the oldest rotated files until the total fits the retention budget.
    async fn prune(&self) -> Result<(), LogError> {
        if self.policy.retention_size == 0 {
            return Ok(());
        }
        let files = self.rotated_files().await?;
        let mut total: u64 = files.iter().map(|(_, _, len)| len).sum();

        for (_, path, len) in files {
            if total <= self.policy.retention_size {
                break;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LogError::io(&path, e)),
            }
            total = total.saturating_sub(len);
            self.bus.publish(
                Event::new(EventKind::LogPruned)
                    .with_process(Arc::clone(&self.process))
                    .with_path(&path),
            );
        }
        Ok(())
    }
}

fn rotated_path(path: &Path, generation: u64) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{generation:06}"));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(dir: &Path, rollover: u64, retention: u64) -> LogSink {
        LogSink::new(
            "storage#0",
            dir.join("storage-0.log"),
            RotationPolicy {
                rollover_size: rollover,
                retention_size: retention,
                ..RotationPolicy::default()
            },
            Bus::new(64),
        )
    }

    #[tokio::test]
    async fn test_one_rotation_per_crossing() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink(tmp.path(), 100, 0);

        sink.write(&[b'a'; 60]).await.unwrap();
        assert!(sink.rotated_files().await.unwrap().is_empty());

        sink.write(&[b'b'; 60]).await.unwrap();
        assert_eq!(sink.rotated_files().await.unwrap().len(), 1);
        assert_eq!(sink.size().await, 0);

        sink.write(&[b'c'; 30]).await.unwrap();
        let rotated = sink.rotated_files().await.unwrap();
        assert_eq!(rotated.len(), 1);
        assert_eq!(rotated[0].2, 120);
        assert_eq!(sink.size().await, 30);
    }

    #[tokio::test]
    async fn test_single_large_write_rotates_once() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink(tmp.path(), 10, 0);

        sink.write(&[b'x'; 1000]).await.unwrap();
        assert_eq!(sink.rotated_files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retention_bounds_rotated_total() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink(tmp.path(), 100, 250);

        for _ in 0..10 {
            sink.write(&[b'z'; 100]).await.unwrap();
            let total: u64 = sink
                .rotated_files()
                .await
                .unwrap()
                .iter()
                .map(|(_, _, len)| len)
                .sum();
            assert!(total <= 250, "rotated total {total} exceeds retention");
        }

        let rotated = sink.rotated_files().await.unwrap();
        assert_eq!(rotated.len(), 2);
        // The newest generations survive.
        assert_eq!(rotated[0].0, 9);
        assert_eq!(rotated[1].0, 10);
    }

    #[tokio::test]
    async fn test_zero_retention_keeps_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink(tmp.path(), 10, 0);

        for _ in 0..5 {
            sink.write(&[b'q'; 10]).await.unwrap();
        }
        assert_eq!(sink.rotated_files().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_enforce_picks_up_external_growth() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink(tmp.path(), 50, 0);

        sink.write(b"hello\n").await.unwrap();
        std::fs::write(sink.path(), vec![b'e'; 80]).unwrap();

        sink.enforce().await.unwrap();
        assert_eq!(sink.rotated_files().await.unwrap().len(), 1);
        assert_eq!(sink.size().await, 0);

        sink.write(b"after\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "after\n");
    }

    #[tokio::test]
    async fn test_rotation_events_published() {
        let tmp = tempfile::tempdir().unwrap();
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let sink = LogSink::new(
            "backup#1",
            tmp.path().join("backup-1.log"),
            RotationPolicy {
                rollover_size: 10,
                retention_size: 15,
                ..RotationPolicy::default()
            },
            bus,
        );

        sink.write(&[b'a'; 10]).await.unwrap();
        sink.write(&[b'b'; 10]).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        assert_eq!(
            kinds,
            vec![EventKind::LogRotated, EventKind::LogRotated, EventKind::LogPruned]
        );
    }
}
