//! # Launcher: one OS process per spec.
//!
//! ```text
//! launch(spec, sink)
//!   ├─► ensure_private_dir(data_dir)   (0700, only if absent)
//!   ├─► ensure_private_dir(log_dir)
//!   ├─► Command::new(command).args().envs().current_dir()
//!   │        stdin=null, stdout/stderr=piped, kill_on_drop=false,
//!   │        own process group (pgid = pid)
//!   ├─► spawn pump(stdout) ─► sink.write()
//!   ├─► spawn pump(stderr) ─► sink.write()
//!   └─► ProcessHandle { pid, started_at, restart_count }
//! ```

use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::ProcessError;
use crate::logs::LogSink;
use crate::process::{ExitOutcome, ProcessHandle, ProcessSpec};

const PUMP_BUF: usize = 8 * 1024;

/// Creates `path` (and parents) with mode 0700 if it does not exist.
///
/// Existing directories are left untouched, so calling this before every
/// launch is idempotent.
pub async fn ensure_private_dir(path: &Path) -> Result<(), ProcessError> {
    let dir_err = |source| ProcessError::Directory {
        path: path.to_path_buf(),
        source,
    };

    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(dir_err(std::io::Error::new(
                ErrorKind::AlreadyExists,
                "exists and is not a directory",
            )));
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(dir_err(e)),
    }

    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true).mode(0o700);
    builder.create(path).await.map_err(dir_err)?;
    // umask can only narrow the mode; pin the leaf to exactly 0700.
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .await
        .map_err(dir_err)
}

/// Spawns managed processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Launcher;

impl Launcher {
    pub fn new() -> Self {
        Self
    }

    /// Launches `spec`, capturing its output into `sink`.
    ///
    /// `restart_count` and `last_exit` are carried into the returned handle
    /// for observability only.
    pub async fn launch(
        &self,
        spec: &ProcessSpec,
        sink: Arc<LogSink>,
        restart_count: u32,
        last_exit: Option<ExitOutcome>,
    ) -> Result<ProcessHandle, ProcessError> {
        if let Some(dir) = spec.data_dir() {
            ensure_private_dir(dir).await?;
        }
        ensure_private_dir(spec.log_dir()).await?;

        let mut cmd = Command::new(spec.command());
        cmd.args(spec.args())
            .envs(spec.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .process_group(0);
        if let Some(dir) = spec.working_dir() {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: spec.command().to_path_buf(),
            source,
        })?;
        let pid = child.id().ok_or(ProcessError::MissingPid)?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(pump(out, Arc::clone(&sink)));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(pump(err, sink));
        }

        Ok(ProcessHandle::new(
            child,
            pid,
            restart_count,
            last_exit,
            pumps,
        ))
    }
}

/// Copies one child stream into the sink until EOF.
fn pump<R>(mut reader: R, sink: Arc<LogSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; PUMP_BUF];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => sink.write_reported(&buf[..n]).await,
                Err(err) => {
                    tracing::debug!(%err, path = ?sink.path(), "output pump read failed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Bus;
    use crate::logs::RotationPolicy;
    use crate::process::ProcessClass;
    use std::time::Duration;

    fn sink_for(spec: &ProcessSpec) -> Arc<LogSink> {
        Arc::new(LogSink::new(
            spec.name(),
            spec.log_path(),
            RotationPolicy::default(),
            Bus::new(16),
        ))
    }

    #[tokio::test]
    async fn test_launch_creates_private_dirs_and_captures_output() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data/4500");
        let logs = tmp.path().join("logs");
        let spec = ProcessSpec::builder(ProcessClass::Storage, 0, "/bin/sh")
            .args(["-c", "echo hello; echo oops >&2"])
            .data_dir(&data)
            .log_dir(&logs)
            .build();

        let sink = sink_for(&spec);
        let mut handle = Launcher::new()
            .launch(&spec, sink.clone(), 0, None)
            .await
            .unwrap();
        assert!(handle.pid() > 0);

        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome, ExitOutcome::Code(0));

        let mode = std::fs::metadata(&data).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);

        let log = std::fs::read_to_string(spec.log_path()).unwrap();
        assert!(log.contains("hello"));
        assert!(log.contains("oops"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::builder(ProcessClass::Stateless, 1, "/nonexistent/fdbserver")
            .log_dir(tmp.path())
            .build();

        let err = Launcher::new()
            .launch(&spec, sink_for(&spec), 0, None)
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "process_spawn_failed");
    }

    #[tokio::test]
    async fn test_existing_dir_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("shared");
        std::fs::create_dir(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        ensure_private_dir(&dir).await.unwrap();
        ensure_private_dir(&dir).await.unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[tokio::test]
    async fn test_terminate_stops_live_child() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::builder(ProcessClass::Storage, 2, "/bin/sh")
            .args(["-c", "exec sleep 30"])
            .log_dir(tmp.path())
            .build();

        let mut handle = Launcher::new()
            .launch(&spec, sink_for(&spec), 0, None)
            .await
            .unwrap();
        assert!(handle.is_alive());

        let stop = handle.terminate(Duration::from_secs(5)).await;
        assert_eq!(stop, crate::process::StopOutcome::Graceful(ExitOutcome::Signal(15)));
    }

    /// Reaped, or a zombie waiting for whoever inherited it.
    fn is_gone(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    async fn wait_gone(pid: i32) -> bool {
        for _ in 0..100 {
            if is_gone(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_terminate_reaches_forked_helpers() {
        let tmp = tempfile::tempdir().unwrap();
        let pidfile = tmp.path().join("helper.pid");
        let script = format!(
            "sleep 30 >/dev/null 2>&1 & echo $! > {}; wait",
            pidfile.display()
        );
        let spec = ProcessSpec::builder(ProcessClass::Storage, 3, "/bin/sh")
            .args(["-c", script.as_str()])
            .log_dir(tmp.path())
            .build();

        let mut handle = Launcher::new()
            .launch(&spec, sink_for(&spec), 0, None)
            .await
            .unwrap();
        let mut helper = None;
        for _ in 0..100 {
            if let Ok(pid) = std::fs::read_to_string(&pidfile) {
                if let Ok(pid) = pid.trim().parse::<i32>() {
                    helper = Some(pid);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let helper = helper.unwrap();
        assert!(!is_gone(helper));

        let stop = handle.terminate(Duration::from_secs(5)).await;
        assert!(stop.is_clean());
        assert!(wait_gone(helper).await);
    }

    #[tokio::test]
    async fn test_dropped_handle_kills_child() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::builder(ProcessClass::Storage, 4, "/bin/sh")
            .args(["-c", "exec sleep 30"])
            .log_dir(tmp.path())
            .build();

        let handle = Launcher::new()
            .launch(&spec, sink_for(&spec), 0, None)
            .await
            .unwrap();
        let pid = handle.pid() as i32;
        drop(handle);
        assert!(wait_gone(pid).await);
    }

}
