//! scrcpy child process management

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sfleet_core::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Identifies one launch of a device's mirroring process.
///
/// Tokens increase monotonically per orchestrator, so an exit report can be
/// matched against the session that is currently tracked.
pub type LaunchToken = u64;

/// Exit report sent by a process's wait task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorExit {
    pub device_id: String,
    pub token: LaunchToken,
    /// `None` when killed by a signal or the wait failed
    pub code: Option<i32>,
}

/// A running scrcpy process for one device.
///
/// The `Child` handle is owned by a dedicated `wait_for_exit` task which
/// reports a [`MirrorExit`] once the process is gone, whether it exited on its
/// own or was killed through [`MirrorProcess::kill`].
pub struct MirrorProcess {
    /// Consumed on first kill (or on drop)
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set by the wait task once the child has exited
    exited: Arc<AtomicBool>,
}

impl MirrorProcess {
    /// Spawn `program args...` for `device_id`.
    ///
    /// stdout/stderr are captured and forwarded to the log.
    pub fn spawn(
        program: &Path,
        args: &[String],
        device_id: &str,
        token: LaunchToken,
        exit_tx: mpsc::Sender<MirrorExit>,
    ) -> Result<Self> {
        info!(
            "Spawning mirroring for {}: {} {}",
            device_id,
            program.display(),
            args.join(" ")
        );

        let tool = program
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "scrcpy".to_string());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(tool.clone())
                } else {
                    Error::spawn(tool.clone(), e.to_string())
                }
            })?;

        let pid = child.id();
        info!("Mirroring process for {} started with PID: {:?}", device_id, pid);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(Self::stdout_reader(stdout, device_id.to_string()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(Self::stderr_reader(stderr, device_id.to_string()));
        }

        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            exit_tx,
            device_id.to_string(),
            token,
            Arc::clone(&exited),
        ));

        Ok(Self {
            kill_tx: Some(kill_tx),
            exited,
        })
    }

    /// Background task: owns `child`, waits for it to exit, reports [`MirrorExit`].
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        exit_tx: mpsc::Sender<MirrorExit>,
        device_id: String,
        token: LaunchToken,
        exited: Arc<AtomicBool>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Mirroring for {} exited with status: {:?}", device_id, status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for mirroring process of {}: {}", device_id, e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                debug!("Kill requested for mirroring process of {}", device_id);
                if let Err(e) = child.kill().await {
                    error!("Failed to kill mirroring process of {}: {}", device_id, e);
                }
                match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        error!("Error waiting after kill for {}: {}", device_id, e);
                        None
                    }
                }
            }
        };

        // Flag first so is_running() is false before the report is observed
        exited.store(true, Ordering::Release);

        let report = MirrorExit {
            device_id,
            token,
            code,
        };
        if exit_tx.send(report).await.is_err() {
            debug!("Exit channel closed before exit report");
        }
    }

    async fn stdout_reader(stdout: tokio::process::ChildStdout, device_id: String) {
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            debug!("[{}] {}", device_id, line);
        }
        trace!("stdout reader for {} finished", device_id);
    }

    async fn stderr_reader(stderr: tokio::process::ChildStderr, device_id: String) {
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            debug!("[{}] stderr: {}", device_id, line);
        }
        trace!("stderr reader for {} finished", device_id);
    }

    /// Request a forceful kill. The wait task performs the kill and reaps the child.
    pub fn kill(&mut self) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        match self.kill_tx.take() {
            Some(tx) => tx
                .send(())
                .map_err(|_| Error::process("mirroring wait task already finished")),
            None => Err(Error::process("kill already requested")),
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }
}

impl Drop for MirrorProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) covers a wait task that never got to run
    }
}
