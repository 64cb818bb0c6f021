//! Per-device mirroring process orchestration
//!
//! At most one scrcpy process is tracked per device id. Exits are reported on
//! the channel handed to [`MirrorOrchestrator::new`]; the owner calls
//! [`MirrorOrchestrator::reap`] with the reported token to drop the entry.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Local;
use sfleet_core::prelude::*;
use sfleet_core::DeviceViewModel;
use tokio::sync::mpsc;

use crate::args::build_mirror_args;
use crate::process::{LaunchToken, MirrorExit, MirrorProcess};

struct Session {
    token: LaunchToken,
    endpoint: String,
    process: MirrorProcess,
}

/// Owns the device-id → scrcpy process map
pub struct MirrorOrchestrator {
    scrcpy: PathBuf,
    exit_tx: mpsc::Sender<MirrorExit>,
    sessions: HashMap<String, Session>,
    next_token: LaunchToken,
}

impl MirrorOrchestrator {
    pub fn new(scrcpy: impl Into<PathBuf>, exit_tx: mpsc::Sender<MirrorExit>) -> Self {
        Self {
            scrcpy: scrcpy.into(),
            exit_tx,
            sessions: HashMap::new(),
            next_token: 1,
        }
    }

    /// Launch mirroring for a device.
    ///
    /// Returns `Ok(false)` without doing anything when a live process is
    /// already tracked for the id.
    pub fn start(&mut self, vm: &DeviceViewModel) -> Result<bool> {
        let id = vm.id().to_string();

        if let Some(session) = self.sessions.get(&id) {
            if session.process.is_running() {
                debug!("Mirroring already running for {}", id);
                return Ok(false);
            }
            // Exited but not yet reaped
            self.sessions.remove(&id);
        }

        let args = build_mirror_args(vm, Local::now());
        let token = self.next_token;
        self.next_token += 1;

        let process = MirrorProcess::spawn(&self.scrcpy, &args, &id, token, self.exit_tx.clone())?;

        info!(
            "Mirroring {} ({}) via {} [{}]",
            vm.name(),
            id,
            vm.launch_endpoint(),
            vm.status
        );
        self.sessions.insert(
            id,
            Session {
                token,
                endpoint: vm.launch_endpoint().to_string(),
                process,
            },
        );
        Ok(true)
    }

    /// Kill and forget the process for `id`. Returns whether one was tracked.
    ///
    /// Kill failures are logged and the entry is removed anyway.
    pub fn stop(&mut self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some(mut session) => {
                if let Err(e) = session.process.kill() {
                    warn!("Failed to stop mirroring for {}: {}", id, e);
                }
                info!("Stopped mirroring for {} ({})", id, session.endpoint);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        let running = self.running_count();
        if running > 0 {
            info!("Stopping {} mirroring session(s)", running);
        }
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            self.stop(&id);
        }
    }

    /// Whether a live process is tracked for `id`
    pub fn is_running(&self, id: &str) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|session| session.process.is_running())
    }

    /// Drop the entry for `id` if it still belongs to launch `token`.
    ///
    /// A late exit from a process that was already replaced leaves the
    /// successor untouched.
    pub fn reap(&mut self, id: &str, token: LaunchToken) -> bool {
        match self.sessions.get(id) {
            Some(session) if session.token == token => {
                self.sessions.remove(id);
                true
            }
            _ => false,
        }
    }

    fn running_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.process.is_running())
            .count()
    }
}

impl Drop for MirrorOrchestrator {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfleet_core::{Device, TransportStatus};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes an executable stand-in for scrcpy that runs `body`
    #[cfg(unix)]
    fn fake_scrcpy(dir: &TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("scrcpy");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn vm(serial: &str) -> DeviceViewModel {
        let mut vm = DeviceViewModel::offline(Device::discovered(serial, "Pixel"));
        vm.status = TransportStatus::Cable;
        vm.cable_endpoint = Some(serial.to_string());
        vm
    }

    #[tokio::test]
    async fn test_start_missing_tool_fails() {
        let (tx, _rx) = mpsc::channel(4);
        let mut orch = MirrorOrchestrator::new("/nonexistent/sfleet-test/scrcpy", tx);
        let device = vm("ABC123");

        tokio_test::assert_err!(orch.start(&device));
        assert!(!orch.is_running(device.id()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_removes() {
        let temp = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let mut orch = MirrorOrchestrator::new(fake_scrcpy(&temp, "exec sleep 60"), tx);
        let device = vm("ABC123");

        assert!(orch.start(&device).unwrap());
        assert!(!orch.start(&device).unwrap());
        assert!(orch.is_running(device.id()));
        assert_eq!(orch.running_count(), 1);

        assert!(orch.stop(device.id()));
        assert!(!orch.is_running(device.id()));
        assert!(!orch.stop(device.id()));

        let exit = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.device_id, device.id());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reap_ignores_stale_token() {
        let temp = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let mut orch = MirrorOrchestrator::new(fake_scrcpy(&temp, "exec sleep 60"), tx);
        let device = vm("ABC123");

        orch.start(&device).unwrap();
        orch.stop(device.id());
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        // Replacement launched before the old exit is processed
        orch.start(&device).unwrap();
        assert!(!orch.reap(device.id(), first.token));
        assert!(orch.is_running(device.id()));

        orch.stop_all();
        assert_eq!(orch.running_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_natural_exit_is_reaped() {
        let temp = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let mut orch = MirrorOrchestrator::new(fake_scrcpy(&temp, "exit 1"), tx);
        let device = vm("ABC123");

        orch.start(&device).unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.code, Some(1));
        assert!(!orch.is_running(device.id()));
        assert!(orch.reap(device.id(), exit.token));
        assert!(!orch.reap(device.id(), exit.token));
    }
}
