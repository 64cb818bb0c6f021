//! Service traits at the engine's seams
//!
//! - [`DeviceBridge`] - device discovery and wireless pairing (adb in production)
//! - [`Mirroring`] - per-device mirroring processes (scrcpy in production)
//! - [`SavePathPicker`] - choosing a recording directory

use std::path::{Path, PathBuf};

use sfleet_core::prelude::*;
use sfleet_core::{default_save_path, DeviceViewModel, DiscoveredEndpoint};
use sfleet_daemon::{AdbBridge, LaunchToken, MirrorOrchestrator};

// ─────────────────────────────────────────────────────────────────────────────
// Device bridge
// ─────────────────────────────────────────────────────────────────────────────

/// Discovery and wireless pairing.
///
/// `discover` never fails; an unavailable tool yields an empty sample.
#[trait_variant::make(DeviceBridge: Send)]
pub trait LocalDeviceBridge {
    /// Endpoints currently reachable, already filtered to ready devices
    async fn discover(&self) -> Vec<DiscoveredEndpoint>;

    /// Switch a cable-attached device to wireless; returns the new address
    async fn connect_wireless(&self, cable_endpoint: &str, port: u16) -> Result<String>;

    async fn disconnect_wireless(&self, address: &str) -> Result<()>;
}

impl DeviceBridge for AdbBridge {
    async fn discover(&self) -> Vec<DiscoveredEndpoint> {
        AdbBridge::discover(self).await
    }

    async fn connect_wireless(&self, cable_endpoint: &str, port: u16) -> Result<String> {
        self.enable_wireless(cable_endpoint, port).await
    }

    async fn disconnect_wireless(&self, address: &str) -> Result<()> {
        AdbBridge::disconnect_wireless(self, address).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mirroring
// ─────────────────────────────────────────────────────────────────────────────

/// One mirroring process per device id.
///
/// Exit reports travel on the channel the implementation was built with; the
/// engine hands the reported token back through [`Mirroring::reap`].
#[cfg_attr(test, mockall::automock)]
pub trait Mirroring: Send {
    /// Launch for the view model's id. `Ok(false)` if already running.
    fn start(&mut self, vm: &DeviceViewModel) -> Result<bool>;

    /// Kill and forget. Returns whether a process was tracked.
    fn stop(&mut self, id: &str) -> bool;

    fn stop_all(&mut self);

    fn is_running(&self, id: &str) -> bool;

    /// Forget `id` if it still belongs to `token`
    fn reap(&mut self, id: &str, token: LaunchToken) -> bool;
}

impl Mirroring for MirrorOrchestrator {
    fn start(&mut self, vm: &DeviceViewModel) -> Result<bool> {
        MirrorOrchestrator::start(self, vm)
    }

    fn stop(&mut self, id: &str) -> bool {
        MirrorOrchestrator::stop(self, id)
    }

    fn stop_all(&mut self) {
        MirrorOrchestrator::stop_all(self)
    }

    fn is_running(&self, id: &str) -> bool {
        MirrorOrchestrator::is_running(self, id)
    }

    fn reap(&mut self, id: &str, token: LaunchToken) -> bool {
        MirrorOrchestrator::reap(self, id, token)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Save path picker
// ─────────────────────────────────────────────────────────────────────────────

/// Asks the user for a recording directory. `None` means cancelled.
///
/// `pick` may block on a dialog; the engine calls it off the actor thread.
pub trait SavePathPicker: Send + Sync {
    fn pick(&self, current: Option<&Path>) -> Option<PathBuf>;
}

/// Picker for frontends without a folder dialog: offers the platform videos
/// folder when it exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSavePathPicker;

impl SavePathPicker for DefaultSavePathPicker {
    fn pick(&self, _current: Option<&Path>) -> Option<PathBuf> {
        let path = default_save_path();
        path.is_dir().then_some(path)
    }
}
