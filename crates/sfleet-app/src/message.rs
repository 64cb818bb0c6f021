//! Messages processed by the engine actor
//!
//! Every mutation of the registry or the session map arrives here, including
//! the results of work the engine ran off-actor (discovery, wireless pairing).

use std::path::PathBuf;

use sfleet_core::{DeviceSettings, DiscoveredEndpoint};
use tokio::sync::oneshot;

/// All messages handled by the engine
#[derive(Debug)]
pub enum Message {
    // ─────────────────────────────────────────────────────────
    // Polling
    // ─────────────────────────────────────────────────────────
    /// Run a discovery pass now (in addition to the periodic tick)
    Refresh,

    /// A discovery pass finished
    DiscoveryComplete { sample: Vec<DiscoveredEndpoint> },

    // ─────────────────────────────────────────────────────────
    // Mirroring Commands
    // ─────────────────────────────────────────────────────────
    StartMirroring { id: String },

    StopMirroring { id: String },

    StopAll,

    // ─────────────────────────────────────────────────────────
    // Registry Commands
    // ─────────────────────────────────────────────────────────
    UpdateSettings {
        id: String,
        settings: DeviceSettings,
    },

    /// Requested display order, by device id
    UpdateDeviceOrder { ids: Vec<String> },

    DeleteDevice { id: String },

    RenameDevice { id: String, name: String },

    SetGlobalAutoConnect { enabled: bool },

    SetTheme { theme: String },

    // ─────────────────────────────────────────────────────────
    // Wireless Pairing
    // ─────────────────────────────────────────────────────────
    /// Switch a cable-attached device to adb over Wi-Fi
    ConnectWireless { id: String },

    DisconnectWireless { id: String },

    /// A pairing task finished
    WirelessFinished {
        id: String,
        result: WirelessOutcome,
    },

    // ─────────────────────────────────────────────────────────
    // Dialogs
    // ─────────────────────────────────────────────────────────
    /// Ask the save-path picker for a recording directory
    SelectSavePath {
        reply: oneshot::Sender<Option<PathBuf>>,
    },

    // ─────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────
    /// Stop every session and leave the run loop
    Shutdown,
}

/// Result of a wireless pairing task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirelessOutcome {
    Connected { address: String },
    Disconnected { address: String },
    Failed { reason: String },
}

impl Message {
    /// Short label for logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::DiscoveryComplete { .. } => "discovery_complete",
            Self::StartMirroring { .. } => "start_mirroring",
            Self::StopMirroring { .. } => "stop_mirroring",
            Self::StopAll => "stop_all",
            Self::UpdateSettings { .. } => "update_settings",
            Self::UpdateDeviceOrder { .. } => "update_device_order",
            Self::DeleteDevice { .. } => "delete_device",
            Self::RenameDevice { .. } => "rename_device",
            Self::SetGlobalAutoConnect { .. } => "set_global_auto_connect",
            Self::SetTheme { .. } => "set_theme",
            Self::ConnectWireless { .. } => "connect_wireless",
            Self::DisconnectWireless { .. } => "disconnect_wireless",
            Self::WirelessFinished { .. } => "wireless_finished",
            Self::SelectSavePath { .. } => "select_save_path",
            Self::Shutdown => "shutdown",
        }
    }
}
