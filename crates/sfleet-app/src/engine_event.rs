//! Domain events emitted by the Engine for external consumers
//!
//! Frontends subscribe through [`crate::EngineHandle::subscribe`]. Events for
//! one poll cycle or command are sent after the registry has been persisted,
//! and `DevicesChanged` is always the last event of its cycle.

use std::sync::Arc;

use sfleet_core::{DeviceViewModel, TransportStatus};

/// Domain events emitted by the Engine.
///
/// The broadcast buffer is bounded; a lagging subscriber loses the oldest
/// events. Subscribers that only care about the device list should prefer
/// `watch_devices()`, which always holds the latest snapshot.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    // ─────────────────────────────────────────────────────────
    // Device List
    // ─────────────────────────────────────────────────────────
    /// Membership, status, mirroring flag or order changed
    DevicesChanged { devices: Arc<Vec<DeviceViewModel>> },

    /// A serial was seen for the first time and registered
    DeviceAdded { id: String, serial: String },

    /// A device was deleted by the user
    DeviceRemoved { id: String },

    /// Transport status changed between two polls
    StatusChanged {
        id: String,
        from: TransportStatus,
        to: TransportStatus,
    },

    // ─────────────────────────────────────────────────────────
    // Mirroring
    // ─────────────────────────────────────────────────────────
    MirroringStarted { id: String, endpoint: String },

    /// Stopped by request, by handover, or because the process exited
    MirroringStopped { id: String, exit_code: Option<i32> },

    MirroringFailed { id: String, reason: String },

    /// An active session moved to another transport
    HandoverPerformed {
        id: String,
        from: TransportStatus,
        to: TransportStatus,
    },

    // ─────────────────────────────────────────────────────────
    // Wireless Pairing
    // ─────────────────────────────────────────────────────────
    WirelessConnected { id: String, address: String },

    WirelessDisconnected { id: String, address: String },

    WirelessFailed { id: String, reason: String },

    // ─────────────────────────────────────────────────────────
    // Engine Lifecycle
    // ─────────────────────────────────────────────────────────
    /// Engine is shutting down; all sessions have been stopped
    Shutdown,
}

impl EngineEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DevicesChanged { .. } => "devices_changed",
            Self::DeviceAdded { .. } => "device_added",
            Self::DeviceRemoved { .. } => "device_removed",
            Self::StatusChanged { .. } => "status_changed",
            Self::MirroringStarted { .. } => "mirroring_started",
            Self::MirroringStopped { .. } => "mirroring_stopped",
            Self::MirroringFailed { .. } => "mirroring_failed",
            Self::HandoverPerformed { .. } => "handover_performed",
            Self::WirelessConnected { .. } => "wireless_connected",
            Self::WirelessDisconnected { .. } => "wireless_disconnected",
            Self::WirelessFailed { .. } => "wireless_failed",
            Self::Shutdown => "shutdown",
        }
    }

    /// Device id the event refers to, if any
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::DeviceAdded { id, .. }
            | Self::DeviceRemoved { id }
            | Self::StatusChanged { id, .. }
            | Self::MirroringStarted { id, .. }
            | Self::MirroringStopped { id, .. }
            | Self::MirroringFailed { id, .. }
            | Self::HandoverPerformed { id, .. }
            | Self::WirelessConnected { id, .. }
            | Self::WirelessDisconnected { id, .. }
            | Self::WirelessFailed { id, .. } => Some(id),
            Self::DevicesChanged { .. } | Self::Shutdown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_type_labels() {
        assert_eq!(EngineEvent::Shutdown.event_type(), "shutdown");

        let event = EngineEvent::StatusChanged {
            id: "dev-1".to_string(),
            from: TransportStatus::Wireless,
            to: TransportStatus::Cable,
        };
        assert_eq!(event.event_type(), "status_changed");

        let event = EngineEvent::DevicesChanged {
            devices: Arc::new(Vec::new()),
        };
        assert_eq!(event.event_type(), "devices_changed");
    }

    #[test]
    fn test_device_id() {
        let event = EngineEvent::MirroringStopped {
            id: "dev-1".to_string(),
            exit_code: Some(0),
        };
        assert_eq!(event.device_id(), Some("dev-1"));
        assert_eq!(EngineEvent::Shutdown.device_id(), None);
    }
}
