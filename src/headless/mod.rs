//! Headless mode - NDJSON frontend for the engine
//!
//! Engine events are written to stdout as newline-delimited JSON, one event
//! per line, each with an `"event"` field naming its type. Commands are read
//! from stdin one per line (see [`commands`]).
//!
//! # Example Output
//!
//! ```json
//! {"event":"device_added","device_id":"dev-1718000000000-3fa2","serial":"ABC123","timestamp":1718000000001}
//! {"event":"status_changed","device_id":"dev-1718000000000-3fa2","from":"offline","to":"cable","timestamp":1718000000001}
//! {"event":"devices","devices":[...],"timestamp":1718000000002}
//! ```

pub mod commands;
pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use sfleet_app::EngineEvent;
use sfleet_core::{DeviceViewModel, TransportStatus};
use tracing::error;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Full device list, in registry order
    Devices {
        devices: Vec<DeviceViewModel>,
        timestamp: i64,
    },

    DeviceAdded {
        device_id: String,
        serial: String,
        timestamp: i64,
    },

    DeviceRemoved { device_id: String, timestamp: i64 },

    StatusChanged {
        device_id: String,
        from: TransportStatus,
        to: TransportStatus,
        timestamp: i64,
    },

    MirroringStarted {
        device_id: String,
        endpoint: String,
        timestamp: i64,
    },

    MirroringStopped {
        device_id: String,
        exit_code: Option<i32>,
        timestamp: i64,
    },

    MirroringFailed {
        device_id: String,
        reason: String,
        timestamp: i64,
    },

    Handover {
        device_id: String,
        from: TransportStatus,
        to: TransportStatus,
        timestamp: i64,
    },

    WirelessConnected {
        device_id: String,
        address: String,
        timestamp: i64,
    },

    WirelessDisconnected {
        device_id: String,
        address: String,
        timestamp: i64,
    },

    WirelessFailed {
        device_id: String,
        reason: String,
        timestamp: i64,
    },

    /// Reply to `save-path`
    SavePath {
        path: Option<String>,
        timestamp: i64,
    },

    /// Error occurred (bad command, lagging event stream, ...)
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    Shutdown { timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match self.to_json() {
            Some(json) => json,
            None => return,
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        // Flush to ensure immediate output
        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// One NDJSON line (without the newline)
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                None
            }
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn devices(devices: &[DeviceViewModel]) -> Self {
        Self::Devices {
            devices: devices.to_vec(),
            timestamp: Self::now(),
        }
    }

    pub fn save_path(path: Option<String>) -> Self {
        Self::SavePath {
            path,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }
}

impl From<&EngineEvent> for HeadlessEvent {
    fn from(event: &EngineEvent) -> Self {
        let timestamp = Self::now();
        match event.clone() {
            EngineEvent::DevicesChanged { devices } => Self::Devices {
                devices: devices.to_vec(),
                timestamp,
            },
            EngineEvent::DeviceAdded { id, serial } => Self::DeviceAdded {
                device_id: id,
                serial,
                timestamp,
            },
            EngineEvent::DeviceRemoved { id } => Self::DeviceRemoved {
                device_id: id,
                timestamp,
            },
            EngineEvent::StatusChanged { id, from, to } => Self::StatusChanged {
                device_id: id,
                from,
                to,
                timestamp,
            },
            EngineEvent::MirroringStarted { id, endpoint } => Self::MirroringStarted {
                device_id: id,
                endpoint,
                timestamp,
            },
            EngineEvent::MirroringStopped { id, exit_code } => Self::MirroringStopped {
                device_id: id,
                exit_code,
                timestamp,
            },
            EngineEvent::MirroringFailed { id, reason } => Self::MirroringFailed {
                device_id: id,
                reason,
                timestamp,
            },
            EngineEvent::HandoverPerformed { id, from, to } => Self::Handover {
                device_id: id,
                from,
                to,
                timestamp,
            },
            EngineEvent::WirelessConnected { id, address } => Self::WirelessConnected {
                device_id: id,
                address,
                timestamp,
            },
            EngineEvent::WirelessDisconnected { id, address } => Self::WirelessDisconnected {
                device_id: id,
                address,
                timestamp,
            },
            EngineEvent::WirelessFailed { id, reason } => Self::WirelessFailed {
                device_id: id,
                reason,
                timestamp,
            },
            EngineEvent::Shutdown => Self::Shutdown { timestamp },
        }
    }
}
