//! Core domain type definitions
//!
//! Persisted types ([`AppSettings`], [`Device`], [`DeviceSettings`],
//! [`ConnectionProfile`], [`RecordingSettings`]) serialize with camelCase keys
//! and tolerate missing fields. Keys written by the original desktop app are
//! accepted as aliases.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Root settings document
// ─────────────────────────────────────────────────────────────────────────────

/// Root of `settings.json`: global flags plus the ordered device registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Master switch for the auto-connect policy
    pub global_auto_connect: bool,

    /// UI theme name ("System", "Light", "Dark"); opaque to the engine
    pub theme: String,

    /// Device registry. Order is user-controlled and is the auto-connect priority.
    pub devices: Vec<Device>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            global_auto_connect: true,
            theme: "System".to_string(),
            devices: Vec::new(),
        }
    }
}

impl AppSettings {
    pub fn find(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    pub fn find_by_serial(&self, serial: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.serial == serial)
    }

    /// Position of a device in the persisted order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.id == id)
    }

    /// Restore the invariants a freshly read document may break: every
    /// device has an id, and shared profiles hold identical values.
    ///
    /// Returns whether anything changed; the caller should write the
    /// document back so backfilled ids stay stable across restarts.
    pub fn repair(&mut self) -> bool {
        let mut changed = false;
        for device in &mut self.devices {
            if device.id.trim().is_empty() {
                device.id = generate_device_id();
                changed = true;
            }
            changed |= device.settings.sync_shared_profiles();
        }
        changed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────────────────────────────────────

/// A managed device as stored in the registry.
///
/// `serial` is the hardware identity used to join discovery samples across
/// transports; `id` is the registry key and never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Empty only between deserialization and [`AppSettings::repair`]
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_device_name")]
    pub name: String,

    pub serial: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Last wireless address seen for this device
    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub settings: DeviceSettings,
}

impl Device {
    /// Create a registry entry for a freshly discovered serial.
    ///
    /// The display name starts out as the model string.
    pub fn discovered(serial: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            id: generate_device_id(),
            name: model.clone(),
            serial: serial.into(),
            model,
            ip_address: None,
            settings: DeviceSettings::default(),
        }
    }
}

/// Generate a fresh registry identifier: `dev-<unix millis>-<4 hex>`.
pub fn generate_device_id() -> String {
    format!(
        "dev-{}-{:04x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u16>()
    )
}

fn default_device_name() -> String {
    "New Device".to_string()
}

fn default_model() -> String {
    "Unknown".to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-device settings
// ─────────────────────────────────────────────────────────────────────────────

/// Per-device behavior flags, encoding profiles and recording options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSettings {
    /// Start mirroring automatically when the device becomes reachable
    pub auto_connect: bool,

    /// Move a cable session onto wireless when the cable goes away
    #[serde(alias = "autoSwitchToWifi")]
    pub auto_switch_to_wireless: bool,

    /// Move a wireless session onto the cable when one is plugged in
    #[serde(alias = "autoSwitchToUsb")]
    pub auto_switch_to_cable: bool,

    /// Keep distinct cable and wireless profiles. When false both profiles
    /// hold identical values.
    #[serde(alias = "separateSettings")]
    pub separate_profiles: bool,

    #[serde(alias = "usbProfile")]
    pub cable_profile: ConnectionProfile,

    #[serde(alias = "wifiProfile")]
    pub wireless_profile: ConnectionProfile,

    pub recording: RecordingSettings,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            auto_connect: true,
            auto_switch_to_wireless: true,
            auto_switch_to_cable: true,
            separate_profiles: false,
            cable_profile: ConnectionProfile::default(),
            wireless_profile: ConnectionProfile::default(),
            recording: RecordingSettings::default(),
        }
    }
}

/// Video/audio encoding parameters for one transport.
///
/// Numeric zero means "leave the mirroring tool's default" for every field
/// except the bitrates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionProfile {
    pub video_enabled: bool,
    /// Show the mirroring window (independent of video transfer)
    pub display_enabled: bool,
    /// Mbps
    pub video_bitrate: u32,
    pub max_fps: u32,
    /// Longest edge in pixels, 0 = device resolution
    pub max_size: u32,
    pub video_codec: VideoCodec,
    /// ms
    pub video_buffer: u32,

    pub audio_enabled: bool,
    /// Kbps
    pub audio_bitrate: u32,
    pub audio_codec: AudioCodec,
    /// ms
    pub audio_buffer: u32,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            video_enabled: true,
            display_enabled: true,
            video_bitrate: 8,
            max_fps: 60,
            max_size: 0,
            video_codec: VideoCodec::H264,
            video_buffer: 50,
            audio_enabled: true,
            audio_bitrate: 128,
            audio_codec: AudioCodec::Opus,
            audio_buffer: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Av1,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Av1 => "av1",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Opus,
    Aac,
    Raw,
}

impl AudioCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "opus",
            AudioCodec::Aac => "aac",
            AudioCodec::Raw => "raw",
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recording options applied on top of the active profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingSettings {
    pub record_video: bool,
    pub record_audio: bool,
    pub record_format: RecordFormat,
    pub save_path: PathBuf,
}

impl RecordingSettings {
    /// Whether a recording file should be produced at all
    pub fn is_enabled(&self) -> bool {
        self.record_video || self.record_audio
    }
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            record_video: false,
            record_audio: false,
            record_format: RecordFormat::Mp4,
            save_path: default_save_path(),
        }
    }
}

/// Platform videos folder, falling back to home and then the working directory
pub fn default_save_path() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Mp4,
    Mkv,
}

impl RecordFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFormat::Mp4 => "mp4",
            RecordFormat::Mkv => "mkv",
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Live state
// ─────────────────────────────────────────────────────────────────────────────

/// How a device is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportStatus {
    #[default]
    Offline,
    Cable,
    Wireless,
    CableAndWireless,
}

impl TransportStatus {
    /// Derive the status from which endpoints are present.
    pub fn from_presence(cable: bool, wireless: bool) -> Self {
        match (cable, wireless) {
            (true, true) => TransportStatus::CableAndWireless,
            (true, false) => TransportStatus::Cable,
            (false, true) => TransportStatus::Wireless,
            (false, false) => TransportStatus::Offline,
        }
    }

    pub fn is_online(&self) -> bool {
        !matches!(self, TransportStatus::Offline)
    }

    pub fn has_cable(&self) -> bool {
        matches!(
            self,
            TransportStatus::Cable | TransportStatus::CableAndWireless
        )
    }

    pub fn has_wireless(&self) -> bool {
        matches!(
            self,
            TransportStatus::Wireless | TransportStatus::CableAndWireless
        )
    }

    /// Short label for logs and headless output
    pub fn label(&self) -> &'static str {
        match self {
            TransportStatus::Offline => "offline",
            TransportStatus::Cable => "cable",
            TransportStatus::Wireless => "wireless",
            TransportStatus::CableAndWireless => "cable+wireless",
        }
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A registry device plus live transport state. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceViewModel {
    #[serde(flatten)]
    pub device: Device,

    pub status: TransportStatus,

    pub is_mirroring: bool,

    /// adb serial of the cable endpoint currently offered by discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cable_endpoint: Option<String>,

    /// adb serial (`ip:port`) of the wireless endpoint currently offered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wireless_endpoint: Option<String>,
}

impl DeviceViewModel {
    /// Offline view of a registry entry
    pub fn offline(device: Device) -> Self {
        Self {
            device,
            status: TransportStatus::Offline,
            is_mirroring: false,
            cable_endpoint: None,
            wireless_endpoint: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.device.id
    }

    pub fn name(&self) -> &str {
        &self.device.name
    }

    /// Endpoint a new mirroring session should address.
    ///
    /// Cable wins whenever it is present; the physical serial is the last resort.
    pub fn launch_endpoint(&self) -> &str {
        match self.status {
            TransportStatus::Cable | TransportStatus::CableAndWireless => self
                .cable_endpoint
                .as_deref()
                .unwrap_or(&self.device.serial),
            TransportStatus::Wireless => self
                .wireless_endpoint
                .as_deref()
                .unwrap_or(&self.device.serial),
            TransportStatus::Offline => &self.device.serial,
        }
    }
}
