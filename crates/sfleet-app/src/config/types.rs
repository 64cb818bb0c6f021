//! Runtime configuration types (`config.toml`)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime configuration loaded from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub tools: ToolsSettings,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub wireless: WirelessSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

/// Locations of the external tools. Empty means "look it up".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolsSettings {
    #[serde(default)]
    pub scrcpy_path: String,

    #[serde(default)]
    pub adb_path: String,
}

impl ToolsSettings {
    pub fn scrcpy_override(&self) -> Option<PathBuf> {
        non_empty_path(&self.scrcpy_path)
    }

    pub fn adb_override(&self) -> Option<PathBuf> {
        non_empty_path(&self.adb_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollingSettings {
    /// Seconds between discovery runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for a single adb invocation
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// Poll shortly after a USB attach or detach instead of waiting for the
    /// next interval
    #[serde(default = "default_hotplug")]
    pub hotplug: bool,

    /// Directory watched for USB device nodes. Empty = platform default.
    #[serde(default)]
    pub usb_device_dir: String,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            hotplug: default_hotplug(),
            usb_device_dir: String::new(),
        }
    }
}

impl PollingSettings {
    /// Poll interval, never shorter than one second
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs.max(1))
    }

    pub fn usb_device_dir_override(&self) -> Option<PathBuf> {
        non_empty_path(&self.usb_device_dir)
    }
}

fn default_interval_secs() -> u64 {
    5
}

fn default_discovery_timeout_secs() -> u64 {
    30
}

fn default_hotplug() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WirelessSettings {
    /// Port passed to `adb tcpip`
    #[serde(default = "default_wireless_port")]
    pub port: u16,
}

impl Default for WirelessSettings {
    fn default() -> Self {
        Self {
            port: default_wireless_port(),
        }
    }
}

fn default_wireless_port() -> u16 {
    sfleet_daemon::DEFAULT_WIRELESS_PORT
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Override for the settings document location
    #[serde(default)]
    pub settings_path: String,
}

impl StorageSettings {
    pub fn settings_override(&self) -> Option<PathBuf> {
        non_empty_path(&self.settings_path)
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
        assert_eq!(config.polling.discovery_timeout(), Duration::from_secs(30));
        assert_eq!(config.wireless.port, 5555);
        assert!(config.tools.scrcpy_override().is_none());
        assert!(config.storage.settings_override().is_none());
        assert!(config.polling.hotplug);
        assert!(config.polling.usb_device_dir_override().is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: FleetConfig = toml::from_str(
            r#"
[tools]
scrcpy_path = "/opt/scrcpy/scrcpy"

[polling]
interval_secs = 2
"#,
        )
        .unwrap();

        assert_eq!(
            config.tools.scrcpy_override(),
            Some(PathBuf::from("/opt/scrcpy/scrcpy"))
        );
        assert!(config.tools.adb_override().is_none());
        assert_eq!(config.polling.interval(), Duration::from_secs(2));
        assert_eq!(config.polling.discovery_timeout_secs, 30);
        assert_eq!(config.wireless.port, 5555);
        assert!(config.polling.hotplug);
    }

    #[test]
    fn test_hotplug_toml() {
        let config: FleetConfig = toml::from_str(
            r#"
[polling]
hotplug = false
usb_device_dir = "/run/usb"
"#,
        )
        .unwrap();

        assert!(!config.polling.hotplug);
        assert_eq!(
            config.polling.usb_device_dir_override(),
            Some(PathBuf::from("/run/usb"))
        );
    }

    #[test]
    fn test_zero_interval_clamped() {
        let polling = PollingSettings {
            interval_secs: 0,
            discovery_timeout_secs: 0,
            ..PollingSettings::default()
        };
        assert_eq!(polling.interval(), Duration::from_secs(1));
        assert_eq!(polling.discovery_timeout(), Duration::from_secs(1));
    }
}
