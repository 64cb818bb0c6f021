//! Startup wiring: configuration, tool lookup and engine construction

use std::path::PathBuf;
use std::time::Duration;

use sfleet_app::config::{self, FleetConfig};
use sfleet_app::{Engine, EngineOptions, HotplugConfig, JsonSettingsStore, SettingsStore};
use sfleet_core::prelude::*;
use sfleet_daemon::{AdbBridge, MirrorOrchestrator, ToolPaths};
use tokio::sync::mpsc;

/// Capacity of the process exit channel
const EXIT_CHANNEL_CAPACITY: usize = 64;

/// Values given on the command line. They win over `config.toml`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_dir: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub scrcpy: Option<PathBuf>,
    pub adb: Option<PathBuf>,
    pub interval_secs: Option<u64>,
}

/// Everything resolved before the engine starts
#[derive(Debug, Clone)]
pub struct Startup {
    pub config_dir: PathBuf,
    pub config: FleetConfig,
    pub settings_path: PathBuf,
    pub tools: ToolPaths,
}

impl Startup {
    /// Load `config.toml` (creating a default one on first run), apply
    /// `overrides` and locate scrcpy and adb.
    pub fn resolve(overrides: &Overrides) -> Self {
        let config_dir = overrides
            .config_dir
            .clone()
            .unwrap_or_else(config::default_config_dir);

        if let Err(e) = config::init_config_dir(&config_dir) {
            warn!("Could not initialize {:?}: {}", config_dir, e);
        }

        let mut config = config::load_config(&config_dir);
        apply_overrides(&mut config, overrides);

        let settings_path = overrides
            .settings_path
            .clone()
            .unwrap_or_else(|| config::settings_path(&config_dir, &config));

        let tools = ToolPaths::resolve(
            config.tools.scrcpy_override().as_deref(),
            config.tools.adb_override().as_deref(),
        );

        info!("Config dir: {}", config_dir.display());
        info!("Settings: {}", settings_path.display());

        Self {
            config_dir,
            config,
            settings_path,
            tools,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.polling.interval()
    }

    pub fn adb_bridge(&self) -> AdbBridge {
        AdbBridge::with_timeout(
            self.tools.adb_command(),
            self.config.polling.discovery_timeout(),
        )
    }

    /// USB watcher settings from `[polling]`
    pub fn hotplug_config(&self) -> HotplugConfig {
        let polling = &self.config.polling;
        if !polling.hotplug {
            return HotplugConfig::disabled();
        }
        match polling.usb_device_dir_override() {
            Some(path) => HotplugConfig::default().with_path(path),
            None => HotplugConfig::default(),
        }
    }

    pub fn settings_store(&self) -> JsonSettingsStore {
        JsonSettingsStore::new(&self.settings_path)
    }

    /// Engine wired to adb, scrcpy and `settings.json`
    pub fn build_engine(&self) -> Engine<AdbBridge> {
        if let Some(message) = self.tools.scrcpy_unavailable_message() {
            warn!("{}", message);
        }
        if let Some(message) = self.tools.adb_unavailable_message() {
            warn!("{}", message);
        }

        let (exit_tx, exit_rx) = mpsc::channel(EXIT_CHANNEL_CAPACITY);
        let orchestrator = MirrorOrchestrator::new(self.tools.scrcpy_command(), exit_tx);
        let store: Box<dyn SettingsStore> = Box::new(self.settings_store());

        Engine::new(
            self.adb_bridge(),
            Box::new(orchestrator),
            exit_rx,
            store,
            EngineOptions {
                poll_interval: self.poll_interval(),
                wireless_port: self.config.wireless.port,
            },
        )
    }
}

fn apply_overrides(config: &mut FleetConfig, overrides: &Overrides) {
    if let Some(path) = &overrides.scrcpy {
        config.tools.scrcpy_path = path.to_string_lossy().to_string();
    }
    if let Some(path) = &overrides.adb {
        config.tools.adb_path = path.to_string_lossy().to_string();
    }
    if let Some(secs) = overrides.interval_secs {
        config.polling.interval_secs = secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = FleetConfig::default();
        let overrides = Overrides {
            scrcpy: Some(PathBuf::from("/opt/scrcpy/scrcpy")),
            interval_secs: Some(2),
            ..Overrides::default()
        };

        apply_overrides(&mut config, &overrides);

        assert_eq!(config.tools.scrcpy_path, "/opt/scrcpy/scrcpy");
        assert!(config.tools.adb_path.is_empty());
        assert_eq!(config.polling.interval(), Duration::from_secs(2));
    }

    #[test]
    #[serial]
    fn test_resolve_creates_config_dir() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("scrcpy-fleet");
        let overrides = Overrides {
            config_dir: Some(dir.clone()),
            ..Overrides::default()
        };

        let startup = Startup::resolve(&overrides);

        assert!(dir.join("config.toml").exists());
        assert_eq!(startup.settings_path, dir.join("settings.json"));
        assert_eq!(startup.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_hotplug_config_from_polling_section() {
        let temp = tempdir().unwrap();
        let overrides = Overrides {
            config_dir: Some(temp.path().to_path_buf()),
            ..Overrides::default()
        };
        let mut startup = Startup::resolve(&overrides);

        startup.config.polling.usb_device_dir = "/run/usb-nodes".to_string();
        assert_eq!(
            startup.hotplug_config().path,
            Some(PathBuf::from("/run/usb-nodes"))
        );

        startup.config.polling.hotplug = false;
        assert_eq!(startup.hotplug_config(), HotplugConfig::disabled());
    }

    #[test]
    #[serial]
    fn test_settings_override() {
        let temp = tempdir().unwrap();
        let overrides = Overrides {
            config_dir: Some(temp.path().to_path_buf()),
            settings_path: Some(temp.path().join("fleet.json")),
            ..Overrides::default()
        };

        let startup = Startup::resolve(&overrides);
        assert_eq!(startup.settings_store().path(), temp.path().join("fleet.json"));
    }
}
