//! Runtime configuration loading for `config.toml`

use std::path::{Path, PathBuf};

use sfleet_core::prelude::*;

use super::types::FleetConfig;

const APP_DIR: &str = "scrcpy-fleet";
const CONFIG_FILENAME: &str = "config.toml";
const SETTINGS_FILENAME: &str = "settings.json";

/// Platform configuration directory for scrcpy-fleet
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Where the settings document lives: storage override, else `<dir>/settings.json`
pub fn settings_path(config_dir: &Path, config: &FleetConfig) -> PathBuf {
    config
        .storage
        .settings_override()
        .unwrap_or_else(|| config_dir.join(SETTINGS_FILENAME))
}

/// Load `config.toml` from `config_dir`.
///
/// A missing file or a parse error yields defaults.
pub fn load_config(config_dir: &Path) -> FleetConfig {
    let config_path = config_dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return FleetConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                debug!("Loaded config from {:?}", config_path);
                config
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                FleetConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            FleetConfig::default()
        }
    }
}

/// Create `config_dir` with a commented default `config.toml`
pub fn init_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;
    }

    let config_path = config_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# scrcpy-fleet configuration

[tools]
scrcpy_path = ""        # Empty = SFLEET_SCRCPY, then PATH
adb_path = ""           # Empty = SFLEET_ADB, next to scrcpy, then PATH

[polling]
interval_secs = 5
discovery_timeout_secs = 30
hotplug = true          # Poll right after a USB attach or detach
usb_device_dir = ""     # Empty = /dev/bus/usb on Linux

[wireless]
port = 5555             # Port used by `adb tcpip`

[storage]
settings_path = ""      # Empty = settings.json next to this file
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_config() {
        let temp = tempdir().unwrap();
        assert_eq!(load_config(temp.path()), FleetConfig::default());
    }

    #[test]
    fn test_load_malformed_config() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILENAME), "[polling\ninterval_secs = ").unwrap();
        assert_eq!(load_config(temp.path()), FleetConfig::default());
    }

    #[test]
    fn test_init_writes_parseable_defaults() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("nested").join("scrcpy-fleet");

        init_config_dir(&dir).unwrap();
        assert!(dir.join(CONFIG_FILENAME).exists());
        assert_eq!(load_config(&dir), FleetConfig::default());

        // Existing file is left alone
        std::fs::write(dir.join(CONFIG_FILENAME), "[polling]\ninterval_secs = 9\n").unwrap();
        init_config_dir(&dir).unwrap();
        assert_eq!(load_config(&dir).polling.interval_secs, 9);
    }

    #[test]
    fn test_settings_path_override() {
        let dir = Path::new("/etc/sfleet");
        let mut config = FleetConfig::default();
        assert_eq!(
            settings_path(dir, &config),
            PathBuf::from("/etc/sfleet/settings.json")
        );

        config.storage.settings_path = "/srv/fleet.json".to_string();
        assert_eq!(settings_path(dir, &config), PathBuf::from("/srv/fleet.json"));
    }
}
