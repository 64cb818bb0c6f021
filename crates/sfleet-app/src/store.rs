//! Settings store: loads and persists the device registry

use std::path::{Path, PathBuf};

use sfleet_core::prelude::*;
use sfleet_core::AppSettings;

use crate::config::write_settings_file;

/// Durable home of the [`AppSettings`] document.
///
/// `load` never fails: a missing or unreadable document yields defaults.
pub trait SettingsStore: Send {
    fn load(&self) -> AppSettings;

    /// Full overwrite of the stored document
    fn save(&mut self, settings: &AppSettings) -> Result<()>;
}

/// `settings.json` on disk
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    /// Read and repair the document. A repaired document is written back at
    /// once so backfilled ids survive a restart.
    fn load(&self) -> AppSettings {
        let (settings, repaired) = load_settings_file(&self.path);
        if repaired {
            info!("Repaired {:?} on load, writing it back", self.path);
            let _ = write_settings_file(&self.path, &settings)
                .with_context(|| format!("Failed to rewrite {}", self.path.display()));
        }
        settings
    }

    fn save(&mut self, settings: &AppSettings) -> Result<()> {
        write_settings_file(&self.path, settings)
    }
}

/// Read `path`, falling back to defaults when missing or malformed.
///
/// The result is repaired in memory (see [`AppSettings::repair`]) but the
/// file is left as it is. A malformed file is copied to `<name>.bak` before
/// it can be overwritten.
pub fn read_settings_file(path: &Path) -> AppSettings {
    load_settings_file(path).0
}

/// The document at `path` plus whether it needed repairs
fn load_settings_file(path: &Path) -> (AppSettings, bool) {
    if !path.exists() {
        debug!("No settings file at {:?}, using defaults", path);
        return (AppSettings::default(), false);
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppSettings>(&content) {
            Ok(mut settings) => {
                debug!(
                    "Loaded {} devices from {:?}",
                    settings.devices.len(),
                    path
                );
                let repaired = settings.repair();
                (settings, repaired)
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}; using defaults", path, e);
                backup_malformed(path);
                (AppSettings::default(), false)
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}; using defaults", path, e);
            (AppSettings::default(), false)
        }
    }
}

fn backup_malformed(path: &Path) {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    if let Err(e) = std::fs::copy(path, &backup) {
        warn!("Failed to back up {:?}: {}", path, e);
    }
}
