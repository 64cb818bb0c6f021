//! External tool lookup
//!
//! Resolves where `scrcpy` and `adb` live. Lookup order for each tool:
//! configured path, environment variable, (for adb) the directory that holds
//! scrcpy, then `PATH`.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Environment variable overriding the scrcpy location
pub const SCRCPY_ENV: &str = "SFLEET_SCRCPY";

/// Environment variable overriding the adb location
pub const ADB_ENV: &str = "SFLEET_ADB";

#[cfg(windows)]
const ADB_FILE_NAME: &str = "adb.exe";
#[cfg(not(windows))]
const ADB_FILE_NAME: &str = "adb";

/// Resolved locations of the external tools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolPaths {
    /// Path to scrcpy if found
    pub scrcpy: Option<PathBuf>,

    /// Path to adb if found
    pub adb: Option<PathBuf>,
}

impl ToolPaths {
    /// Resolve both tools (run once at startup)
    pub fn resolve(scrcpy_override: Option<&Path>, adb_override: Option<&Path>) -> Self {
        let scrcpy = Self::find_scrcpy(scrcpy_override);
        let adb = Self::find_adb(adb_override, scrcpy.as_deref());

        match &scrcpy {
            Some(path) => tracing::info!("scrcpy: {}", path.display()),
            None => tracing::warn!("scrcpy not found"),
        }
        match &adb {
            Some(path) => tracing::info!("adb: {}", path.display()),
            None => tracing::warn!("adb not found"),
        }

        Self { scrcpy, adb }
    }

    fn find_scrcpy(configured: Option<&Path>) -> Option<PathBuf> {
        Self::candidate(configured, SCRCPY_ENV)
            .or_else(|| which::which("scrcpy").ok())
            .map(Self::normalize)
    }

    fn find_adb(configured: Option<&Path>, scrcpy: Option<&Path>) -> Option<PathBuf> {
        Self::candidate(configured, ADB_ENV)
            .or_else(|| {
                // scrcpy release bundles ship adb alongside the scrcpy binary
                scrcpy
                    .and_then(Path::parent)
                    .map(|dir| dir.join(ADB_FILE_NAME))
                    .filter(|p| p.is_file())
            })
            .or_else(|| which::which("adb").ok())
            .map(Self::normalize)
    }

    /// Configured path if non-empty, else the environment variable if set
    fn candidate(configured: Option<&Path>, env_var: &str) -> Option<PathBuf> {
        configured
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::var_os(env_var)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
    }

    fn normalize(path: PathBuf) -> PathBuf {
        dunce::canonicalize(&path).unwrap_or(path)
    }

    /// Command to run for adb, falling back to a bare `adb` lookup at spawn time
    pub fn adb_command(&self) -> PathBuf {
        self.adb.clone().unwrap_or_else(|| PathBuf::from("adb"))
    }

    /// Command to run for scrcpy, falling back to a bare `scrcpy` lookup at spawn time
    pub fn scrcpy_command(&self) -> PathBuf {
        self.scrcpy.clone().unwrap_or_else(|| PathBuf::from("scrcpy"))
    }

    /// Get user-friendly message for a missing scrcpy
    pub fn scrcpy_unavailable_message(&self) -> Option<&'static str> {
        if self.scrcpy.is_some() {
            None
        } else {
            Some("scrcpy not found. Install scrcpy or set tools.scrcpy_path in config.toml.")
        }
    }

    /// Get user-friendly message for a missing adb
    pub fn adb_unavailable_message(&self) -> Option<&'static str> {
        if self.adb.is_some() {
            None
        } else {
            Some("adb not found. Install platform-tools or set tools.adb_path in config.toml.")
        }
    }
}
