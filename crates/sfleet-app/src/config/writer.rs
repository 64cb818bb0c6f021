//! Settings document writer
//!
//! Writes `settings.json` pretty-printed with a full overwrite, holding an
//! exclusive file lock for the duration of the write.

use std::io::Write;
use std::path::Path;

use fs2::FileExt;
use sfleet_core::prelude::*;
use sfleet_core::AppSettings;

/// Serialize and write the full settings document to `path`
pub fn write_settings_file(path: &Path, settings: &AppSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| Error::persistence(path, format!("serialize failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::persistence(path, format!("failed to create directory: {}", e))
            })?;
        }
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::persistence(path, format!("failed to open: {}", e)))?;

    // Blocks if another process holds the lock
    file.lock_exclusive()
        .map_err(|e| Error::persistence(path, format!("failed to lock: {}", e)))?;

    // Truncate only once the lock is held
    file.set_len(0)
        .map_err(|e| Error::persistence(path, format!("failed to truncate: {}", e)))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.flush())
        .map_err(|e| Error::persistence(path, format!("failed to write: {}", e)))?;

    // Lock is released when file is dropped
    debug!("Saved settings to {:?}", path);
    Ok(())
}
