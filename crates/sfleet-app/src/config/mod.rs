//! Configuration for scrcpy-fleet
//!
//! Supports:
//! - `config.toml` - Runtime configuration (tool paths, polling, wireless port)
//! - `settings.json` - The persisted device registry (see [`crate::store`])

pub mod settings;
pub mod types;
pub mod writer;

pub use settings::{default_config_dir, init_config_dir, load_config, settings_path};
pub use types::*;
pub use writer::write_settings_file;
