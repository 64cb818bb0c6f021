//! sfleet-app - Device reconciliation and orchestration for scrcpy-fleet
//!
//! This crate owns the [`Engine`] actor that merges discovery samples into the
//! persisted registry, applies the auto-connect and handover policies, and
//! publishes the device list. A USB watcher nudges it to poll early on
//! hot-plug. Frontends talk to it through [`EngineHandle`].
//! Runtime configuration, the settings store and the service traits at the
//! engine's seams live here too.

pub mod config;
pub mod engine;
pub mod engine_event;
pub mod handle;
pub mod hotplug;
pub mod message;
pub mod reconcile;
pub mod services;
pub mod signals;
pub mod store;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Re-export primary types
pub use engine::{Engine, EngineOptions};
pub use engine_event::EngineEvent;
pub use handle::EngineHandle;
pub use hotplug::{HotplugConfig, UsbWatcher};
pub use message::{Message, WirelessOutcome};
pub use reconcile::{reconcile, PolicyAction, ReconcileOutcome};
pub use services::{DefaultSavePathPicker, DeviceBridge, Mirroring, SavePathPicker};
pub use store::{read_settings_file, JsonSettingsStore, SettingsStore};
