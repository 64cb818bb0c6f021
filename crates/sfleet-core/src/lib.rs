//! # sfleet-core - Core Domain Types
//!
//! Foundation crate for scrcpy-fleet. Provides the persisted device registry
//! types, live transport state, profile selection, error handling and logging.
//!
//! This crate has **zero internal dependencies**.
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`AppSettings`] - Root of the persisted settings document
//! - [`Device`], [`DeviceSettings`] - Registry entry and its per-device options
//! - [`ConnectionProfile`], [`RecordingSettings`] - Encoding and recording options
//! - [`TransportStatus`], [`DeviceViewModel`] - Live, never-persisted state
//!
//! ### Endpoints (`endpoint`)
//! - [`DiscoveredEndpoint`] - One reachable endpoint reported by discovery
//! - [`TransportKind`] - Cable or wireless
//!
//! ### Profiles (`profile`)
//! - [`select_profile()`] - Pick the profile a session should launch with
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! ```rust
//! use sfleet_core::prelude::*;
//! ```

pub mod endpoint;
pub mod error;
pub mod logging;
pub mod profile;
pub mod types;

/// Prelude for common imports used throughout all scrcpy-fleet crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use endpoint::{parse_ipv4, DiscoveredEndpoint, TransportKind};
pub use error::{Error, Result, ResultExt};
pub use profile::select_profile;
pub use types::{
    default_save_path, generate_device_id, AppSettings, AudioCodec, ConnectionProfile, Device,
    DeviceSettings, DeviceViewModel, RecordFormat, RecordingSettings, TransportStatus, VideoCodec,
};
