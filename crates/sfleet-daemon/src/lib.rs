//! # sfleet-daemon - External Tool Plumbing
//!
//! Talks to `adb` for device discovery and wireless pairing, and manages
//! `scrcpy` child processes.
//!
//! Depends on [`sfleet_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Discovery
//! - [`AdbBridge`] - `adb devices -l` discovery, `tcpip`/`connect`/`disconnect`
//! - [`parse_devices_output()`] - Parse `adb devices -l` text
//!
//! ### Mirroring
//! - [`MirrorOrchestrator`] - One scrcpy process per device id
//! - [`MirrorProcess`] - A single scrcpy child with exit reporting
//! - [`build_mirror_args()`] - scrcpy flags from a device's active profile
//!
//! ### Tools
//! - [`ToolPaths`] - Where scrcpy and adb live

pub mod adb;
pub mod args;
pub mod orchestrator;
pub mod process;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tool_availability;

pub use adb::{
    parse_devices_output, parse_wlan_address, AdbBridge, AdbDeviceLine, DEFAULT_ADB_TIMEOUT,
    DEFAULT_WIRELESS_PORT,
};
pub use args::{build_mirror_args, profile_args, recording_args, recording_path};
pub use orchestrator::MirrorOrchestrator;
pub use process::{LaunchToken, MirrorExit, MirrorProcess};
pub use tool_availability::{ToolPaths, ADB_ENV, SCRCPY_ENV};
