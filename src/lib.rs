//! scrcpy-fleet Library
//!
//! Wiring for the `sfleet` binary: startup configuration, the headless NDJSON
//! frontend and the one-shot device listing. The engine itself lives in
//! `sfleet-app`.

pub mod headless;
pub mod inventory;
pub mod startup;

// Re-export main entry points
pub use headless::runner::run_headless;
pub use startup::{Overrides, Startup};
