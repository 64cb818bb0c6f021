//! USB hot-plug trigger
//!
//! Watches the USB device-node directory and asks the engine for an early
//! discovery run when a device is attached or detached, so a cable handover
//! does not wait for the next poll tick. When the directory cannot be
//! watched the engine keeps running on its interval alone.

use std::path::PathBuf;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use sfleet_core::prelude::*;
use tokio::sync::{mpsc, oneshot};

use crate::message::Message;

/// Settle time after a USB event before polling
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Device-node directory on Linux (one subdirectory per bus)
pub const LINUX_USB_DEVICE_DIR: &str = "/dev/bus/usb";

/// Configuration for the USB watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugConfig {
    /// Directory to watch; `None` disables the watcher
    pub path: Option<PathBuf>,
    pub debounce: Duration,
}

impl Default for HotplugConfig {
    fn default() -> Self {
        Self {
            path: default_usb_device_dir(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl HotplugConfig {
    /// Watch `path` instead of the platform directory
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce = Duration::from_millis(ms);
        self
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            ..Self::default()
        }
    }
}

/// Platform directory holding USB device nodes, if there is one to watch
pub fn default_usb_device_dir() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        Some(PathBuf::from(LINUX_USB_DEVICE_DIR))
    } else {
        None
    }
}

/// Sends [`Message::Refresh`] after USB attach/detach activity
pub struct UsbWatcher {
    config: HotplugConfig,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl UsbWatcher {
    pub fn new(config: HotplugConfig) -> Self {
        Self {
            config,
            stop_tx: None,
        }
    }

    /// Start watching. An error means hot-plug is unavailable and only the
    /// poll interval drives discovery.
    pub fn start(&mut self, message_tx: mpsc::Sender<Message>) -> Result<()> {
        if self.is_running() {
            return Err(Error::watch("USB watcher is already running"));
        }
        let Some(path) = self.config.path.clone() else {
            return Err(Error::watch("USB hot-plug disabled"));
        };
        if !path.is_dir() {
            return Err(Error::watch(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        let debounce = self.config.debounce;
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::task::spawn_blocking(move || {
            run_watcher(path, debounce, message_tx, stop_rx);
        });
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl Drop for UsbWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_watcher(
    path: PathBuf,
    debounce: Duration,
    message_tx: mpsc::Sender<Message>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let tx = message_tx.clone();
    let debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
        match result {
            Ok(events) if events.is_empty() => {}
            Ok(events) => {
                debug!("USB activity ({} event(s)), requesting discovery", events.len());
                let _ = tx.blocking_send(Message::Refresh);
            }
            Err(errors) => {
                for error in errors {
                    warn!("USB watcher error: {:?}", error);
                }
            }
        }
    });

    let mut debouncer = match debouncer {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to create USB watcher, polling only: {}", e);
            return;
        }
    };

    if let Err(e) = debouncer.watch(&path, RecursiveMode::Recursive) {
        warn!("Failed to watch {}, polling only: {}", path.display(), e);
        return;
    }
    info!("Watching {} for USB hot-plug", path.display());

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(oneshot::error::TryRecvError::Closed) => {
                info!("USB watcher stopping");
                break;
            }
            Err(oneshot::error::TryRecvError::Empty) => {
                if message_tx.is_closed() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}
