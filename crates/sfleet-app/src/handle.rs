//! Channel-backed command surface of the engine
//!
//! Commands are fire-and-forget: failures are logged by the engine and show up
//! only as the absence of the expected state change (or as an
//! [`EngineEvent`] for subscribers).

use std::path::PathBuf;
use std::sync::Arc;

use sfleet_core::prelude::*;
use sfleet_core::{DeviceSettings, DeviceViewModel};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::engine_event::EngineEvent;
use crate::message::Message;

/// Cloneable handle for talking to a running [`crate::Engine`]
#[derive(Debug, Clone)]
pub struct EngineHandle {
    msg_tx: mpsc::Sender<Message>,
    devices_rx: watch::Receiver<Arc<Vec<DeviceViewModel>>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub(crate) fn new(
        msg_tx: mpsc::Sender<Message>,
        devices_rx: watch::Receiver<Arc<Vec<DeviceViewModel>>>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            msg_tx,
            devices_rx,
            event_tx,
        }
    }

    /// Raw sender, for input sources such as the signal handler
    pub fn sender(&self) -> mpsc::Sender<Message> {
        self.msg_tx.clone()
    }

    async fn send(&self, msg: Message) -> Result<()> {
        let label = msg.label();
        self.msg_tx
            .send(msg)
            .await
            .map_err(|_| Error::channel_send(format!("engine stopped, dropped {}", label)))
    }

    // ─────────────────────────────────────────────────────────
    // Mirroring
    // ─────────────────────────────────────────────────────────

    pub async fn start_mirroring(&self, id: impl Into<String>) -> Result<()> {
        self.send(Message::StartMirroring { id: id.into() }).await
    }

    pub async fn stop_mirroring(&self, id: impl Into<String>) -> Result<()> {
        self.send(Message::StopMirroring { id: id.into() }).await
    }

    pub async fn stop_all(&self) -> Result<()> {
        self.send(Message::StopAll).await
    }

    // ─────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────

    pub async fn update_settings(
        &self,
        id: impl Into<String>,
        settings: DeviceSettings,
    ) -> Result<()> {
        self.send(Message::UpdateSettings {
            id: id.into(),
            settings,
        })
        .await
    }

    pub async fn update_device_order(&self, ids: Vec<String>) -> Result<()> {
        self.send(Message::UpdateDeviceOrder { ids }).await
    }

    pub async fn delete_device(&self, id: impl Into<String>) -> Result<()> {
        self.send(Message::DeleteDevice { id: id.into() }).await
    }

    pub async fn rename_device(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<()> {
        self.send(Message::RenameDevice {
            id: id.into(),
            name: name.into(),
        })
        .await
    }

    pub async fn set_global_auto_connect(&self, enabled: bool) -> Result<()> {
        self.send(Message::SetGlobalAutoConnect { enabled }).await
    }

    pub async fn set_theme(&self, theme: impl Into<String>) -> Result<()> {
        self.send(Message::SetTheme {
            theme: theme.into(),
        })
        .await
    }

    // ─────────────────────────────────────────────────────────
    // Wireless
    // ─────────────────────────────────────────────────────────

    pub async fn connect_wireless(&self, id: impl Into<String>) -> Result<()> {
        self.send(Message::ConnectWireless { id: id.into() }).await
    }

    pub async fn disconnect_wireless(&self, id: impl Into<String>) -> Result<()> {
        self.send(Message::DisconnectWireless { id: id.into() }).await
    }

    // ─────────────────────────────────────────────────────────
    // Misc
    // ─────────────────────────────────────────────────────────

    /// Poll now instead of waiting for the next tick
    pub async fn refresh(&self) -> Result<()> {
        self.send(Message::Refresh).await
    }

    /// Ask for a recording directory. `Ok(None)` if the picker was cancelled.
    pub async fn select_save_path(&self) -> Result<Option<PathBuf>> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::SelectSavePath { reply }).await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Message::Shutdown).await
    }

    // ─────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────

    /// Latest published device list
    pub fn devices(&self) -> Arc<Vec<DeviceViewModel>> {
        Arc::clone(&self.devices_rx.borrow())
    }

    /// Device list updates, latest-value-wins
    pub fn watch_devices(&self) -> watch::Receiver<Arc<Vec<DeviceViewModel>>> {
        self.devices_rx.clone()
    }

    /// All engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }
}
