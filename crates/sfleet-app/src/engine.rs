//! Engine - single owner of the device registry and the mirroring sessions
//!
//! The engine is an actor. The poll tick, process exit reports and every
//! command from [`EngineHandle`] arrive as messages on its channels and are
//! processed one at a time, so the registry and the session map never need a
//! lock. Discovery runs on a spawned task and reports back with
//! [`Message::DiscoveryComplete`]; at most one discovery is in flight.
//!
//! Within one cycle the order is always: mutate registry, persist, publish.

use std::sync::Arc;
use std::time::Duration;

use sfleet_core::prelude::*;
use sfleet_core::{
    AppSettings, DeviceSettings, DeviceViewModel, DiscoveredEndpoint, TransportStatus,
};
use sfleet_daemon::{MirrorExit, DEFAULT_WIRELESS_PORT};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::engine_event::EngineEvent;
use crate::handle::EngineHandle;
use crate::message::{Message, WirelessOutcome};
use crate::reconcile::{apply_order, reconcile, sort_like_registry, PolicyAction};
use crate::services::{DefaultSavePathPicker, DeviceBridge, Mirroring, SavePathPicker};
use crate::store::SettingsStore;

const MESSAGE_CAPACITY: usize = 256;
const EVENT_CAPACITY: usize = 256;

/// Tunables for the run loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub poll_interval: Duration,

    /// Port used when switching a device to adb over Wi-Fi
    pub wireless_port: u16,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            wireless_port: DEFAULT_WIRELESS_PORT,
        }
    }
}

/// Reconciliation engine.
///
/// Owns:
/// - the persisted registry ([`AppSettings`])
/// - the live view-model list, kept in registry order
/// - the mirroring sessions (through [`Mirroring`])
/// - the change channels handed out by [`EngineHandle`]
pub struct Engine<B> {
    settings: AppSettings,
    devices: Vec<DeviceViewModel>,

    bridge: Arc<B>,
    mirroring: Box<dyn Mirroring>,
    store: Box<dyn SettingsStore>,
    picker: Arc<dyn SavePathPicker>,
    options: EngineOptions,

    msg_tx: mpsc::Sender<Message>,
    msg_rx: mpsc::Receiver<Message>,
    exit_rx: mpsc::Receiver<MirrorExit>,

    /// Latest published device list (latest-value-wins)
    snapshot_tx: watch::Sender<Arc<Vec<DeviceViewModel>>>,
    event_tx: broadcast::Sender<EngineEvent>,

    poll_in_flight: bool,
    quit: bool,
}

impl<B> Engine<B>
where
    B: DeviceBridge + Send + Sync + 'static,
{
    /// Create an engine around its collaborators.
    ///
    /// `exit_rx` must be the receiving end of the channel `mirroring` reports
    /// process exits on. The registry is loaded from `store` immediately and
    /// every device starts out Offline. A document that needed repairs
    /// (missing ids, drifted shared profiles) is saved back once.
    pub fn new(
        bridge: B,
        mirroring: Box<dyn Mirroring>,
        exit_rx: mpsc::Receiver<MirrorExit>,
        mut store: Box<dyn SettingsStore>,
        options: EngineOptions,
    ) -> Self {
        let mut settings = store.load();
        info!("Loaded {} device(s) from settings", settings.devices.len());
        if settings.repair() {
            info!("Repaired loaded settings, saving");
            let _ = store
                .save(&settings)
                .context("Failed to save repaired settings");
        }

        let devices: Vec<DeviceViewModel> = settings
            .devices
            .iter()
            .cloned()
            .map(DeviceViewModel::offline)
            .collect();

        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_CAPACITY);
        let (snapshot_tx, _) = watch::channel(Arc::new(devices.clone()));
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            settings,
            devices,
            bridge: Arc::new(bridge),
            mirroring,
            store,
            picker: Arc::new(DefaultSavePathPicker),
            options,
            msg_tx,
            msg_rx,
            exit_rx,
            snapshot_tx,
            event_tx,
            poll_in_flight: false,
            quit: false,
        }
    }

    /// Replace the save-path picker (frontends with a folder dialog)
    pub fn with_save_path_picker(mut self, picker: Box<dyn SavePathPicker>) -> Self {
        self.picker = Arc::from(picker);
        self
    }

    /// Command surface for frontends. Cheap to clone.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(
            self.msg_tx.clone(),
            self.snapshot_tx.subscribe(),
            self.event_tx.clone(),
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn devices(&self) -> &[DeviceViewModel] {
        &self.devices
    }

    pub fn device(&self, id: &str) -> Option<&DeviceViewModel> {
        self.devices.iter().find(|vm| vm.id() == id)
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    // ─────────────────────────────────────────────────────────
    // Run Loop
    // ─────────────────────────────────────────────────────────

    /// Drive the engine until [`Message::Shutdown`].
    ///
    /// The first discovery runs immediately. A discovery that overruns the
    /// interval delays the next tick instead of overlapping it. All sessions
    /// are stopped before this returns.
    pub async fn run(mut self) {
        info!(
            "Engine running (poll every {:?})",
            self.options.poll_interval
        );

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.quit {
            tokio::select! {
                _ = ticker.tick() => {
                    self.request_poll();
                }
                Some(exit) = self.exit_rx.recv() => {
                    self.handle_exit(exit);
                }
                msg = self.msg_rx.recv() => match msg {
                    Some(msg) => self.handle_message(msg),
                    None => break,
                },
            }
        }

        self.shutdown();
    }

    /// Run one discovery pass inline and apply it
    pub async fn poll_once(&mut self) {
        let sample = self.bridge.discover().await;
        self.apply_sample(sample);
    }

    /// Start a discovery task unless one is already running
    fn request_poll(&mut self) {
        if self.poll_in_flight {
            trace!("Discovery still running, skipping tick");
            return;
        }
        self.poll_in_flight = true;

        let bridge = Arc::clone(&self.bridge);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let sample = bridge.discover().await;
            if tx.send(Message::DiscoveryComplete { sample }).await.is_err() {
                debug!("Engine gone before discovery finished");
            }
        });
    }

    /// Process one message
    pub fn handle_message(&mut self, msg: Message) {
        trace!("Engine message: {}", msg.label());

        match msg {
            Message::Refresh => self.request_poll(),
            Message::DiscoveryComplete { sample } => {
                self.poll_in_flight = false;
                self.apply_sample(sample);
            }
            Message::StartMirroring { id } => self.start_mirroring(&id),
            Message::StopMirroring { id } => self.stop_mirroring(&id),
            Message::StopAll => self.stop_all(),
            Message::UpdateSettings { id, settings } => self.update_settings(&id, settings),
            Message::UpdateDeviceOrder { ids } => self.update_device_order(&ids),
            Message::DeleteDevice { id } => self.delete_device(&id),
            Message::RenameDevice { id, name } => self.rename_device(&id, &name),
            Message::SetGlobalAutoConnect { enabled } => self.set_global_auto_connect(enabled),
            Message::SetTheme { theme } => self.set_theme(theme),
            Message::ConnectWireless { id } => self.connect_wireless(&id),
            Message::DisconnectWireless { id } => self.disconnect_wireless(&id),
            Message::WirelessFinished { id, result } => self.wireless_finished(id, result),
            Message::SelectSavePath { reply } => {
                let picker = Arc::clone(&self.picker);
                tokio::task::spawn_blocking(move || {
                    let picked = picker.pick(None);
                    debug!("Save path picker returned {:?}", picked);
                    let _ = reply.send(picked);
                });
            }
            Message::Shutdown => {
                info!("Shutdown requested");
                self.quit = true;
            }
        }
    }

    /// Handle a process exit report
    pub fn handle_exit(&mut self, exit: MirrorExit) {
        if !self.mirroring.reap(&exit.device_id, exit.token) {
            // Stopped by us or superseded by a newer launch
            trace!(
                "Ignoring exit of {} (token {})",
                exit.device_id,
                exit.token
            );
            return;
        }

        info!(
            "Mirroring for {} ended (exit code {:?})",
            exit.device_id, exit.code
        );
        let mut events = Vec::new();
        if let Some(vm) = self.devices.iter_mut().find(|vm| vm.id() == exit.device_id) {
            vm.is_mirroring = false;
        }
        events.push(EngineEvent::MirroringStopped {
            id: exit.device_id,
            exit_code: exit.code,
        });
        self.publish(events, false);
    }

    /// Stop every session and announce shutdown
    pub fn shutdown(&mut self) {
        info!("Engine shutting down, stopping all sessions");
        self.quit = true;
        self.stop_all();
        let _ = self.event_tx.send(EngineEvent::Shutdown);
    }

    // ─────────────────────────────────────────────────────────
    // Poll Cycle
    // ─────────────────────────────────────────────────────────

    fn apply_sample(&mut self, sample: Vec<DiscoveredEndpoint>) {
        debug!("Discovery returned {} endpoint(s)", sample.len());

        let mirroring = &self.mirroring;
        let outcome = reconcile(&mut self.settings, &self.devices, &sample, |id| {
            mirroring.is_running(id)
        });
        self.devices = outcome.devices;

        let mut events = Vec::new();
        for id in outcome.added {
            let serial = self
                .settings
                .find(&id)
                .map(|d| d.serial.clone())
                .unwrap_or_default();
            events.push(EngineEvent::DeviceAdded { id, serial });
        }
        for t in outcome.transitions {
            events.push(EngineEvent::StatusChanged {
                id: t.id,
                from: t.from,
                to: t.to,
            });
        }

        for action in outcome.actions {
            match action {
                PolicyAction::Handover { id, from, to } => {
                    self.handover(&id, from, to, &mut events);
                }
                PolicyAction::StopOffline { id } => {
                    info!("{} went offline while mirroring, stopping", id);
                    self.mirroring.stop(&id);
                    self.set_mirroring_flag(&id, false);
                    events.push(EngineEvent::MirroringStopped {
                        id,
                        exit_code: None,
                    });
                }
            }
        }

        self.auto_connect(&mut events);

        if outcome.registry_changed {
            self.persist();
        }
        self.publish(events, outcome.registry_changed);
    }

    /// Move an active session to the transport that just became preferred.
    ///
    /// Stop strictly before start; the two never overlap.
    fn handover(
        &mut self,
        id: &str,
        from: TransportStatus,
        to: TransportStatus,
        events: &mut Vec<EngineEvent>,
    ) {
        info!("Handover for {}: {} -> {}", id, from, to);
        self.mirroring.stop(id);
        self.set_mirroring_flag(id, false);

        if self.launch(id, events) {
            events.push(EngineEvent::HandoverPerformed {
                id: id.to_string(),
                from,
                to,
            });
        }
    }

    /// Start eligible devices, in registry order
    fn auto_connect(&mut self, events: &mut Vec<EngineEvent>) {
        if !self.settings.global_auto_connect {
            return;
        }

        let eligible: Vec<String> = self
            .devices
            .iter()
            .filter(|vm| {
                vm.device.settings.auto_connect && vm.status.is_online() && !vm.is_mirroring
            })
            .map(|vm| vm.id().to_string())
            .collect();

        for id in eligible {
            info!("Auto-connecting {}", id);
            self.launch(&id, events);
        }
    }

    // ─────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────

    fn start_mirroring(&mut self, id: &str) {
        let Some(vm) = self.device(id) else {
            warn!("start: {}", Error::device_not_found(id));
            return;
        };
        if !vm.status.is_online() {
            info!("{} is offline, not starting", id);
            return;
        }

        let mut events = Vec::new();
        self.launch(id, &mut events);
        self.publish(events, false);
    }

    fn stop_mirroring(&mut self, id: &str) {
        let tracked = self.mirroring.stop(id);
        let flagged = self.device(id).is_some_and(|vm| vm.is_mirroring);
        if !tracked && !flagged {
            debug!("stop: {} is not mirroring", id);
            return;
        }

        info!("Stopped mirroring for {}", id);
        self.set_mirroring_flag(id, false);
        let events = vec![EngineEvent::MirroringStopped {
            id: id.to_string(),
            exit_code: None,
        }];
        self.publish(events, false);
    }

    fn stop_all(&mut self) {
        self.mirroring.stop_all();

        let mut events = Vec::new();
        for vm in self.devices.iter_mut().filter(|vm| vm.is_mirroring) {
            vm.is_mirroring = false;
            events.push(EngineEvent::MirroringStopped {
                id: vm.device.id.clone(),
                exit_code: None,
            });
        }
        self.publish(events, false);
    }

    fn update_settings(&mut self, id: &str, settings: DeviceSettings) {
        let Some(device) = self.settings.find_mut(id) else {
            warn!("update_settings: {}", Error::device_not_found(id));
            return;
        };

        let normalized = settings.normalized_against(&device.settings);
        if normalized == device.settings {
            debug!("update_settings: no change for {}", id);
            return;
        }
        device.settings = normalized.clone();

        if let Some(vm) = self.devices.iter_mut().find(|vm| vm.id() == id) {
            vm.device.settings = normalized;
        }
        info!("Updated settings for {}", id);
        self.persist();
        self.publish(Vec::new(), true);
    }

    fn update_device_order(&mut self, ids: &[String]) {
        if !apply_order(&mut self.settings, ids) {
            debug!("update_device_order: order unchanged");
            return;
        }

        sort_like_registry(&mut self.devices, &self.settings);
        info!("Device order updated");
        self.persist();
        self.publish(Vec::new(), true);
    }

    fn delete_device(&mut self, id: &str) {
        let Some(index) = self.settings.position(id) else {
            warn!("delete: {}", Error::device_not_found(id));
            return;
        };

        let mut events = Vec::new();
        if self.mirroring.stop(id) {
            events.push(EngineEvent::MirroringStopped {
                id: id.to_string(),
                exit_code: None,
            });
        }

        let device = self.settings.devices.remove(index);
        self.devices.retain(|vm| vm.id() != id);
        info!("Deleted device {} ({})", device.name, device.id);

        self.persist();
        events.push(EngineEvent::DeviceRemoved { id: id.to_string() });
        self.publish(events, true);
    }

    fn rename_device(&mut self, id: &str, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            warn!("rename: empty name for {} ignored", id);
            return;
        }
        let Some(device) = self.settings.find_mut(id) else {
            warn!("rename: {}", Error::device_not_found(id));
            return;
        };
        if device.name == name {
            return;
        }

        device.name = name.to_string();
        if let Some(vm) = self.devices.iter_mut().find(|vm| vm.id() == id) {
            vm.device.name = name.to_string();
        }
        self.persist();
        self.publish(Vec::new(), true);
    }

    fn set_global_auto_connect(&mut self, enabled: bool) {
        if self.settings.global_auto_connect == enabled {
            return;
        }

        info!("Global auto-connect {}", if enabled { "on" } else { "off" });
        self.settings.global_auto_connect = enabled;
        self.persist();

        let mut events = Vec::new();
        self.auto_connect(&mut events);
        self.publish(events, false);
    }

    fn set_theme(&mut self, theme: String) {
        if self.settings.theme == theme {
            return;
        }
        self.settings.theme = theme;
        self.persist();
    }

    fn connect_wireless(&mut self, id: &str) {
        let endpoint = match self.device(id) {
            Some(vm) => vm.cable_endpoint.clone(),
            None => {
                warn!("connect_wireless: {}", Error::device_not_found(id));
                return;
            }
        };
        let Some(endpoint) = endpoint else {
            self.emit(EngineEvent::WirelessFailed {
                id: id.to_string(),
                reason: "device is not connected by cable".to_string(),
            });
            return;
        };

        info!("Enabling wireless adb for {} via {}", id, endpoint);
        let bridge = Arc::clone(&self.bridge);
        let tx = self.msg_tx.clone();
        let port = self.options.wireless_port;
        let id = id.to_string();
        tokio::spawn(async move {
            let result = match bridge.connect_wireless(&endpoint, port).await {
                Ok(address) => WirelessOutcome::Connected { address },
                Err(e) => WirelessOutcome::Failed {
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(Message::WirelessFinished { id, result }).await;
        });
    }

    fn disconnect_wireless(&mut self, id: &str) {
        let address = match self.device(id) {
            Some(vm) => vm.wireless_endpoint.clone(),
            None => {
                warn!("disconnect_wireless: {}", Error::device_not_found(id));
                return;
            }
        };
        let Some(address) = address else {
            self.emit(EngineEvent::WirelessFailed {
                id: id.to_string(),
                reason: "device has no wireless endpoint".to_string(),
            });
            return;
        };

        info!("Disconnecting wireless adb for {} at {}", id, address);
        let bridge = Arc::clone(&self.bridge);
        let tx = self.msg_tx.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let result = match bridge.disconnect_wireless(&address).await {
                Ok(()) => WirelessOutcome::Disconnected { address },
                Err(e) => WirelessOutcome::Failed {
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(Message::WirelessFinished { id, result }).await;
        });
    }

    fn wireless_finished(&mut self, id: String, result: WirelessOutcome) {
        match result {
            WirelessOutcome::Connected { address } => {
                info!("{} reachable over wireless at {}", id, address);
                self.emit(EngineEvent::WirelessConnected { id, address });
                self.request_poll();
            }
            WirelessOutcome::Disconnected { address } => {
                info!("{} disconnected from {}", id, address);
                self.emit(EngineEvent::WirelessDisconnected { id, address });
                self.request_poll();
            }
            WirelessOutcome::Failed { reason } => {
                warn!("Wireless command for {} failed: {}", id, reason);
                self.emit(EngineEvent::WirelessFailed { id, reason });
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────

    /// Start a session for `id` and update its flag. Returns whether the
    /// device is mirroring afterwards.
    fn launch(&mut self, id: &str, events: &mut Vec<EngineEvent>) -> bool {
        let Some(index) = self.devices.iter().position(|vm| vm.id() == id) else {
            return false;
        };

        let vm = &self.devices[index];
        let endpoint = vm.launch_endpoint().to_string();
        match self.mirroring.start(vm) {
            Ok(started) => {
                self.devices[index].is_mirroring = true;
                if started {
                    info!("Mirroring {} via {}", id, endpoint);
                    events.push(EngineEvent::MirroringStarted {
                        id: id.to_string(),
                        endpoint,
                    });
                }
                true
            }
            Err(e) => {
                error!("Failed to start mirroring for {}: {}", id, e);
                self.devices[index].is_mirroring = false;
                events.push(EngineEvent::MirroringFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    fn set_mirroring_flag(&mut self, id: &str, value: bool) {
        if let Some(vm) = self.devices.iter_mut().find(|vm| vm.id() == id) {
            vm.is_mirroring = value;
        }
    }

    /// Save the registry. Failures are logged; memory stays authoritative.
    fn persist(&mut self) {
        let _ = self
            .store
            .save(&self.settings)
            .context("Failed to save settings");
    }

    fn emit(&self, event: EngineEvent) {
        trace!("Engine event: {}", event.event_type());
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Send `events`, then the device list if it changed (or `force`)
    fn publish(&mut self, events: Vec<EngineEvent>, force: bool) {
        for event in events {
            self.emit(event);
        }

        let changed = force || **self.snapshot_tx.borrow() != self.devices;
        if !changed {
            return;
        }

        let snapshot = Arc::new(self.devices.clone());
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));
        self.emit(EngineEvent::DevicesChanged { devices: snapshot });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockMirroring;
    use crate::test_utils::{test_rig, FakeBridge, MemoryStore, MirrorCall, TestRig};
    use mockall::Sequence;
    use sfleet_core::Device;
    use sfleet_daemon::test_utils::{cable, wireless};
    use tokio::sync::{broadcast::error::TryRecvError, oneshot};

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    fn device_list_notifications(events: &[EngineEvent]) -> Vec<Arc<Vec<DeviceViewModel>>> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::DevicesChanged { devices } => Some(Arc::clone(devices)),
                _ => None,
            })
            .collect()
    }

    fn manual_settings(serials: &[&str]) -> AppSettings {
        AppSettings {
            global_auto_connect: false,
            devices: serials
                .iter()
                .map(|s| Device::discovered(*s, "Pixel_7"))
                .collect(),
            ..AppSettings::default()
        }
    }

    fn id_of(rig: &TestRig, serial: &str) -> String {
        rig.engine
            .settings()
            .find_by_serial(serial)
            .map(|d| d.id.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_new_device_persisted_once_and_published_once() {
        let mut rig = test_rig(manual_settings(&[]));
        let mut rx = rig.engine.subscribe();
        rig.bridge.set_sample(vec![cable("ABC123")]);

        rig.engine.poll_once().await;

        assert_eq!(rig.store.saves(), 1);
        let events = drain(&mut rx);
        let notifications = device_list_notifications(&events);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].len(), 1);
        assert_eq!(notifications[0][0].status, TransportStatus::Cable);
        assert_eq!(notifications[0][0].device.model, "Pixel_7");
        assert!(matches!(events[0], EngineEvent::DeviceAdded { .. }));
        assert!(matches!(
            events.last(),
            Some(EngineEvent::DevicesChanged { .. })
        ));

        let saved = rig.store.saved();
        assert_eq!(saved.devices.len(), 1);
        assert_eq!(saved.devices[0].serial, "ABC123");
    }

    #[tokio::test]
    async fn test_identical_sample_no_spurious_notification() {
        let mut rig = test_rig(manual_settings(&[]));
        rig.bridge
            .set_sample(vec![cable("ABC123"), wireless("ABC123", "192.168.1.23")]);
        rig.engine.poll_once().await;

        let mut rx = rig.engine.subscribe();
        let saves = rig.store.saves();
        rig.engine.poll_once().await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(rig.store.saves(), saves);
    }

    #[tokio::test]
    async fn test_status_change_publishes_without_persisting() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let mut rx = rig.engine.subscribe();
        rig.bridge.set_sample(vec![cable("ABC123")]);

        rig.engine.poll_once().await;

        assert_eq!(rig.store.saves(), 0);
        assert_eq!(device_list_notifications(&drain(&mut rx)).len(), 1);
        assert_eq!(rig.engine.devices()[0].status, TransportStatus::Cable);
    }

    #[tokio::test]
    async fn test_auto_connect_in_registry_order() {
        let mut settings = manual_settings(&["B", "A", "C"]);
        settings.global_auto_connect = true;
        settings.devices[2].settings.auto_connect = false;
        let mut rig = test_rig(settings);
        rig.bridge.set_sample(vec![cable("A"), cable("B"), cable("C")]);

        rig.engine.poll_once().await;

        assert_eq!(
            rig.mirroring.starts(),
            vec![id_of(&rig, "B"), id_of(&rig, "A")]
        );
        assert!(rig.engine.devices()[0].is_mirroring);
        assert!(!rig.engine.devices()[2].is_mirroring);

        // Already mirroring: no second start
        rig.engine.poll_once().await;
        assert_eq!(rig.mirroring.starts().len(), 2);
    }

    #[tokio::test]
    async fn test_global_auto_connect_off_starts_nothing() {
        let mut rig = test_rig(manual_settings(&["A"]));
        rig.bridge.set_sample(vec![cable("A"), cable("NEW")]);

        rig.engine.poll_once().await;

        assert!(rig.mirroring.calls().is_empty());
    }

    #[tokio::test]
    async fn test_offline_while_mirroring_stops() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        rig.bridge.set_sample(vec![cable("ABC123")]);
        rig.engine.poll_once().await;
        rig.engine.handle_message(Message::StartMirroring { id: id.clone() });
        assert!(rig.engine.device(&id).is_some_and(|vm| vm.is_mirroring));

        rig.bridge.set_sample(vec![]);
        rig.engine.poll_once().await;

        let vm = rig.engine.device(&id).cloned().unwrap();
        assert_eq!(vm.status, TransportStatus::Offline);
        assert!(!vm.is_mirroring);
        assert_eq!(rig.mirroring.stops(), vec![id]);
    }

    #[tokio::test]
    async fn test_handover_stop_then_start_exactly_once() {
        let (_exit_tx, exit_rx) = mpsc::channel(4);
        let bridge = FakeBridge::new();
        let store = MemoryStore::with_settings(manual_settings(&["ABC123"]));

        let mut seq = Sequence::new();
        let mut mock = MockMirroring::new();
        mock.expect_is_running().returning(|_| true);
        mock.expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| true);
        mock.expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|vm| vm.launch_endpoint() == "ABC123")
            .returning(|_| Ok(true));
        mock.expect_stop_all().returning(|| ());

        let mut engine = Engine::new(
            bridge.clone(),
            Box::new(mock),
            exit_rx,
            Box::new(store),
            EngineOptions::default(),
        );

        bridge.set_sample(vec![wireless("ABC123", "192.168.1.23")]);
        engine.poll_once().await;

        bridge.set_sample(vec![cable("ABC123"), wireless("ABC123", "192.168.1.23")]);
        engine.poll_once().await;

        assert!(engine.devices()[0].is_mirroring);
        assert_eq!(
            engine.devices()[0].status,
            TransportStatus::CableAndWireless
        );
    }

    #[tokio::test]
    async fn test_handover_disabled_keeps_session() {
        let mut settings = manual_settings(&["ABC123"]);
        settings.devices[0].settings.auto_switch_to_cable = false;
        let mut rig = test_rig(settings);
        let id = id_of(&rig, "ABC123");

        rig.bridge.set_sample(vec![wireless("ABC123", "192.168.1.23")]);
        rig.engine.poll_once().await;
        rig.engine.handle_message(Message::StartMirroring { id });
        rig.mirroring.clear_calls();

        rig.bridge
            .set_sample(vec![cable("ABC123"), wireless("ABC123", "192.168.1.23")]);
        rig.engine.poll_once().await;

        assert!(rig.mirroring.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cable_to_wireless_handover_uses_wireless_endpoint() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");

        rig.bridge
            .set_sample(vec![cable("ABC123"), wireless("ABC123", "192.168.1.23")]);
        rig.engine.poll_once().await;
        rig.engine.handle_message(Message::StartMirroring { id: id.clone() });
        rig.mirroring.clear_calls();

        rig.bridge.set_sample(vec![wireless("ABC123", "192.168.1.23")]);
        rig.engine.poll_once().await;

        assert_eq!(
            rig.mirroring.calls(),
            vec![
                MirrorCall::Stop { id: id.clone() },
                MirrorCall::Start {
                    id,
                    endpoint: "192.168.1.23:5555".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_start_leaves_flag_false() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        let mut rx = rig.engine.subscribe();
        rig.bridge.set_sample(vec![cable("ABC123")]);
        rig.engine.poll_once().await;

        rig.mirroring.fail_starts(true);
        rig.engine.handle_message(Message::StartMirroring { id: id.clone() });

        assert!(!rig.engine.device(&id).unwrap().is_mirroring);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::MirroringFailed { .. })));
    }

    #[tokio::test]
    async fn test_start_ignored_when_offline() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        rig.engine.handle_message(Message::StartMirroring { id });
        assert!(rig.mirroring.calls().is_empty());
    }

    #[tokio::test]
    async fn test_process_exit_clears_flag() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        rig.bridge.set_sample(vec![cable("ABC123")]);
        rig.engine.poll_once().await;
        rig.engine.handle_message(Message::StartMirroring { id: id.clone() });

        let exit = rig.mirroring.exit(&id, Some(2)).unwrap();
        rig.engine.handle_exit(exit.clone());
        assert!(!rig.engine.device(&id).unwrap().is_mirroring);

        // A second report for the same token is ignored
        let mut rx = rig.engine.subscribe();
        rig.engine.handle_exit(exit);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_stale_exit_after_restart_is_ignored() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        rig.bridge.set_sample(vec![cable("ABC123")]);
        rig.engine.poll_once().await;
        rig.engine.handle_message(Message::StartMirroring { id: id.clone() });

        let stale = rig.mirroring.exit(&id, None).unwrap();
        rig.engine.handle_message(Message::StopMirroring { id: id.clone() });
        rig.engine.handle_message(Message::StartMirroring { id: id.clone() });

        rig.engine.handle_exit(stale);
        assert!(rig.engine.device(&id).unwrap().is_mirroring);
    }

    #[tokio::test]
    async fn test_update_order_idempotent() {
        let mut rig = test_rig(manual_settings(&["A", "B", "C"]));
        let order = vec![id_of(&rig, "C"), id_of(&rig, "A"), id_of(&rig, "B")];
        let mut rx = rig.engine.subscribe();

        rig.engine.handle_message(Message::UpdateDeviceOrder { ids: order.clone() });
        rig.engine.handle_message(Message::UpdateDeviceOrder { ids: order });

        assert_eq!(rig.store.saves(), 1);
        assert_eq!(device_list_notifications(&drain(&mut rx)).len(), 1);
        let serials: Vec<&str> = rig
            .engine
            .devices()
            .iter()
            .map(|vm| vm.device.serial.as_str())
            .collect();
        assert_eq!(serials, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_update_settings_keeps_profiles_identical() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");

        let mut settings = rig.engine.settings().devices[0].settings.clone();
        settings.wireless_profile.max_fps = 30;
        rig.engine.handle_message(Message::UpdateSettings {
            id: id.clone(),
            settings,
        });

        let saved = rig.store.saved();
        let stored = &saved.devices[0].settings;
        assert_eq!(stored.cable_profile.max_fps, 30);
        assert_eq!(stored.cable_profile, stored.wireless_profile);
        assert_eq!(
            rig.engine.device(&id).unwrap().device.settings,
            *stored
        );
    }

    #[tokio::test]
    async fn test_delete_stops_and_persists() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        rig.bridge.set_sample(vec![cable("ABC123")]);
        rig.engine.poll_once().await;
        rig.engine.handle_message(Message::StartMirroring { id: id.clone() });

        rig.engine.handle_message(Message::DeleteDevice { id: id.clone() });

        assert!(rig.engine.devices().is_empty());
        assert!(rig.store.saved().devices.is_empty());
        assert_eq!(rig.mirroring.stops(), vec![id.clone()]);

        // Still attached: rediscovered under a fresh id
        rig.engine.poll_once().await;
        assert_eq!(rig.engine.devices().len(), 1);
        assert_ne!(rig.engine.devices()[0].id(), id);
    }

    #[tokio::test]
    async fn test_rename_persists() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        rig.engine.handle_message(Message::RenameDevice {
            id: id.clone(),
            name: "  Desk phone ".to_string(),
        });
        assert_eq!(rig.store.saved().devices[0].name, "Desk phone");

        rig.engine.handle_message(Message::RenameDevice {
            id,
            name: "   ".to_string(),
        });
        assert_eq!(rig.store.saves(), 1);
    }

    #[tokio::test]
    async fn test_enabling_global_auto_connect_starts_online_devices() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        rig.bridge.set_sample(vec![cable("ABC123")]);
        rig.engine.poll_once().await;
        assert!(rig.mirroring.starts().is_empty());

        rig.engine
            .handle_message(Message::SetGlobalAutoConnect { enabled: true });

        assert_eq!(rig.mirroring.starts().len(), 1);
        assert!(rig.store.saved().global_auto_connect);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_state() {
        let mut rig = test_rig(manual_settings(&[]));
        rig.store.fail_saves(true);
        rig.bridge.set_sample(vec![cable("ABC123")]);

        rig.engine.poll_once().await;

        assert_eq!(rig.engine.settings().devices.len(), 1);
        assert!(rig.store.saved().devices.is_empty());
    }

    #[tokio::test]
    async fn test_connect_wireless_requires_cable() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        let mut rx = rig.engine.subscribe();

        rig.engine.handle_message(Message::ConnectWireless { id });

        let events = drain(&mut rx);
        assert!(matches!(events[0], EngineEvent::WirelessFailed { .. }));
        assert!(rig.bridge.wireless_calls().is_empty());
    }

    #[tokio::test]
    async fn test_wireless_finished_emits_and_polls() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        let mut rx = rig.engine.subscribe();

        rig.engine.handle_message(Message::WirelessFinished {
            id: id.clone(),
            result: WirelessOutcome::Connected {
                address: "192.168.1.50:5555".to_string(),
            },
        });

        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            EngineEvent::WirelessConnected { address, .. } if address == "192.168.1.50:5555"
        ));
        assert!(rig.engine.poll_in_flight);
    }

    #[tokio::test]
    async fn test_select_save_path_replies() {
        struct FixedPicker;
        impl SavePathPicker for FixedPicker {
            fn pick(&self, _current: Option<&std::path::Path>) -> Option<std::path::PathBuf> {
                Some(std::path::PathBuf::from("/tmp/recordings"))
            }
        }

        let rig = test_rig(manual_settings(&[]));
        let mut engine = rig.engine.with_save_path_picker(Box::new(FixedPicker));
        let (reply, rx) = oneshot::channel();
        engine.handle_message(Message::SelectSavePath { reply });

        assert_eq!(
            rx.await.unwrap(),
            Some(std::path::PathBuf::from("/tmp/recordings"))
        );
    }

    #[tokio::test]
    async fn test_save_path_dialog_does_not_block_engine() {
        struct BlockingPicker {
            release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        }
        impl SavePathPicker for BlockingPicker {
            fn pick(&self, _current: Option<&std::path::Path>) -> Option<std::path::PathBuf> {
                let _ = self.release.lock().ok()?.recv();
                Some(std::path::PathBuf::from("/tmp/recordings"))
            }
        }

        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let rig = test_rig(manual_settings(&[]));
        let mut engine = rig.engine.with_save_path_picker(Box::new(BlockingPicker {
            release: std::sync::Mutex::new(release_rx),
        }));
        let (reply, mut rx) = oneshot::channel();
        engine.handle_message(Message::SelectSavePath { reply });

        // Dialog still open; the actor keeps serving commands
        engine.handle_message(Message::SetTheme {
            theme: "Light".to_string(),
        });
        assert_eq!(engine.settings().theme, "Light");
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ));

        release_tx.send(()).unwrap();
        assert_eq!(
            rx.await.unwrap(),
            Some(std::path::PathBuf::from("/tmp/recordings"))
        );
    }

    #[tokio::test]
    async fn test_drifted_registry_repaired_and_saved_on_load() {
        let mut device = Device::discovered("ABC123", "Pixel_7");
        device.id.clear();
        device.settings.wireless_profile.video_bitrate = 4;
        let rig = test_rig(AppSettings {
            devices: vec![device],
            ..AppSettings::default()
        });

        assert_eq!(rig.store.saves(), 1);
        let saved = rig.store.saved();
        let stored = &saved.devices[0];
        assert!(stored.id.starts_with("dev-"));
        assert_eq!(stored.settings.cable_profile, stored.settings.wireless_profile);
        assert_eq!(rig.engine.devices()[0].id(), stored.id);
    }

    #[tokio::test]
    async fn test_clean_registry_not_saved_on_load() {
        let rig = test_rig(manual_settings(&["ABC123", "R58M123"]));
        assert_eq!(rig.store.saves(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_discovery_is_never_overlapped() {
        let TestRig { engine, bridge, .. } = test_rig(manual_settings(&["ABC123"]));
        bridge.hold_discovery();
        let handle = engine.handle();
        let task = tokio::spawn(engine.run());

        // Three ticks and a manual refresh while the first pass hangs
        tokio::time::sleep(Duration::from_secs(17)).await;
        handle.refresh().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(bridge.discover_calls(), 1);

        bridge.release_discovery();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(bridge.discover_calls(), 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_all() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        let id = id_of(&rig, "ABC123");
        rig.bridge.set_sample(vec![cable("ABC123")]);
        rig.engine.poll_once().await;
        rig.engine.handle_message(Message::StartMirroring { id });
        let mut rx = rig.engine.subscribe();

        rig.engine.shutdown();

        assert!(rig.engine.should_quit());
        assert!(rig.mirroring.calls().contains(&MirrorCall::StopAll));
        assert!(rig.engine.devices().iter().all(|vm| !vm.is_mirroring));
        assert!(matches!(
            drain(&mut rx).last(),
            Some(EngineEvent::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_wireless_ip_is_persisted() {
        let mut rig = test_rig(manual_settings(&["ABC123"]));
        rig.bridge.set_sample(vec![wireless("ABC123", "10.0.0.7")]);
        rig.engine.poll_once().await;

        let saved = rig.store.saved();
        assert_eq!(saved.devices[0].ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(rig.store.saves(), 1);
        assert_eq!(
            rig.engine.devices()[0].wireless_endpoint.as_deref(),
            Some("10.0.0.7:5555")
        );
    }
}
