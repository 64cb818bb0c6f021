//! Test doubles for the engine's seams
//!
//! Every double is a cheap clone over shared state, so a test can hand one
//! copy to the engine and keep another to script and inspect it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use sfleet_core::prelude::*;
use sfleet_core::{AppSettings, DeviceViewModel, DiscoveredEndpoint, TransportKind};
use sfleet_daemon::{LaunchToken, MirrorExit};
use tokio::sync::{mpsc, Semaphore};

use crate::engine::{Engine, EngineOptions};
use crate::services::{DeviceBridge, Mirroring};
use crate::store::SettingsStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─────────────────────────────────────────────────────────────────────────────
// FakeBridge
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BridgeState {
    sample: Vec<DiscoveredEndpoint>,
    discover_calls: usize,
    wireless_failure: Option<String>,
    wireless_calls: Vec<String>,
    gate: Option<Arc<Semaphore>>,
}

/// Scripted discovery: returns whatever sample was last set
#[derive(Debug, Clone, Default)]
pub struct FakeBridge {
    state: Arc<Mutex<BridgeState>>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sample(&self, sample: Vec<DiscoveredEndpoint>) {
        lock(&self.state).sample = sample;
    }

    pub fn discover_calls(&self) -> usize {
        lock(&self.state).discover_calls
    }

    /// Make discovery runs block until [`FakeBridge::release_discovery`]
    pub fn hold_discovery(&self) {
        lock(&self.state).gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held and future discovery runs complete
    pub fn release_discovery(&self) {
        if let Some(gate) = lock(&self.state).gate.take() {
            gate.close();
        }
    }

    /// Make the next wireless commands fail with `reason`
    pub fn fail_wireless(&self, reason: impl Into<String>) {
        lock(&self.state).wireless_failure = Some(reason.into());
    }

    /// `connect <endpoint>:<port>` / `disconnect <address>` in call order
    pub fn wireless_calls(&self) -> Vec<String> {
        lock(&self.state).wireless_calls.clone()
    }
}

impl DeviceBridge for FakeBridge {
    async fn discover(&self) -> Vec<DiscoveredEndpoint> {
        let gate = {
            let mut state = lock(&self.state);
            state.discover_calls += 1;
            state.gate.clone()
        };
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }
        lock(&self.state).sample.clone()
    }

    async fn connect_wireless(&self, cable_endpoint: &str, port: u16) -> Result<String> {
        let mut state = lock(&self.state);
        state
            .wireless_calls
            .push(format!("connect {}:{}", cable_endpoint, port));
        if let Some(reason) = state.wireless_failure.clone() {
            return Err(Error::wireless(reason));
        }

        let address = format!("192.168.1.50:{}", port);
        let cable = state
            .sample
            .iter()
            .find(|ep| ep.transport == TransportKind::Cable && ep.address == cable_endpoint)
            .cloned();
        if let Some(cable) = cable {
            state.sample.push(DiscoveredEndpoint::wireless(
                cable.serial,
                cable.model,
                address.clone(),
            ));
        }
        Ok(address)
    }

    async fn disconnect_wireless(&self, address: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.wireless_calls.push(format!("disconnect {}", address));
        if let Some(reason) = state.wireless_failure.clone() {
            return Err(Error::wireless(reason));
        }
        state.sample.retain(|ep| ep.address != address);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordingMirroring
// ─────────────────────────────────────────────────────────────────────────────

/// One call observed by [`RecordingMirroring`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorCall {
    Start { id: String, endpoint: String },
    Stop { id: String },
    StopAll,
}

#[derive(Debug, Default)]
struct MirroringState {
    calls: Vec<MirrorCall>,
    sessions: HashMap<String, LaunchToken>,
    exited: HashSet<String>,
    next_token: LaunchToken,
    fail_starts: bool,
}

/// In-memory [`Mirroring`] that records every call.
///
/// Sessions behave like the real orchestrator: an exited session stops
/// reporting as running but stays tracked until it is reaped.
#[derive(Debug, Clone, Default)]
pub struct RecordingMirroring {
    state: Arc<Mutex<MirroringState>>,
}

impl RecordingMirroring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MirrorCall> {
        lock(&self.state).calls.clone()
    }

    /// Ids passed to `start`, in order
    pub fn starts(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                MirrorCall::Start { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids passed to `stop`, in order
    pub fn stops(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                MirrorCall::Stop { id } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Make subsequent starts fail as if scrcpy were missing
    pub fn fail_starts(&self, fail: bool) {
        lock(&self.state).fail_starts = fail;
    }

    /// Let the session for `id` exit on its own. Returns the report the
    /// process wait task would send.
    pub fn exit(&self, id: &str, code: Option<i32>) -> Option<MirrorExit> {
        let mut state = lock(&self.state);
        let token = *state.sessions.get(id)?;
        state.exited.insert(id.to_string());
        Some(MirrorExit {
            device_id: id.to_string(),
            token,
            code,
        })
    }
}

impl Mirroring for RecordingMirroring {
    fn start(&mut self, vm: &DeviceViewModel) -> Result<bool> {
        let mut state = lock(&self.state);
        let id = vm.id().to_string();
        if state.sessions.contains_key(&id) && !state.exited.contains(&id) {
            return Ok(false);
        }

        state.calls.push(MirrorCall::Start {
            id: id.clone(),
            endpoint: vm.launch_endpoint().to_string(),
        });
        if state.fail_starts {
            return Err(Error::tool_not_found("scrcpy"));
        }

        state.next_token += 1;
        let token = state.next_token;
        state.exited.remove(&id);
        state.sessions.insert(id, token);
        Ok(true)
    }

    fn stop(&mut self, id: &str) -> bool {
        let mut state = lock(&self.state);
        state.calls.push(MirrorCall::Stop { id: id.to_string() });
        state.exited.remove(id);
        state.sessions.remove(id).is_some()
    }

    fn stop_all(&mut self) {
        let mut state = lock(&self.state);
        state.calls.push(MirrorCall::StopAll);
        state.sessions.clear();
        state.exited.clear();
    }

    fn is_running(&self, id: &str) -> bool {
        let state = lock(&self.state);
        state.sessions.contains_key(id) && !state.exited.contains(id)
    }

    fn reap(&mut self, id: &str, token: LaunchToken) -> bool {
        let mut state = lock(&self.state);
        if state.sessions.get(id) == Some(&token) {
            state.sessions.remove(id);
            state.exited.remove(id);
            true
        } else {
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StoreState {
    settings: AppSettings,
    saves: usize,
    fail: bool,
}

/// [`SettingsStore`] kept in memory, counting saves
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: AppSettings) -> Self {
        let store = Self::default();
        lock(&store.state).settings = settings;
        store
    }

    pub fn saves(&self) -> usize {
        lock(&self.state).saves
    }

    /// Last document saved (or the seeded one)
    pub fn saved(&self) -> AppSettings {
        lock(&self.state).settings.clone()
    }

    /// Make saves fail
    pub fn fail_saves(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> AppSettings {
        lock(&self.state).settings.clone()
    }

    fn save(&mut self, settings: &AppSettings) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail {
            return Err(Error::persistence("memory://settings", "save refused"));
        }
        state.settings = settings.clone();
        state.saves += 1;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rig
// ─────────────────────────────────────────────────────────────────────────────

/// An engine wired to fakes, plus the handles to drive and inspect them
pub struct TestRig {
    pub engine: Engine<FakeBridge>,
    pub bridge: FakeBridge,
    pub mirroring: RecordingMirroring,
    pub store: MemoryStore,
    /// Feed [`RecordingMirroring::exit`] reports back into the engine
    pub exit_tx: mpsc::Sender<MirrorExit>,
}

/// Build a [`TestRig`] around a seeded settings document
pub fn test_rig(settings: AppSettings) -> TestRig {
    test_rig_with_options(settings, EngineOptions::default())
}

pub fn test_rig_with_options(settings: AppSettings, options: EngineOptions) -> TestRig {
    let bridge = FakeBridge::new();
    let mirroring = RecordingMirroring::new();
    let store = MemoryStore::with_settings(settings);
    let (exit_tx, exit_rx) = mpsc::channel(16);

    let engine = Engine::new(
        bridge.clone(),
        Box::new(mirroring.clone()),
        exit_rx,
        Box::new(store.clone()),
        options,
    );

    TestRig {
        engine,
        bridge,
        mirroring,
        store,
        exit_tx,
    }
}
