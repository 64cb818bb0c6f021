//! Merging a discovery sample into the device registry
//!
//! [`reconcile`] is pure apart from the registry it is handed: it adds newly
//! seen serials, derives each device's transport status, carries the
//! mirroring flag forward from process liveness, and reports which policy
//! actions the transitions call for. Executing those actions is the engine's
//! job.

use std::collections::HashMap;

use sfleet_core::prelude::*;
use sfleet_core::{
    AppSettings, Device, DeviceViewModel, DiscoveredEndpoint, TransportKind, TransportStatus,
};

/// Live endpoints of one physical device
#[derive(Debug, Default)]
struct EndpointGroup<'a> {
    cable: Option<&'a DiscoveredEndpoint>,
    wireless: Option<&'a DiscoveredEndpoint>,
}

/// Something the engine must do to an active session after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyAction {
    /// Restart an active session on the transport that just became preferred
    Handover {
        id: String,
        from: TransportStatus,
        to: TransportStatus,
    },

    /// The device went away while a process was still tracked
    StopOffline { id: String },
}

/// A status change observed for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub id: String,
    pub from: TransportStatus,
    pub to: TransportStatus,
}

/// Result of one reconciliation pass
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// View models in registry order
    pub devices: Vec<DeviceViewModel>,

    /// Ids of devices created during this pass
    pub added: Vec<String>,

    /// Persisted fields changed (new devices, wireless address)
    pub registry_changed: bool,

    pub transitions: Vec<StatusTransition>,

    pub actions: Vec<PolicyAction>,
}

/// Merge `sample` into `registry`.
///
/// `previous` is the view-model list from the last pass and supplies the old
/// status for transition detection. `is_running` reports process liveness by
/// device id.
pub fn reconcile<F>(
    registry: &mut AppSettings,
    previous: &[DeviceViewModel],
    sample: &[DiscoveredEndpoint],
    is_running: F,
) -> ReconcileOutcome
where
    F: Fn(&str) -> bool,
{
    let mut outcome = ReconcileOutcome::default();

    // Group by physical serial, keeping first-seen order for new devices
    let mut groups: HashMap<&str, EndpointGroup<'_>> = HashMap::new();
    let mut seen_order: Vec<&str> = Vec::new();
    for endpoint in sample {
        let group = groups.entry(endpoint.serial.as_str()).or_insert_with(|| {
            seen_order.push(endpoint.serial.as_str());
            EndpointGroup::default()
        });
        let slot = match endpoint.transport {
            TransportKind::Cable => &mut group.cable,
            TransportKind::Wireless => &mut group.wireless,
        };
        if slot.is_none() {
            *slot = Some(endpoint);
        }
    }

    // Register serials never seen before
    for serial in seen_order {
        if registry.find_by_serial(serial).is_some() {
            continue;
        }
        let model = groups
            .get(serial)
            .and_then(|g| g.cable.or(g.wireless))
            .map(|ep| ep.model.as_str())
            .unwrap_or("Unknown");
        let device = Device::discovered(serial, model);
        info!(
            "New device {} ({}) registered as {}",
            device.name,
            serial,
            device.id
        );
        outcome.added.push(device.id.clone());
        registry.devices.push(device);
        outcome.registry_changed = true;
    }

    let old_status: HashMap<&str, TransportStatus> = previous
        .iter()
        .map(|vm| (vm.id(), vm.status))
        .collect();

    // One view model per registry entry, in registry order
    for device in registry.devices.iter_mut() {
        let group = groups.get(device.serial.as_str());
        let cable = group.and_then(|g| g.cable);
        let wireless = group.and_then(|g| g.wireless);

        if let Some(ip) = wireless.and_then(DiscoveredEndpoint::ip_address) {
            if device.ip_address.as_deref() != Some(ip.as_str()) {
                device.ip_address = Some(ip);
                outcome.registry_changed = true;
            }
        }

        let status = TransportStatus::from_presence(cable.is_some(), wireless.is_some());
        let is_mirroring = is_running(&device.id);
        let from = old_status
            .get(device.id.as_str())
            .copied()
            .unwrap_or(TransportStatus::Offline);

        if from != status {
            info!("{} ({}): {} -> {}", device.name, device.id, from, status);
            outcome.transitions.push(StatusTransition {
                id: device.id.clone(),
                from,
                to: status,
            });
            if is_mirroring {
                if let Some(action) = policy_for(device, from, status) {
                    outcome.actions.push(action);
                }
            }
        }

        outcome.devices.push(DeviceViewModel {
            device: device.clone(),
            status,
            is_mirroring,
            cable_endpoint: cable.map(|ep| ep.address.clone()),
            wireless_endpoint: wireless.map(|ep| ep.address.clone()),
        });
    }

    outcome
}

/// Decide what an active session needs after `from -> to`.
///
/// - wireless only → cable present: move to cable if `auto_switch_to_cable`
/// - cable present → wireless only: move to wireless if `auto_switch_to_wireless`
/// - anything → offline: stop the leftover process
pub fn policy_for(
    device: &Device,
    from: TransportStatus,
    to: TransportStatus,
) -> Option<PolicyAction> {
    let settings = &device.settings;

    if to == TransportStatus::Offline {
        return Some(PolicyAction::StopOffline {
            id: device.id.clone(),
        });
    }

    let to_cable = from == TransportStatus::Wireless && to.has_cable();
    let to_wireless = from.has_cable() && to == TransportStatus::Wireless;

    if (to_cable && settings.auto_switch_to_cable)
        || (to_wireless && settings.auto_switch_to_wireless)
    {
        Some(PolicyAction::Handover {
            id: device.id.clone(),
            from,
            to,
        })
    } else {
        None
    }
}

/// Apply a user-supplied order to the registry.
///
/// Listed ids come first in the given order; unknown ids are ignored and
/// devices not listed keep their relative order after the listed ones.
/// Returns whether the order changed.
pub fn apply_order(registry: &mut AppSettings, ids: &[String]) -> bool {
    let before: Vec<String> = registry.devices.iter().map(|d| d.id.clone()).collect();

    let mut remaining: Vec<Option<Device>> =
        std::mem::take(&mut registry.devices).into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    for id in ids {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|d| &d.id == id))
        {
            if let Some(device) = slot.take() {
                ordered.push(device);
            }
        }
    }
    ordered.extend(remaining.into_iter().flatten());
    registry.devices = ordered;

    registry
        .devices
        .iter()
        .map(|d| d.id.as_str())
        .ne(before.iter().map(String::as_str))
}

/// Reorder view models to match the registry
pub fn sort_like_registry(devices: &mut [DeviceViewModel], registry: &AppSettings) {
    devices.sort_by_key(|vm| registry.position(vm.id()).unwrap_or(usize::MAX));
}
