//! One-shot device listing for `sfleet devices`

use sfleet_app::{reconcile, DeviceBridge, SettingsStore};
use sfleet_core::DeviceViewModel;

/// Run one discovery and merge it with the stored registry.
///
/// Nothing is started and nothing is written: serials not yet registered show
/// up with an id that is not persisted.
pub async fn snapshot<B: DeviceBridge>(
    bridge: &B,
    store: &dyn SettingsStore,
) -> Vec<DeviceViewModel> {
    let mut settings = store.load();
    let sample = bridge.discover().await;
    reconcile(&mut settings, &[], &sample, |_| false).devices
}
