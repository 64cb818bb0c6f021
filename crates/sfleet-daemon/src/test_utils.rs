//! Test utilities for daemon types
//!
//! Provides helpers for building discovery samples and view models.

use sfleet_core::{Device, DeviceViewModel, DiscoveredEndpoint, TransportStatus};

/// Cable endpoint whose adb serial is the hardware serial
pub fn cable(serial: &str) -> DiscoveredEndpoint {
    DiscoveredEndpoint::cable(serial, "Pixel_7")
}

/// Wireless endpoint for `serial` at `<ip>:5555`
pub fn wireless(serial: &str, ip: &str) -> DiscoveredEndpoint {
    DiscoveredEndpoint::wireless(serial, "Pixel_7", format!("{}:5555", ip))
}

/// View model for a fresh device with the given live status.
///
/// Endpoints are filled in to match the status.
pub fn test_view_model(serial: &str, status: TransportStatus) -> DeviceViewModel {
    let mut vm = DeviceViewModel::offline(Device::discovered(serial, "Pixel_7"));
    vm.status = status;
    if status.has_cable() {
        vm.cable_endpoint = Some(serial.to_string());
    }
    if status.has_wireless() {
        vm.wireless_endpoint = Some("192.168.1.50:5555".to_string());
    }
    vm
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfleet_core::TransportKind;

    #[test]
    fn test_endpoint_helpers() {
        assert_eq!(cable("A1").transport, TransportKind::Cable);
        let ep = wireless("A1", "10.0.0.9");
        assert_eq!(ep.address, "10.0.0.9:5555");
        assert_eq!(ep.serial, "A1");
    }

    #[test]
    fn test_view_model_endpoints_follow_status() {
        let vm = test_view_model("A1", TransportStatus::CableAndWireless);
        assert_eq!(vm.cable_endpoint.as_deref(), Some("A1"));
        assert!(vm.wireless_endpoint.is_some());

        let vm = test_view_model("A1", TransportStatus::Offline);
        assert!(vm.cable_endpoint.is_none());
        assert!(vm.wireless_endpoint.is_none());
    }
}
