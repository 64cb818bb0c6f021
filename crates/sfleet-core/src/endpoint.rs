//! Discovered device endpoints and transport classification

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `a.b.c.d:port` serials reported for devices connected with `adb connect`
static WIRELESS_SERIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d+$").expect("Invalid wireless serial regex")
});

static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").expect("Invalid IPv4 regex")
});

/// Suffix of mDNS names adb assigns to devices paired over Wi-Fi
const MDNS_TLS_SUFFIX: &str = "._adb-tls-connect._tcp";

/// Transport over which a single endpoint is reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
    Cable,
    Wireless,
}

impl TransportKind {
    /// Classify an adb serial string.
    pub fn classify(address: &str) -> Self {
        if WIRELESS_SERIAL.is_match(address) || address.contains(MDNS_TLS_SUFFIX) {
            TransportKind::Wireless
        } else {
            TransportKind::Cable
        }
    }
}

/// One line of discovery output, after filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredEndpoint {
    /// Physical serial (join key across transports)
    pub serial: String,

    pub model: String,

    pub transport: TransportKind,

    /// adb serial used to address this endpoint (`-s <address>`)
    pub address: String,
}

impl DiscoveredEndpoint {
    pub fn cable(serial: impl Into<String>, model: impl Into<String>) -> Self {
        let serial = serial.into();
        Self {
            address: serial.clone(),
            serial,
            model: model.into(),
            transport: TransportKind::Cable,
        }
    }

    pub fn wireless(
        serial: impl Into<String>,
        model: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            serial: serial.into(),
            model: model.into(),
            transport: TransportKind::Wireless,
            address: address.into(),
        }
    }

    /// IPv4 address embedded in the endpoint address, if any
    pub fn ip_address(&self) -> Option<String> {
        parse_ipv4(&self.address)
    }
}

/// Extract the first dotted IPv4 address from a string
pub fn parse_ipv4(text: &str) -> Option<String> {
    IPV4.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
