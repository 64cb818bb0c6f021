//! Device discovery and wireless pairing through `adb`
//!
//! Discovery runs `adb devices -l`, keeps endpoints in the `device` state and
//! joins wireless endpoints to their hardware serial via
//! `getprop ro.serialno`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use regex::Regex;
use sfleet_core::prelude::*;
use sfleet_core::{DiscoveredEndpoint, TransportKind};
use tokio::process::Command;
use tokio::time::timeout;

/// Default timeout for a single adb invocation
pub const DEFAULT_ADB_TIMEOUT: Duration = Duration::from_secs(30);

/// Default port for `adb tcpip`
pub const DEFAULT_WIRELESS_PORT: u16 = 5555;

static SERIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9._:\-]+)\s+(\S+)").expect("Invalid adb serial regex")
});

static MODEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"model:(\S+)").expect("Invalid adb model regex"));

static INET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"inet (\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").expect("Invalid inet regex")
});

/// One usable line of `adb devices -l`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbDeviceLine {
    /// adb serial (`-s` target)
    pub address: String,
    /// `model:` token, or "Unknown"
    pub model: String,
}

/// Parse `adb devices -l` output.
///
/// Only entries in the `device` state are returned; `unauthorized`,
/// `offline`, `authorizing`, `no permissions` and the like are dropped.
pub fn parse_devices_output(output: &str) -> Vec<AdbDeviceLine> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let caps = SERIAL_PATTERN.captures(line)?;
            let state = caps.get(2)?.as_str();
            if state != "device" {
                trace!("Skipping adb entry in state {}: {}", state, line);
                return None;
            }
            let model = MODEL_PATTERN
                .captures(line)
                .and_then(|m| m.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            Some(AdbDeviceLine {
                address: caps.get(1)?.as_str().to_string(),
                model,
            })
        })
        .collect()
}

/// Extract the wlan address from `ip addr show wlan0`
pub fn parse_wlan_address(output: &str) -> Option<String> {
    INET_PATTERN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Captured output of one adb run
#[derive(Debug)]
struct AdbOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

impl AdbOutput {
    fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Handle to the adb executable.
///
/// The hardware serial of each wireless address is looked up once and cached
/// for the lifetime of the adapter.
#[derive(Debug)]
pub struct AdbBridge {
    adb: PathBuf,
    timeout: Duration,
    serial_cache: Mutex<HashMap<String, String>>,
}

impl AdbBridge {
    pub fn new(adb: impl Into<PathBuf>) -> Self {
        Self::with_timeout(adb, DEFAULT_ADB_TIMEOUT)
    }

    pub fn with_timeout(adb: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            adb: adb.into(),
            timeout,
            serial_cache: Mutex::new(HashMap::new()),
        }
    }

    /// List reachable endpoints. Never fails: a missing adb or a failed run
    /// yields an empty list.
    pub async fn discover(&self) -> Vec<DiscoveredEndpoint> {
        match self.try_discover().await {
            Ok(endpoints) => endpoints,
            Err(Error::ToolNotFound { .. }) => {
                warn!("adb not found at {}; no devices", self.adb.display());
                Vec::new()
            }
            Err(e) => {
                warn!("Device discovery failed: {}", e);
                Vec::new()
            }
        }
    }

    /// List reachable endpoints, surfacing failures
    pub async fn try_discover(&self) -> Result<Vec<DiscoveredEndpoint>> {
        let start = std::time::Instant::now();
        let output = self.run(&["devices", "-l"]).await?;
        if !output.success {
            return Err(Error::discovery(format!(
                "adb devices failed: {}",
                output.stderr.trim()
            )));
        }

        let lines = parse_devices_output(&output.stdout);
        let mut endpoints = Vec::with_capacity(lines.len());

        for line in lines {
            let endpoint = match TransportKind::classify(&line.address) {
                TransportKind::Cable => DiscoveredEndpoint::cable(line.address, line.model),
                TransportKind::Wireless => {
                    let serial = self.hardware_serial(&line.address).await;
                    DiscoveredEndpoint::wireless(serial, line.model, line.address)
                }
            };
            endpoints.push(endpoint);
        }

        debug!(
            "Discovered {} endpoints in {:?}",
            endpoints.len(),
            start.elapsed()
        );
        Ok(endpoints)
    }

    /// Hardware serial behind a wireless address, cached.
    ///
    /// Falls back to the address itself when the device cannot be queried.
    async fn hardware_serial(&self, address: &str) -> String {
        if let Some(serial) = self.cached_serial(address) {
            return serial;
        }

        let serial = match self
            .run(&["-s", address, "shell", "getprop", "ro.serialno"])
            .await
        {
            Ok(out) if out.success && !out.stdout.trim().is_empty() => {
                out.stdout.trim().to_string()
            }
            Ok(out) => {
                debug!(
                    "getprop ro.serialno failed for {}: {}",
                    address,
                    out.stderr.trim()
                );
                return address.to_string();
            }
            Err(e) => {
                debug!("getprop ro.serialno failed for {}: {}", address, e);
                return address.to_string();
            }
        };

        if let Ok(mut cache) = self.serial_cache.lock() {
            cache.insert(address.to_string(), serial.clone());
        }
        serial
    }

    fn cached_serial(&self, address: &str) -> Option<String> {
        self.serial_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(address).cloned())
    }

    /// Switch a cable-attached device to TCP mode and connect to it.
    ///
    /// Returns the wireless address (`ip:port`) on success.
    pub async fn enable_wireless(&self, cable_serial: &str, port: u16) -> Result<String> {
        let ip = self.wlan_address(cable_serial).await.ok_or_else(|| {
            Error::wireless(format!("{} has no wlan0 address", cable_serial))
        })?;

        let port_str = port.to_string();
        let tcpip = self.run(&["-s", cable_serial, "tcpip", &port_str]).await?;
        let expected = format!("restarting in TCP mode port: {}", port);
        if !tcpip.combined().contains(&expected) {
            return Err(Error::wireless(format!(
                "adb tcpip failed for {}: {}",
                cable_serial,
                tcpip.combined().trim()
            )));
        }

        let address = format!("{}:{}", ip, port);
        let connect = self.run(&["connect", &address]).await?;
        let text = connect.combined();
        if text.contains(&format!("connected to {}", address)) {
            info!("Wireless connection established: {}", address);
            if let Ok(mut cache) = self.serial_cache.lock() {
                cache.insert(address.clone(), cable_serial.to_string());
            }
            Ok(address)
        } else {
            Err(Error::wireless(format!(
                "adb connect {} failed: {}",
                address,
                text.trim()
            )))
        }
    }

    /// Drop a wireless connection (`adb disconnect <address>`)
    pub async fn disconnect_wireless(&self, address: &str) -> Result<()> {
        let out = self.run(&["disconnect", address]).await?;
        let text = out.combined();
        if text.contains("disconnected") {
            info!("Wireless connection closed: {}", address);
            Ok(())
        } else {
            Err(Error::wireless(format!(
                "adb disconnect {} failed: {}",
                address,
                text.trim()
            )))
        }
    }

    /// IPv4 address a device reports for wlan0
    pub async fn wlan_address(&self, serial: &str) -> Option<String> {
        let out = self
            .run(&["-s", serial, "shell", "ip", "addr", "show", "wlan0"])
            .await
            .ok()?;
        parse_wlan_address(&out.stdout)
    }

    async fn run(&self, args: &[&str]) -> Result<AdbOutput> {
        trace!("adb {}", args.join(" "));

        let fut = Command::new(&self.adb)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::process(format!("adb {} timed out", args.join(" "))))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found("adb")
                } else {
                    Error::spawn("adb", e.to_string())
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stderr.is_empty() && !stderr.contains("adb server is out of date") {
            debug!("adb {} stderr: {}", args.join(" "), stderr.trim());
        }

        Ok(AdbOutput {
            stdout,
            stderr,
            success: output.status.success(),
        })
    }
}
