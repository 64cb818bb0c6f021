//! Integration tests for the on-disk settings document
//!
//! Uses the fixtures in `tests/fixtures/settings/`.

use std::path::{Path, PathBuf};

use sfleet_app::{read_settings_file, JsonSettingsStore, SettingsStore};
use sfleet_core::{AppSettings, Device, RecordFormat, VideoCodec};
use tempfile::tempdir;
use tokio_test::assert_ok;

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/settings")
        .join(name)
}

#[test]
fn test_legacy_document_keys_are_accepted() {
    let settings = read_settings_file(&fixture_path("legacy_settings.json"));

    assert!(!settings.global_auto_connect);
    assert_eq!(settings.theme, "Dark");
    assert_eq!(settings.devices.len(), 2);

    let pixel = &settings.devices[0];
    assert_eq!(pixel.id, "dev-1712051234567-3fa2");
    assert_eq!(pixel.ip_address.as_deref(), Some("192.168.1.40"));
    assert!(!pixel.settings.auto_switch_to_wireless);
    assert!(pixel.settings.auto_switch_to_cable);
    assert!(pixel.settings.separate_profiles);
    assert_eq!(pixel.settings.cable_profile.video_bitrate, 16);
    assert_eq!(pixel.settings.cable_profile.video_codec, VideoCodec::H265);
    assert_eq!(pixel.settings.wireless_profile.max_size, 1280);
    assert!(!pixel.settings.wireless_profile.audio_enabled);
    assert_eq!(pixel.settings.recording.record_format, RecordFormat::Mkv);
    assert_eq!(
        pixel.settings.recording.save_path,
        PathBuf::from("/tmp/recordings")
    );
}

#[test]
fn test_sparse_device_gets_defaults() {
    let settings = read_settings_file(&fixture_path("legacy_settings.json"));

    let emulator = &settings.devices[1];
    assert!(emulator.id.starts_with("dev-"));
    assert_eq!(emulator.name, "New Device");
    assert!(emulator.settings.auto_connect);
    assert!(!emulator.settings.separate_profiles);
}

#[test]
fn test_truncated_document_falls_back_to_defaults() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("settings.json");
    std::fs::copy(fixture_path("truncated_settings.json"), &path).unwrap();

    let settings = read_settings_file(&path);

    assert_eq!(settings, AppSettings::default());
    assert!(temp.path().join("settings.json.bak").exists());
}

#[test]
fn test_save_then_load_preserves_registry() {
    let temp = tempdir().unwrap();
    let mut store = JsonSettingsStore::new(temp.path().join("settings.json"));

    let mut pixel = Device::discovered("1A2B3C4D", "Pixel_7");
    pixel.ip_address = Some("192.168.1.40".to_string());
    pixel.settings.auto_switch_to_cable = false;
    let settings = AppSettings {
        global_auto_connect: false,
        theme: "Light".to_string(),
        devices: vec![pixel, Device::discovered("R58M123", "SM_G991B")],
    };

    assert_ok!(store.save(&settings));
    let loaded = store.load();

    assert_eq!(loaded, settings);
}

#[test]
fn test_legacy_document_is_rewritten_with_current_keys() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("settings.json");
    std::fs::copy(fixture_path("legacy_settings.json"), &path).unwrap();

    let mut store = JsonSettingsStore::new(&path);
    let settings = store.load();
    assert_ok!(store.save(&settings));

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("\"autoSwitchToWireless\""));
    assert!(content.contains("\"cableProfile\""));
    assert!(!content.contains("\"usbProfile\""));
    assert_eq!(store.load(), settings);
}

#[test]
fn test_shared_profiles_converge_on_load() {
    let settings = read_settings_file(&fixture_path("legacy_shared_profiles.json"));

    let galaxy = &settings.devices[0].settings;
    assert!(!galaxy.separate_profiles);
    assert_eq!(galaxy.cable_profile.video_bitrate, 12);
    assert_eq!(galaxy.cable_profile.max_fps, 60);
    assert_eq!(galaxy.wireless_profile, galaxy.cable_profile);
}

#[test]
fn test_repaired_document_is_written_back_once() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("settings.json");
    std::fs::copy(fixture_path("legacy_shared_profiles.json"), &path).unwrap();

    let store = JsonSettingsStore::new(&path);
    let first = store.load();
    let rewritten = std::fs::read_to_string(&path).unwrap();
    let second = store.load();

    // Backfilled id survives a restart
    assert!(first.devices[0].id.starts_with("dev-"));
    assert_eq!(second, first);
    assert!(rewritten.contains(&first.devices[0].id));
    assert!(!rewritten.contains("\"wifiProfile\""));

    // Nothing left to repair, so the second load leaves the file alone
    assert_eq!(std::fs::read_to_string(&path).unwrap(), rewritten);
}
