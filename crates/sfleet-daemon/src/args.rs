//! scrcpy command-line synthesis
//!
//! Flags are derived from the active [`ConnectionProfile`] and the device's
//! [`RecordingSettings`]. Zero-valued numeric fields are left to scrcpy's own
//! defaults.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use sfleet_core::{select_profile, ConnectionProfile, DeviceViewModel, RecordingSettings};

/// Full argument list for launching scrcpy against a device
pub fn build_mirror_args(vm: &DeviceViewModel, now: DateTime<Local>) -> Vec<String> {
    let profile = select_profile(&vm.device.settings, vm.status);

    let mut args = vec!["-s".to_string(), vm.launch_endpoint().to_string()];
    args.extend(profile_args(profile));
    args.extend(recording_args(
        &vm.device.settings.recording,
        &vm.device.name,
        now,
    ));
    args
}

/// Video, window and audio flags for a profile
pub fn profile_args(profile: &ConnectionProfile) -> Vec<String> {
    let mut args = Vec::new();

    if profile.video_enabled {
        if profile.max_size > 0 {
            args.push(format!("--max-size={}", profile.max_size));
        }
        if profile.video_bitrate > 0 {
            args.push(format!("--video-bit-rate={}M", profile.video_bitrate));
        }
        if profile.max_fps > 0 {
            args.push(format!("--max-fps={}", profile.max_fps));
        }
        if profile.video_buffer > 0 {
            args.push(format!("--video-buffer={}", profile.video_buffer));
        }
        args.push(format!("--video-codec={}", profile.video_codec));
    } else {
        args.push("--no-video".to_string());
    }

    if !profile.display_enabled {
        args.push("--no-window".to_string());
    }

    if profile.audio_enabled {
        if profile.audio_bitrate > 0 {
            args.push(format!("--audio-bit-rate={}K", profile.audio_bitrate));
        }
        args.push(format!("--audio-codec={}", profile.audio_codec));
        if profile.audio_buffer > 0 {
            args.push(format!("--audio-buffer={}", profile.audio_buffer));
        }
    } else {
        args.push("--no-audio".to_string());
    }

    args
}

/// `--record` flags, empty when recording is off
pub fn recording_args(
    recording: &RecordingSettings,
    device_name: &str,
    now: DateTime<Local>,
) -> Vec<String> {
    if !recording.is_enabled() {
        return Vec::new();
    }

    let path = recording_path(recording, device_name, now);
    vec![
        format!("--record={}", path.display()),
        format!("--record-format={}", recording.record_format),
    ]
}

/// `<save_path>/<name>_<yyyyMMdd_HHmmss>.<format>`
pub fn recording_path(
    recording: &RecordingSettings,
    device_name: &str,
    now: DateTime<Local>,
) -> PathBuf {
    let file_name = format!(
        "{}_{}.{}",
        sanitize_file_stem(device_name),
        now.format("%Y%m%d_%H%M%S"),
        recording.record_format
    );
    recording.save_path.join(file_name)
}

fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        "device".to_string()
    } else {
        cleaned
    }
}
