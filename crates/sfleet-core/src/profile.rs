//! Connection profile selection and the identical-profiles invariant
//!
//! When `separate_profiles` is off, the cable and wireless profiles must hold
//! the same values after every mutation. All writers go through
//! [`DeviceSettings::update_profile`] or [`DeviceSettings::normalized_against`].

use crate::endpoint::TransportKind;
use crate::types::{ConnectionProfile, DeviceSettings, TransportStatus};

/// Pick the profile a new session should use for the given status.
///
/// The wireless profile is used only when profiles are separate and the
/// device is reachable over wireless alone.
pub fn select_profile(settings: &DeviceSettings, status: TransportStatus) -> &ConnectionProfile {
    if settings.separate_profiles && status == TransportStatus::Wireless {
        &settings.wireless_profile
    } else {
        &settings.cable_profile
    }
}

impl DeviceSettings {
    /// Mutate one profile, mirroring the write onto the other profile when
    /// profiles are shared.
    pub fn update_profile<F>(&mut self, kind: TransportKind, f: F)
    where
        F: FnOnce(&mut ConnectionProfile),
    {
        let target = match kind {
            TransportKind::Cable => &mut self.cable_profile,
            TransportKind::Wireless => &mut self.wireless_profile,
        };
        f(target);

        if !self.separate_profiles {
            match kind {
                TransportKind::Cable => self.wireless_profile = self.cable_profile.clone(),
                TransportKind::Wireless => self.cable_profile = self.wireless_profile.clone(),
            }
        }
    }

    /// Turn separate profiles on or off. Turning them off copies the cable
    /// profile onto the wireless one.
    pub fn set_separate_profiles(&mut self, separate: bool) {
        self.separate_profiles = separate;
        self.sync_shared_profiles();
    }

    /// Copy the cable profile onto the wireless one if profiles are shared
    /// but have drifted apart. Returns whether anything changed.
    pub fn sync_shared_profiles(&mut self) -> bool {
        if self.separate_profiles || self.cable_profile == self.wireless_profile {
            return false;
        }
        self.wireless_profile = self.cable_profile.clone();
        true
    }

    /// Normalize a full settings replacement against the stored value.
    ///
    /// With shared profiles, the profile that differs from `previous` is the
    /// one the caller edited and is copied onto the other. If both differ the
    /// cable profile wins.
    pub fn normalized_against(mut self, previous: &DeviceSettings) -> DeviceSettings {
        if self.separate_profiles || self.cable_profile == self.wireless_profile {
            return self;
        }

        let cable_changed = self.cable_profile != previous.cable_profile;
        let wireless_changed = self.wireless_profile != previous.wireless_profile;

        if wireless_changed && !cable_changed {
            self.cable_profile = self.wireless_profile.clone();
        } else {
            self.wireless_profile = self.cable_profile.clone();
        }
        self
    }
}
