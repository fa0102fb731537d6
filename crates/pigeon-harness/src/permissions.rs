//! Permission sources for tests and simulation

use std::sync::atomic::{AtomicBool, Ordering};

use pigeon_core::{Capability, PermissionSource};

/// Grants that can be flipped at runtime
#[derive(Debug)]
pub struct StaticPermissions {
    fine_location: AtomicBool,
    nearby_wifi_devices: AtomicBool,
}

impl StaticPermissions {
    pub fn new(fine_location: bool, nearby_wifi_devices: bool) -> Self {
        Self {
            fine_location: AtomicBool::new(fine_location),
            nearby_wifi_devices: AtomicBool::new(nearby_wifi_devices),
        }
    }

    pub fn all_granted() -> Self {
        Self::new(true, true)
    }

    pub fn denied() -> Self {
        Self::new(false, false)
    }

    pub fn set(&self, capability: Capability, granted: bool) {
        self.flag(capability).store(granted, Ordering::SeqCst);
    }

    pub fn grant_all(&self) {
        self.set(Capability::FineLocation, true);
        self.set(Capability::NearbyWifiDevices, true);
    }

    pub fn revoke_all(&self) {
        self.set(Capability::FineLocation, false);
        self.set(Capability::NearbyWifiDevices, false);
    }

    fn flag(&self, capability: Capability) -> &AtomicBool {
        match capability {
            Capability::FineLocation => &self.fine_location,
            Capability::NearbyWifiDevices => &self.nearby_wifi_devices,
        }
    }
}

impl PermissionSource for StaticPermissions {
    fn is_granted(&self, capability: Capability) -> bool {
        self.flag(capability).load(Ordering::SeqCst)
    }
}
