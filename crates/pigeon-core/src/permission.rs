//! Permission gate for discovery and connect operations
//!
//! Grants can be revoked at any moment, so the gate never caches: every call asks
//! the permission source again.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PermissionConfig;

/// First platform API level that requires the nearby Wi-Fi devices grant
pub const NEARBY_DEVICES_MIN_API_LEVEL: u32 = 33;

/// Capabilities that discovery and connect depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    FineLocation,
    NearbyWifiDevices,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::FineLocation => "fine-location",
            Capability::NearbyWifiDevices => "nearby-wifi-devices",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// OS-reported grant state
pub trait PermissionSource: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

/// Pure predicate over the current grants
#[derive(Clone)]
pub struct PermissionGate {
    source: Arc<dyn PermissionSource>,
    requires_nearby_devices: bool,
}

impl PermissionGate {
    pub fn new(source: Arc<dyn PermissionSource>, config: &PermissionConfig) -> Self {
        Self {
            source,
            requires_nearby_devices: config.api_level >= NEARBY_DEVICES_MIN_API_LEVEL,
        }
    }

    /// Capabilities required on this platform version
    pub fn required(&self) -> Vec<Capability> {
        let mut required = vec![Capability::FineLocation];
        if self.requires_nearby_devices {
            required.push(Capability::NearbyWifiDevices);
        }
        required
    }

    /// Required capabilities that are not granted right now
    pub fn missing(&self) -> Vec<Capability> {
        self.required()
            .into_iter()
            .filter(|capability| !self.source.is_granted(*capability))
            .collect()
    }

    pub fn can_discover_and_connect(&self) -> bool {
        self.required()
            .into_iter()
            .all(|capability| self.source.is_granted(capability))
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate")
            .field("requires_nearby_devices", &self.requires_nearby_devices)
            .finish()
    }
}
