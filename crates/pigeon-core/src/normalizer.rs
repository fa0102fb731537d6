//! Event Normalizer
//!
//! Converts raw platform notifications and request replies into canonical
//! [`Event`]s. Unknown broadcast categories are dropped here so they never reach the
//! state machine. No reordering and no deduplication happen at this layer; the state
//! machine's transitions are idempotent instead.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::RequestId;
use crate::types::Peer;

/// Raw radio state value meaning "disabled"
pub const WIFI_P2P_STATE_DISABLED: i32 = 1;
/// Raw radio state value meaning "enabled"
pub const WIFI_P2P_STATE_ENABLED: i32 = 2;

// ----------------------------------------------------------------------------
// Raw Platform Input
// ----------------------------------------------------------------------------

/// Network info attached to a raw connection-changed broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConnectionInfo {
    pub is_connected: bool,
    pub detailed_state: Option<String>,
}

impl RawConnectionInfo {
    pub fn connected() -> Self {
        Self {
            is_connected: true,
            detailed_state: Some("CONNECTED".to_string()),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
            detailed_state: Some("DISCONNECTED".to_string()),
        }
    }
}

/// A device record as the platform reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDevice {
    pub device_address: String,
    pub device_name: String,
    pub status: i32,
}

/// Broadcast notifications from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawBroadcast {
    StateChanged {
        wifi_state: i32,
    },
    PeersChanged,
    ConnectionChanged {
        network_info: Option<RawConnectionInfo>,
    },
    ThisDeviceChanged,
    /// Any category this layer does not know about
    Unrecognized {
        action: String,
    },
}

/// Replies to requests previously submitted to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawReply {
    /// The platform accepted the request; the outcome follows separately
    Accepted { request: RequestId },
    /// The platform declined the request with a failure code
    Failed { request: RequestId, reason: i32 },
    PeerList {
        request: RequestId,
        devices: Vec<RawDevice>,
    },
    ConnectionAddress {
        request: RequestId,
        group_formed: bool,
        is_group_owner: bool,
        group_owner_address: Option<String>,
    },
    LocalDevice {
        request: RequestId,
        device: Option<RawDevice>,
    },
}

/// Everything a platform adapter can deliver to the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawEvent {
    Broadcast(RawBroadcast),
    Reply(RawReply),
}

impl From<RawBroadcast> for RawEvent {
    fn from(broadcast: RawBroadcast) -> Self {
        RawEvent::Broadcast(broadcast)
    }
}

impl From<RawReply> for RawEvent {
    fn from(reply: RawReply) -> Self {
        RawEvent::Reply(reply)
    }
}

// ----------------------------------------------------------------------------
// Canonical Events
// ----------------------------------------------------------------------------

/// Canonical input of the session state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RadioChanged {
        enabled: bool,
    },
    /// Signal only: the platform does not push the list itself
    PeersChanged,
    ConnectionChanged {
        info: RawConnectionInfo,
    },
    /// Signal only: the identity has to be requested
    IdentityChanged,
    PeerListReceived {
        request: RequestId,
        peers: Vec<Peer>,
    },
    AddressInfoReceived {
        request: RequestId,
        is_coordinator: bool,
        peer_address: Option<IpAddr>,
    },
    LocalIdentityReceived {
        request: RequestId,
        display_name: Option<String>,
    },
    RequestAccepted {
        request: RequestId,
    },
    RequestRejected {
        request: RequestId,
        reason: String,
    },
    /// A deadline scheduled by the session has expired
    RequestTimedOut {
        request: RequestId,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RadioChanged { .. } => "RadioChanged",
            Event::PeersChanged => "PeersChanged",
            Event::ConnectionChanged { .. } => "ConnectionChanged",
            Event::IdentityChanged => "IdentityChanged",
            Event::PeerListReceived { .. } => "PeerListReceived",
            Event::AddressInfoReceived { .. } => "AddressInfoReceived",
            Event::LocalIdentityReceived { .. } => "LocalIdentityReceived",
            Event::RequestAccepted { .. } => "RequestAccepted",
            Event::RequestRejected { .. } => "RequestRejected",
            Event::RequestTimedOut { .. } => "RequestTimedOut",
        }
    }
}

// ----------------------------------------------------------------------------
// Normalization
// ----------------------------------------------------------------------------

/// Map a raw notification to its canonical event, or drop it
pub fn normalize(raw: RawEvent) -> Option<Event> {
    match raw {
        RawEvent::Broadcast(broadcast) => normalize_broadcast(broadcast),
        RawEvent::Reply(reply) => Some(normalize_reply(reply)),
    }
}

fn normalize_broadcast(broadcast: RawBroadcast) -> Option<Event> {
    match broadcast {
        RawBroadcast::StateChanged { wifi_state } => Some(Event::RadioChanged {
            enabled: wifi_state == WIFI_P2P_STATE_ENABLED,
        }),
        RawBroadcast::PeersChanged => Some(Event::PeersChanged),
        // A broadcast without network info is treated as not connected
        RawBroadcast::ConnectionChanged { network_info } => Some(Event::ConnectionChanged {
            info: network_info.unwrap_or_else(|| RawConnectionInfo {
                is_connected: false,
                detailed_state: None,
            }),
        }),
        RawBroadcast::ThisDeviceChanged => Some(Event::IdentityChanged),
        RawBroadcast::Unrecognized { action } => {
            debug!("Dropping unrecognized platform broadcast: {}", action);
            None
        }
    }
}

fn normalize_reply(reply: RawReply) -> Event {
    match reply {
        RawReply::Accepted { request } => Event::RequestAccepted { request },
        RawReply::Failed { request, reason } => Event::RequestRejected {
            request,
            reason: failure_reason(reason).to_string(),
        },
        RawReply::PeerList { request, devices } => Event::PeerListReceived {
            request,
            peers: devices
                .into_iter()
                .filter(|device| !device.device_address.trim().is_empty())
                .map(|device| Peer::new(device.device_address, device.device_name, device.status))
                .collect(),
        },
        RawReply::ConnectionAddress {
            request,
            group_formed,
            is_group_owner,
            group_owner_address,
        } => {
            let peer_address = if group_formed {
                group_owner_address.and_then(|address| parse_address(&address))
            } else {
                None
            };
            Event::AddressInfoReceived {
                request,
                is_coordinator: is_group_owner,
                peer_address,
            }
        }
        RawReply::LocalDevice { request, device } => Event::LocalIdentityReceived {
            request,
            display_name: device
                .map(|device| device.device_name.trim().to_string())
                .filter(|name| !name.is_empty()),
        },
    }
}

/// Platform reports host addresses with an optional leading slash
fn parse_address(raw: &str) -> Option<IpAddr> {
    let trimmed = raw.trim().trim_start_matches('/');
    match trimmed.parse() {
        Ok(address) => Some(address),
        Err(_) => {
            debug!("Unparseable group owner address: {:?}", raw);
            None
        }
    }
}

fn failure_reason(code: i32) -> &'static str {
    match code {
        0 => "internal error",
        1 => "peer-to-peer unsupported",
        2 => "framework busy",
        3 => "no service requests",
        _ => "unknown failure",
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
