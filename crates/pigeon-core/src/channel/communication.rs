//! Channel Communication Protocol Types
//!
//! Typed messages flowing in and out of the session task:
//! - `Command`: subscriber → session
//! - `Effect`: session → platform adapter / runtime timers
//! - `Notice`: session → subscribers (conditions that are not part of the state)

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::permission::Capability;
use crate::types::PeerId;

// ----------------------------------------------------------------------------
// Command: Subscriber → Session
// ----------------------------------------------------------------------------

/// Commands issued by the UI or any other subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Connect to a peer from the current peer set
    ConnectTo { peer_id: PeerId },
    /// Change this device's display name
    SetLocalDisplayName { name: String },
    /// Reissue a discovery request
    StartDiscovery,
}

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// Kind of asynchronous platform request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestKind {
    Discovery,
    PeerList,
    Connect,
    ConnectionAddress,
    LocalIdentity,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Discovery => write!(f, "discovery"),
            RequestKind::PeerList => write!(f, "peer-list"),
            RequestKind::Connect => write!(f, "connect"),
            RequestKind::ConnectionAddress => write!(f, "connection-address"),
            RequestKind::LocalIdentity => write!(f, "local-identity"),
        }
    }
}

/// Identifies one issued request; replies echo it back
///
/// Sequence numbers increase monotonically over the session's lifetime, so a
/// reply from an earlier radio generation or an older refresh compares lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId {
    pub kind: RequestKind,
    pub seq: u64,
}

impl RequestId {
    pub fn new(kind: RequestKind, seq: u64) -> Self {
        Self { kind, seq }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.seq)
    }
}

/// Parameters handed to the platform's connect call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequestConfig {
    pub device_address: PeerId,
    pub group_owner_intent: Option<u8>,
}

/// A request for the platform adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformRequest {
    Discover {
        request: RequestId,
    },
    PeerList {
        request: RequestId,
    },
    Connect {
        request: RequestId,
        config: ConnectRequestConfig,
    },
    ConnectionAddress {
        request: RequestId,
    },
    LocalIdentity {
        request: RequestId,
    },
}

impl PlatformRequest {
    pub fn id(&self) -> RequestId {
        match self {
            PlatformRequest::Discover { request }
            | PlatformRequest::PeerList { request }
            | PlatformRequest::Connect { request, .. }
            | PlatformRequest::ConnectionAddress { request }
            | PlatformRequest::LocalIdentity { request } => *request,
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.id().kind
    }
}

// ----------------------------------------------------------------------------
// Effect: Session → Runtime
// ----------------------------------------------------------------------------

/// Side effects requested by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Submit a request to the platform adapter
    Submit(PlatformRequest),
    /// Deliver a deadline for the request back to the session after `after`
    ScheduleTimeout { request: RequestId, after: Duration },
}

// ----------------------------------------------------------------------------
// Notice: Session → Subscribers
// ----------------------------------------------------------------------------

/// Conditions surfaced to subscribers alongside the observable state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// Discovery or connect needs grants that are missing
    PermissionRequired { missing: Vec<Capability> },
    /// The platform declined a request
    RequestRejected { kind: RequestKind, reason: String },
    /// A reported connection could not be given an address and was dropped
    AddressResolutionFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new(RequestKind::ConnectionAddress, 7);
        assert_eq!(id.to_string(), "connection-address#7");
    }

    #[test]
    fn test_platform_request_id() {
        let request = RequestId::new(RequestKind::Connect, 3);
        let submitted = PlatformRequest::Connect {
            request,
            config: ConnectRequestConfig {
                device_address: PeerId::new("aa:bb"),
                group_owner_intent: None,
            },
        };
        assert_eq!(submitted.id(), request);
        assert_eq!(submitted.kind(), RequestKind::Connect);
    }
}
