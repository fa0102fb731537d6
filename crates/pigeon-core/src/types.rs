//! Core types for Pigeon sessions
//!
//! This module defines the data model owned by the session state machine, using
//! newtypes and private fields so the session invariants hold by construction.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Display name used until the platform or the user provides one
pub const DEFAULT_DEVICE_NAME: &str = "Unknown Device";

// ----------------------------------------------------------------------------
// Peer Identifier
// ----------------------------------------------------------------------------

/// Stable hardware address of a peer (for example `"aa:bb:cc:dd:ee:ff"`)
///
/// Addresses are trimmed and lowercased so the same device reported with
/// different casing is one set member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeerId {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

// ----------------------------------------------------------------------------
// Peers
// ----------------------------------------------------------------------------

/// Platform device status as reported in a peer snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    Connected,
    Invited,
    Failed,
    Available,
    Unavailable,
    Unknown(i32),
}

impl PeerStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => PeerStatus::Connected,
            1 => PeerStatus::Invited,
            2 => PeerStatus::Failed,
            3 => PeerStatus::Available,
            4 => PeerStatus::Unavailable,
            other => PeerStatus::Unknown(other),
        }
    }
}

/// A discovered peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub display_name: String,
    pub raw_status: i32,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, display_name: impl Into<String>, raw_status: i32) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            raw_status,
        }
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus::from_raw(self.raw_status)
    }
}

/// Set of peers keyed by id
///
/// No insert or merge: a set is only built from a complete platform snapshot,
/// which replaces the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSet(BTreeMap<PeerId, Peer>);

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a snapshot; a repeated id keeps its last occurrence
    pub fn from_snapshot(peers: impl IntoIterator<Item = Peer>) -> Self {
        Self(peers.into_iter().map(|peer| (peer.id.clone(), peer)).collect())
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.0.contains_key(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&Peer> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.0.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &PeerId> {
        self.0.keys()
    }
}

// ----------------------------------------------------------------------------
// Connection Info
// ----------------------------------------------------------------------------

/// Addressing of the active session, or the absence of one
///
/// Only constructible through [`ConnectionInfo::none`] and
/// [`ConnectionInfo::established`]: an established connection always carries
/// the peer address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    is_established: bool,
    is_local_coordinator: bool,
    peer_address: Option<IpAddr>,
}

impl ConnectionInfo {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn established(is_local_coordinator: bool, peer_address: IpAddr) -> Self {
        Self {
            is_established: true,
            is_local_coordinator,
            peer_address: Some(peer_address),
        }
    }

    pub fn is_established(&self) -> bool {
        self.is_established
    }

    /// Whether this device is the group owner hosting the session
    pub fn is_local_coordinator(&self) -> bool {
        self.is_local_coordinator
    }

    pub fn peer_address(&self) -> Option<IpAddr> {
        self.peer_address
    }
}

// ----------------------------------------------------------------------------
// Local Identity
// ----------------------------------------------------------------------------

/// Where the current local display name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentitySource {
    Default,
    Platform,
    User,
}

/// This device's identity as shown to peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub display_name: String,
    pub source: IdentitySource,
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_DEVICE_NAME.to_string(),
            source: IdentitySource::Default,
        }
    }
}

impl LocalIdentity {
    /// A name chosen by the user outranks whatever the platform reports
    pub fn is_pinned(&self) -> bool {
        self.source == IdentitySource::User
    }
}

// ----------------------------------------------------------------------------
// Session Phase
// ----------------------------------------------------------------------------

/// Phase of the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Radio is off; overrides every other phase
    Disabled,
    Idle,
    Discovering,
    PeerListReady,
    Connecting,
    Connected,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Disabled => "Disabled",
            SessionPhase::Idle => "Idle",
            SessionPhase::Discovering => "Discovering",
            SessionPhase::PeerListReady => "PeerListReady",
            SessionPhase::Connecting => "Connecting",
            SessionPhase::Connected => "Connected",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Aggregate state owned by the session state machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub radio_enabled: bool,
    pub peers: PeerSet,
    pub connection: ConnectionInfo,
    pub identity: LocalIdentity,
    pub phase: SessionPhase,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            radio_enabled: false,
            peers: PeerSet::new(),
            connection: ConnectionInfo::none(),
            identity: LocalIdentity::default(),
            phase: SessionPhase::Disabled,
        }
    }
}

impl SessionState {
    /// Check the data-model invariants
    pub fn invariants_hold(&self) -> bool {
        let address_ok =
            !self.connection.is_established() || self.connection.peer_address().is_some();
        let radio_ok = self.radio_enabled || self.peers.is_empty();
        let phase_ok = (self.phase == SessionPhase::Disabled) != self.radio_enabled;
        let connected_ok =
            (self.phase == SessionPhase::Connected) == self.connection.is_established();
        address_ok && radio_ok && phase_ok && connected_ok
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_normalization() {
        assert_eq!(PeerId::new(" AA:BB:cc:00:11:22 "), PeerId::new("aa:bb:cc:00:11:22"));
        assert_eq!(PeerId::new("AA:BB").to_string(), "aa:bb");
    }

    #[test]
    fn test_snapshot_keeps_last_duplicate() {
        let set = PeerSet::from_snapshot(vec![
            Peer::new("A", "first", 3),
            Peer::new("B", "other", 3),
            Peer::new("a", "second", 1),
        ]);

        assert_eq!(set.len(), 2);
        let peer = set.get(&PeerId::new("A")).unwrap();
        assert_eq!(peer.display_name, "second");
        assert_eq!(peer.status(), PeerStatus::Invited);
    }

    #[test]
    fn test_connection_info_constructors() {
        let none = ConnectionInfo::none();
        assert!(!none.is_established());
        assert_eq!(none.peer_address(), None);

        let addr: IpAddr = "192.168.49.1".parse().unwrap();
        let info = ConnectionInfo::established(true, addr);
        assert!(info.is_established());
        assert!(info.is_local_coordinator());
        assert_eq!(info.peer_address(), Some(addr));
    }

    #[test]
    fn test_default_state() {
        let state = SessionState::default();
        assert!(!state.radio_enabled);
        assert!(state.peers.is_empty());
        assert_eq!(state.phase, SessionPhase::Disabled);
        assert_eq!(state.identity.display_name, DEFAULT_DEVICE_NAME);
        assert!(state.invariants_hold());
    }

    #[test]
    fn test_peer_status_unknown() {
        assert_eq!(PeerStatus::from_raw(42), PeerStatus::Unknown(42));
    }
}
