//! Session lifecycle transitions
//!
//! [`SessionMachine`] applies one event or command at a time. Replies are matched
//! against the requests the machine issued itself, so anything late, duplicated,
//! or from an earlier radio generation is discarded instead of corrupting state.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::{
    Command, ConnectRequestConfig, Effect, Notice, PlatformRequest, RequestId, RequestKind,
};
use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::normalizer::{Event, RawConnectionInfo};
use crate::permission::PermissionGate;
use crate::types::{
    ConnectionInfo, IdentitySource, LocalIdentity, Peer, PeerId, PeerSet, SessionPhase,
    SessionState,
};

// ----------------------------------------------------------------------------
// Transition Results
// ----------------------------------------------------------------------------

/// Outcome of applying one event or command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Phase before the input was applied
    pub from: SessionPhase,
    /// Phase after the input was applied
    pub to: SessionPhase,
    /// Name of the event or command that caused it
    pub trigger: &'static str,
    /// Effects for the runtime to execute, in order
    pub effects: Vec<Effect>,
    /// Notices for subscribers
    pub notices: Vec<Notice>,
}

impl Transition {
    fn start(trigger: &'static str, phase: SessionPhase) -> Self {
        Self {
            from: phase,
            to: phase,
            trigger,
            effects: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Whether the input changed nothing a runtime has to act on
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.effects.is_empty() && self.notices.is_empty()
    }

    /// Platform requests carried by this transition
    pub fn requests(&self) -> impl Iterator<Item = &PlatformRequest> {
        self.effects.iter().filter_map(|effect| match effect {
            Effect::Submit(request) => Some(request),
            Effect::ScheduleTimeout { .. } => None,
        })
    }
}

/// Counters describing what the machine has processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MachineStats {
    pub events_processed: u64,
    pub commands_processed: u64,
    pub commands_refused: u64,
    pub stale_discarded: u64,
    pub phase_changes: u64,
}

/// A connect request waiting for its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingConnect {
    request: RequestId,
    peer_id: PeerId,
    /// Phase to restore if the platform rejects the request
    revert_to: SessionPhase,
}

// ----------------------------------------------------------------------------
// Session Machine
// ----------------------------------------------------------------------------

/// Owner of the session state
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    gate: PermissionGate,
    config: SessionConfig,
    /// Last sequence number handed out
    last_seq: u64,
    /// Sequence number at which the current radio generation began
    generation_start: u64,
    /// Sequence number of the last applied peer snapshot
    last_peer_list: u64,
    pending_discovery: Option<RequestId>,
    pending_connect: Option<PendingConnect>,
    pending_address: Option<RequestId>,
    pending_identity: Option<RequestId>,
    stats: MachineStats,
}

impl SessionMachine {
    pub fn new(config: SessionConfig, gate: PermissionGate) -> Self {
        Self {
            state: SessionState::default(),
            gate,
            config,
            last_seq: 0,
            generation_start: 0,
            last_peer_list: 0,
            pending_discovery: None,
            pending_connect: None,
            pending_address: None,
            pending_identity: None,
            stats: MachineStats::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn stats(&self) -> MachineStats {
        self.stats
    }

    /// Requests to issue when the session starts
    pub fn bootstrap(&mut self) -> Transition {
        let mut transition = Transition::start("Bootstrap", self.state.phase);
        if self.config.request_identity_on_start {
            self.request_identity(&mut transition);
        }
        transition
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Apply a canonical event
    ///
    /// Events never fail: stale input is logged and dropped, and platform failures
    /// surface as notices.
    pub fn handle_event(&mut self, event: Event) -> Transition {
        self.stats.events_processed += 1;
        let mut transition = Transition::start(event.name(), self.state.phase);

        let result = match event {
            Event::RadioChanged { enabled } => {
                self.on_radio_changed(enabled, &mut transition);
                Ok(())
            }
            Event::PeersChanged => self.on_peers_changed(&mut transition),
            Event::ConnectionChanged { info } => self.on_connection_changed(info, &mut transition),
            Event::IdentityChanged => {
                self.request_identity(&mut transition);
                Ok(())
            }
            Event::PeerListReceived { request, peers } => self.on_peer_list(request, peers),
            Event::AddressInfoReceived {
                request,
                is_coordinator,
                peer_address,
            } => self.on_address_info(request, is_coordinator, peer_address, &mut transition),
            Event::LocalIdentityReceived {
                request,
                display_name,
            } => self.on_local_identity(request, display_name),
            Event::RequestAccepted { request } => {
                self.on_request_accepted(request);
                Ok(())
            }
            Event::RequestRejected { request, reason } => {
                self.on_request_rejected(request, reason, &mut transition)
            }
            Event::RequestTimedOut { request } => self.on_request_timed_out(request, &mut transition),
        };

        if let Err(err) = result {
            self.stats.stale_discarded += 1;
            debug!("{} ({})", err, transition.trigger);
        }

        self.finish(transition)
    }

    fn on_radio_changed(&mut self, enabled: bool, transition: &mut Transition) {
        if enabled == self.state.radio_enabled {
            debug!("Radio already {}", if enabled { "enabled" } else { "disabled" });
            return;
        }

        // Everything issued before this point belongs to the previous generation
        self.generation_start = self.last_seq;
        self.state.radio_enabled = enabled;

        if !enabled {
            info!("Radio disabled, dropping peers and connection");
            self.state.peers = PeerSet::new();
            self.state.connection = ConnectionInfo::none();
            self.pending_discovery = None;
            self.pending_connect = None;
            self.pending_address = None;
            self.set_phase(SessionPhase::Disabled);
            return;
        }

        info!("Radio enabled");
        self.set_phase(SessionPhase::Idle);
        if self.check_permissions(transition) {
            self.request_discovery(transition);
        }
    }

    fn on_peers_changed(&mut self, transition: &mut Transition) -> Result<(), SessionError> {
        if !self.state.radio_enabled {
            return Err(SessionError::stale("peers signal while radio disabled"));
        }
        if self.check_permissions(transition) {
            let request = self.issue(RequestKind::PeerList);
            transition
                .effects
                .push(Effect::Submit(PlatformRequest::PeerList { request }));
        }
        Ok(())
    }

    fn on_peer_list(&mut self, request: RequestId, peers: Vec<Peer>) -> Result<(), SessionError> {
        if request.kind != RequestKind::PeerList
            || !self.state.radio_enabled
            || request.seq <= self.generation_start
        {
            return Err(SessionError::stale(format!("peer list {}", request)));
        }
        if request.seq < self.last_peer_list {
            return Err(SessionError::stale(format!("out-of-order peer list {}", request)));
        }

        self.last_peer_list = request.seq;
        self.state.peers = PeerSet::from_snapshot(peers);
        debug!("Peer set replaced: {} peers", self.state.peers.len());

        if matches!(
            self.state.phase,
            SessionPhase::Idle | SessionPhase::Discovering
        ) {
            self.set_phase(SessionPhase::PeerListReady);
        }
        Ok(())
    }

    fn on_connection_changed(
        &mut self,
        info: RawConnectionInfo,
        transition: &mut Transition,
    ) -> Result<(), SessionError> {
        if !info.is_connected {
            self.pending_connect = None;
            self.pending_address = None;
            self.state.connection = ConnectionInfo::none();
            if matches!(
                self.state.phase,
                SessionPhase::Connecting | SessionPhase::Connected
            ) {
                info!("Connection lost");
                self.set_phase(SessionPhase::Idle);
            }
            return Ok(());
        }

        if !self.state.radio_enabled {
            return Err(SessionError::stale("connection report while radio disabled"));
        }
        if self.state.phase == SessionPhase::Connected || self.pending_address.is_some() {
            debug!("Connection already reported, ignoring repeat");
            return Ok(());
        }

        // The connect request has produced its outcome
        self.pending_connect = None;
        let request = self.issue(RequestKind::ConnectionAddress);
        self.pending_address = Some(request);
        transition
            .effects
            .push(Effect::Submit(PlatformRequest::ConnectionAddress { request }));
        transition.effects.push(Effect::ScheduleTimeout {
            request,
            after: self.config.address_resolution_timeout(),
        });
        self.set_phase(SessionPhase::Connecting);
        Ok(())
    }

    fn on_address_info(
        &mut self,
        request: RequestId,
        is_coordinator: bool,
        peer_address: Option<std::net::IpAddr>,
        transition: &mut Transition,
    ) -> Result<(), SessionError> {
        if self.pending_address != Some(request) {
            return Err(SessionError::stale(format!("address info {}", request)));
        }
        self.pending_address = None;

        match peer_address {
            Some(address) => {
                self.state.connection = ConnectionInfo::established(is_coordinator, address);
                info!(
                    "Connected to {} ({})",
                    address,
                    if is_coordinator { "coordinator" } else { "client" }
                );
                self.set_phase(SessionPhase::Connected);
            }
            None => self.fail_resolution("no group owner address reported", transition),
        }
        Ok(())
    }

    fn on_local_identity(
        &mut self,
        request: RequestId,
        display_name: Option<String>,
    ) -> Result<(), SessionError> {
        if self.pending_identity != Some(request) {
            return Err(SessionError::stale(format!("identity reply {}", request)));
        }
        self.pending_identity = None;

        let Some(name) = display_name else {
            debug!("Platform reported no device name");
            return Ok(());
        };
        if self.state.identity.is_pinned() {
            debug!("Keeping user-chosen name over platform name {:?}", name);
            return Ok(());
        }
        if self.state.identity.display_name != name {
            info!("Local display name is now {:?}", name);
        }
        self.state.identity = LocalIdentity {
            display_name: name,
            source: IdentitySource::Platform,
        };
        Ok(())
    }

    fn on_request_accepted(&mut self, request: RequestId) {
        if self.pending_discovery == Some(request) {
            self.pending_discovery = None;
        }
        debug!("Platform accepted {}", request);
    }

    fn on_request_rejected(
        &mut self,
        request: RequestId,
        reason: String,
        transition: &mut Transition,
    ) -> Result<(), SessionError> {
        match request.kind {
            RequestKind::Discovery => {
                if self.pending_discovery != Some(request) {
                    return Err(SessionError::stale(format!("rejection of {}", request)));
                }
                self.pending_discovery = None;
                if self.state.phase == SessionPhase::Discovering {
                    self.set_phase(SessionPhase::Idle);
                }
            }
            RequestKind::Connect => {
                let pending = match &self.pending_connect {
                    Some(pending) if pending.request == request => pending.clone(),
                    _ => return Err(SessionError::stale(format!("rejection of {}", request))),
                };
                self.pending_connect = None;
                debug!("Connect to {} rejected", pending.peer_id);
                if self.state.phase == SessionPhase::Connecting && self.pending_address.is_none() {
                    self.set_phase(pending.revert_to);
                }
            }
            RequestKind::ConnectionAddress => {
                if self.pending_address != Some(request) {
                    return Err(SessionError::stale(format!("rejection of {}", request)));
                }
                self.fail_resolution(&reason, transition);
                return Ok(());
            }
            RequestKind::PeerList => {
                if !self.state.radio_enabled || request.seq <= self.generation_start {
                    return Err(SessionError::stale(format!("rejection of {}", request)));
                }
            }
            RequestKind::LocalIdentity => {
                if self.pending_identity != Some(request) {
                    return Err(SessionError::stale(format!("rejection of {}", request)));
                }
                self.pending_identity = None;
            }
        }

        let err = SessionError::RequestRejected {
            kind: request.kind,
            reason: reason.clone(),
        };
        warn!("{}", err);
        transition.notices.push(Notice::RequestRejected {
            kind: request.kind,
            reason,
        });
        Ok(())
    }

    fn on_request_timed_out(
        &mut self,
        request: RequestId,
        transition: &mut Transition,
    ) -> Result<(), SessionError> {
        if self.pending_address != Some(request) {
            return Err(SessionError::stale(format!("deadline of {}", request)));
        }
        self.fail_resolution("timed out waiting for address info", transition);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Apply a subscriber command
    ///
    /// A refused command leaves the state untouched.
    pub fn handle_command(&mut self, command: Command) -> Result<Transition, SessionError> {
        self.stats.commands_processed += 1;
        let trigger = match &command {
            Command::ConnectTo { .. } => "ConnectTo",
            Command::SetLocalDisplayName { .. } => "SetLocalDisplayName",
            Command::StartDiscovery => "StartDiscovery",
        };
        let mut transition = Transition::start(trigger, self.state.phase);

        let result = match command {
            Command::ConnectTo { peer_id } => self.connect_to(peer_id, &mut transition),
            Command::SetLocalDisplayName { name } => self.set_local_display_name(name),
            Command::StartDiscovery => self.start_discovery(&mut transition),
        };

        match result {
            Ok(()) => Ok(self.finish(transition)),
            Err(err) => {
                self.stats.commands_refused += 1;
                debug!("{} refused: {}", trigger, err);
                Err(err)
            }
        }
    }

    fn connect_to(
        &mut self,
        peer_id: PeerId,
        transition: &mut Transition,
    ) -> Result<(), SessionError> {
        let missing = self.gate.missing();
        if !missing.is_empty() {
            return Err(SessionError::PermissionDenied { missing });
        }
        if !self.state.peers.contains(&peer_id) {
            return Err(SessionError::PeerNotFound { peer_id });
        }
        if self.state.phase == SessionPhase::Connected || self.pending_address.is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let revert_to = match (&self.pending_connect, self.state.phase) {
            (Some(pending), SessionPhase::Connecting) => pending.revert_to,
            (None, SessionPhase::Connecting) => SessionPhase::PeerListReady,
            (_, phase) => phase,
        };
        let request = self.issue(RequestKind::Connect);
        info!("Connecting to {}", peer_id);
        transition.effects.push(Effect::Submit(PlatformRequest::Connect {
            request,
            config: ConnectRequestConfig {
                device_address: peer_id.clone(),
                group_owner_intent: self.config.group_owner_intent,
            },
        }));
        self.pending_connect = Some(PendingConnect {
            request,
            peer_id,
            revert_to,
        });
        self.set_phase(SessionPhase::Connecting);
        Ok(())
    }

    fn set_local_display_name(&mut self, name: String) -> Result<(), SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidDisplayName {
                reason: "name is empty".to_string(),
            });
        }
        info!("Local display name set to {:?}", name);
        self.state.identity = LocalIdentity {
            display_name: name.to_string(),
            source: IdentitySource::User,
        };
        Ok(())
    }

    fn start_discovery(&mut self, transition: &mut Transition) -> Result<(), SessionError> {
        if !self.state.radio_enabled {
            return Err(SessionError::RadioDisabled);
        }
        let missing = self.gate.missing();
        if !missing.is_empty() {
            return Err(SessionError::PermissionDenied { missing });
        }
        self.request_discovery(transition);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn issue(&mut self, kind: RequestKind) -> RequestId {
        self.last_seq += 1;
        RequestId::new(kind, self.last_seq)
    }

    fn request_discovery(&mut self, transition: &mut Transition) {
        let request = self.issue(RequestKind::Discovery);
        self.pending_discovery = Some(request);
        transition
            .effects
            .push(Effect::Submit(PlatformRequest::Discover { request }));
        if self.state.phase == SessionPhase::Idle {
            self.set_phase(SessionPhase::Discovering);
        }
    }

    fn request_identity(&mut self, transition: &mut Transition) {
        let request = self.issue(RequestKind::LocalIdentity);
        self.pending_identity = Some(request);
        transition
            .effects
            .push(Effect::Submit(PlatformRequest::LocalIdentity { request }));
    }

    /// True when discovery and connect are allowed; otherwise emits a notice
    fn check_permissions(&self, transition: &mut Transition) -> bool {
        let missing = self.gate.missing();
        if missing.is_empty() {
            return true;
        }
        warn!("{}", SessionError::PermissionDenied { missing: missing.clone() });
        transition.notices.push(Notice::PermissionRequired { missing });
        false
    }

    fn fail_resolution(&mut self, reason: &str, transition: &mut Transition) {
        let err = SessionError::resolution_failed(reason);
        warn!("{}", err);
        self.pending_address = None;
        self.state.connection = ConnectionInfo::none();
        self.set_phase(SessionPhase::Idle);
        transition.notices.push(Notice::AddressResolutionFailed {
            reason: reason.to_string(),
        });
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.state.phase != phase {
            debug!("Phase {} -> {}", self.state.phase, phase);
            self.state.phase = phase;
            self.stats.phase_changes += 1;
        }
    }

    fn finish(&self, mut transition: Transition) -> Transition {
        transition.to = self.state.phase;
        debug_assert!(self.state.invariants_hold(), "invariants broken: {:?}", self.state);
        transition
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermissionConfig;
    use crate::permission::{Capability, PermissionSource};
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Grants(AtomicBool);

    impl PermissionSource for Grants {
        fn is_granted(&self, _capability: Capability) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn create_test_machine(granted: bool) -> (SessionMachine, Arc<Grants>) {
        let grants = Arc::new(Grants(AtomicBool::new(granted)));
        let gate = PermissionGate::new(grants.clone(), &PermissionConfig::default());
        let config = SessionConfig::default()
            .with_address_resolution_timeout(Duration::from_millis(500));
        (SessionMachine::new(config, gate), grants)
    }

    fn find_request(transition: &Transition, kind: RequestKind) -> RequestId {
        transition
            .requests()
            .map(PlatformRequest::id)
            .find(|id| id.kind == kind)
            .unwrap_or_else(|| panic!("no {} request in {:?}", kind, transition))
    }

    fn peers() -> Vec<Peer> {
        vec![
            Peer::new("AA:00:00:00:00:01", "Alice", 3),
            Peer::new("aa:00:00:00:00:02", "Bob", 3),
        ]
    }

    fn address() -> IpAddr {
        "192.168.49.1".parse().unwrap()
    }

    /// Radio on, peer list applied
    fn ready_machine() -> SessionMachine {
        let (mut machine, _grants) = create_test_machine(true);
        machine.handle_event(Event::RadioChanged { enabled: true });
        let refresh = machine.handle_event(Event::PeersChanged);
        let request = find_request(&refresh, RequestKind::PeerList);
        machine.handle_event(Event::PeerListReceived {
            request,
            peers: peers(),
        });
        assert_eq!(machine.phase(), SessionPhase::PeerListReady);
        machine
    }

    /// Drive a ready machine through connect, connection report and address reply
    fn connected_machine() -> SessionMachine {
        let mut machine = ready_machine();
        machine
            .handle_command(Command::ConnectTo {
                peer_id: PeerId::new("aa:00:00:00:00:01"),
            })
            .unwrap();
        let report = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::connected(),
        });
        let request = find_request(&report, RequestKind::ConnectionAddress);
        machine.handle_event(Event::AddressInfoReceived {
            request,
            is_coordinator: false,
            peer_address: Some(address()),
        });
        assert_eq!(machine.phase(), SessionPhase::Connected);
        machine
    }

    #[test]
    fn test_initial_state_is_disabled() {
        let (machine, _) = create_test_machine(true);
        assert_eq!(machine.phase(), SessionPhase::Disabled);
        assert!(machine.state().invariants_hold());
    }

    #[test]
    fn test_bootstrap_requests_identity() {
        let (mut machine, _) = create_test_machine(true);
        let transition = machine.bootstrap();
        find_request(&transition, RequestKind::LocalIdentity);
    }

    #[test]
    fn test_radio_enable_starts_discovery() {
        let (mut machine, _) = create_test_machine(true);
        let transition = machine.handle_event(Event::RadioChanged { enabled: true });

        assert_eq!(transition.from, SessionPhase::Disabled);
        assert_eq!(transition.to, SessionPhase::Discovering);
        find_request(&transition, RequestKind::Discovery);
    }

    #[test]
    fn test_radio_enable_without_permission() {
        let (mut machine, _) = create_test_machine(false);
        let transition = machine.handle_event(Event::RadioChanged { enabled: true });

        assert_eq!(machine.phase(), SessionPhase::Idle);
        assert_eq!(transition.requests().count(), 0);
        assert!(matches!(
            transition.notices.as_slice(),
            [Notice::PermissionRequired { missing }] if missing.contains(&Capability::FineLocation)
        ));
    }

    #[test]
    fn test_radio_disable_clears_everything() {
        let mut machine = connected_machine();
        let transition = machine.handle_event(Event::RadioChanged { enabled: false });

        assert_eq!(transition.to, SessionPhase::Disabled);
        assert!(machine.state().peers.is_empty());
        assert!(!machine.state().connection.is_established());
        assert!(machine.state().invariants_hold());
    }

    #[test]
    fn test_radio_events_are_idempotent() {
        let (mut machine, _) = create_test_machine(true);
        machine.handle_event(Event::RadioChanged { enabled: true });
        let snapshot = machine.state().clone();

        let repeat = machine.handle_event(Event::RadioChanged { enabled: true });
        assert!(repeat.is_noop());
        assert_eq!(machine.state(), &snapshot);

        machine.handle_event(Event::RadioChanged { enabled: false });
        let snapshot = machine.state().clone();
        let repeat = machine.handle_event(Event::RadioChanged { enabled: false });
        assert!(repeat.is_noop());
        assert_eq!(machine.state(), &snapshot);
    }

    #[test]
    fn test_peer_snapshot_replaces_set() {
        let mut machine = ready_machine();
        assert_eq!(machine.state().peers.len(), 2);

        let refresh = machine.handle_event(Event::PeersChanged);
        let request = find_request(&refresh, RequestKind::PeerList);
        machine.handle_event(Event::PeerListReceived {
            request,
            peers: vec![Peer::new("aa:00:00:00:00:03", "Carol", 3)],
        });

        let ids: Vec<_> = machine.state().peers.ids().map(PeerId::to_string).collect();
        assert_eq!(ids, vec!["aa:00:00:00:00:03".to_string()]);
    }

    #[test]
    fn test_out_of_order_peer_list_is_discarded() {
        let mut machine = ready_machine();
        let older = find_request(&machine.handle_event(Event::PeersChanged), RequestKind::PeerList);
        let newer = find_request(&machine.handle_event(Event::PeersChanged), RequestKind::PeerList);

        machine.handle_event(Event::PeerListReceived {
            request: newer,
            peers: vec![Peer::new("aa:00:00:00:00:09", "Newest", 3)],
        });
        machine.handle_event(Event::PeerListReceived {
            request: older,
            peers: peers(),
        });

        assert_eq!(machine.state().peers.len(), 1);
        assert!(machine.state().peers.contains(&PeerId::new("aa:00:00:00:00:09")));
        assert_eq!(machine.stats().stale_discarded, 1);
    }

    #[test]
    fn test_peer_list_from_previous_generation_is_discarded() {
        let (mut machine, _) = create_test_machine(true);
        machine.handle_event(Event::RadioChanged { enabled: true });
        let request = find_request(&machine.handle_event(Event::PeersChanged), RequestKind::PeerList);

        machine.handle_event(Event::RadioChanged { enabled: false });
        machine.handle_event(Event::PeerListReceived {
            request,
            peers: peers(),
        });
        assert!(machine.state().peers.is_empty());

        // Still stale once the radio comes back
        machine.handle_event(Event::RadioChanged { enabled: true });
        machine.handle_event(Event::PeerListReceived {
            request,
            peers: peers(),
        });
        assert!(machine.state().peers.is_empty());
        assert_eq!(machine.phase(), SessionPhase::Discovering);
    }

    #[test]
    fn test_peer_list_does_not_disturb_connection() {
        let mut machine = connected_machine();
        let request = find_request(&machine.handle_event(Event::PeersChanged), RequestKind::PeerList);
        machine.handle_event(Event::PeerListReceived {
            request,
            peers: vec![],
        });

        assert_eq!(machine.phase(), SessionPhase::Connected);
        assert!(machine.state().peers.is_empty());
    }

    #[test]
    fn test_connect_to_unknown_peer() {
        let mut machine = ready_machine();
        let before = machine.state().clone();
        let err = machine
            .handle_command(Command::ConnectTo {
                peer_id: PeerId::new("ff:ff:ff:ff:ff:ff"),
            })
            .unwrap_err();

        assert!(matches!(err, SessionError::PeerNotFound { .. }));
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn test_connect_without_permission() {
        let (mut machine, grants) = create_test_machine(true);
        machine.handle_event(Event::RadioChanged { enabled: true });
        let request = find_request(&machine.handle_event(Event::PeersChanged), RequestKind::PeerList);
        machine.handle_event(Event::PeerListReceived {
            request,
            peers: peers(),
        });

        grants.0.store(false, Ordering::SeqCst);
        let err = machine
            .handle_command(Command::ConnectTo {
                peer_id: PeerId::new("aa:00:00:00:00:01"),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::PermissionDenied { .. }));
        assert_eq!(machine.phase(), SessionPhase::PeerListReady);
    }

    #[test]
    fn test_connect_carries_device_address_and_intent() {
        let grants = Arc::new(Grants(AtomicBool::new(true)));
        let gate = PermissionGate::new(grants, &PermissionConfig::default());
        let mut machine =
            SessionMachine::new(SessionConfig::default().with_group_owner_intent(0), gate);
        machine.handle_event(Event::RadioChanged { enabled: true });
        let request = find_request(&machine.handle_event(Event::PeersChanged), RequestKind::PeerList);
        machine.handle_event(Event::PeerListReceived {
            request,
            peers: peers(),
        });

        let transition = machine
            .handle_command(Command::ConnectTo {
                peer_id: PeerId::new("AA:00:00:00:00:02"),
            })
            .unwrap();
        match transition.requests().next() {
            Some(PlatformRequest::Connect { config, .. }) => {
                assert_eq!(config.device_address, PeerId::new("aa:00:00:00:00:02"));
                assert_eq!(config.group_owner_intent, Some(0));
            }
            other => panic!("unexpected request: {:?}", other),
        }
        assert_eq!(transition.to, SessionPhase::Connecting);
    }

    #[test]
    fn test_connect_rejection_reverts_phase() {
        let mut machine = ready_machine();
        let transition = machine
            .handle_command(Command::ConnectTo {
                peer_id: PeerId::new("aa:00:00:00:00:01"),
            })
            .unwrap();
        let request = find_request(&transition, RequestKind::Connect);

        let rejected = machine.handle_event(Event::RequestRejected {
            request,
            reason: "framework busy".to_string(),
        });
        assert_eq!(machine.phase(), SessionPhase::PeerListReady);
        assert_eq!(
            rejected.notices,
            vec![Notice::RequestRejected {
                kind: RequestKind::Connect,
                reason: "framework busy".to_string(),
            }]
        );

        // A second delivery of the same rejection is stale
        let repeat = machine.handle_event(Event::RequestRejected {
            request,
            reason: "framework busy".to_string(),
        });
        assert!(repeat.is_noop());
    }

    #[test]
    fn test_connect_while_connected() {
        let mut machine = connected_machine();
        let err = machine
            .handle_command(Command::ConnectTo {
                peer_id: PeerId::new("aa:00:00:00:00:02"),
            })
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyConnected);
    }

    #[test]
    fn test_connection_report_requests_address_with_deadline() {
        let mut machine = ready_machine();
        let transition = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::connected(),
        });

        assert_eq!(transition.to, SessionPhase::Connecting);
        let request = find_request(&transition, RequestKind::ConnectionAddress);
        assert!(transition.effects.contains(&Effect::ScheduleTimeout {
            request,
            after: Duration::from_millis(500),
        }));

        // Duplicate report while resolving issues nothing
        let repeat = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::connected(),
        });
        assert!(repeat.is_noop());
    }

    #[test]
    fn test_address_info_establishes_connection() {
        let machine = connected_machine();
        let connection = machine.state().connection;
        assert!(connection.is_established());
        assert_eq!(connection.peer_address(), Some(address()));
        assert!(!connection.is_local_coordinator());
    }

    #[test]
    fn test_address_without_ip_fails_resolution() {
        let mut machine = ready_machine();
        let report = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::connected(),
        });
        let request = find_request(&report, RequestKind::ConnectionAddress);

        let transition = machine.handle_event(Event::AddressInfoReceived {
            request,
            is_coordinator: true,
            peer_address: None,
        });
        assert_eq!(machine.phase(), SessionPhase::Idle);
        assert!(!machine.state().connection.is_established());
        assert!(matches!(
            transition.notices.as_slice(),
            [Notice::AddressResolutionFailed { .. }]
        ));
    }

    #[test]
    fn test_address_deadline_expiry() {
        let mut machine = ready_machine();
        let report = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::connected(),
        });
        let request = find_request(&report, RequestKind::ConnectionAddress);

        let transition = machine.handle_event(Event::RequestTimedOut { request });
        assert_eq!(machine.phase(), SessionPhase::Idle);
        assert_eq!(transition.notices.len(), 1);

        // A late reply after the deadline is discarded
        machine.handle_event(Event::AddressInfoReceived {
            request,
            is_coordinator: false,
            peer_address: Some(address()),
        });
        assert_eq!(machine.phase(), SessionPhase::Idle);
        assert!(!machine.state().connection.is_established());
    }

    #[test]
    fn test_deadline_after_success_is_ignored() {
        let mut machine = ready_machine();
        let report = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::connected(),
        });
        let request = find_request(&report, RequestKind::ConnectionAddress);
        machine.handle_event(Event::AddressInfoReceived {
            request,
            is_coordinator: true,
            peer_address: Some(address()),
        });

        let transition = machine.handle_event(Event::RequestTimedOut { request });
        assert!(transition.is_noop());
        assert_eq!(machine.phase(), SessionPhase::Connected);
    }

    #[test]
    fn test_disconnect_returns_to_idle() {
        let mut machine = connected_machine();
        let transition = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::disconnected(),
        });
        assert_eq!(transition.to, SessionPhase::Idle);
        assert!(!machine.state().connection.is_established());
        assert_eq!(machine.state().peers.len(), 2);

        let repeat = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::disconnected(),
        });
        assert!(repeat.is_noop());
    }

    #[test]
    fn test_disconnect_report_while_browsing_is_harmless() {
        let mut machine = ready_machine();
        let transition = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::disconnected(),
        });
        assert!(transition.is_noop());
        assert_eq!(machine.phase(), SessionPhase::PeerListReady);
    }

    #[test]
    fn test_platform_identity_applies() {
        let (mut machine, _) = create_test_machine(true);
        let request = find_request(&machine.handle_event(Event::IdentityChanged), RequestKind::LocalIdentity);
        machine.handle_event(Event::LocalIdentityReceived {
            request,
            display_name: Some("Pixel 8".to_string()),
        });

        assert_eq!(machine.state().identity.display_name, "Pixel 8");
        assert_eq!(machine.state().identity.source, IdentitySource::Platform);
    }

    #[test]
    fn test_user_name_is_pinned() {
        let (mut machine, _) = create_test_machine(true);
        machine
            .handle_command(Command::SetLocalDisplayName {
                name: "  Pigeon One ".to_string(),
            })
            .unwrap();
        let request = find_request(&machine.handle_event(Event::IdentityChanged), RequestKind::LocalIdentity);
        machine.handle_event(Event::LocalIdentityReceived {
            request,
            display_name: Some("Pixel 8".to_string()),
        });

        assert_eq!(machine.state().identity.display_name, "Pigeon One");
        assert!(machine.state().identity.is_pinned());
    }

    #[test]
    fn test_empty_display_name_rejected() {
        let (mut machine, _) = create_test_machine(true);
        let err = machine
            .handle_command(Command::SetLocalDisplayName {
                name: "   ".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidDisplayName { .. }));
        assert_eq!(machine.state().identity, LocalIdentity::default());
    }

    #[test]
    fn test_start_discovery_requires_radio() {
        let (mut machine, _) = create_test_machine(true);
        assert_eq!(
            machine.handle_command(Command::StartDiscovery).unwrap_err(),
            SessionError::RadioDisabled
        );
    }

    #[test]
    fn test_discovery_rejection_returns_to_idle() {
        let (mut machine, _) = create_test_machine(true);
        let transition = machine.handle_event(Event::RadioChanged { enabled: true });
        let request = find_request(&transition, RequestKind::Discovery);

        let rejected = machine.handle_event(Event::RequestRejected {
            request,
            reason: "framework busy".to_string(),
        });
        assert_eq!(rejected.to, SessionPhase::Idle);
        assert_eq!(rejected.notices.len(), 1);

        let retry = machine.handle_command(Command::StartDiscovery).unwrap();
        assert_eq!(retry.to, SessionPhase::Discovering);
    }

    #[test]
    fn test_full_lifecycle_scenario() {
        let (mut machine, _) = create_test_machine(true);
        let mut phases = vec![machine.phase()];

        machine.handle_event(Event::RadioChanged { enabled: true });
        phases.push(machine.phase());

        let request = find_request(&machine.handle_event(Event::PeersChanged), RequestKind::PeerList);
        machine.handle_event(Event::PeerListReceived {
            request,
            peers: peers(),
        });
        phases.push(machine.phase());

        machine
            .handle_command(Command::ConnectTo {
                peer_id: PeerId::new("aa:00:00:00:00:01"),
            })
            .unwrap();
        phases.push(machine.phase());

        let report = machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::connected(),
        });
        let request = find_request(&report, RequestKind::ConnectionAddress);
        machine.handle_event(Event::AddressInfoReceived {
            request,
            is_coordinator: true,
            peer_address: Some(address()),
        });
        phases.push(machine.phase());

        machine.handle_event(Event::ConnectionChanged {
            info: RawConnectionInfo::disconnected(),
        });
        phases.push(machine.phase());

        assert_eq!(
            phases,
            vec![
                SessionPhase::Disabled,
                SessionPhase::Discovering,
                SessionPhase::PeerListReady,
                SessionPhase::Connecting,
                SessionPhase::Connected,
                SessionPhase::Idle,
            ]
        );
    }
}
