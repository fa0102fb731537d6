//! Observable State Store
//!
//! Publishes the session state to any number of subscribers. Each field lives in
//! its own `watch` channel, so a subscriber that joins late still sees the current
//! value immediately and a subscriber is only woken when its field actually changes.
//! Only the session task holds the [`StateStore`]; everyone else reads through a
//! cloneable [`StateView`].

use tokio::sync::watch;
use tracing::trace;

use crate::channel::{Notice, NoticeReceiver, NoticeSender};
use crate::types::{ConnectionInfo, LocalIdentity, PeerSet, SessionPhase, SessionState};

/// Replace the watched value only when it differs
fn publish_field<T: PartialEq + Clone>(sender: &watch::Sender<T>, value: &T) -> bool {
    sender.send_if_modified(|current| {
        if current == value {
            false
        } else {
            *current = value.clone();
            true
        }
    })
}

// ----------------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------------

/// Write side of the observable state
#[derive(Debug)]
pub struct StateStore {
    snapshot: watch::Sender<SessionState>,
    radio_enabled: watch::Sender<bool>,
    peers: watch::Sender<PeerSet>,
    connection: watch::Sender<ConnectionInfo>,
    identity: watch::Sender<LocalIdentity>,
    phase: watch::Sender<SessionPhase>,
    notices: NoticeSender,
    view: StateView,
}

impl StateStore {
    pub fn new(initial: &SessionState, notices: NoticeSender) -> Self {
        let (snapshot, snapshot_rx) = watch::channel(initial.clone());
        let (radio_enabled, radio_rx) = watch::channel(initial.radio_enabled);
        let (peers, peers_rx) = watch::channel(initial.peers.clone());
        let (connection, connection_rx) = watch::channel(initial.connection);
        let (identity, identity_rx) = watch::channel(initial.identity.clone());
        let (phase, phase_rx) = watch::channel(initial.phase);

        let view = StateView {
            snapshot: snapshot_rx,
            radio_enabled: radio_rx,
            peers: peers_rx,
            connection: connection_rx,
            identity: identity_rx,
            phase: phase_rx,
            notices: notices.clone(),
        };

        Self {
            snapshot,
            radio_enabled,
            peers,
            connection,
            identity,
            phase,
            notices,
            view,
        }
    }

    /// A read handle for subscribers
    pub fn view(&self) -> StateView {
        self.view.clone()
    }

    /// Publish the state; returns whether any field changed
    ///
    /// Peers and connection go out before radio and phase, so a subscriber that
    /// sees the radio off or the phase leave `Connected` already finds them cleared.
    pub fn publish(&self, state: &SessionState) -> bool {
        let mut changed = false;
        changed |= publish_field(&self.peers, &state.peers);
        changed |= publish_field(&self.connection, &state.connection);
        changed |= publish_field(&self.identity, &state.identity);
        changed |= publish_field(&self.radio_enabled, &state.radio_enabled);
        changed |= publish_field(&self.phase, &state.phase);
        if changed {
            publish_field(&self.snapshot, state);
            trace!("Published state in phase {}", state.phase);
        }
        changed
    }

    /// Broadcast a notice; dropped silently when nobody listens
    pub fn announce(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            trace!("No notice subscribers");
        }
    }
}

// ----------------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------------

/// Read side of the observable state
#[derive(Debug, Clone)]
pub struct StateView {
    snapshot: watch::Receiver<SessionState>,
    radio_enabled: watch::Receiver<bool>,
    peers: watch::Receiver<PeerSet>,
    connection: watch::Receiver<ConnectionInfo>,
    identity: watch::Receiver<LocalIdentity>,
    phase: watch::Receiver<SessionPhase>,
    notices: NoticeSender,
}

impl StateView {
    /// Consistent copy of the whole state
    pub fn snapshot(&self) -> SessionState {
        self.snapshot.borrow().clone()
    }

    pub fn radio_enabled(&self) -> bool {
        *self.radio_enabled.borrow()
    }

    pub fn peers(&self) -> PeerSet {
        self.peers.borrow().clone()
    }

    pub fn connection(&self) -> ConnectionInfo {
        *self.connection.borrow()
    }

    pub fn identity(&self) -> LocalIdentity {
        self.identity.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<SessionState> {
        self.snapshot.clone()
    }

    pub fn subscribe_radio(&self) -> watch::Receiver<bool> {
        self.radio_enabled.clone()
    }

    pub fn subscribe_peers(&self) -> watch::Receiver<PeerSet> {
        self.peers.clone()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionInfo> {
        self.connection.clone()
    }

    pub fn subscribe_identity(&self) -> watch::Receiver<LocalIdentity> {
        self.identity.clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    /// Notices published from now on
    pub fn subscribe_notices(&self) -> NoticeReceiver {
        self.notices.subscribe()
    }
}
