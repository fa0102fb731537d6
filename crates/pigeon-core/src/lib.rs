//! Pigeon Core
//!
//! This crate provides the session lifecycle for Pigeon's Wi-Fi Direct peer
//! connections: the data model, the permission gate, the normalizer that turns raw
//! platform notifications into canonical events, the session state machine, and the
//! observable store that publishes its state, plus the [`PlatformAdapter`] trait the
//! platform side implements. It performs no I/O; the runtime crate drives it from a
//! single serialized task.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod normalizer;
pub mod permission;
pub mod platform;
pub mod session;
pub mod store;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{
    create_notice_channel, create_raw_event_channel, Command, ConnectRequestConfig, Effect,
    Notice, NoticeReceiver, NoticeSender, PlatformRequest, RawEventReceiver, RawEventSink,
    RequestId, RequestKind,
};
pub use config::{
    ChannelConfig, PermissionConfig, PigeonConfig, SessionConfig, MAX_GROUP_OWNER_INTENT,
};
pub use errors::{PigeonError, PigeonResult, PlatformError, SessionError};
pub use normalizer::{
    normalize, Event, RawBroadcast, RawConnectionInfo, RawDevice, RawEvent, RawReply,
    WIFI_P2P_STATE_DISABLED, WIFI_P2P_STATE_ENABLED,
};
pub use permission::{Capability, PermissionGate, PermissionSource};
pub use platform::PlatformAdapter;
pub use session::{MachineStats, SessionMachine, Transition};
pub use store::{StateStore, StateView};
pub use types::{
    ConnectionInfo, IdentitySource, LocalIdentity, Peer, PeerId, PeerSet, PeerStatus,
    SessionPhase, SessionState, DEFAULT_DEVICE_NAME,
};
