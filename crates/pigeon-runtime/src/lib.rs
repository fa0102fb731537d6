//! Pigeon Runtime
//!
//! Runs the session state machine from `pigeon-core` inside one Tokio task:
//! - `SessionTask`: the serialized loop over commands, platform events and deadlines
//! - `RuntimeBuilder`/`RuntimeHandle`: startup, commands and state subscriptions
//!
//! Platform adapters implement [`PlatformAdapter`] and deliver everything they
//! observe through the [`RawEventSink`] handed to them at startup.

pub mod builder;
pub mod task;

pub use builder::{RuntimeBuilder, RuntimeHandle};
pub use task::{SessionTask, TaskMessage, TaskStats};

// Re-export core types for convenience
pub use pigeon_core::{
    Command, ConnectionInfo, LocalIdentity, Notice, NoticeReceiver, PeerId, PeerSet,
    PermissionSource, PigeonConfig, PigeonError, PigeonResult, PlatformAdapter,
    PlatformRequest, RawEventSink, SessionError, SessionPhase, SessionState, StateView,
};
