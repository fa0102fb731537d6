//! Session State Machine
//!
//! The single owner of [`SessionState`](crate::types::SessionState). It consumes
//! canonical events and commands and answers with a [`Transition`] listing the
//! effects to execute and the notices to publish. It performs no I/O itself.
//!
//! Phases follow `Idle → Discovering → PeerListReady → Connecting → Connected →
//! Idle`, with `Disabled` overriding everything while the radio is off. Every
//! transition tolerates repetition, since the platform offers no delivery-once
//! guarantee.

pub mod machine;

pub use machine::{MachineStats, SessionMachine, Transition};
