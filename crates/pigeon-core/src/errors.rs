//! Error types for Pigeon sessions
//!
//! `SessionError` covers the conditions the state machine reports to callers or
//! logs; `PlatformError` is what a platform adapter returns when it cannot even
//! submit a request, and it only ever surfaces as the reason of a rejection;
//! `PigeonError` unifies session errors with channel and configuration failures of
//! the surrounding runtime.

use crate::channel::RequestKind;
use crate::permission::Capability;
use crate::types::PeerId;

// ----------------------------------------------------------------------------
// Session Errors
// ----------------------------------------------------------------------------

/// Conditions reported by the session state machine
///
/// None of these is fatal: each one leaves the session in a well-defined state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Permission required: missing {}", format_capabilities(.missing))]
    PermissionDenied { missing: Vec<Capability> },

    #[error("Peer not found: {peer_id}")]
    PeerNotFound { peer_id: PeerId },

    #[error("Platform rejected {kind} request: {reason}")]
    RequestRejected { kind: RequestKind, reason: String },

    #[error("Connection established but peer address could not be resolved: {reason}")]
    AddressResolutionFailed { reason: String },

    #[error("Stale {what} discarded")]
    StaleEventDiscarded { what: String },

    #[error("Already connected to a peer")]
    AlreadyConnected,

    #[error("Radio is disabled")]
    RadioDisabled,

    #[error("Invalid display name: {reason}")]
    InvalidDisplayName { reason: String },
}

fn format_capabilities(missing: &[Capability]) -> String {
    missing
        .iter()
        .map(|capability| capability.name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl SessionError {
    /// Create a stale event error describing what was discarded
    pub fn stale<T: Into<String>>(what: T) -> Self {
        SessionError::StaleEventDiscarded { what: what.into() }
    }

    /// Create an address resolution failure with a reason
    pub fn resolution_failed<T: Into<String>>(reason: T) -> Self {
        SessionError::AddressResolutionFailed {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Platform Errors
// ----------------------------------------------------------------------------

/// Immediate failure to submit a request to the platform
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform service unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Platform busy")]
    Busy,
}

impl PlatformError {
    pub fn unavailable<T: Into<String>>(reason: T) -> Self {
        PlatformError::Unavailable {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error type for Pigeon
#[derive(Debug, thiserror::Error)]
pub enum PigeonError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Channel communication error between the session task and its handles
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl PigeonError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        PigeonError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        PigeonError::Configuration {
            reason: reason.into(),
        }
    }

    /// The session error carried by this error, if any
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            PigeonError::Session(err) => Some(err),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type PigeonResult<T> = Result<T, PigeonError>;
