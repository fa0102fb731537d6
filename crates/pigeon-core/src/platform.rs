//! Platform Adapter Trait Definition
//!
//! Defines the interface the session task uses to reach the peer-to-peer platform.
//! Concrete adapters live elsewhere: `pigeon-harness` provides mock and scripted
//! ones for tests and simulation.

use std::sync::Arc;

use crate::channel::PlatformRequest;
use crate::errors::PlatformError;

// ----------------------------------------------------------------------------
// Platform Adapter Trait
// ----------------------------------------------------------------------------

/// Outbound half of the platform
///
/// `submit` only hands the request over. Every outcome (acceptance, failure code,
/// the requested data) comes back later through the
/// [`RawEventSink`](crate::channel::RawEventSink) the adapter was built with,
/// echoing the request's [`RequestId`](crate::channel::RequestId).
///
/// An `Err` from `submit` means the request never reached the platform; the
/// session treats it exactly like a rejection. Implementations must return
/// promptly since the session task awaits each submission in turn.
#[async_trait::async_trait]
pub trait PlatformAdapter: Send + Sync {
    async fn submit(&self, request: PlatformRequest) -> Result<(), PlatformError>;

    /// Name used in log output
    fn name(&self) -> &'static str {
        "platform"
    }
}

#[async_trait::async_trait]
impl<T: PlatformAdapter + ?Sized> PlatformAdapter for Arc<T> {
    async fn submit(&self, request: PlatformRequest) -> Result<(), PlatformError> {
        (**self).submit(request).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait::async_trait]
impl<T: PlatformAdapter + ?Sized> PlatformAdapter for Box<T> {
    async fn submit(&self, request: PlatformRequest) -> Result<(), PlatformError> {
        (**self).submit(request).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
