//! Pigeon Harness
//!
//! Platform stand-ins for exercising a Pigeon session without radio hardware:
//!
//! - **MockPlatform**: records submitted requests; the test plays the platform
//! - **ScriptedPlatform**: a simulated world with nearby devices, latency and
//!   duplicated replies
//! - **StaticPermissions**: grants that can be flipped while the session runs
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pigeon_harness::{ScriptConfig, ScriptedPlatform, StaticPermissions};
//! use pigeon_runtime::RuntimeBuilder;
//!
//! let config = ScriptConfig::ideal().with_peer("aa:00:00:00:00:01", "Alice");
//! let mut platform = None;
//! let runtime = RuntimeBuilder::new()
//!     .with_permissions(Arc::new(StaticPermissions::all_granted()))
//!     .start(|sink| {
//!         let scripted = ScriptedPlatform::new(sink, config);
//!         platform = Some(scripted.clone());
//!         scripted
//!     })
//!     .await?;
//! platform.unwrap().power_on();
//! ```

pub mod mock_platform;
pub mod permissions;
pub mod scripted_platform;

pub use mock_platform::{MockPlatform, MockPlatformStats};
pub use permissions::StaticPermissions;
pub use scripted_platform::{ScriptConfig, ScriptStats, ScriptedPeer, ScriptedPlatform};
