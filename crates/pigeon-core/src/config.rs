//! Centralized Configuration Management
//!
//! All configuration structures used by the session core and runtime, aggregated
//! into [`PigeonConfig`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PigeonError, PigeonResult};

/// Highest group-owner intent the platform accepts
pub const MAX_GROUP_OWNER_INTENT: u8 = 15;

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the session task's channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for the command channel (handles → session task)
    pub command_buffer_size: usize,
    /// Buffer size for the internal timer channel
    pub timer_buffer_size: usize,
    /// Capacity of the notice broadcast; slow subscribers lose the oldest notices
    pub notice_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32, // user commands are infrequent
            timer_buffer_size: 16,
            notice_buffer_size: 64,
        }
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Session lifecycle tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for address info after the platform reports a connection
    pub address_resolution_timeout_ms: u64,
    /// Preference for becoming group owner (0..=15), platform default when unset
    pub group_owner_intent: Option<u8>,
    /// Ask the platform for this device's name when the session starts
    pub request_identity_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address_resolution_timeout_ms: 10_000,
            group_owner_intent: None,
            request_identity_on_start: true,
        }
    }
}

impl SessionConfig {
    pub fn address_resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.address_resolution_timeout_ms)
    }

    pub fn with_address_resolution_timeout(mut self, timeout: Duration) -> Self {
        self.address_resolution_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_group_owner_intent(mut self, intent: u8) -> Self {
        self.group_owner_intent = Some(intent);
        self
    }
}

// ----------------------------------------------------------------------------
// Permission Configuration
// ----------------------------------------------------------------------------

/// Platform facts the permission gate depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Platform API level; decides whether the nearby devices grant is required
    pub api_level: u32,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self { api_level: 33 }
    }
}

// ----------------------------------------------------------------------------
// Aggregate
// ----------------------------------------------------------------------------

/// Complete configuration for the session core and runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PigeonConfig {
    pub channels: ChannelConfig,
    pub session: SessionConfig,
    pub permissions: PermissionConfig,
}

impl PigeonConfig {
    /// Configuration with short timeouts for tests
    pub fn testing() -> Self {
        Self {
            session: SessionConfig::default()
                .with_address_resolution_timeout(Duration::from_millis(200)),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PigeonResult<()> {
        if self.channels.command_buffer_size == 0 {
            return Err(PigeonError::config_error(
                "command_buffer_size must be greater than 0",
            ));
        }
        if self.channels.timer_buffer_size == 0 {
            return Err(PigeonError::config_error(
                "timer_buffer_size must be greater than 0",
            ));
        }
        if self.channels.notice_buffer_size == 0 {
            return Err(PigeonError::config_error(
                "notice_buffer_size must be greater than 0",
            ));
        }
        if self.session.address_resolution_timeout_ms == 0 {
            return Err(PigeonError::config_error(
                "address_resolution_timeout_ms must be greater than 0",
            ));
        }
        if let Some(intent) = self.session.group_owner_intent {
            if intent > MAX_GROUP_OWNER_INTENT {
                return Err(PigeonError::config_error(format!(
                    "group_owner_intent {} exceeds {}",
                    intent, MAX_GROUP_OWNER_INTENT
                )));
            }
        }
        Ok(())
    }
}
