//! Scripted Platform Simulation
//!
//! A platform adapter that plays a small simulated world: a fixed set of nearby
//! devices, a local device name and the addressing of the group formed when a
//! connect succeeds. Replies arrive after a random latency and can be duplicated,
//! which exercises the session's tolerance for redelivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pigeon_core::{
    PlatformAdapter, PlatformError, PlatformRequest, RawBroadcast, RawConnectionInfo, RawDevice,
    RawEvent, RawEventSink, RawReply, WIFI_P2P_STATE_DISABLED, WIFI_P2P_STATE_ENABLED,
};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

/// Platform failure code for "framework busy"
const REASON_BUSY: i32 = 2;
/// Device status code for "available"
const STATUS_AVAILABLE: i32 = 3;

// ----------------------------------------------------------------------------
// Script Configuration
// ----------------------------------------------------------------------------

/// A nearby device in the simulated world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedPeer {
    pub address: String,
    pub name: String,
}

impl ScriptedPeer {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

/// Configuration for the simulated platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Name the platform reports for this device
    pub local_name: Option<String>,
    pub peers: Vec<ScriptedPeer>,
    /// Group owner address reported once connected; `None` forms no usable group
    pub group_owner_address: Option<String>,
    /// Whether this device ends up as group owner
    pub is_group_owner: bool,
    /// Answer every connect request with a failure code
    pub reject_connect: bool,
    /// Never answer address requests
    pub withhold_address: bool,
    /// Simulated reply latency range (min, max) in milliseconds
    pub latency_range: (u64, u64),
    /// Probability of a reply being delivered twice (0.0 = never, 1.0 = always)
    pub duplication_rate: f64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            local_name: Some("Pigeon Simulator".to_string()),
            peers: Vec::new(),
            group_owner_address: Some("/192.168.49.1".to_string()),
            is_group_owner: false,
            reject_connect: false,
            withhold_address: false,
            latency_range: (5, 20),
            duplication_rate: 0.0,
        }
    }
}

impl ScriptConfig {
    /// Instant replies, no duplication
    pub fn ideal() -> Self {
        Self {
            latency_range: (0, 1),
            ..Self::default()
        }
    }

    /// Slow replies that are often delivered twice
    pub fn unreliable() -> Self {
        Self {
            latency_range: (20, 120),
            duplication_rate: 0.3,
            ..Self::default()
        }
    }

    pub fn with_peer(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.peers.push(ScriptedPeer::new(address, name));
        self
    }
}

/// Counters kept by [`ScriptedPlatform`]
#[derive(Debug, Default)]
pub struct ScriptStats {
    pub requests_handled: AtomicU64,
    pub replies_delivered: AtomicU64,
    pub replies_duplicated: AtomicU64,
}

// ----------------------------------------------------------------------------
// Scripted Platform
// ----------------------------------------------------------------------------

/// Simulated platform adapter
#[derive(Debug, Clone)]
pub struct ScriptedPlatform {
    sink: RawEventSink,
    config: ScriptConfig,
    stats: Arc<ScriptStats>,
}

impl ScriptedPlatform {
    pub fn new(sink: RawEventSink, config: ScriptConfig) -> Self {
        Self {
            sink,
            config,
            stats: Arc::new(ScriptStats::default()),
        }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<ScriptStats> {
        Arc::clone(&self.stats)
    }

    /// The radio comes up
    pub fn power_on(&self) {
        info!("Simulated radio on");
        self.sink.deliver(RawBroadcast::StateChanged {
            wifi_state: WIFI_P2P_STATE_ENABLED,
        });
    }

    /// The radio goes down
    pub fn power_off(&self) {
        info!("Simulated radio off");
        self.sink.deliver(RawBroadcast::StateChanged {
            wifi_state: WIFI_P2P_STATE_DISABLED,
        });
    }

    /// Nearby devices changed; the session has to ask for the list
    pub fn peers_changed(&self) {
        self.sink.deliver(RawBroadcast::PeersChanged);
    }

    /// The group dissolves
    pub fn drop_connection(&self) {
        info!("Simulated connection loss");
        self.sink.deliver(RawBroadcast::ConnectionChanged {
            network_info: Some(RawConnectionInfo::disconnected()),
        });
    }

    /// This device's details changed
    pub fn device_changed(&self) {
        self.sink.deliver(RawBroadcast::ThisDeviceChanged);
    }

    fn devices(&self) -> Vec<RawDevice> {
        self.config
            .peers
            .iter()
            .map(|peer| RawDevice {
                device_address: peer.address.clone(),
                device_name: peer.name.clone(),
                status: STATUS_AVAILABLE,
            })
            .collect()
    }

    fn knows_peer(&self, address: &str) -> bool {
        self.config
            .peers
            .iter()
            .any(|peer| peer.address.trim().eq_ignore_ascii_case(address))
    }

    /// What the platform answers to a request, in delivery order
    fn script(&self, request: &PlatformRequest) -> Vec<RawEvent> {
        match request {
            PlatformRequest::Discover { request } => vec![
                RawReply::Accepted { request: *request }.into(),
                RawBroadcast::PeersChanged.into(),
            ],
            PlatformRequest::PeerList { request } => vec![RawReply::PeerList {
                request: *request,
                devices: self.devices(),
            }
            .into()],
            PlatformRequest::Connect { request, config } => {
                if self.config.reject_connect || !self.knows_peer(config.device_address.as_str()) {
                    vec![RawReply::Failed {
                        request: *request,
                        reason: REASON_BUSY,
                    }
                    .into()]
                } else {
                    vec![
                        RawReply::Accepted { request: *request }.into(),
                        RawBroadcast::ConnectionChanged {
                            network_info: Some(RawConnectionInfo::connected()),
                        }
                        .into(),
                    ]
                }
            }
            PlatformRequest::ConnectionAddress { request } => {
                if self.config.withhold_address {
                    Vec::new()
                } else {
                    vec![RawReply::ConnectionAddress {
                        request: *request,
                        group_formed: self.config.group_owner_address.is_some(),
                        is_group_owner: self.config.is_group_owner,
                        group_owner_address: self.config.group_owner_address.clone(),
                    }
                    .into()]
                }
            }
            PlatformRequest::LocalIdentity { request } => vec![RawReply::LocalDevice {
                request: *request,
                device: self.config.local_name.as_ref().map(|name| RawDevice {
                    device_address: "02:00:00:00:00:00".to_string(),
                    device_name: name.clone(),
                    status: STATUS_AVAILABLE,
                }),
            }
            .into()],
        }
    }

    fn latency(&self) -> Duration {
        let (min, max) = self.config.latency_range;
        Duration::from_millis(fastrand::u64(min..=max.max(min)))
    }

    fn should_duplicate(&self) -> bool {
        self.config.duplication_rate > 0.0 && fastrand::f64() < self.config.duplication_rate
    }

    /// Deliver a batch of events in order, each after its own latency
    fn deliver_later(&self, events: Vec<RawEvent>) {
        if events.is_empty() {
            return;
        }
        let delays: Vec<(Duration, bool)> = events
            .iter()
            .map(|_| (self.latency(), self.should_duplicate()))
            .collect();
        let sink = self.sink.clone();
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            for (event, (delay, duplicate)) in events.into_iter().zip(delays) {
                sleep(delay).await;
                if duplicate {
                    stats.replies_duplicated.fetch_add(1, Ordering::Relaxed);
                    sink.deliver(event.clone());
                }
                if !sink.deliver(event) {
                    debug!("Session gone, stopping scripted replies");
                    return;
                }
                stats.replies_delivered.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for ScriptedPlatform {
    async fn submit(&self, request: PlatformRequest) -> Result<(), PlatformError> {
        if self.sink.is_closed() {
            return Err(PlatformError::unavailable("simulation stopped"));
        }
        self.stats.requests_handled.fetch_add(1, Ordering::Relaxed);
        debug!("Scripted platform handling {}", request.id());
        let events = self.script(&request);
        self.deliver_later(events);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pigeon_core::{create_raw_event_channel, ConnectRequestConfig, PeerId, RequestId, RequestKind};

    fn create_test_platform(config: ScriptConfig) -> (ScriptedPlatform, pigeon_core::RawEventReceiver) {
        let (sink, receiver) = create_raw_event_channel();
        (ScriptedPlatform::new(sink, config), receiver)
    }

    #[tokio::test]
    async fn test_discovery_script() {
        let (platform, mut receiver) = create_test_platform(ScriptConfig::ideal());
        let request = RequestId::new(RequestKind::Discovery, 1);
        platform
            .submit(PlatformRequest::Discover { request })
            .await
            .unwrap();

        assert_eq!(
            receiver.recv().await,
            Some(RawEvent::from(RawReply::Accepted { request }))
        );
        assert_eq!(
            receiver.recv().await,
            Some(RawEvent::from(RawBroadcast::PeersChanged))
        );
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_fails() {
        let (platform, mut receiver) =
            create_test_platform(ScriptConfig::ideal().with_peer("aa:00:00:00:00:01", "Alice"));
        let request = RequestId::new(RequestKind::Connect, 3);
        platform
            .submit(PlatformRequest::Connect {
                request,
                config: ConnectRequestConfig {
                    device_address: PeerId::new("bb:00:00:00:00:01"),
                    group_owner_intent: None,
                },
            })
            .await
            .unwrap();

        assert_eq!(
            receiver.recv().await,
            Some(RawEvent::from(RawReply::Failed {
                request,
                reason: REASON_BUSY,
            }))
        );
    }

    #[tokio::test]
    async fn test_known_peer_matches_case_insensitively() {
        let (platform, _receiver) =
            create_test_platform(ScriptConfig::ideal().with_peer("AA:00:00:00:00:01", "Alice"));
        assert!(platform.knows_peer("aa:00:00:00:00:01"));
    }

    #[tokio::test]
    async fn test_withheld_address_sends_nothing() {
        let config = ScriptConfig {
            withhold_address: true,
            ..ScriptConfig::ideal()
        };
        let (platform, _receiver) = create_test_platform(config);
        let request = RequestId::new(RequestKind::ConnectionAddress, 4);
        assert!(platform
            .script(&PlatformRequest::ConnectionAddress { request })
            .is_empty());
    }

    #[tokio::test]
    async fn test_submit_after_session_gone() {
        let (platform, receiver) = create_test_platform(ScriptConfig::ideal());
        drop(receiver);
        let request = RequestId::new(RequestKind::PeerList, 1);
        assert!(platform
            .submit(PlatformRequest::PeerList { request })
            .await
            .is_err());
    }
}
