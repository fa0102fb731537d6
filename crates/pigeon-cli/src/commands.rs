//! Command handlers for the Pigeon CLI

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use pigeon_core::{Notice, NoticeReceiver, SessionPhase, StateView};
use pigeon_harness::{ScriptConfig, ScriptedPeer, ScriptedPlatform, StaticPermissions};
use pigeon_runtime::RuntimeBuilder;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, SimulateArgs};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Simulate(args) => Self::handle_simulate(args, config).await,
            Commands::Config => Self::handle_config(&config),
        }
    }

    fn handle_config(config: &AppConfig) -> Result<()> {
        println!("{}", toml::to_string_pretty(config)?);
        Ok(())
    }

    /// Run one session against the scripted platform and report the outcome
    async fn handle_simulate(args: SimulateArgs, config: AppConfig) -> Result<()> {
        let script = script_config(&args, &config.simulation);
        let permissions = Arc::new(if args.deny_permissions {
            StaticPermissions::denied()
        } else {
            StaticPermissions::all_granted()
        });
        let limit = Duration::from_millis(config.cli.phase_timeout_ms);
        let settle_delay = Duration::from_millis(script.latency_range.1);

        info!(
            "Simulating {} nearby device(s), api level {}",
            script.peers.len(),
            config.core.permissions.api_level
        );

        let mut scripted = None;
        let mut runtime = RuntimeBuilder::new()
            .with_config(config.core.clone())
            .with_permissions(permissions)
            .start(|sink| {
                let platform = ScriptedPlatform::new(sink, script);
                scripted = Some(platform.clone());
                platform
            })
            .await?;
        let platform = scripted
            .ok_or_else(|| CliError::Simulation("platform adapter was not created".to_string()))?;
        let view = runtime.view();
        let notice_printer = spawn_notice_printer(runtime.subscribe_notices());
        let phase_printer = spawn_phase_printer(view.subscribe_phase());

        if let Some(name) = &args.name {
            runtime.set_local_display_name(name.clone()).await?;
        }

        platform.power_on();
        let settled = if args.deny_permissions {
            wait_for(&view, limit, |phase| phase == SessionPhase::Idle).await?
        } else {
            wait_for(&view, limit, |phase| phase == SessionPhase::PeerListReady).await?
        };
        info!("Session settled in {}", settled);

        if let Some(peer) = &args.connect {
            match runtime.connect_to(peer.as_str()).await {
                Ok(()) => {
                    let outcome =
                        wait_for(&view, limit, |phase| phase != SessionPhase::Connecting).await?;
                    info!("Connect to {} ended in {}", peer, outcome);
                }
                Err(e) => warn!("Connect to {} refused: {}", peer, e),
            }
        }

        // Let replies still in flight land before reporting
        tokio::time::sleep(settle_delay).await;
        print_state(&view, args.json)?;

        let stats = runtime.shutdown().await?;
        info!(
            "Session handled {} platform events and submitted {} requests ({} refused)",
            stats.raw_events_received, stats.requests_submitted, stats.submit_failures
        );
        notice_printer.abort();
        phase_printer.abort();
        Ok(())
    }
}

/// Simulation settings from the configuration with command-line overrides applied
pub fn script_config(args: &SimulateArgs, base: &ScriptConfig) -> ScriptConfig {
    let mut script = base.clone();
    if !args.peers.is_empty() {
        script.peers = args
            .peers
            .iter()
            .map(|(address, name)| ScriptedPeer::new(address.as_str(), name.as_str()))
            .collect();
    }
    if let Some(address) = &args.address {
        script.group_owner_address = Some(address.clone());
    }
    if args.fail_resolution {
        script.group_owner_address = None;
    }
    script.is_group_owner |= args.coordinator;
    script.withhold_address |= args.withhold_address;
    script.reject_connect |= args.reject_connect;
    if args.unreliable {
        let unreliable = ScriptConfig::unreliable();
        script.latency_range = unreliable.latency_range;
        script.duplication_rate = unreliable.duplication_rate;
    }
    script
}

/// Wait until the published phase satisfies `done`
async fn wait_for(
    view: &StateView,
    limit: Duration,
    done: impl Fn(SessionPhase) -> bool,
) -> Result<SessionPhase> {
    let mut phases = view.subscribe_phase();
    match tokio::time::timeout(limit, next_matching(&mut phases, &done)).await {
        Ok(outcome) => Ok(outcome?),
        Err(_) => Err(CliError::Simulation(format!(
            "timed out waiting in phase {}",
            view.phase()
        ))),
    }
}

async fn next_matching(
    phases: &mut watch::Receiver<SessionPhase>,
    done: &impl Fn(SessionPhase) -> bool,
) -> anyhow::Result<SessionPhase> {
    loop {
        let phase = *phases.borrow_and_update();
        if done(phase) {
            return Ok(phase);
        }
        phases
            .changed()
            .await
            .map_err(|_| anyhow!("session stopped in phase {}", phase))?;
    }
}

fn spawn_phase_printer(mut phases: watch::Receiver<SessionPhase>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = *phases.borrow_and_update();
        info!("Phase: {}", last);
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow_and_update();
            info!("Phase: {} -> {}", last, phase);
            last = phase;
        }
    })
}

fn spawn_notice_printer(mut notices: NoticeReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => warn!("{}", describe_notice(&notice)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} notices", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub fn describe_notice(notice: &Notice) -> String {
    match notice {
        Notice::PermissionRequired { missing } => format!(
            "Permission required: {}",
            missing
                .iter()
                .map(|capability| capability.name())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Notice::RequestRejected { kind, reason } => {
            format!("Platform rejected {} request: {}", kind, reason)
        }
        Notice::AddressResolutionFailed { reason } => {
            format!("Connection dropped, no peer address: {}", reason)
        }
    }
}

fn print_state(view: &StateView, json: bool) -> Result<()> {
    let state = view.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!("Phase:      {}", state.phase);
    println!("Radio:      {}", if state.radio_enabled { "on" } else { "off" });
    println!(
        "Identity:   {} ({:?})",
        state.identity.display_name, state.identity.source
    );
    println!("Peers:      {}", state.peers.len());
    for peer in state.peers.iter() {
        println!("  {}  {:<20} {:?}", peer.id, peer.display_name, peer.status());
    }
    match state.connection.peer_address() {
        Some(address) => println!(
            "Connection: {} as {}",
            address,
            if state.connection.is_local_coordinator() {
                "group owner"
            } else {
                "client"
            }
        ),
        None => println!("Connection: none"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pigeon_core::{Capability, RequestKind};

    #[test]
    fn test_arguments_override_simulation_config() {
        let base = ScriptConfig::default().with_peer("aa:00:00:00:00:09", "Config Peer");
        let args = SimulateArgs {
            peers: vec![("aa:00:00:00:00:01".to_string(), "Alice".to_string())],
            coordinator: true,
            fail_resolution: true,
            unreliable: true,
            ..SimulateArgs::default()
        };

        let script = script_config(&args, &base);
        assert_eq!(script.peers, vec![ScriptedPeer::new("aa:00:00:00:00:01", "Alice")]);
        assert!(script.is_group_owner);
        assert_eq!(script.group_owner_address, None);
        assert_eq!(script.duplication_rate, ScriptConfig::unreliable().duplication_rate);
    }

    #[test]
    fn test_config_peers_kept_without_arguments() {
        let base = ScriptConfig::default().with_peer("aa:00:00:00:00:09", "Config Peer");
        let script = script_config(&SimulateArgs::default(), &base);
        assert_eq!(script.peers, base.peers);
    }

    #[test]
    fn test_describe_notice() {
        assert_eq!(
            describe_notice(&Notice::PermissionRequired {
                missing: vec![Capability::FineLocation, Capability::NearbyWifiDevices],
            }),
            "Permission required: fine-location, nearby-wifi-devices"
        );
        assert_eq!(
            describe_notice(&Notice::RequestRejected {
                kind: RequestKind::Connect,
                reason: "framework busy".to_string(),
            }),
            "Platform rejected connect request: framework busy"
        );
    }

    #[tokio::test]
    async fn test_simulated_connection() {
        let mut config = AppConfig::default();
        config.simulation = ScriptConfig::ideal();
        config.cli.phase_timeout_ms = 2_000;
        let args = SimulateArgs {
            peers: vec![("aa:00:00:00:00:01".to_string(), "Alice".to_string())],
            connect: Some("aa:00:00:00:00:01".to_string()),
            ..SimulateArgs::default()
        };

        CommandDispatcher::handle_simulate(args, config).await.unwrap();
    }
}
