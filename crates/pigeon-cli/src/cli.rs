//! Command-line interface definitions and parsing

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a session against a simulated platform
    Simulate(SimulateArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SimulateArgs {
    /// Nearby device as ADDRESS=NAME (repeatable)
    #[arg(short, long = "peer", value_parser = parse_peer)]
    pub peers: Vec<(String, String)>,

    /// Connect to this peer address once the peer list is in
    #[arg(long)]
    pub connect: Option<String>,

    /// Set the local display name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Group owner address reported after connecting
    #[arg(long)]
    pub address: Option<String>,

    /// This device becomes the group owner
    #[arg(long)]
    pub coordinator: bool,

    /// Run without location and nearby-devices grants
    #[arg(long)]
    pub deny_permissions: bool,

    /// Form a group without a usable address
    #[arg(long)]
    pub fail_resolution: bool,

    /// Never answer the address request
    #[arg(long)]
    pub withhold_address: bool,

    /// Reject every connect request
    #[arg(long)]
    pub reject_connect: bool,

    /// Slow, duplicated platform replies
    #[arg(long)]
    pub unreliable: bool,

    /// Print the final state as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parse `ADDRESS=NAME`; a bare address gets an empty name
pub fn parse_peer(raw: &str) -> Result<(String, String), String> {
    let (address, name) = match raw.split_once('=') {
        Some((address, name)) => (address.trim(), name.trim()),
        None => (raw.trim(), ""),
    };
    if address.is_empty() {
        return Err(format!("missing peer address in {:?}", raw));
    }
    Ok((address.to_string(), name.to_string()))
}
