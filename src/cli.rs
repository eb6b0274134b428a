use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "cuebridge", about = "Bridges a physical trigger surface to a LAN cue-playback application")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the static TOML config file.
    #[arg(long, global = true, default_value = "/etc/cuebridge/cuebridge.toml")]
    pub config: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon: supervisor loop, inbound dispatcher, input layer.
    Daemon,
    /// Clear the persisted pairing record.
    Unpair,
    /// Run pairing against a specific, already-known responder set (stdin-free alias for pair-auto).
    Pair,
    /// Broadcast discovery only, printing every responder and its workspaces.
    Discover {
        #[arg(long, default_value = "255.255.255.255")]
        bcast: String,
        #[arg(long, default_value_t = 1.2)]
        wait: f64,
    },
    /// Broadcast discovery, decide roles, and persist the pairing record.
    PairAuto {
        #[arg(long, default_value = "255.255.255.255")]
        bcast: String,
        #[arg(long, default_value_t = 1.2)]
        wait: f64,
    },
}
