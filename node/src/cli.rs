//! # CLI Interface
//!
//! Defines the command-line argument structure for `basalt-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// BASALT watchdog node.
///
/// A permissionless enforcement daemon for the BASALT custody core.
/// Sweeps reserve attestations from the oracle feed, escalates expired
/// self-pauses, enforces objectively checkable violations, and runs the
/// sustained-insufficiency escalation checks.
#[derive(Parser, Debug)]
#[command(
    name = "basalt-node",
    about = "BASALT watchdog node",
    version,
    propagate_version = true
)]
pub struct BasaltNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the BASALT node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the watchdog sweep loop.
    Run(RunArgs),
    /// Initialize a new node — creates the data directory and a fresh
    /// engine snapshot with default parameters.
    Init(InitArgs),
    /// Print a summary of the persisted engine snapshot.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where the engine snapshot lives.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "BASALT_DATA_DIR", default_value = "~/.basalt")]
    pub data_dir: PathBuf,

    /// Path to the oracle attestation feed (JSON, re-read every sweep).
    #[arg(long, short = 'a', env = "BASALT_ATTESTATIONS")]
    pub attestations: PathBuf,

    /// Seconds between watchdog sweeps.
    #[arg(long, env = "BASALT_SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Maximum oracle sync attempts per sweep. Reserves past the budget
    /// are deferred to the next sweep.
    #[arg(long, env = "BASALT_SYNC_BUDGET", default_value_t = 32)]
    pub sync_budget: u32,

    /// Watchdog identity recorded in the audit trail.
    #[arg(long, env = "BASALT_WATCHDOG_ID", default_value = "basalt-watchdog")]
    pub watchdog_id: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "BASALT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "BASALT_DATA_DIR", default_value = "~/.basalt")]
    pub data_dir: PathBuf,

    /// Network label stamped into the snapshot metadata: mainnet,
    /// testnet, or devnet.
    #[arg(long, default_value = "devnet")]
    pub network: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Path to the node data directory holding the snapshot.
    #[arg(long, short = 'd', env = "BASALT_DATA_DIR", default_value = "~/.basalt")]
    pub data_dir: PathBuf,
}
