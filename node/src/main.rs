// Copyright (c) 2026 Basalt Core Developers. MIT License.
// See LICENSE for details.

//! # BASALT Watchdog Node
//!
//! Entry point for the `basalt-node` binary. Parses CLI arguments,
//! initializes logging, and runs the permissionless watchdog sweep loop
//! against a persisted custody-engine snapshot.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the watchdog sweep loop
//! - `init`    — initialize the data directory and engine snapshot
//! - `status`  — print a summary of the persisted snapshot
//! - `version` — print build version information
//!
//! Each sweep does four things, in order: refresh attested backings under
//! a sync budget, escalate expired self-pauses, enforce any objectively
//! confirmable violations, and run pending insufficiency escalation
//! checks. Every action goes through the engine's normal gated entry
//! points — the node holds no authority of its own.

mod adapters;
mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use basalt_protocol::config::{ProtocolParams, PROTOCOL_FINGERPRINT, PROTOCOL_VERSION};
use basalt_protocol::external::{DevProofValidator, InMemoryTokenLedger, SystemClock};
use basalt_protocol::{CustodyEngine, EngineState, SyncBudget, ViolationReason, WatchdogError};

use adapters::{load_snapshot, save_snapshot, FileOracle, Snapshot};
use cli::{BasaltNodeCli, Commands};
use logging::LogFormat;

/// Every violation class the sweep probes, in enforcement order: the
/// solvency hole first, then staleness, then the review parking lot.
const SWEEP_REASONS: [ViolationReason; 4] = [
    ViolationReason::InsufficientReserves,
    ViolationReason::StaleAttestation,
    ViolationReason::ProlongedStaleness,
    ViolationReason::StuckUnderReview,
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BasaltNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => print_status(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the watchdog sweep loop over the persisted engine snapshot.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "basalt_node=info,basalt_protocol=info",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        data_dir = %args.data_dir.display(),
        attestations = %args.attestations.display(),
        sweep_interval_secs = args.sweep_interval_secs,
        sync_budget = args.sync_budget,
        watchdog_id = %args.watchdog_id,
        "starting basalt-node"
    );

    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("failed to create data directory: {}", args.data_dir.display())
    })?;

    // Load the snapshot, or start fresh on a first run.
    let snapshot = match load_snapshot(&args.data_dir) {
        Ok(snapshot) => {
            tracing::info!(
                reserves = snapshot.state.ledger.len(),
                network = %snapshot.network,
                "snapshot loaded"
            );
            snapshot
        }
        Err(err) => {
            tracing::warn!(%err, "no usable snapshot; starting with fresh state");
            Snapshot {
                fingerprint: PROTOCOL_FINGERPRINT.to_string(),
                network: "devnet".to_string(),
                state: EngineState::new(ProtocolParams::default()),
            }
        }
    };
    let network = snapshot.network.clone();

    // The watchdog only exercises oracle sync and enforcement, so the
    // token ledger and proof validator are the devnet stand-ins.
    let mut engine = CustodyEngine::from_state(
        snapshot.state,
        Arc::new(FileOracle::new(&args.attestations)),
        InMemoryTokenLedger::new(),
        Arc::new(DevProofValidator),
        Arc::new(SystemClock),
    );

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(args.sweep_interval_secs.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep(&mut engine, &args.watchdog_id, args.sync_budget);
                let snapshot = Snapshot {
                    fingerprint: PROTOCOL_FINGERPRINT.to_string(),
                    network: network.clone(),
                    state: engine.state().clone(),
                };
                if let Err(err) = save_snapshot(&args.data_dir, &snapshot) {
                    tracing::error!(%err, "snapshot persist failed; state kept in memory");
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    // Final persist on the way out.
    let snapshot = Snapshot {
        fingerprint: PROTOCOL_FINGERPRINT.to_string(),
        network,
        state: engine.into_state(),
    };
    save_snapshot(&args.data_dir, &snapshot)?;
    tracing::info!("basalt-node stopped");
    Ok(())
}

/// One full watchdog pass over every registered reserve.
fn sweep(engine: &mut CustodyEngine, watchdog_id: &str, budget_size: u32) {
    let ids = engine.state().ledger.reserve_ids();
    if ids.is_empty() {
        tracing::debug!("no reserves registered; sweep is a no-op");
        return;
    }

    // 1. Refresh attested backings under the sweep budget.
    let mut budget = SyncBudget::new(budget_size);
    let report = engine.sync_batch(watchdog_id, &ids, &mut budget);
    tracing::info!(
        synced = report.synced.len(),
        failed = report.failed.len(),
        deferred = report.deferred.len(),
        "oracle sweep"
    );
    for (reserve, err) in &report.failed {
        tracing::debug!(reserve = %reserve, %err, "sync attempt failed");
    }

    // 2. Expired self-pauses. Expiry changes nothing until someone calls
    // it in — that someone is us.
    let now = chrono::Utc::now();
    for id in &ids {
        let expired = engine
            .reserve(id)
            .map(|r| r.pause_credit.pause_expired(now))
            .unwrap_or(false);
        if !expired {
            continue;
        }
        match engine.escalate_expired_self_pause(watchdog_id, id) {
            Ok(()) => tracing::warn!(reserve = %id, "expired self-pause escalated to review"),
            Err(err) => tracing::debug!(reserve = %id, %err, "self-pause escalation skipped"),
        }
    }

    // 3. Objective violations. NotConfirmed and AlreadyEnforced are the
    // normal case for a healthy book — only real enforcement is loud.
    for id in &ids {
        for reason in SWEEP_REASONS {
            match engine.enforce_objective_violation(watchdog_id, id, reason) {
                Ok(()) => tracing::warn!(reserve = %id, %reason, "violation enforced"),
                Err(WatchdogError::NotConfirmed { .. })
                | Err(WatchdogError::AlreadyEnforced(_))
                | Err(WatchdogError::ReserveRevoked(_)) => {}
                Err(err) => {
                    tracing::debug!(reserve = %id, %reason, %err, "enforcement attempt failed")
                }
            }
        }
    }

    // 4. Armed escalation timers past their grace.
    for id in &ids {
        let armed = engine
            .reserve(id)
            .map(|r| r.escalation.is_some())
            .unwrap_or(false);
        if !armed {
            continue;
        }
        match engine.check_escalation(watchdog_id, id) {
            Ok(outcome) => {
                tracing::warn!(reserve = %id, ?outcome, "escalation check concluded")
            }
            Err(WatchdogError::GraceNotElapsed { .. }) => {}
            Err(err) => tracing::debug!(reserve = %id, %err, "escalation check failed"),
        }
    }
}

/// Initializes a new node data directory with a fresh engine snapshot.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("basalt_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let snapshot = Snapshot {
        fingerprint: PROTOCOL_FINGERPRINT.to_string(),
        network: args.network.clone(),
        state: EngineState::new(ProtocolParams::default()),
    };
    save_snapshot(data_dir, &snapshot)?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", args.network);
    println!("  Fingerprint    : {PROTOCOL_FINGERPRINT}");
    Ok(())
}

/// Prints a human-readable summary of the persisted snapshot.
fn print_status(args: cli::StatusArgs) -> Result<()> {
    let snapshot = load_snapshot(&args.data_dir)?;
    let state = &snapshot.state;

    println!("basalt-node status ({})", snapshot.network);
    println!("  fingerprint     : {}", snapshot.fingerprint);
    println!("  reserves        : {}", state.ledger.len());
    println!("  total minted    : {} sats", state.ledger.total_minted());
    println!("  redemption book : {} records", state.redemptions.len());
    println!("  audit events    : {}", state.events.len());
    println!();
    for reserve in state.ledger.iter() {
        println!(
            "  {:<24} {:<14} backing {:>16} minted {:>16} wallets {:>3} pending {:>3}{}",
            reserve.address,
            reserve.status.to_string(),
            reserve.backing,
            reserve.minted,
            reserve.wallets.len(),
            reserve.active_redemptions,
            if reserve.emergency_paused {
                "  [EMERGENCY PAUSED]"
            } else {
                ""
            },
        );
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("basalt-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {PROTOCOL_VERSION}");
    println!("fingerprint {PROTOCOL_FINGERPRINT}");
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
