// Copyright (c) 2026 Basalt Core Developers. MIT License.
// See LICENSE for details.

//! # BASALT Protocol — Core Library
//!
//! BASALT is a reserve-backed Bitcoin custody protocol: Qualified
//! Custodians (QCs) hold real BTC in attested reserve wallets, and a
//! wrapped supply is minted against those reserves under one non-negotiable
//! rule — attested backing covers minted supply, always, on every path.
//!
//! This crate is the custody core. It owns the books and the gates; it
//! deliberately does *not* know how SPV proofs are verified, where
//! attestations come from, or how the token ledger moves balances — those
//! arrive through the seams in [`external`].
//!
//! ## Architecture
//!
//! The modules mirror the actual concerns of running custody:
//!
//! - **config** — Protocol constants and deployment-tunable parameters.
//! - **ledger** — The authoritative records: reserves, wallets, the store.
//! - **engine** — The custody engine: minting gates, QC lifecycle,
//!   oracle sync, redemptions, watchdog enforcement, governance.
//! - **events** — The append-only audit trail.
//! - **external** — Collaborator traits (oracle, token ledger, SPV
//!   verification, clock) plus in-memory devnet implementations.
//!
//! ## Design Philosophy
//!
//! 1. Solvency is checked before every mint, not reconciled after.
//! 2. Stale data can flag a reserve; it can never punish one.
//! 3. Watchdogs are messengers — every claim is re-derived from live state.
//! 4. Revoked means revoked. No resurrection path exists, on purpose.

pub mod config;
pub mod engine;
pub mod events;
pub mod external;
pub mod ledger;

pub use engine::governance::GovernanceError;
pub use engine::lifecycle::{Actor, Authority, LifecycleError, SelfPauseTarget};
pub use engine::minting::MintError;
pub use engine::oracle_sync::{BatchSyncReport, OracleSyncError, SyncBudget};
pub use engine::redemption::{Redemption, RedemptionError, RedemptionId, RedemptionStatus};
pub use engine::watchdog::{EscalationOutcome, ViolationReason, WatchdogError};
pub use engine::{CustodyEngine, EngineState, ReentrancyError};
pub use events::{AuditEvent, EventKind, EventLog};
pub use external::{Clock, DownstreamError, Oracle, ProofValidator, TokenLedger};
pub use ledger::{Reserve, ReserveId, ReserveStatus, Wallet, WalletStatus};
