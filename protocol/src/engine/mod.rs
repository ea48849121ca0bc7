//! # Custody Engine
//!
//! The single choke point every balance-changing operation passes through.
//! [`CustodyEngine`] owns the ledger store, the redemption book, and the
//! audit log, and reaches external collaborators (oracle, token ledger,
//! proof validator, clock) only through the seams in [`crate::external`].
//!
//! ## Operation groups
//!
//! ```text
//! minting.rs     — Invariant engine: mint/burn/batch, cap & solvency gates
//! lifecycle.rs   — QC state machine, actor authority, self-pause economy
//! oracle_sync.rs — Rate-limited attested-backing refresh, batch sweeps
//! redemption.rs  — Pending → Fulfilled/Defaulted, obligation tracking
//! watchdog.rs    — Permissionless violation enforcement & escalation
//! governance.rs  — Arbiter surface: registration, caps, backlog tooling
//! ```
//!
//! ## Transaction model
//!
//! Operations execute as serialized transactions: each takes `&mut self`,
//! reads one timestamp from the clock, performs every check before any
//! write, and either commits completely or returns a typed error with
//! state untouched. Deadlines are explicit fields compared against the
//! transaction timestamp — the engine never waits for anything.
//!
//! The reentrancy guard makes the single-transaction assumption explicit:
//! entry points that call out to external collaborators refuse to start
//! while another such operation is in flight, so a collaborator callback
//! routed back through a shared handle can never double-spend minting
//! capacity or re-settle an obligation counter.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProtocolParams;
use crate::events::{EventKind, EventLog};
use crate::external::{Clock, Oracle, ProofValidator, TokenLedger};
use crate::ledger::{LedgerError, LedgerStore, Reserve};

pub mod governance;
pub mod lifecycle;
pub mod minting;
pub mod oracle_sync;
pub mod redemption;
pub mod watchdog;

use redemption::{Redemption, RedemptionId};

/// Rejection of a call that arrived while another externally-reaching
/// operation was already in flight.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("reentrant call rejected: an operation is already in flight")]
pub struct ReentrancyError;

/// The serializable half of the engine: everything that must survive a
/// restart. Adapters are re-attached on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    /// Deployment-tunable parameters (governance-mutable).
    pub params: ProtocolParams,
    /// The authoritative reserve records.
    pub ledger: LedgerStore,
    /// The redemption book, keyed by content-derived id.
    pub redemptions: BTreeMap<RedemptionId, Redemption>,
    /// Monotonic counter folded into redemption-id derivation.
    pub redemption_nonce: u64,
    /// Append-only audit trail.
    pub events: EventLog,
}

impl EngineState {
    /// Fresh state with no reserves.
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            ledger: LedgerStore::new(),
            redemptions: BTreeMap::new(),
            redemption_nonce: 0,
            events: EventLog::new(),
        }
    }
}

/// The solvency invariant engine and QC lifecycle core.
pub struct CustodyEngine {
    state: EngineState,
    oracle: Arc<dyn Oracle>,
    token_ledger: Arc<dyn TokenLedger>,
    proof_validator: Arc<dyn ProofValidator>,
    clock: Arc<dyn Clock>,
    in_flight: bool,
}

impl std::fmt::Debug for CustodyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyEngine")
            .field("reserves", &self.state.ledger.len())
            .field("redemptions", &self.state.redemptions.len())
            .field("events", &self.state.events.len())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl CustodyEngine {
    /// Builds an engine over fresh state.
    pub fn new(
        params: ProtocolParams,
        oracle: Arc<dyn Oracle>,
        token_ledger: Arc<dyn TokenLedger>,
        proof_validator: Arc<dyn ProofValidator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::from_state(EngineState::new(params), oracle, token_ledger, proof_validator, clock)
    }

    /// Re-attaches adapters to previously persisted state.
    pub fn from_state(
        state: EngineState,
        oracle: Arc<dyn Oracle>,
        token_ledger: Arc<dyn TokenLedger>,
        proof_validator: Arc<dyn ProofValidator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            oracle,
            token_ledger,
            proof_validator,
            clock,
            in_flight: false,
        }
    }

    /// Read access to the persistable state, e.g. for snapshotting.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Consumes the engine, yielding its state for persistence.
    pub fn into_state(self) -> EngineState {
        self.state
    }

    /// Current protocol parameters.
    pub fn params(&self) -> &ProtocolParams {
        &self.state.params
    }

    /// The audit trail.
    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    /// Looks up a reserve record.
    pub fn reserve(&self, id: &str) -> Result<&Reserve, LedgerError> {
        self.state.ledger.reserve(id)
    }

    /// Looks up a redemption record.
    pub fn redemption(&self, id: &str) -> Option<&Redemption> {
        self.state.redemptions.get(id)
    }

    /// Iterates the redemption book.
    pub fn redemptions(&self) -> impl Iterator<Item = &Redemption> {
        self.state.redemptions.values()
    }

    // -- internal plumbing ---------------------------------------------------

    /// One timestamp per transaction, read once at entry.
    pub(crate) fn txn_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn oracle(&self) -> &dyn Oracle {
        self.oracle.as_ref()
    }

    pub(crate) fn token_ledger(&self) -> &dyn TokenLedger {
        self.token_ledger.as_ref()
    }

    pub(crate) fn proof_validator(&self) -> &dyn ProofValidator {
        self.proof_validator.as_ref()
    }

    pub(crate) fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    /// Marks an externally-reaching operation as in flight.
    pub(crate) fn enter(&mut self) -> Result<(), ReentrancyError> {
        if self.in_flight {
            return Err(ReentrancyError);
        }
        self.in_flight = true;
        Ok(())
    }

    /// Clears the in-flight marker. Paired with every successful `enter`.
    pub(crate) fn exit(&mut self) {
        self.in_flight = false;
    }

    /// Records an audit event at the transaction timestamp.
    pub(crate) fn emit(&mut self, now: DateTime<Utc>, actor: &str, kind: EventKind) {
        tracing::debug!(actor, event = ?kind, "audit event");
        self.state.events.record(now, actor, kind);
    }
}
