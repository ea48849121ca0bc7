//! # Audit Events
//!
//! Every state-changing operation in the custody core emits a structured
//! [`AuditEvent`] carrying the acting identity, the old/new values where a
//! value changed, and the transaction timestamp. External audit-trail
//! construction consumes this log; the engine itself never reads it back
//! for decisions — state lives in the ledger, not the log.
//!
//! The log is append-only and part of the engine snapshot. `since()` gives
//! consumers a cheap cursor-based tail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::watchdog::ViolationReason;
use crate::ledger::{ReserveId, ReserveStatus};

/// A single audit-trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Globally unique event id.
    pub id: Uuid,
    /// Monotonic sequence number within this engine instance.
    pub seq: u64,
    /// Transaction timestamp at which the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// The acting identity: arbiter id, custodian address, watchdog
    /// caller, or `"protocol"` for automatic transitions.
    pub actor: String,
    /// What happened.
    pub kind: EventKind,
}

/// Typed audit payloads. Old/new values are carried explicitly so the
/// trail can be replayed without consulting ledger history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventKind {
    /// A new reserve was registered by governance.
    ReserveRegistered {
        reserve: ReserveId,
        minting_cap: u64,
    },
    /// A lifecycle transition completed.
    StatusChanged {
        reserve: ReserveId,
        old: ReserveStatus,
        new: ReserveStatus,
        reason: String,
    },
    /// Per-reserve minting cap updated.
    MintingCapUpdated {
        reserve: ReserveId,
        old: u64,
        new: u64,
    },
    /// Protocol-wide cap updated (0 = uncapped).
    GlobalCapUpdated { old: u64, new: u64 },
    /// Wrapped tokens minted against a reserve.
    Minted {
        reserve: ReserveId,
        recipient: String,
        amount: u64,
    },
    /// A batch mint completed (aggregate view; per-recipient transfers
    /// are the token ledger's trail).
    BatchMinted {
        reserve: ReserveId,
        recipients: usize,
        total: u64,
    },
    /// Wrapped tokens burned against a reserve.
    Burned {
        reserve: ReserveId,
        account: String,
        amount: u64,
    },
    /// Pure accounting credit with no token movement.
    MintedCredited { reserve: ReserveId, amount: u64 },
    /// Pure accounting debit with no token movement.
    MintedDebited { reserve: ReserveId, amount: u64 },
    /// A redemption entered the Pending state (token already burned).
    RedemptionRequested {
        id: String,
        reserve: ReserveId,
        wallet: String,
        amount: u64,
        deadline: DateTime<Utc>,
    },
    /// A redemption was fulfilled with a verified payment proof.
    RedemptionFulfilled { id: String, reserve: ReserveId },
    /// A redemption was flagged defaulted by an arbiter.
    RedemptionDefaulted {
        id: String,
        reserve: ReserveId,
        reason: String,
    },
    /// Settled redemption records pruned from the working set.
    RedemptionsPruned { removed: usize },
    /// Backing refreshed from a fresh oracle attestation.
    OracleSynced { reserve: ReserveId, backing: u64 },
    /// A pause credit was granted by governance.
    PauseCreditGranted { reserve: ReserveId },
    /// A pause credit was revoked by governance.
    PauseCreditRevoked { reserve: ReserveId },
    /// The custodian consumed its pause credit.
    PauseCreditConsumed {
        reserve: ReserveId,
        pause_ends: DateTime<Utc>,
        reason: String,
    },
    /// The custodian renewed its pause credit after the renewal period.
    PauseCreditRenewed { reserve: ReserveId },
    /// An expired self-pause was escalated to review.
    SelfPauseEscalated { reserve: ReserveId },
    /// A watchdog-confirmed objective violation was enforced.
    ViolationEnforced {
        reserve: ReserveId,
        reason: ViolationReason,
    },
    /// The insufficiency escalation timer was armed.
    EscalationArmed {
        reserve: ReserveId,
        fires_at: DateTime<Utc>,
    },
    /// Re-verification showed the violation resolved; timer cleared.
    EscalationCleared { reserve: ReserveId },
    /// The sustained violation was confirmed and escalation fired.
    EscalationFired { reserve: ReserveId },
    /// The emergency pause flag was set.
    EmergencyPauseSet { reserve: ReserveId },
    /// The emergency pause flag was cleared by an arbiter.
    EmergencyPauseCleared { reserve: ReserveId },
    /// A reserve wallet completed SPV-verified registration.
    WalletRegistered { reserve: ReserveId, address: String },
    /// A wallet entered PendingDeregistration.
    WalletDeregistrationRequested { reserve: ReserveId, address: String },
    /// A wallet was finalized for removal.
    WalletDeregistered { reserve: ReserveId, address: String },
}

/// Append-only audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<AuditEvent>,
    next_seq: u64,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns a reference to it.
    pub fn record(&mut self, timestamp: DateTime<Utc>, actor: &str, kind: EventKind) -> &AuditEvent {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            seq: self.next_seq,
            timestamp,
            actor: actor.to_string(),
            kind,
        };
        self.next_seq += 1;
        self.events.push(event);
        self.events.last().expect("just pushed")
    }

    /// The full trail, oldest first.
    pub fn all(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Events with `seq >= from`, for cursor-based consumers.
    pub fn since(&self, from: u64) -> &[AuditEvent] {
        let start = self.events.partition_point(|e| e.seq < from);
        &self.events[start..]
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
