//! # Oracle Sync
//!
//! Pulls attested reserve balances from the Bitcoin-side oracle into the
//! ledger. Two rules shape everything here:
//!
//! 1. **Rate limiting** — a reserve's backing figure is written at most
//!    once per configured interval, measured from the last *successful*
//!    write. The first sync is always allowed. Failed attempts do not
//!    burn the slot.
//! 2. **Staleness is a violation, not a value** — a stale attestation is
//!    never written. It flags the reserve, forces it into review, and
//!    surfaces as an error.
//!
//! Batch sweeps take an explicit [`SyncBudget`] so a caller with bounded
//! resources defers work instead of truncating it silently.

use thiserror::Error;

use crate::events::EventKind;
use crate::external::DownstreamError;
use crate::ledger::{LedgerError, ReserveId, ReserveStatus};

use super::{CustodyEngine, ReentrancyError};
use chrono::{DateTime, Utc};

/// Errors from oracle sync operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleSyncError {
    /// Another externally-reaching operation is in flight.
    #[error(transparent)]
    Reentrancy(#[from] ReentrancyError),

    /// Reserve lookup failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Terminal reserves are never synced.
    #[error("reserve {0} is revoked; its backing is no longer tracked")]
    ReserveRevoked(ReserveId),

    /// The per-reserve write interval has not elapsed.
    #[error("sync rate limited until {retry_at}")]
    RateLimited {
        /// Earliest instant the next write is accepted.
        retry_at: DateTime<Utc>,
    },

    /// The oracle reported its data as stale. The reserve was flagged and
    /// moved toward review; nothing was written.
    #[error("oracle attestation for reserve {0} is stale")]
    StaleAttestation(ReserveId),

    /// The oracle call itself failed. The reserve's failure flag was set.
    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl CustodyEngine {
    /// Refreshes `reserve_id`'s attested backing from the oracle.
    /// Returns the written backing amount in sats.
    pub fn sync_backing_from_oracle(
        &mut self,
        caller: &str,
        reserve_id: &str,
    ) -> Result<u64, OracleSyncError> {
        self.enter()?;
        let out = self.sync_inner(caller, reserve_id);
        self.exit();
        out
    }

    fn sync_inner(&mut self, caller: &str, reserve_id: &str) -> Result<u64, OracleSyncError> {
        let now = self.txn_now();
        let interval = self.params().oracle_sync_interval();

        let reserve = self.state().ledger.reserve(reserve_id)?;
        if reserve.status.is_terminal() {
            return Err(OracleSyncError::ReserveRevoked(reserve_id.to_string()));
        }
        if let Some(last) = reserve.oracle_last_sync_at {
            let retry_at = last + interval;
            if now < retry_at {
                return Err(OracleSyncError::RateLimited { retry_at });
            }
        }

        let (backing, stale) = match self.oracle().balance_and_staleness(reserve_id) {
            Ok(reading) => reading,
            Err(err) => {
                self.state_mut().ledger.reserve_mut(reserve_id)?.oracle_failure = true;
                tracing::warn!(reserve = reserve_id, %err, "oracle call failed");
                return Err(err.into());
            }
        };

        if stale {
            self.state_mut().ledger.reserve_mut(reserve_id)?.oracle_failure = true;
            tracing::warn!(reserve = reserve_id, "stale oracle attestation; forcing review");
            // Push toward review; already-UnderReview reserves stay put.
            let status = self.state().ledger.reserve(reserve_id)?.status;
            if status.can_transition_to(ReserveStatus::UnderReview) {
                self.force_transition(
                    now,
                    caller,
                    reserve_id,
                    ReserveStatus::UnderReview,
                    "stale oracle attestation",
                )
                .expect("edge checked via can_transition_to");
            }
            return Err(OracleSyncError::StaleAttestation(reserve_id.to_string()));
        }

        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        reserve.backing = backing;
        reserve.oracle_last_sync_at = Some(now);
        reserve.oracle_failure = false;

        tracing::info!(reserve = reserve_id, backing, "backing synced from oracle");
        self.emit(
            now,
            caller,
            EventKind::OracleSynced {
                reserve: reserve_id.to_string(),
                backing,
            },
        );
        Ok(backing)
    }
}

// ---------------------------------------------------------------------------
// Batch sweeps
// ---------------------------------------------------------------------------

/// Caller-supplied bound on how many sync attempts a sweep may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncBudget {
    remaining: u32,
}

impl SyncBudget {
    /// A budget of `attempts` sync calls.
    pub fn new(attempts: u32) -> Self {
        Self {
            remaining: attempts,
        }
    }

    /// Attempts left.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Outcome of a budgeted sweep over several reserves.
#[derive(Debug, Default)]
pub struct BatchSyncReport {
    /// Reserves whose backing was written, with the new figure.
    pub synced: Vec<(ReserveId, u64)>,
    /// Reserves whose attempt failed, with the reason. Rate limiting is an
    /// expected entry here during frequent sweeps.
    pub failed: Vec<(ReserveId, OracleSyncError)>,
    /// Reserves not attempted because the budget ran out.
    pub deferred: Vec<ReserveId>,
}

impl BatchSyncReport {
    /// Returns `true` if every attempted entry synced and nothing was
    /// deferred.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.deferred.is_empty()
    }
}

impl CustodyEngine {
    /// Sweeps `reserve_ids`, syncing each until the budget runs out. The
    /// budget is checked before every attempt; entries past exhaustion are
    /// reported as deferred, never silently dropped.
    pub fn sync_batch(
        &mut self,
        caller: &str,
        reserve_ids: &[ReserveId],
        budget: &mut SyncBudget,
    ) -> BatchSyncReport {
        let mut report = BatchSyncReport::default();
        for id in reserve_ids {
            if !budget.consume() {
                report.deferred.push(id.clone());
                continue;
            }
            match self.sync_backing_from_oracle(caller, id) {
                Ok(backing) => report.synced.push((id.clone(), backing)),
                Err(err) => report.failed.push((id.clone(), err)),
            }
        }
        tracing::debug!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            deferred = report.deferred.len(),
            "batch sync sweep finished"
        );
        report
    }
}
