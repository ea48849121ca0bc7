//! # Watchdog Enforcement
//!
//! Anyone may call these entry points. Authority comes from the claim
//! being *objectively re-derivable from live state*, not from the caller's
//! identity: the engine re-checks the violation itself and refuses when
//! the books do not confirm it. A watchdog is a messenger, never a judge.
//!
//! Reserve insufficiency gets a two-step treatment:
//!
//! ```text
//! enforce(InsufficientReserves)          check_escalation()
//!   backing < minted confirmed             grace elapsed +
//!   → UnderReview, timer armed  ──45min──► fresh oracle re-read
//!                                            ├─ recovered → timer cleared
//!                                            └─ sustained → emergency pause
//! ```
//!
//! The grace window absorbs transient oracle noise; the re-read at
//! escalation must be fresh — stale data can flag a reserve but can never
//! emergency-pause one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::EventKind;
use crate::external::DownstreamError;
use crate::ledger::{EscalationTimer, LedgerError, ReserveId, ReserveStatus};

use super::lifecycle::LifecycleError;
use super::{CustodyEngine, ReentrancyError};
use chrono::{DateTime, Utc};

/// Objectively checkable violation classes a watchdog may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationReason {
    /// Attested backing is below the minted supply.
    InsufficientReserves,
    /// The newest attestation is older than the staleness threshold.
    StaleAttestation,
    /// The reserve has gone without a fresh attestation for so long the
    /// custodian has effectively stopped attesting.
    ProlongedStaleness,
    /// The reserve has sat in UnderReview past the review timeout.
    StuckUnderReview,
}

impl std::fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationReason::InsufficientReserves => write!(f, "insufficient reserves"),
            ViolationReason::StaleAttestation => write!(f, "stale attestation"),
            ViolationReason::ProlongedStaleness => write!(f, "prolonged staleness"),
            ViolationReason::StuckUnderReview => write!(f, "stuck under review"),
        }
    }
}

/// Result of a sustained-insufficiency escalation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// The fresh re-read showed the reserve recovered; timer cleared.
    Resolved,
    /// The violation held; the reserve is now emergency paused.
    EmergencyPaused,
}

/// Errors from watchdog operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchdogError {
    /// Another externally-reaching operation is in flight.
    #[error(transparent)]
    Reentrancy(#[from] ReentrancyError),

    /// Reserve lookup failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A transition refused by the lifecycle graph.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Terminal reserves have nothing left to enforce.
    #[error("reserve {0} is revoked")]
    ReserveRevoked(ReserveId),

    /// The live state does not confirm the reported violation.
    #[error("violation not confirmed on reserve {reserve}: {reason}")]
    NotConfirmed {
        /// The accused reserve.
        reserve: ReserveId,
        /// The claimed violation.
        reason: ViolationReason,
    },

    /// The violation is confirmed but already fully enforced; repeating
    /// the call would only churn the audit trail.
    #[error("violation already enforced on reserve {0}")]
    AlreadyEnforced(ReserveId),

    /// No escalation timer is armed on this reserve.
    #[error("no escalation timer armed on reserve {0}")]
    NoTimer(ReserveId),

    /// The escalation grace period has not elapsed.
    #[error("escalation grace runs until {until}")]
    GraceNotElapsed {
        /// Earliest instant escalation may fire.
        until: DateTime<Utc>,
    },

    /// The re-verification read was stale. Stale data never escalates.
    #[error("oracle reading for reserve {0} is stale; escalation refused")]
    StaleData(ReserveId),

    /// The oracle call failed.
    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl CustodyEngine {
    /// Permissionless violation enforcement. Re-derives the claimed
    /// violation from live state; confirmed violations move the reserve
    /// to UnderReview (or emergency-pause it for a blown review timeout).
    pub fn enforce_objective_violation(
        &mut self,
        caller: &str,
        reserve_id: &str,
        reason: ViolationReason,
    ) -> Result<(), WatchdogError> {
        let now = self.txn_now();
        let params = self.params().clone();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        if reserve.status.is_terminal() {
            return Err(WatchdogError::ReserveRevoked(reserve_id.to_string()));
        }

        match reason {
            ViolationReason::InsufficientReserves => {
                if reserve.backing >= reserve.minted {
                    return Err(WatchdogError::NotConfirmed {
                        reserve: reserve_id.to_string(),
                        reason,
                    });
                }
                if reserve.escalation.is_some() && reserve.status == ReserveStatus::UnderReview {
                    return Err(WatchdogError::AlreadyEnforced(reserve_id.to_string()));
                }
                let needs_transition = reserve.status != ReserveStatus::UnderReview;

                if self.state().ledger.reserve(reserve_id)?.escalation.is_none() {
                    let timer = EscalationTimer { armed_at: now };
                    let fires_at = timer.fires_at(params.escalation_grace());
                    self.state_mut().ledger.reserve_mut(reserve_id)?.escalation = Some(timer);
                    self.emit(
                        now,
                        caller,
                        EventKind::EscalationArmed {
                            reserve: reserve_id.to_string(),
                            fires_at,
                        },
                    );
                }
                if needs_transition {
                    self.force_transition(
                        now,
                        caller,
                        reserve_id,
                        ReserveStatus::UnderReview,
                        "insufficient reserves",
                    )?;
                }
            }
            ViolationReason::StaleAttestation => {
                let confirmed = reserve.oracle_failure
                    || reserve.attestation_age(now) > params.oracle_staleness_threshold();
                if !confirmed {
                    return Err(WatchdogError::NotConfirmed {
                        reserve: reserve_id.to_string(),
                        reason,
                    });
                }
                if reserve.status == ReserveStatus::UnderReview {
                    return Err(WatchdogError::AlreadyEnforced(reserve_id.to_string()));
                }
                self.force_transition(now, caller, reserve_id, ReserveStatus::UnderReview, "stale attestation")?;
            }
            ViolationReason::ProlongedStaleness => {
                if reserve.attestation_age(now) <= params.prolonged_staleness() {
                    return Err(WatchdogError::NotConfirmed {
                        reserve: reserve_id.to_string(),
                        reason,
                    });
                }
                if reserve.status == ReserveStatus::UnderReview {
                    return Err(WatchdogError::AlreadyEnforced(reserve_id.to_string()));
                }
                self.force_transition(
                    now,
                    caller,
                    reserve_id,
                    ReserveStatus::UnderReview,
                    "custodian stopped attesting",
                )?;
            }
            ViolationReason::StuckUnderReview => {
                let stuck = reserve.status == ReserveStatus::UnderReview
                    && now - reserve.status_changed_at > params.review_timeout();
                if !stuck {
                    return Err(WatchdogError::NotConfirmed {
                        reserve: reserve_id.to_string(),
                        reason,
                    });
                }
                if reserve.emergency_paused {
                    return Err(WatchdogError::AlreadyEnforced(reserve_id.to_string()));
                }
                self.state_mut().ledger.reserve_mut(reserve_id)?.emergency_paused = true;
                self.emit(
                    now,
                    caller,
                    EventKind::EmergencyPauseSet {
                        reserve: reserve_id.to_string(),
                    },
                );
            }
        }

        tracing::warn!(reserve = reserve_id, %reason, caller, "violation enforced");
        self.emit(
            now,
            caller,
            EventKind::ViolationEnforced {
                reserve: reserve_id.to_string(),
                reason,
            },
        );
        Ok(())
    }

    /// Permissionless check of an armed insufficiency escalation. After
    /// the grace period, a fresh oracle re-read decides: recovered clears
    /// the timer, sustained sets the emergency pause.
    pub fn check_escalation(
        &mut self,
        caller: &str,
        reserve_id: &str,
    ) -> Result<EscalationOutcome, WatchdogError> {
        self.enter()?;
        let out = self.check_escalation_inner(caller, reserve_id);
        self.exit();
        out
    }

    fn check_escalation_inner(
        &mut self,
        caller: &str,
        reserve_id: &str,
    ) -> Result<EscalationOutcome, WatchdogError> {
        let now = self.txn_now();
        let grace = self.params().escalation_grace();

        let reserve = self.state().ledger.reserve(reserve_id)?;
        if reserve.status.is_terminal() {
            return Err(WatchdogError::ReserveRevoked(reserve_id.to_string()));
        }
        let timer = reserve
            .escalation
            .ok_or_else(|| WatchdogError::NoTimer(reserve_id.to_string()))?;
        let fires_at = timer.fires_at(grace);
        if now < fires_at {
            return Err(WatchdogError::GraceNotElapsed { until: fires_at });
        }
        let minted = reserve.minted;

        let (backing, stale) = match self.oracle().balance_and_staleness(reserve_id) {
            Ok(reading) => reading,
            Err(err) => {
                self.state_mut().ledger.reserve_mut(reserve_id)?.oracle_failure = true;
                return Err(err.into());
            }
        };
        if stale {
            self.state_mut().ledger.reserve_mut(reserve_id)?.oracle_failure = true;
            return Err(WatchdogError::StaleData(reserve_id.to_string()));
        }

        // The re-read is authoritative for this decision; keep the books
        // aligned with it.
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        reserve.backing = backing;
        reserve.oracle_failure = false;

        if backing >= minted {
            reserve.escalation = None;
            tracing::info!(reserve = reserve_id, backing, minted, "escalation resolved");
            self.emit(
                now,
                caller,
                EventKind::EscalationCleared {
                    reserve: reserve_id.to_string(),
                },
            );
            return Ok(EscalationOutcome::Resolved);
        }

        reserve.escalation = None;
        reserve.emergency_paused = true;
        tracing::error!(
            reserve = reserve_id,
            backing,
            minted,
            "sustained insufficiency; emergency pause set"
        );
        self.emit(
            now,
            caller,
            EventKind::EscalationFired {
                reserve: reserve_id.to_string(),
            },
        );
        self.emit(
            now,
            caller,
            EventKind::EmergencyPauseSet {
                reserve: reserve_id.to_string(),
            },
        );
        Ok(EscalationOutcome::EmergencyPaused)
    }
}
