//! # QC Lifecycle State Machine
//!
//! Status transitions are driven by three actor classes with different
//! authority:
//!
//! 1. **Arbiter** — full authority, valid for any edge in the 5-state graph.
//! 2. **Enforcer** — automated detection; may only target `UnderReview`,
//!    the human-reviewable intermediate state.
//! 3. **The custodian itself** — via self-pause, which consumes a
//!    [`crate::ledger::PauseCredit`] to halt instantly without governance,
//!    bounded to 48 hours.
//!
//! Authority is an explicit permission-check function per operation, not
//! dispatch: the same transition edge can be legal for one actor class and
//! refused for another.
//!
//! Every transition stamps `status_changed_at` and emits an audit event.
//! Minting/redemption gating is derived directly from the stored status,
//! so a completed transition is immediately visible to the invariant
//! engine — there is no separate authorization flag to drift out of sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::EventKind;
use crate::ledger::{LedgerError, ReserveId, ReserveStatus};

use super::redemption::RedemptionStatus;
use super::CustodyEngine;

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// Authority class of an acting identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authority {
    /// Full-authority governance arbiter: any valid edge.
    Arbiter,
    /// Limited automated enforcement: may only move reserves into
    /// UnderReview.
    Enforcer,
}

impl Authority {
    /// Whether this authority class may drive a transition into `to`.
    /// Graph validity is checked separately.
    pub fn permits(self, to: ReserveStatus) -> bool {
        match self {
            Authority::Arbiter => true,
            Authority::Enforcer => to == ReserveStatus::UnderReview,
        }
    }
}

impl std::fmt::Display for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authority::Arbiter => write!(f, "Arbiter"),
            Authority::Enforcer => write!(f, "Enforcer"),
        }
    }
}

/// An acting identity with its authority class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identity recorded in the audit trail.
    pub id: String,
    /// Authority class used for permission checks.
    pub authority: Authority,
}

impl Actor {
    /// A full-authority arbiter identity.
    pub fn arbiter(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authority: Authority::Arbiter,
        }
    }

    /// A limited-authority enforcer identity.
    pub fn enforcer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authority: Authority::Enforcer,
        }
    }
}

/// Which halt the custodian is buying with its pause credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfPauseTarget {
    /// Halt minting only; redemptions continue.
    MintingPaused,
    /// Halt all custodian-side operations.
    Paused,
}

impl SelfPauseTarget {
    fn status(self) -> ReserveStatus {
        match self {
            SelfPauseTarget::MintingPaused => ReserveStatus::MintingPaused,
            SelfPauseTarget::Paused => ReserveStatus::Paused,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from lifecycle operations. State is unchanged on every variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Reserve lookup failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The 5-state graph has no such edge.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: ReserveStatus,
        /// Requested status.
        to: ReserveStatus,
    },

    /// The actor's authority class does not cover this target status.
    #[error("{authority} authority may not set status {target}")]
    Unauthorized {
        /// The acting authority class.
        authority: Authority,
        /// The refused target status.
        target: ReserveStatus,
    },

    /// Self-pause requires an Active reserve.
    #[error("self-pause requires Active status, reserve is {status}")]
    NotActive {
        /// The reserve's current status.
        status: ReserveStatus,
    },

    /// No pause credit available.
    #[error("no pause credit available (renewable at {renewable_at:?})")]
    NoPauseCredit {
        /// When renewal becomes possible, if a credit was ever consumed.
        renewable_at: Option<DateTime<Utc>>,
    },

    /// The reserve already holds an unconsumed credit.
    #[error("reserve already holds a pause credit")]
    AlreadyHasCredit,

    /// Revoking a credit the reserve does not hold.
    #[error("reserve holds no pause credit to revoke")]
    NoCreditToRevoke,

    /// Renewal attempted before the renewal period elapsed (or before any
    /// credit was ever granted).
    #[error("pause credit not renewable until {renewable_at:?}")]
    CreditNotRenewable {
        /// Earliest renewal instant; `None` when no credit was ever
        /// consumed, in which case only a governance grant helps.
        renewable_at: Option<DateTime<Utc>>,
    },

    /// A redemption deadline falls inside the would-be pause window.
    /// Self-pause may not be used to dodge an imminent commitment.
    #[error("redemption {redemption_id} is due {deadline}, inside the pause window")]
    ImminentObligation {
        /// The blocking redemption.
        redemption_id: String,
        /// Its fulfillment deadline.
        deadline: DateTime<Utc>,
    },

    /// The reserve is not currently self-paused.
    #[error("reserve is not self-paused")]
    NotSelfPaused,

    /// Manual resume arrived after the pause window closed; only the
    /// escalation path applies now.
    #[error("self-pause window ended at {ended_at}; resume is no longer available")]
    SelfPauseExpired {
        /// When the window closed.
        ended_at: DateTime<Utc>,
    },

    /// Escalation attempted while the pause window is still open.
    #[error("self-pause window still open until {ends_at}")]
    SelfPauseStillActive {
        /// When the window closes.
        ends_at: DateTime<Utc>,
    },

    /// The reserve is terminally revoked.
    #[error("reserve {0} is revoked")]
    ReserveRevoked(ReserveId),
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl CustodyEngine {
    /// Actor-driven status transition.
    ///
    /// Checks the actor's authority against the target, then the graph
    /// edge, then applies the transition.
    pub fn set_status(
        &mut self,
        actor: &Actor,
        reserve_id: &str,
        new_status: ReserveStatus,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        if !actor.authority.permits(new_status) {
            return Err(LifecycleError::Unauthorized {
                authority: actor.authority,
                target: new_status,
            });
        }
        let now = self.txn_now();
        self.force_transition(now, &actor.id, reserve_id, new_status, reason)
    }

    /// Graph-validated transition without an authority check. Used by
    /// protocol-internal automation (discipline curve, stale-data
    /// enforcement, self-pause) that already established its right to the
    /// edge.
    pub(crate) fn force_transition(
        &mut self,
        now: DateTime<Utc>,
        actor: &str,
        reserve_id: &str,
        new_status: ReserveStatus,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        let old = reserve.status;
        if !old.can_transition_to(new_status) {
            return Err(LifecycleError::InvalidTransition {
                from: old,
                to: new_status,
            });
        }

        reserve.status = new_status;
        reserve.status_changed_at = now;
        // A forced transition ends any self-pause in progress; the pause
        // bookkeeping must not claim a window that no longer governs the
        // status.
        if reserve.pause_credit.is_paused {
            reserve.pause_credit.end_pause();
        }
        // A terminal reserve has nothing left to escalate.
        if new_status == ReserveStatus::Revoked {
            reserve.escalation = None;
        }

        tracing::info!(
            reserve = reserve_id,
            %old,
            new = %new_status,
            actor,
            reason,
            "reserve status changed"
        );
        self.emit(
            now,
            actor,
            EventKind::StatusChanged {
                reserve: reserve_id.to_string(),
                old,
                new: new_status,
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    /// Custodian self-pause: consumes the pause credit to halt instantly,
    /// without governance, for the configured 48-hour window.
    ///
    /// Refused when any Pending redemption against this reserve has a
    /// deadline inside `pause_duration + min_redemption_buffer` of now.
    pub fn self_pause(
        &mut self,
        reserve_id: &str,
        target: SelfPauseTarget,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        let now = self.txn_now();
        let pause_duration = self.params().self_pause_duration();
        let guard_window = pause_duration + self.params().min_redemption_buffer();
        let renewal = self.params().pause_credit_renewal();

        let reserve = self.state().ledger.reserve(reserve_id)?;
        if reserve.status != ReserveStatus::Active {
            return Err(LifecycleError::NotActive {
                status: reserve.status,
            });
        }
        if !reserve.pause_credit.has_credit {
            return Err(LifecycleError::NoPauseCredit {
                renewable_at: reserve.pause_credit.credit_renew_time,
            });
        }

        // Obligation guard: no deadline may land inside the pause window
        // plus buffer.
        let horizon = now + guard_window;
        for redemption in self.state.redemptions.values() {
            if redemption.reserve == reserve_id
                && redemption.status == RedemptionStatus::Pending
                && redemption.deadline <= horizon
            {
                return Err(LifecycleError::ImminentObligation {
                    redemption_id: redemption.id.clone(),
                    deadline: redemption.deadline,
                });
            }
        }

        self.force_transition(now, reserve_id, reserve_id, target.status(), reason)?;
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        reserve
            .pause_credit
            .consume(now, pause_duration, renewal, reason);
        let pause_ends = reserve.pause_credit.pause_end_time.expect("just consumed");

        self.emit(
            now,
            reserve_id,
            EventKind::PauseCreditConsumed {
                reserve: reserve_id.to_string(),
                pause_ends,
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    /// Custodian resumes from self-pause before the window closes.
    pub fn resume_self_pause(&mut self, reserve_id: &str) -> Result<(), LifecycleError> {
        let now = self.txn_now();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        if !reserve.pause_credit.is_paused {
            return Err(LifecycleError::NotSelfPaused);
        }
        let ends = reserve.pause_credit.pause_end_time.expect("paused implies end time");
        if now > ends {
            return Err(LifecycleError::SelfPauseExpired { ended_at: ends });
        }
        self.force_transition(now, reserve_id, reserve_id, ReserveStatus::Active, "self-pause resumed")
        // force_transition ends the pause bookkeeping.
    }

    /// Permissionless escalation of an expired self-pause: any second
    /// actor may invoke this after the 48-hour window passes without a
    /// resume, moving the reserve to UnderReview. Expiry alone changes
    /// nothing — the check must be called.
    pub fn escalate_expired_self_pause(
        &mut self,
        caller: &str,
        reserve_id: &str,
    ) -> Result<(), LifecycleError> {
        let now = self.txn_now();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        if !reserve.pause_credit.is_paused {
            return Err(LifecycleError::NotSelfPaused);
        }
        let ends = reserve.pause_credit.pause_end_time.expect("paused implies end time");
        if now <= ends {
            return Err(LifecycleError::SelfPauseStillActive { ends_at: ends });
        }

        self.force_transition(
            now,
            caller,
            reserve_id,
            ReserveStatus::UnderReview,
            "self-pause expired without resume",
        )?;
        self.emit(
            now,
            caller,
            EventKind::SelfPauseEscalated {
                reserve: reserve_id.to_string(),
            },
        );
        Ok(())
    }

    /// Governance grants a pause credit. One credit exists per reserve at
    /// a time.
    pub fn grant_pause_credit(
        &mut self,
        actor: &Actor,
        reserve_id: &str,
    ) -> Result<(), LifecycleError> {
        if actor.authority != Authority::Arbiter {
            return Err(LifecycleError::Unauthorized {
                authority: actor.authority,
                target: ReserveStatus::Active,
            });
        }
        let now = self.txn_now();
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        if reserve.status.is_terminal() {
            return Err(LifecycleError::ReserveRevoked(reserve_id.to_string()));
        }
        if reserve.pause_credit.has_credit {
            return Err(LifecycleError::AlreadyHasCredit);
        }
        reserve.pause_credit.has_credit = true;
        reserve.pause_credit.credit_renew_time = None;
        let actor_id = actor.id.clone();
        self.emit(
            now,
            &actor_id,
            EventKind::PauseCreditGranted {
                reserve: reserve_id.to_string(),
            },
        );
        Ok(())
    }

    /// Governance revokes an unconsumed pause credit.
    pub fn revoke_pause_credit(
        &mut self,
        actor: &Actor,
        reserve_id: &str,
    ) -> Result<(), LifecycleError> {
        if actor.authority != Authority::Arbiter {
            return Err(LifecycleError::Unauthorized {
                authority: actor.authority,
                target: ReserveStatus::Active,
            });
        }
        let now = self.txn_now();
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        if !reserve.pause_credit.has_credit {
            return Err(LifecycleError::NoCreditToRevoke);
        }
        reserve.pause_credit.has_credit = false;
        let actor_id = actor.id.clone();
        self.emit(
            now,
            &actor_id,
            EventKind::PauseCreditRevoked {
                reserve: reserve_id.to_string(),
            },
        );
        Ok(())
    }

    /// Custodian renews its consumed credit after the renewal period.
    /// Renewal is an explicit action — elapsing time alone restores
    /// nothing.
    pub fn renew_pause_credit(&mut self, reserve_id: &str) -> Result<(), LifecycleError> {
        let now = self.txn_now();
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        if reserve.status.is_terminal() {
            return Err(LifecycleError::ReserveRevoked(reserve_id.to_string()));
        }
        if reserve.pause_credit.has_credit {
            return Err(LifecycleError::AlreadyHasCredit);
        }
        if !reserve.pause_credit.renewable(now) {
            return Err(LifecycleError::CreditNotRenewable {
                renewable_at: reserve.pause_credit.credit_renew_time,
            });
        }
        reserve.pause_credit.has_credit = true;
        reserve.pause_credit.credit_renew_time = None;
        self.emit(
            now,
            reserve_id,
            EventKind::PauseCreditRenewed {
                reserve: reserve_id.to_string(),
            },
        );
        Ok(())
    }
}
