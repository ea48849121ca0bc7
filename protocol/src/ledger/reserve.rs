//! # Reserve Records
//!
//! A [`Reserve`] is the authoritative record for one Qualified Custodian:
//! attested backing, outstanding minted supply, minting cap, lifecycle
//! status, oracle bookkeeping, the custodian's pause credit, and the set of
//! registered reserve wallets.
//!
//! ## Status Model
//!
//! ```text
//!                ┌────────────────┐
//!      ┌────────►│     Active      │◄────────┐
//!      │         └──┬────┬────┬───┘         │
//!      │            │    │    │             │
//! ┌────┴────────┐◄──┘    │    └──►┌─────────┴──┐
//! │ MintingPaused│◄──────┼───────►│   Paused    │
//! └────┬─────────┘       │        └────┬────────┘
//!      │            ┌────▼───────┐     │
//!      └───────────►│ UnderReview │◄───┘
//!                   └────┬───┬────┘
//!                        │   │
//!          (back to Active)  │
//!                        ┌───▼──────┐
//!   (reachable from any) │  Revoked  │ ← terminal, no way back
//!                        └───────────┘
//! ```
//!
//! Revoked is intentional finality, not an error to be retried. No actor —
//! arbiter included — can resurrect a revoked reserve.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::wallet::Wallet;

/// A reserve (custodian) identity — its protocol address.
pub type ReserveId = String;

// ---------------------------------------------------------------------------
// ReserveStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReserveStatus {
    /// Fully operational: may mint and take redemptions.
    Active,
    /// Minting halted; redemptions continue.
    MintingPaused,
    /// All custodian-side operations halted.
    Paused,
    /// Flagged by automated detection or governance; pending human review.
    /// Only an arbiter can move the reserve out of this state.
    UnderReview,
    /// Permanently deauthorized. Terminal.
    Revoked,
}

impl ReserveStatus {
    /// Returns `true` if the 5-state graph allows moving from `self` to `to`.
    ///
    /// Self-loops are not transitions. Revoked has no outgoing edges under
    /// any actor, and UnderReview can only resolve to Active or Revoked.
    pub fn can_transition_to(self, to: ReserveStatus) -> bool {
        use ReserveStatus::*;
        if self == to {
            return false;
        }
        match self {
            Active => matches!(to, MintingPaused | Paused | UnderReview | Revoked),
            MintingPaused => matches!(to, Active | Paused | UnderReview | Revoked),
            Paused => matches!(to, Active | MintingPaused | UnderReview | Revoked),
            UnderReview => matches!(to, Active | Revoked),
            Revoked => false,
        }
    }

    /// Returns `true` if this is the terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReserveStatus::Revoked)
    }

    /// Returns `true` if the status alone permits minting. The emergency
    /// pause flag is checked separately by the invariant engine.
    pub fn allows_minting(self) -> bool {
        matches!(self, ReserveStatus::Active)
    }
}

impl std::fmt::Display for ReserveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReserveStatus::Active => write!(f, "Active"),
            ReserveStatus::MintingPaused => write!(f, "MintingPaused"),
            ReserveStatus::Paused => write!(f, "Paused"),
            ReserveStatus::UnderReview => write!(f, "UnderReview"),
            ReserveStatus::Revoked => write!(f, "Revoked"),
        }
    }
}

// ---------------------------------------------------------------------------
// PauseCredit
// ---------------------------------------------------------------------------

/// The custodian's renewable self-pause right.
///
/// One credit exists per reserve at a time. Consuming it starts both the
/// 48-hour pause window and the 90-day renewal clock; the credit comes back
/// only through an explicit renewal action after the clock elapses, never
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseCredit {
    /// Whether the credit is currently available.
    pub has_credit: bool,
    /// When the credit was last consumed.
    pub last_used: Option<DateTime<Utc>>,
    /// Earliest instant an explicit renewal is accepted
    /// (`last_used + renewal period`).
    pub credit_renew_time: Option<DateTime<Utc>>,
    /// Whether a self-pause is currently in effect.
    pub is_paused: bool,
    /// When the current self-pause window ends (`use time + 48h`).
    pub pause_end_time: Option<DateTime<Utc>>,
    /// Custodian-supplied reason for the current pause.
    pub pause_reason: Option<String>,
}

impl PauseCredit {
    /// A fresh credit, granted and unused.
    pub fn granted() -> Self {
        Self {
            has_credit: true,
            last_used: None,
            credit_renew_time: None,
            is_paused: false,
            pause_end_time: None,
            pause_reason: None,
        }
    }

    /// No credit available. New reserves start here until governance
    /// grants one.
    pub fn absent() -> Self {
        Self {
            has_credit: false,
            last_used: None,
            credit_renew_time: None,
            is_paused: false,
            pause_end_time: None,
            pause_reason: None,
        }
    }

    /// Consumes the credit, opening a pause window of `pause_duration` and
    /// starting the renewal clock. Caller has already verified
    /// `has_credit`.
    pub fn consume(
        &mut self,
        now: DateTime<Utc>,
        pause_duration: Duration,
        renewal_period: Duration,
        reason: &str,
    ) {
        self.has_credit = false;
        self.last_used = Some(now);
        self.credit_renew_time = Some(now + renewal_period);
        self.is_paused = true;
        self.pause_end_time = Some(now + pause_duration);
        self.pause_reason = Some(reason.to_string());
    }

    /// Ends the pause window (manual resume or escalation).
    pub fn end_pause(&mut self) {
        self.is_paused = false;
        self.pause_end_time = None;
        self.pause_reason = None;
    }

    /// Returns `true` if the pause window has elapsed without a resume.
    pub fn pause_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.is_paused, self.pause_end_time) {
            (true, Some(end)) => now > end,
            _ => false,
        }
    }

    /// Returns `true` if an explicit renewal would be accepted at `now`.
    pub fn renewable(&self, now: DateTime<Utc>) -> bool {
        !self.has_credit && matches!(self.credit_renew_time, Some(t) if now >= t)
    }
}

// ---------------------------------------------------------------------------
// EscalationTimer
// ---------------------------------------------------------------------------

/// Armed the first time an unresolved insufficient-reserves violation is
/// enforced; cleared when re-verification shows it resolved (fresh data
/// only) or when escalation fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTimer {
    /// When the violation was first confirmed.
    pub armed_at: DateTime<Utc>,
}

impl EscalationTimer {
    /// Earliest instant the permissionless escalation check may act.
    pub fn fires_at(&self, grace: Duration) -> DateTime<Utc> {
        self.armed_at + grace
    }
}

// ---------------------------------------------------------------------------
// Reserve
// ---------------------------------------------------------------------------

/// The authoritative per-custodian record.
///
/// Mutated only through the custody engine's gated entry points. Never
/// physically deleted — `Revoked` is the tombstone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reserve {
    /// Custodian address (also the store key).
    pub address: ReserveId,
    /// Current lifecycle status.
    pub status: ReserveStatus,
    /// Attested backing, in sats.
    pub backing: u64,
    /// Outstanding minted supply attributed to this reserve, in sats.
    pub minted: u64,
    /// Per-reserve minting ceiling, in sats.
    pub minting_cap: u64,
    /// Timestamp of the most recent status transition.
    pub status_changed_at: DateTime<Utc>,
    /// When the backing figure was last written from a fresh attestation.
    pub oracle_last_sync_at: Option<DateTime<Utc>>,
    /// Set when the last oracle interaction failed or reported stale data;
    /// cleared by the next successful sync.
    pub oracle_failure: bool,
    /// Hard stop distinct from lifecycle status: blocks minting *and* new
    /// redemptions. Set by sustained-violation escalation, cleared only by
    /// an arbiter.
    pub emergency_paused: bool,
    /// The custodian's self-pause credit.
    pub pause_credit: PauseCredit,
    /// Insufficiency escalation timer, when armed.
    pub escalation: Option<EscalationTimer>,
    /// Registered reserve wallets, keyed by Bitcoin address.
    pub wallets: BTreeMap<String, Wallet>,
    /// Count of Pending redemptions against this reserve. O(1) gate for
    /// the self-pause guard and solvency tooling.
    pub active_redemptions: u64,
    /// When the reserve was registered.
    pub registered_at: DateTime<Utc>,
}

impl Reserve {
    /// Creates a freshly registered reserve: Active, zero backing and
    /// minted, no pause credit until governance grants one.
    pub fn new(address: ReserveId, minting_cap: u64, now: DateTime<Utc>) -> Self {
        Self {
            address,
            status: ReserveStatus::Active,
            backing: 0,
            minted: 0,
            minting_cap,
            status_changed_at: now,
            oracle_last_sync_at: None,
            oracle_failure: false,
            emergency_paused: false,
            pause_credit: PauseCredit::absent(),
            escalation: None,
            wallets: BTreeMap::new(),
            active_redemptions: 0,
            registered_at: now,
        }
    }

    /// Solvency predicate: attested backing covers the minted supply.
    pub fn is_solvent(&self) -> bool {
        self.backing >= self.minted
    }

    /// Whether a mint may proceed at all: lifecycle status permits it and
    /// no emergency pause is in force.
    pub fn minting_allowed(&self) -> bool {
        self.status.allows_minting() && !self.emergency_paused
    }

    /// Age of the newest attestation at `now`. Falls back to the
    /// registration time when the reserve has never synced, so a custodian
    /// cannot stay un-attested forever by simply never syncing.
    pub fn attestation_age(&self, now: DateTime<Utc>) -> Duration {
        now - self.oracle_last_sync_at.unwrap_or(self.registered_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_graph_matches_spec() {
        use ReserveStatus::*;
        // Active fans out everywhere.
        for to in [MintingPaused, Paused, UnderReview, Revoked] {
            assert!(Active.can_transition_to(to));
        }
        // UnderReview resolves only to Active or Revoked.
        assert!(UnderReview.can_transition_to(Active));
        assert!(UnderReview.can_transition_to(Revoked));
        assert!(!UnderReview.can_transition_to(Paused));
        assert!(!UnderReview.can_transition_to(MintingPaused));
        // Self-loops are not transitions.
        assert!(!Paused.can_transition_to(Paused));
    }

    #[test]
    fn revoked_has_zero_outgoing_edges() {
        use ReserveStatus::*;
        for to in [Active, MintingPaused, Paused, UnderReview, Revoked] {
            assert!(!Revoked.can_transition_to(to));
        }
        assert!(Revoked.is_terminal());
    }

    #[test]
    fn pause_credit_consume_and_renewal_window() {
        let now = Utc::now();
        let mut credit = PauseCredit::granted();
        credit.consume(now, Duration::hours(48), Duration::days(90), "maintenance");

        assert!(!credit.has_credit);
        assert!(credit.is_paused);
        assert_eq!(credit.pause_end_time, Some(now + Duration::hours(48)));
        assert_eq!(credit.credit_renew_time, Some(now + Duration::days(90)));

        // Not renewable the day after; renewable at day 90.
        assert!(!credit.renewable(now + Duration::days(1)));
        assert!(credit.renewable(now + Duration::days(90)));
    }

    #[test]
    fn pause_expiry_is_strict() {
        let now = Utc::now();
        let mut credit = PauseCredit::granted();
        credit.consume(now, Duration::hours(48), Duration::days(90), "ops");

        assert!(!credit.pause_expired(now + Duration::hours(48)));
        assert!(credit.pause_expired(now + Duration::hours(48) + Duration::seconds(1)));

        credit.end_pause();
        assert!(!credit.pause_expired(now + Duration::hours(72)));
    }

    #[test]
    fn new_reserve_is_active_and_solvent() {
        let r = Reserve::new("qc-1".into(), 1_000_000, Utc::now());
        assert_eq!(r.status, ReserveStatus::Active);
        assert!(r.is_solvent());
        assert!(r.minting_allowed());
        assert!(!r.pause_credit.has_credit, "credit is granted, not implied");
    }

    #[test]
    fn attestation_age_uses_registration_as_floor() {
        let t0 = Utc::now();
        let mut r = Reserve::new("qc-1".into(), 0, t0);
        assert_eq!(r.attestation_age(t0 + Duration::hours(5)), Duration::hours(5));

        r.oracle_last_sync_at = Some(t0 + Duration::hours(4));
        assert_eq!(r.attestation_age(t0 + Duration::hours(5)), Duration::hours(1));
    }
}
