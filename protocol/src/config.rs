//! # Protocol Configuration & Constants
//!
//! Every magic number in BASALT lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Values come in two tiers: compile-time constants that define the protocol
//! itself (changing them after launch is a governance event, not a patch),
//! and [`ProtocolParams`] — the deployment-tunable knobs that governance can
//! adjust at runtime. The constants double as the `Default` for the params.
//!
//! All amounts are satoshi-denominated `u64`. All durations are stored as
//! seconds (`i64`, matching `chrono::Duration`) so the params struct stays
//! flat and serializable.

use chrono::Duration;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol Identity
// ---------------------------------------------------------------------------

/// The protocol version string, assembled at compile time.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Human-readable protocol fingerprint, used in snapshots and logs to
/// identify the custody-engine generation that produced them.
pub const PROTOCOL_FINGERPRINT: &str = "BASALT-CUSTODY-2026";

// ---------------------------------------------------------------------------
// Monetary Units
// ---------------------------------------------------------------------------

/// Satoshis per Bitcoin. The protocol never divides — this exists for
/// display math and test readability only.
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Smallest mint the invariant engine will accept. Dust mints waste audit
/// log space and let an attacker grind the event sequence for free.
pub const DEFAULT_MIN_MINT_SATS: u64 = 10_000; // 0.0001 BTC

/// Largest single mint. A fat-finger ceiling, not a security boundary —
/// the backing and cap checks are the real gate.
pub const DEFAULT_MAX_SINGLE_MINT_SATS: u64 = 100 * SATS_PER_BTC;

/// Smallest redemption a user may request. Bitcoin dust limits make
/// anything below this uneconomical to fulfill on-chain.
pub const DEFAULT_MIN_REDEMPTION_SATS: u64 = 1_000_000; // 0.01 BTC

/// Minimum proof-of-control payment a custodian must demonstrate when
/// registering a reserve wallet. Large enough that grinding a matching
/// SPV proof from someone else's transaction is not free.
pub const WALLET_CONTROL_PROOF_MIN_SATS: u64 = 10_000;

/// Global cap default: 0 means "no global cap configured".
pub const DEFAULT_GLOBAL_CAP_SATS: u64 = 0;

// ---------------------------------------------------------------------------
// Time Windows
// ---------------------------------------------------------------------------

/// How long a self-service pause lasts. After this the custodian has either
/// resumed on their own or a watchdog escalates them to review.
pub const SELF_PAUSE_DURATION_SECS: i64 = 48 * 3600;

/// How long after consuming a pause credit the custodian may renew it.
/// Ninety days: long enough that self-pause is an emergency brake, not a
/// scheduling tool.
pub const PAUSE_CREDIT_RENEWAL_SECS: i64 = 90 * 24 * 3600;

/// Safety buffer added to the pause window when checking whether a
/// redemption deadline would land inside a self-pause. A custodian may not
/// use self-pause to dodge an imminent redemption commitment.
pub const MIN_REDEMPTION_BUFFER_SECS: i64 = 12 * 3600;

/// Deadline for fulfilling a redemption after it is requested.
pub const REDEMPTION_TIMEOUT_SECS: i64 = 48 * 3600;

/// Minimum spacing between oracle-backed writes of a reserve's backing
/// figure. The first sync is always allowed.
pub const ORACLE_SYNC_INTERVAL_SECS: i64 = 3600;

/// An attestation older than this is stale: sync writes are denied and the
/// reserve is flagged for review.
pub const ORACLE_STALENESS_THRESHOLD_SECS: i64 = 24 * 3600;

/// Staleness beyond this is no longer an oracle hiccup — it is a custodian
/// that has stopped attesting.
pub const PROLONGED_STALENESS_SECS: i64 = 7 * 24 * 3600;

/// Grace period between a confirmed reserve-insufficiency detection and
/// the permissionless escalation check. Absorbs transient oracle noise
/// while keeping exposure to a genuinely undercollateralized reserve
/// bounded.
pub const ESCALATION_GRACE_SECS: i64 = 45 * 60;

/// A reserve stuck in UnderReview longer than this gets emergency paused.
/// Review is an intermediate state, not a parking lot.
pub const REVIEW_TIMEOUT_SECS: i64 = 30 * 24 * 3600;

// ---------------------------------------------------------------------------
// ProtocolParams
// ---------------------------------------------------------------------------

/// Deployment-tunable protocol parameters.
///
/// Defaults mirror the constants above. The struct is part of the engine
/// snapshot, so a deployment's tuning survives restarts and is visible in
/// the audit trail when governance changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Smallest accepted mint, in sats.
    pub min_mint_sats: u64,
    /// Largest single mint, in sats.
    pub max_single_mint_sats: u64,
    /// Smallest accepted redemption, in sats.
    pub min_redemption_sats: u64,
    /// Protocol-wide minted ceiling in sats. 0 disables the global cap.
    pub global_cap_sats: u64,
    /// Minimum proof-of-control payment for wallet registration, in sats.
    pub wallet_control_proof_min_sats: u64,
    /// Self-pause window, in seconds.
    pub self_pause_duration_secs: i64,
    /// Pause-credit renewal period, in seconds.
    pub pause_credit_renewal_secs: i64,
    /// Redemption-deadline buffer for the self-pause guard, in seconds.
    pub min_redemption_buffer_secs: i64,
    /// Redemption fulfillment deadline, in seconds.
    pub redemption_timeout_secs: i64,
    /// Per-reserve oracle write rate limit, in seconds.
    pub oracle_sync_interval_secs: i64,
    /// Attestation staleness threshold, in seconds.
    pub oracle_staleness_threshold_secs: i64,
    /// Prolonged-staleness threshold, in seconds.
    pub prolonged_staleness_secs: i64,
    /// Grace before a reserve-insufficiency escalation may fire, in seconds.
    pub escalation_grace_secs: i64,
    /// Maximum time a reserve may sit in UnderReview, in seconds.
    pub review_timeout_secs: i64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_mint_sats: DEFAULT_MIN_MINT_SATS,
            max_single_mint_sats: DEFAULT_MAX_SINGLE_MINT_SATS,
            min_redemption_sats: DEFAULT_MIN_REDEMPTION_SATS,
            global_cap_sats: DEFAULT_GLOBAL_CAP_SATS,
            wallet_control_proof_min_sats: WALLET_CONTROL_PROOF_MIN_SATS,
            self_pause_duration_secs: SELF_PAUSE_DURATION_SECS,
            pause_credit_renewal_secs: PAUSE_CREDIT_RENEWAL_SECS,
            min_redemption_buffer_secs: MIN_REDEMPTION_BUFFER_SECS,
            redemption_timeout_secs: REDEMPTION_TIMEOUT_SECS,
            oracle_sync_interval_secs: ORACLE_SYNC_INTERVAL_SECS,
            oracle_staleness_threshold_secs: ORACLE_STALENESS_THRESHOLD_SECS,
            prolonged_staleness_secs: PROLONGED_STALENESS_SECS,
            escalation_grace_secs: ESCALATION_GRACE_SECS,
            review_timeout_secs: REVIEW_TIMEOUT_SECS,
        }
    }
}

impl ProtocolParams {
    /// Self-pause window as a `chrono::Duration`.
    pub fn self_pause_duration(&self) -> Duration {
        Duration::seconds(self.self_pause_duration_secs)
    }

    /// Pause-credit renewal period as a `chrono::Duration`.
    pub fn pause_credit_renewal(&self) -> Duration {
        Duration::seconds(self.pause_credit_renewal_secs)
    }

    /// Redemption-deadline buffer as a `chrono::Duration`.
    pub fn min_redemption_buffer(&self) -> Duration {
        Duration::seconds(self.min_redemption_buffer_secs)
    }

    /// Redemption fulfillment deadline as a `chrono::Duration`.
    pub fn redemption_timeout(&self) -> Duration {
        Duration::seconds(self.redemption_timeout_secs)
    }

    /// Oracle write rate limit as a `chrono::Duration`.
    pub fn oracle_sync_interval(&self) -> Duration {
        Duration::seconds(self.oracle_sync_interval_secs)
    }

    /// Attestation staleness threshold as a `chrono::Duration`.
    pub fn oracle_staleness_threshold(&self) -> Duration {
        Duration::seconds(self.oracle_staleness_threshold_secs)
    }

    /// Prolonged-staleness threshold as a `chrono::Duration`.
    pub fn prolonged_staleness(&self) -> Duration {
        Duration::seconds(self.prolonged_staleness_secs)
    }

    /// Escalation grace period as a `chrono::Duration`.
    pub fn escalation_grace(&self) -> Duration {
        Duration::seconds(self.escalation_grace_secs)
    }

    /// Review timeout as a `chrono::Duration`.
    pub fn review_timeout(&self) -> Duration {
        Duration::seconds(self.review_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_constants() {
        let p = ProtocolParams::default();
        assert_eq!(p.min_mint_sats, DEFAULT_MIN_MINT_SATS);
        assert_eq!(p.self_pause_duration_secs, SELF_PAUSE_DURATION_SECS);
        assert_eq!(p.global_cap_sats, 0, "global cap is off by default");
    }

    #[test]
    fn duration_accessors_agree_with_fields() {
        let p = ProtocolParams::default();
        assert_eq!(p.escalation_grace(), Duration::minutes(45));
        assert_eq!(p.self_pause_duration(), Duration::hours(48));
        assert_eq!(p.pause_credit_renewal(), Duration::days(90));
    }

    #[test]
    fn params_serialization_roundtrip() {
        let p = ProtocolParams {
            global_cap_sats: 21_000 * SATS_PER_BTC,
            ..Default::default()
        };
        let json = serde_json::to_string(&p).expect("serialize");
        let back: ProtocolParams = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, p);
    }
}
