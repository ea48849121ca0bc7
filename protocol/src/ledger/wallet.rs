//! # Reserve Wallets & Obligation Tracking
//!
//! A [`Wallet`] is a Bitcoin address bound 1:1 to exactly one reserve.
//! Registration is SPV-proof-gated (the custodian demonstrates control by
//! proving a payment from the address); deregistration is a two-step flow
//! so a custodian can never abandon a wallet that still owes redemptions:
//!
//! 1. `Active` → `PendingDeregistration` on request, any time.
//! 2. Finalized to removed only when the wallet's active-obligation counter
//!    is zero *and* a post-removal solvency check passes.
//!
//! The obligation counter is the O(1) fast path; the append-only history
//! log is the audit copy. The log never shrinks during normal operation —
//! an accepted space/time trade-off, with pruning available through the
//! arbiter's backlog tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Address validation
// ---------------------------------------------------------------------------

/// Rejection reasons for a malformed Bitcoin address.
///
/// This is input validation, not cryptography: checksum verification
/// belongs to the SPV layer. The goal is catching empty strings, pasted
/// garbage, and obviously-wrong networks before any state mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BtcAddressError {
    /// Empty address string.
    #[error("bitcoin address is empty")]
    Empty,

    /// Address length outside the plausible range for any format.
    #[error("bitcoin address has implausible length {0}")]
    BadLength(usize),

    /// Address does not start with a recognized prefix.
    #[error("bitcoin address has unrecognized prefix: {0}")]
    BadPrefix(String),

    /// Address contains characters invalid for its format.
    #[error("bitcoin address contains invalid character {0:?}")]
    BadCharset(char),
}

/// Sanity-checks a Bitcoin address: non-empty, plausible length, known
/// prefix (legacy base58 `1`/`3`, bech32 `bc1`, testnet `tb1`/`bcrt1`),
/// and format-appropriate charset.
pub fn validate_btc_address(addr: &str) -> Result<(), BtcAddressError> {
    if addr.is_empty() {
        return Err(BtcAddressError::Empty);
    }
    if addr.len() < 14 || addr.len() > 90 {
        return Err(BtcAddressError::BadLength(addr.len()));
    }

    if addr.starts_with("bc1") || addr.starts_with("tb1") || addr.starts_with("bcrt1") {
        // Bech32: lowercase alphanumeric, minus the confusable set.
        for c in addr.chars().skip(addr.find('1').unwrap_or(0) + 1) {
            let valid = c.is_ascii_lowercase() || c.is_ascii_digit();
            if !valid || matches!(c, '1' | 'b' | 'i' | 'o') {
                return Err(BtcAddressError::BadCharset(c));
            }
        }
        Ok(())
    } else if addr.starts_with('1') || addr.starts_with('3') {
        // Base58: alphanumeric minus 0, O, I, l.
        for c in addr.chars() {
            if !c.is_ascii_alphanumeric() || matches!(c, '0' | 'O' | 'I' | 'l') {
                return Err(BtcAddressError::BadCharset(c));
            }
        }
        Ok(())
    } else {
        let prefix: String = addr.chars().take(5).collect();
        Err(BtcAddressError::BadPrefix(prefix))
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Deregistration state of a reserve wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletStatus {
    /// Accepting new redemption obligations.
    Active,
    /// Deregistration requested; no new obligations, removal pending the
    /// obligation and solvency gates.
    PendingDeregistration,
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletStatus::Active => write!(f, "Active"),
            WalletStatus::PendingDeregistration => write!(f, "PendingDeregistration"),
        }
    }
}

/// A Bitcoin wallet registered to a reserve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// The wallet's Bitcoin address.
    pub address: String,
    /// Deregistration state.
    pub status: WalletStatus,
    /// When the SPV-verified registration completed.
    pub registered_at: DateTime<Utc>,
    /// Number of Pending redemptions addressed to this wallet. A wallet
    /// may be finalized for deregistration only at zero.
    pub active_obligations: u64,
    /// Append-only log of every redemption id ever assigned to this
    /// wallet, settled or not.
    pub obligation_history: Vec<String>,
}

impl Wallet {
    /// Creates a freshly registered, active wallet.
    pub fn new(address: String, now: DateTime<Utc>) -> Self {
        Self {
            address,
            status: WalletStatus::Active,
            registered_at: now,
            active_obligations: 0,
            obligation_history: Vec::new(),
        }
    }

    /// Records a new obligation: bumps the counter and appends to the log.
    pub fn add_obligation(&mut self, redemption_id: &str) {
        self.active_obligations += 1;
        self.obligation_history.push(redemption_id.to_string());
    }

    /// Settles one obligation. The history log keeps its entry.
    pub fn settle_obligation(&mut self) {
        debug_assert!(self.active_obligations > 0, "obligation counter underflow");
        self.active_obligations = self.active_obligations.saturating_sub(1);
    }
}
