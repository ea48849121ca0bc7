//! # External Collaborator Seams
//!
//! The custody engine deliberately knows nothing about how Bitcoin SPV
//! proofs are verified, where attested balances come from, or how the
//! wrapped token's ledger moves balances. Those are external collaborators,
//! specified only at their interface boundary:
//!
//! - [`Oracle`] — attested reserve balances plus a staleness flag.
//! - [`ProofValidator`] — black-box SPV payment verification.
//! - [`TokenLedger`] — mint/burn mechanics of the wrapped token.
//! - [`Clock`] — the transaction timestamp source.
//!
//! All calls are synchronous and block the engine; failures surface as a
//! typed [`DownstreamError`] that rejects the whole operation (or, for
//! batch paths, the failing item only).
//!
//! The in-memory implementations at the bottom of this file back the devnet
//! node and the test suites. They are not production adapters.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

/// A failure reported by an external collaborator. The engine never
/// interprets the message — it only decides whether the operation aborts
/// or the item is skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("downstream call failed: {0}")]
pub struct DownstreamError(pub String);

impl DownstreamError {
    /// Convenience constructor for adapters.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of attested reserve balances.
///
/// The attestation pipeline feeding this (price feeds, custodian reports,
/// on-chain balance scans) is out of scope; the engine only consumes the
/// resulting figure and its staleness verdict.
pub trait Oracle: Send + Sync {
    /// Returns `(balance_sats, is_stale)` for the given reserve address.
    fn balance_and_staleness(&self, reserve: &str) -> Result<(u64, bool), DownstreamError>;
}

/// Black-box SPV proof verification.
///
/// Treated as pure and stateless: given a payment address, an expected
/// minimum amount, and a serialized transaction-inclusion proof, it either
/// accepts or rejects. Cryptographic internals live elsewhere.
pub trait ProofValidator: Send + Sync {
    /// Returns `true` if `tx_proof` demonstrates an on-chain payment of at
    /// least `expected_amount` sats to `payment_address`.
    fn verify(&self, payment_address: &str, expected_amount: u64, tx_proof: &[u8]) -> bool;
}

/// The wrapped token's balance ledger.
///
/// The engine is the only caller; every invocation has already passed the
/// invariant checks. A failure here must abort the calling operation
/// before any accounting is written.
pub trait TokenLedger: Send + Sync {
    /// Credits `amount` wrapped tokens to `recipient`.
    fn increase_balance(&self, recipient: &str, amount: u64) -> Result<(), DownstreamError>;

    /// Credits a whole batch in one downstream call. Implementations that
    /// cannot batch should return an error; the engine falls back to
    /// per-recipient calls.
    fn increase_balance_batch(&self, entries: &[(String, u64)]) -> Result<(), DownstreamError>;

    /// Burns `amount` wrapped tokens from `account`.
    fn burn_from(&self, account: &str, amount: u64) -> Result<(), DownstreamError>;

    /// Current wrapped-token balance of `account`.
    fn balance_of(&self, account: &str) -> u64;
}

/// Transaction timestamp source.
///
/// Every deadline in the protocol is an explicit field compared against
/// this value — nothing ever blocks on wall-clock time. Routing time
/// through a seam keeps deadline logic deterministic under test.
pub trait Clock: Send + Sync {
    /// The current transaction timestamp.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock: `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ---------------------------------------------------------------------------
// In-memory implementations (devnet + tests)
// ---------------------------------------------------------------------------

/// A settable clock for tests and devnet replay.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// Jumps the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// An oracle whose per-reserve figures are set by hand.
#[derive(Debug, Default)]
pub struct FixedOracle {
    entries: Mutex<HashMap<String, (u64, bool)>>,
}

impl FixedOracle {
    /// Creates an empty oracle. Unknown reserves report a downstream error.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets the attested balance and staleness flag for a reserve.
    pub fn set(&self, reserve: &str, balance_sats: u64, stale: bool) {
        self.entries
            .lock()
            .insert(reserve.to_string(), (balance_sats, stale));
    }

    /// Removes a reserve so subsequent reads fail, simulating an outage.
    pub fn unset(&self, reserve: &str) {
        self.entries.lock().remove(reserve);
    }
}

impl Oracle for FixedOracle {
    fn balance_and_staleness(&self, reserve: &str) -> Result<(u64, bool), DownstreamError> {
        self.entries
            .lock()
            .get(reserve)
            .copied()
            .ok_or_else(|| DownstreamError::new(format!("no attestation for reserve {reserve}")))
    }
}

/// An in-memory wrapped-token ledger.
///
/// Batch support is toggleable so the engine's per-recipient fallback path
/// can be exercised without a bespoke mock.
#[derive(Debug)]
pub struct InMemoryTokenLedger {
    balances: Mutex<HashMap<String, u64>>,
    batch_supported: Mutex<bool>,
}

impl InMemoryTokenLedger {
    /// Creates an empty ledger with batch calls enabled.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            balances: Mutex::new(HashMap::new()),
            batch_supported: Mutex::new(true),
        })
    }

    /// Enables or disables the batch entry point.
    pub fn set_batch_supported(&self, supported: bool) {
        *self.batch_supported.lock() = supported;
    }

    /// Seeds a balance directly, bypassing the engine. Test setup only.
    pub fn seed(&self, account: &str, amount: u64) {
        self.balances.lock().insert(account.to_string(), amount);
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn increase_balance(&self, recipient: &str, amount: u64) -> Result<(), DownstreamError> {
        let mut balances = self.balances.lock();
        let entry = balances.entry(recipient.to_string()).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| DownstreamError::new("balance overflow"))?;
        Ok(())
    }

    fn increase_balance_batch(&self, entries: &[(String, u64)]) -> Result<(), DownstreamError> {
        if !*self.batch_supported.lock() {
            return Err(DownstreamError::new("batch crediting unsupported"));
        }
        // All-or-nothing under one lock: validate the whole batch first.
        let mut balances = self.balances.lock();
        for (recipient, amount) in entries {
            let current = balances.get(recipient).copied().unwrap_or(0);
            current
                .checked_add(*amount)
                .ok_or_else(|| DownstreamError::new(format!("balance overflow for {recipient}")))?;
        }
        for (recipient, amount) in entries {
            *balances.entry(recipient.clone()).or_insert(0) += amount;
        }
        Ok(())
    }

    fn burn_from(&self, account: &str, amount: u64) -> Result<(), DownstreamError> {
        let mut balances = self.balances.lock();
        let current = balances.get(account).copied().unwrap_or(0);
        if current < amount {
            return Err(DownstreamError::new(format!(
                "insufficient token balance: {account} holds {current}, burn of {amount} requested"
            )));
        }
        balances.insert(account.to_string(), current - amount);
        Ok(())
    }

    fn balance_of(&self, account: &str) -> u64 {
        self.balances.lock().get(account).copied().unwrap_or(0)
    }
}

/// Devnet proof validator: accepts any non-empty proof blob.
///
/// Mirrors the empty-signature gate used while the real verification layer
/// is plugged in at deployment: presence is checked here, cryptographic
/// validity is someone else's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevProofValidator;

impl ProofValidator for DevProofValidator {
    fn verify(&self, _payment_address: &str, _expected_amount: u64, tx_proof: &[u8]) -> bool {
        !tx_proof.is_empty()
    }
}
