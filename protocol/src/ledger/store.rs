//! # Ledger Store
//!
//! The owned, authoritative map of reserve records. All cross-references
//! are direct key lookups — wallet → reserve through a flat index, no
//! relational joins. Nothing outside the custody engine gets a `&mut`
//! into this store; every mutation goes through the engine's gated entry
//! points.
//!
//! The store also maintains the protocol-wide minted aggregate so the
//! global-cap check stays O(1) instead of a scan.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::reserve::{Reserve, ReserveId};
use super::wallet::Wallet;

/// Errors raised by raw store access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The referenced reserve does not exist.
    #[error("reserve not found: {0}")]
    ReserveNotFound(ReserveId),

    /// A reserve with this address is already registered.
    #[error("reserve already registered: {0}")]
    ReserveAlreadyRegistered(ReserveId),

    /// The referenced wallet is not registered to this reserve.
    #[error("wallet {address} not found on reserve {reserve}")]
    WalletNotFound {
        /// The reserve that was searched.
        reserve: ReserveId,
        /// The missing wallet address.
        address: String,
    },

    /// The wallet address is already bound to a reserve. Wallets bind 1:1.
    #[error("wallet {address} already registered to reserve {reserve}")]
    WalletAlreadyRegistered {
        /// The reserve currently holding the binding.
        reserve: ReserveId,
        /// The contested wallet address.
        address: String,
    },

    /// Minted accounting would overflow `u64`. Unreachable through the
    /// invariant engine's checks; kept typed rather than panicking.
    #[error("minted accounting overflow on reserve {0}")]
    AccountingOverflow(ReserveId),

    /// Minted accounting would underflow below zero.
    #[error("minted accounting underflow on reserve {0}")]
    AccountingUnderflow(ReserveId),
}

/// The authoritative reserve map plus derived aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStore {
    /// Reserve records keyed by custodian address.
    reserves: BTreeMap<ReserveId, Reserve>,
    /// Flat wallet-address → reserve-address index for 1:1 enforcement.
    wallet_index: BTreeMap<String, ReserveId>,
    /// Sum of `minted` across all reserves, maintained incrementally.
    total_minted: u64,
}

impl LedgerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new reserve record.
    pub fn insert_reserve(&mut self, reserve: Reserve) -> Result<(), LedgerError> {
        if self.reserves.contains_key(&reserve.address) {
            return Err(LedgerError::ReserveAlreadyRegistered(reserve.address));
        }
        self.reserves.insert(reserve.address.clone(), reserve);
        Ok(())
    }

    /// Looks up a reserve.
    pub fn reserve(&self, id: &str) -> Result<&Reserve, LedgerError> {
        self.reserves
            .get(id)
            .ok_or_else(|| LedgerError::ReserveNotFound(id.to_string()))
    }

    /// Looks up a reserve mutably. Crate-private: mutation is the engine's
    /// business.
    pub(crate) fn reserve_mut(&mut self, id: &str) -> Result<&mut Reserve, LedgerError> {
        self.reserves
            .get_mut(id)
            .ok_or_else(|| LedgerError::ReserveNotFound(id.to_string()))
    }

    /// All registered reserve addresses, in key order.
    pub fn reserve_ids(&self) -> Vec<ReserveId> {
        self.reserves.keys().cloned().collect()
    }

    /// Iterates all reserve records.
    pub fn iter(&self) -> impl Iterator<Item = &Reserve> {
        self.reserves.values()
    }

    /// Number of registered reserves (Revoked tombstones included).
    pub fn len(&self) -> usize {
        self.reserves.len()
    }

    /// Returns `true` if no reserve was ever registered.
    pub fn is_empty(&self) -> bool {
        self.reserves.is_empty()
    }

    /// Protocol-wide minted aggregate.
    pub fn total_minted(&self) -> u64 {
        self.total_minted
    }

    /// Applies a mint to both the per-reserve and global accounting.
    /// Invariant checks have already passed; this is pure bookkeeping.
    pub(crate) fn record_mint(&mut self, id: &str, amount: u64) -> Result<(), LedgerError> {
        let new_total = self
            .total_minted
            .checked_add(amount)
            .ok_or_else(|| LedgerError::AccountingOverflow(id.to_string()))?;
        let reserve = self.reserve_mut(id)?;
        reserve.minted = reserve
            .minted
            .checked_add(amount)
            .ok_or_else(|| LedgerError::AccountingOverflow(id.to_string()))?;
        self.total_minted = new_total;
        Ok(())
    }

    /// Applies a burn to both accounting levels.
    pub(crate) fn record_burn(&mut self, id: &str, amount: u64) -> Result<(), LedgerError> {
        let new_total = self
            .total_minted
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::AccountingUnderflow(id.to_string()))?;
        let reserve = self.reserve_mut(id)?;
        reserve.minted = reserve
            .minted
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::AccountingUnderflow(id.to_string()))?;
        self.total_minted = new_total;
        Ok(())
    }

    /// Binds a wallet to a reserve, enforcing the global 1:1 binding.
    pub(crate) fn add_wallet(&mut self, id: &str, wallet: Wallet) -> Result<(), LedgerError> {
        if let Some(owner) = self.wallet_index.get(&wallet.address) {
            return Err(LedgerError::WalletAlreadyRegistered {
                reserve: owner.clone(),
                address: wallet.address,
            });
        }
        let reserve = self.reserve_mut(id)?;
        let address = wallet.address.clone();
        reserve.wallets.insert(address.clone(), wallet);
        self.wallet_index.insert(address, id.to_string());
        Ok(())
    }

    /// Removes a wallet binding. The caller has already verified the
    /// obligation and solvency gates.
    pub(crate) fn remove_wallet(&mut self, id: &str, address: &str) -> Result<Wallet, LedgerError> {
        let reserve = self.reserve_mut(id)?;
        let wallet = reserve
            .wallets
            .remove(address)
            .ok_or_else(|| LedgerError::WalletNotFound {
                reserve: id.to_string(),
                address: address.to_string(),
            })?;
        self.wallet_index.remove(address);
        Ok(wallet)
    }

    /// Which reserve a wallet address is bound to, if any.
    pub fn wallet_owner(&self, address: &str) -> Option<&ReserveId> {
        self.wallet_index.get(address)
    }
}
