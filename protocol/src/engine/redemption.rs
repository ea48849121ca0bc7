//! # Redemption Lifecycle
//!
//! A redemption burns wrapped tokens *up front* and opens a Pending
//! obligation the custodian must settle on Bitcoin within the deadline:
//!
//! ```text
//!             ┌─────────┐  verified payment proof   ┌───────────┐
//!   burn ────►│ Pending │──────────────────────────►│ Fulfilled │
//!             └────┬────┘                           └───────────┘
//!                  │  deadline passed, arbiter flags
//!                  ▼
//!             ┌───────────┐
//!             │ Defaulted │──► discipline curve on the reserve
//!             └───────────┘
//! ```
//!
//! Burning at initiation keeps the supply honest: the moment a user
//! commits to redeem, the wrapped tokens stop existing, and the reserve's
//! minted figure drops with them. What remains is an off-ledger BTC debt
//! tracked as a wallet obligation.
//!
//! Fulfillment verifies the payment proof against the *stored* request —
//! address and amount from the record, never from the caller — so a
//! custodian cannot satisfy an obligation with someone else's payment.
//!
//! Redemption ids are content-derived (SHA-256 over requester, reserve,
//! amount, nonce, timestamp) so independent replicas derive identical
//! books from the same event order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::events::EventKind;
use crate::external::DownstreamError;
use crate::ledger::{
    validate_btc_address, BtcAddressError, LedgerError, ReserveId, ReserveStatus, WalletStatus,
};

use super::lifecycle::{Actor, Authority};
use super::{CustodyEngine, ReentrancyError};

/// Content-derived redemption identifier (hex SHA-256).
pub type RedemptionId = String;

/// Lifecycle of a single redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionStatus {
    /// Tokens burned; BTC payment owed before the deadline.
    Pending,
    /// Settled with a verified payment proof.
    Fulfilled,
    /// Flagged by an arbiter after the deadline passed unpaid.
    Defaulted,
}

impl std::fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedemptionStatus::Pending => write!(f, "Pending"),
            RedemptionStatus::Fulfilled => write!(f, "Fulfilled"),
            RedemptionStatus::Defaulted => write!(f, "Defaulted"),
        }
    }
}

/// One redemption record. Immutable after resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    /// Content-derived id.
    pub id: RedemptionId,
    /// The reserve owing the payment.
    pub reserve: ReserveId,
    /// The reserve wallet carrying the obligation.
    pub wallet: String,
    /// The account whose tokens were burned.
    pub requester: String,
    /// Owed amount, in sats.
    pub amount: u64,
    /// Destination Bitcoin address, fixed at request time.
    pub user_btc_address: String,
    /// When the request was accepted (and the burn executed).
    pub requested_at: DateTime<Utc>,
    /// Fulfillment deadline.
    pub deadline: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: RedemptionStatus,
    /// When the redemption left Pending, if it has.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Arbiter-supplied reason, set only on default.
    pub default_reason: Option<String>,
}

/// Errors from redemption and wallet-deregistration operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RedemptionError {
    /// Another externally-reaching operation is in flight.
    #[error(transparent)]
    Reentrancy(#[from] ReentrancyError),

    /// Reserve or wallet lookup failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The destination Bitcoin address is malformed.
    #[error("invalid destination address: {0}")]
    InvalidAddress(#[from] BtcAddressError),

    /// Amount below the on-chain dust floor.
    #[error("redemption of {amount} sats is below the minimum of {min}")]
    BelowMinimum {
        /// Requested amount.
        amount: u64,
        /// Configured floor.
        min: u64,
    },

    /// The reserve's status or emergency flag forbids new redemptions.
    #[error("reserve {reserve} is not accepting redemptions: status {status}, emergency_paused {emergency_paused}")]
    RedemptionsNotAllowed {
        /// The gated reserve.
        reserve: ReserveId,
        /// Its lifecycle status.
        status: ReserveStatus,
        /// Whether the emergency hard stop is set.
        emergency_paused: bool,
    },

    /// The targeted wallet is not in Active status.
    #[error("wallet {address} is not active")]
    WalletNotActive {
        /// The targeted wallet.
        address: String,
    },

    /// The requester does not hold enough wrapped tokens.
    #[error("account {account} holds {balance} sats, needs {required}")]
    InsufficientTokenBalance {
        /// The requesting account.
        account: String,
        /// Its wrapped-token balance.
        balance: u64,
        /// The requested redemption amount.
        required: u64,
    },

    /// The reserve's minted figure cannot absorb this redemption.
    #[error("redemption of {requested} sats exceeds minted supply {minted} on reserve {reserve}")]
    ExceedsMintedSupply {
        /// The targeted reserve.
        reserve: ReserveId,
        /// Its minted figure.
        minted: u64,
        /// The requested amount.
        requested: u64,
    },

    /// Derived id already exists in the book.
    #[error("redemption id collision: {0}")]
    IdCollision(RedemptionId),

    /// No such redemption.
    #[error("redemption not found: {0}")]
    NotFound(RedemptionId),

    /// The redemption already left Pending; resolution is idempotent-safe
    /// but not repeatable.
    #[error("redemption {id} is {status}, not Pending")]
    NotPending {
        /// The targeted redemption.
        id: RedemptionId,
        /// Its resolved state.
        status: RedemptionStatus,
    },

    /// The payment proof did not verify against the stored request.
    #[error("payment proof rejected for redemption {0}")]
    InvalidProof(RedemptionId),

    /// Default flagging before the deadline.
    #[error("deadline {deadline} has not passed yet")]
    DeadlineNotPassed {
        /// The redemption's deadline.
        deadline: DateTime<Utc>,
    },

    /// The actor's authority class does not cover this operation.
    #[error("{authority} authority may not flag redemption defaults")]
    Unauthorized {
        /// The acting authority class.
        authority: Authority,
    },

    /// Deregistration on a wallet that is not pending it.
    #[error("wallet {address} is not pending deregistration")]
    WalletNotPendingDeregistration {
        /// The targeted wallet.
        address: String,
    },

    /// The wallet still carries unresolved obligations.
    #[error("wallet {address} still carries {count} active obligations")]
    ObligationsOutstanding {
        /// The targeted wallet.
        address: String,
        /// Pending obligation count.
        count: u64,
    },

    /// Deregistration requires a fresh oracle reading; this one was stale.
    #[error("oracle reading for reserve {0} is stale; deregistration refused")]
    StaleOracle(ReserveId),

    /// Removing the wallet would leave the reserve insolvent per the fresh
    /// reading.
    #[error("fresh backing {backing} sats does not cover minted {minted}")]
    InsolventReserve {
        /// The fresh oracle backing figure.
        backing: u64,
        /// The reserve's minted figure.
        minted: u64,
    },

    /// The token ledger or oracle call failed.
    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl CustodyEngine {
    /// Opens a redemption: burns `amount` wrapped sats from `requester`
    /// and records a Pending obligation on `wallet_address` to pay
    /// `user_btc_address` before the deadline. Returns the redemption id.
    pub fn initiate_redemption(
        &mut self,
        requester: &str,
        reserve_id: &str,
        wallet_address: &str,
        user_btc_address: &str,
        amount: u64,
    ) -> Result<RedemptionId, RedemptionError> {
        self.enter()?;
        let out = self.initiate_inner(requester, reserve_id, wallet_address, user_btc_address, amount);
        self.exit();
        out
    }

    fn initiate_inner(
        &mut self,
        requester: &str,
        reserve_id: &str,
        wallet_address: &str,
        user_btc_address: &str,
        amount: u64,
    ) -> Result<RedemptionId, RedemptionError> {
        let now = self.txn_now();
        validate_btc_address(user_btc_address)?;

        let min = self.params().min_redemption_sats;
        if amount < min {
            return Err(RedemptionError::BelowMinimum { amount, min });
        }

        let timeout = self.params().redemption_timeout();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        let accepting = matches!(
            reserve.status,
            ReserveStatus::Active | ReserveStatus::MintingPaused
        ) && !reserve.emergency_paused;
        if !accepting {
            return Err(RedemptionError::RedemptionsNotAllowed {
                reserve: reserve_id.to_string(),
                status: reserve.status,
                emergency_paused: reserve.emergency_paused,
            });
        }
        let wallet = reserve
            .wallets
            .get(wallet_address)
            .ok_or_else(|| LedgerError::WalletNotFound {
                reserve: reserve_id.to_string(),
                address: wallet_address.to_string(),
            })?;
        if wallet.status != WalletStatus::Active {
            return Err(RedemptionError::WalletNotActive {
                address: wallet_address.to_string(),
            });
        }
        if reserve.minted < amount {
            return Err(RedemptionError::ExceedsMintedSupply {
                reserve: reserve_id.to_string(),
                minted: reserve.minted,
                requested: amount,
            });
        }

        let balance = self.token_ledger().balance_of(requester);
        if balance < amount {
            return Err(RedemptionError::InsufficientTokenBalance {
                account: requester.to_string(),
                balance,
                required: amount,
            });
        }

        let nonce = self.state.redemption_nonce;
        let id = derive_redemption_id(requester, reserve_id, amount, nonce, now);
        if self.state.redemptions.contains_key(&id) {
            return Err(RedemptionError::IdCollision(id));
        }

        // Burn first: the tokens stop existing the moment the user commits.
        self.token_ledger().burn_from(requester, amount)?;
        self.state_mut().ledger.record_burn(reserve_id, amount)?;
        self.state.redemption_nonce += 1;

        let deadline = now + timeout;
        let redemption = Redemption {
            id: id.clone(),
            reserve: reserve_id.to_string(),
            wallet: wallet_address.to_string(),
            requester: requester.to_string(),
            amount,
            user_btc_address: user_btc_address.to_string(),
            requested_at: now,
            deadline,
            status: RedemptionStatus::Pending,
            resolved_at: None,
            default_reason: None,
        };
        self.state.redemptions.insert(id.clone(), redemption);

        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        reserve.active_redemptions += 1;
        if let Some(wallet) = reserve.wallets.get_mut(wallet_address) {
            wallet.add_obligation(&id);
        }

        tracing::info!(
            redemption = %id,
            reserve = reserve_id,
            wallet = wallet_address,
            amount,
            %deadline,
            "redemption opened"
        );
        self.emit(
            now,
            requester,
            EventKind::RedemptionRequested {
                id: id.clone(),
                reserve: reserve_id.to_string(),
                wallet: wallet_address.to_string(),
                amount,
                deadline,
            },
        );
        Ok(id)
    }

    /// Settles a Pending redemption with a Bitcoin payment proof. The
    /// proof is verified against the stored destination address and
    /// amount, never against caller-supplied values.
    pub fn record_redemption_fulfillment(
        &mut self,
        caller: &str,
        redemption_id: &str,
        tx_proof: &[u8],
    ) -> Result<(), RedemptionError> {
        self.enter()?;
        let out = self.fulfill_inner(caller, redemption_id, tx_proof);
        self.exit();
        out
    }

    fn fulfill_inner(
        &mut self,
        caller: &str,
        redemption_id: &str,
        tx_proof: &[u8],
    ) -> Result<(), RedemptionError> {
        let now = self.txn_now();
        let redemption = self
            .state
            .redemptions
            .get(redemption_id)
            .ok_or_else(|| RedemptionError::NotFound(redemption_id.to_string()))?;
        if redemption.status != RedemptionStatus::Pending {
            return Err(RedemptionError::NotPending {
                id: redemption_id.to_string(),
                status: redemption.status,
            });
        }

        let verified = self.proof_validator().verify(
            &redemption.user_btc_address,
            redemption.amount,
            tx_proof,
        );
        if !verified {
            tracing::warn!(redemption = redemption_id, "payment proof rejected");
            return Err(RedemptionError::InvalidProof(redemption_id.to_string()));
        }

        let (reserve_id, wallet_address) = {
            let r = self
                .state
                .redemptions
                .get_mut(redemption_id)
                .expect("checked above");
            r.status = RedemptionStatus::Fulfilled;
            r.resolved_at = Some(now);
            (r.reserve.clone(), r.wallet.clone())
        };
        self.settle_obligation(&reserve_id, &wallet_address)?;

        tracing::info!(redemption = redemption_id, reserve = %reserve_id, "redemption fulfilled");
        self.emit(
            now,
            caller,
            EventKind::RedemptionFulfilled {
                id: redemption_id.to_string(),
                reserve: reserve_id,
            },
        );
        Ok(())
    }

    /// Arbiter flags a Pending redemption whose deadline passed unpaid.
    /// The reserve takes the discipline curve: a first offense lands in
    /// UnderReview; defaulting while already paused or under review is
    /// terminal.
    pub fn flag_defaulted_redemption(
        &mut self,
        actor: &Actor,
        redemption_id: &str,
        reason: &str,
    ) -> Result<(), RedemptionError> {
        if actor.authority != Authority::Arbiter {
            return Err(RedemptionError::Unauthorized {
                authority: actor.authority,
            });
        }
        let now = self.txn_now();
        let redemption = self
            .state
            .redemptions
            .get(redemption_id)
            .ok_or_else(|| RedemptionError::NotFound(redemption_id.to_string()))?;
        if redemption.status != RedemptionStatus::Pending {
            return Err(RedemptionError::NotPending {
                id: redemption_id.to_string(),
                status: redemption.status,
            });
        }
        if now <= redemption.deadline {
            return Err(RedemptionError::DeadlineNotPassed {
                deadline: redemption.deadline,
            });
        }

        let (reserve_id, wallet_address) = {
            let r = self
                .state
                .redemptions
                .get_mut(redemption_id)
                .expect("checked above");
            r.status = RedemptionStatus::Defaulted;
            r.resolved_at = Some(now);
            r.default_reason = Some(reason.to_string());
            (r.reserve.clone(), r.wallet.clone())
        };
        self.settle_obligation(&reserve_id, &wallet_address)?;

        // Discipline curve.
        let status = self.state().ledger.reserve(&reserve_id)?.status;
        let target = match status {
            ReserveStatus::Active | ReserveStatus::MintingPaused => {
                Some(ReserveStatus::UnderReview)
            }
            ReserveStatus::Paused | ReserveStatus::UnderReview => Some(ReserveStatus::Revoked),
            ReserveStatus::Revoked => None,
        };
        if let Some(target) = target {
            self.force_transition(now, &actor.id, &reserve_id, target, "redemption default")
                .expect("discipline edge exists for every non-terminal status");
        }

        tracing::warn!(
            redemption = redemption_id,
            reserve = %reserve_id,
            reason,
            "redemption defaulted"
        );
        let actor_id = actor.id.clone();
        self.emit(
            now,
            &actor_id,
            EventKind::RedemptionDefaulted {
                id: redemption_id.to_string(),
                reserve: reserve_id,
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    /// Decrements the reserve and wallet obligation counters for a
    /// redemption leaving Pending.
    fn settle_obligation(
        &mut self,
        reserve_id: &str,
        wallet_address: &str,
    ) -> Result<(), RedemptionError> {
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        reserve.active_redemptions = reserve.active_redemptions.saturating_sub(1);
        if let Some(wallet) = reserve.wallets.get_mut(wallet_address) {
            wallet.settle_obligation();
        }
        Ok(())
    }

    // -- wallet deregistration ----------------------------------------------

    /// Marks a wallet as pending deregistration. New redemptions stop
    /// targeting it immediately; removal waits for outstanding
    /// obligations to clear.
    pub fn request_wallet_deregistration(
        &mut self,
        reserve_id: &str,
        wallet_address: &str,
    ) -> Result<(), RedemptionError> {
        let now = self.txn_now();
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        let wallet = reserve
            .wallets
            .get_mut(wallet_address)
            .ok_or_else(|| LedgerError::WalletNotFound {
                reserve: reserve_id.to_string(),
                address: wallet_address.to_string(),
            })?;
        if wallet.status != WalletStatus::Active {
            return Err(RedemptionError::WalletNotActive {
                address: wallet_address.to_string(),
            });
        }
        wallet.status = WalletStatus::PendingDeregistration;
        self.emit(
            now,
            reserve_id,
            EventKind::WalletDeregistrationRequested {
                reserve: reserve_id.to_string(),
                address: wallet_address.to_string(),
            },
        );
        Ok(())
    }

    /// Finalizes a wallet deregistration: requires zero outstanding
    /// obligations and a fresh oracle reading showing the reserve still
    /// solvent without the wallet. The reading is a probe — it does not
    /// consume the sync rate-limit slot.
    pub fn finalize_wallet_deregistration(
        &mut self,
        reserve_id: &str,
        wallet_address: &str,
    ) -> Result<(), RedemptionError> {
        self.enter()?;
        let out = self.finalize_dereg_inner(reserve_id, wallet_address);
        self.exit();
        out
    }

    fn finalize_dereg_inner(
        &mut self,
        reserve_id: &str,
        wallet_address: &str,
    ) -> Result<(), RedemptionError> {
        let now = self.txn_now();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        let wallet = reserve
            .wallets
            .get(wallet_address)
            .ok_or_else(|| LedgerError::WalletNotFound {
                reserve: reserve_id.to_string(),
                address: wallet_address.to_string(),
            })?;
        if wallet.status != WalletStatus::PendingDeregistration {
            return Err(RedemptionError::WalletNotPendingDeregistration {
                address: wallet_address.to_string(),
            });
        }
        if wallet.active_obligations > 0 {
            return Err(RedemptionError::ObligationsOutstanding {
                address: wallet_address.to_string(),
                count: wallet.active_obligations,
            });
        }
        let minted = reserve.minted;

        let (backing, stale) = self.oracle().balance_and_staleness(reserve_id)?;
        if stale {
            return Err(RedemptionError::StaleOracle(reserve_id.to_string()));
        }
        if backing < minted {
            return Err(RedemptionError::InsolventReserve { backing, minted });
        }

        self.state_mut().ledger.remove_wallet(reserve_id, wallet_address)?;
        tracing::info!(reserve = reserve_id, wallet = wallet_address, "wallet deregistered");
        self.emit(
            now,
            reserve_id,
            EventKind::WalletDeregistered {
                reserve: reserve_id.to_string(),
                address: wallet_address.to_string(),
            },
        );
        Ok(())
    }
}

/// Hex SHA-256 over the request's identifying fields plus the engine
/// nonce, so replicas replaying the same event order derive the same ids.
fn derive_redemption_id(
    requester: &str,
    reserve_id: &str,
    amount: u64,
    nonce: u64,
    now: DateTime<Utc>,
) -> RedemptionId {
    let mut hasher = Sha256::new();
    hasher.update(requester.as_bytes());
    hasher.update(b"|");
    hasher.update(reserve_id.as_bytes());
    hasher.update(b"|");
    hasher.update(amount.to_be_bytes());
    hasher.update(b"|");
    hasher.update(nonce.to_be_bytes());
    hasher.update(b"|");
    hasher.update(now.timestamp_millis().to_be_bytes());
    hex::encode(hasher.finalize())
}
