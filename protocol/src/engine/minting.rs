//! # Invariant Engine — Mint & Burn
//!
//! The only code path that grows the wrapped supply. Every mint clears the
//! full gate sequence before any write:
//!
//! ```text
//! status + emergency flag → amount range → backing covers minted+amount
//!   → per-reserve cap → global cap → token ledger call → accounting
//! ```
//!
//! Ordering matters: the cheap local checks run before the external token
//! ledger is touched, and ledger accounting is written only after the
//! external call succeeded, so the books never claim tokens that were
//! never issued. The reverse direction is protected too — a batch fallback
//! that fails partway records exactly the recipients that were credited.

use thiserror::Error;

use crate::events::EventKind;
use crate::external::DownstreamError;
use crate::ledger::{LedgerError, ReserveId, ReserveStatus};

use super::lifecycle::{Actor, Authority};
use super::{CustodyEngine, ReentrancyError};

/// Errors from mint/burn operations. Except where noted, state is
/// unchanged on error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MintError {
    /// Another externally-reaching operation is in flight.
    #[error(transparent)]
    Reentrancy(#[from] ReentrancyError),

    /// Reserve lookup or accounting failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The recipient account is empty.
    #[error("recipient account must not be empty")]
    EmptyRecipient,

    /// The reserve's status or emergency flag forbids minting.
    #[error("minting not allowed on reserve {reserve}: status {status}, emergency_paused {emergency_paused}")]
    MintingNotAllowed {
        /// The gated reserve.
        reserve: ReserveId,
        /// Its lifecycle status.
        status: ReserveStatus,
        /// Whether the emergency hard stop is set.
        emergency_paused: bool,
    },

    /// Amount below the dust floor.
    #[error("mint of {amount} sats is below the minimum of {min}")]
    BelowMinimum {
        /// Requested amount.
        amount: u64,
        /// Configured floor.
        min: u64,
    },

    /// Amount above the single-mint ceiling.
    #[error("mint of {amount} sats exceeds the single-mint maximum of {max}")]
    AboveMaximum {
        /// Requested amount.
        amount: u64,
        /// Configured ceiling.
        max: u64,
    },

    /// Attested backing would no longer cover the minted supply.
    #[error("backing {backing} sats cannot cover minted {minted} + requested {requested}")]
    InsufficientBacking {
        /// Attested backing.
        backing: u64,
        /// Currently minted against the reserve.
        minted: u64,
        /// The requested mint.
        requested: u64,
    },

    /// The per-reserve minting cap would be exceeded.
    #[error("minting cap {cap} sats would be exceeded: minted {minted} + requested {requested}")]
    ExceedsMintingCap {
        /// The reserve's cap.
        cap: u64,
        /// Currently minted against the reserve.
        minted: u64,
        /// The requested mint.
        requested: u64,
    },

    /// The protocol-wide cap would be exceeded.
    #[error("global cap {cap} sats would be exceeded: total {total_minted} + requested {requested}")]
    ExceedsGlobalCap {
        /// The configured global cap.
        cap: u64,
        /// Protocol-wide minted aggregate.
        total_minted: u64,
        /// The requested mint.
        requested: u64,
    },

    /// The reserve has less minted supply than the requested burn.
    #[error("burn of {requested} sats exceeds minted supply {minted} on reserve {reserve}")]
    BurnExceedsMinted {
        /// The targeted reserve.
        reserve: ReserveId,
        /// Its minted supply.
        minted: u64,
        /// The requested burn.
        requested: u64,
    },

    /// Batch with no entries.
    #[error("batch mint requires at least one recipient")]
    EmptyBatch,

    /// Batch total does not fit in `u64`.
    #[error("batch mint total overflows")]
    BatchTotalOverflow,

    /// The actor's authority class does not cover accounting adjustments.
    #[error("{authority} authority may not adjust minted accounting")]
    Unauthorized {
        /// The acting authority class.
        authority: Authority,
    },

    /// The external token ledger refused or failed the call. For a batch
    /// fallback this may follow partial issuance; the accounting reflects
    /// exactly what was credited.
    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl CustodyEngine {
    /// Mints `amount` sats of wrapped supply against `reserve_id`, crediting
    /// `recipient` on the token ledger.
    pub fn request_mint(
        &mut self,
        reserve_id: &str,
        recipient: &str,
        amount: u64,
    ) -> Result<(), MintError> {
        self.enter()?;
        let out = self.mint_inner(reserve_id, recipient, amount);
        self.exit();
        out
    }

    fn mint_inner(
        &mut self,
        reserve_id: &str,
        recipient: &str,
        amount: u64,
    ) -> Result<(), MintError> {
        let now = self.txn_now();
        if recipient.trim().is_empty() {
            return Err(MintError::EmptyRecipient);
        }

        let params = self.params().clone();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        if !reserve.minting_allowed() {
            return Err(MintError::MintingNotAllowed {
                reserve: reserve_id.to_string(),
                status: reserve.status,
                emergency_paused: reserve.emergency_paused,
            });
        }
        if amount < params.min_mint_sats {
            return Err(MintError::BelowMinimum {
                amount,
                min: params.min_mint_sats,
            });
        }
        if amount > params.max_single_mint_sats {
            return Err(MintError::AboveMaximum {
                amount,
                max: params.max_single_mint_sats,
            });
        }
        let total_minted = self.state().ledger.total_minted();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        Self::check_mint_gates(&params, total_minted, reserve, amount)?;

        // All checks passed; reach the token ledger, then account.
        self.token_ledger().increase_balance(recipient, amount)?;
        self.state_mut().ledger.record_mint(reserve_id, amount)?;

        tracing::info!(reserve = reserve_id, recipient, amount, "minted");
        self.emit(
            now,
            recipient,
            EventKind::Minted {
                reserve: reserve_id.to_string(),
                recipient: recipient.to_string(),
                amount,
            },
        );
        Ok(())
    }

    /// Burns `amount` sats of wrapped supply held by `account`, debiting
    /// `reserve_id`'s minted figure. Burns are allowed in every lifecycle
    /// status short of the books underflowing — reducing supply only ever
    /// improves the solvency ratio.
    pub fn request_burn(
        &mut self,
        reserve_id: &str,
        account: &str,
        amount: u64,
    ) -> Result<(), MintError> {
        self.enter()?;
        let out = self.burn_inner(reserve_id, account, amount);
        self.exit();
        out
    }

    fn burn_inner(
        &mut self,
        reserve_id: &str,
        account: &str,
        amount: u64,
    ) -> Result<(), MintError> {
        let now = self.txn_now();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        if reserve.minted < amount {
            return Err(MintError::BurnExceedsMinted {
                reserve: reserve_id.to_string(),
                minted: reserve.minted,
                requested: amount,
            });
        }

        self.token_ledger().burn_from(account, amount)?;
        self.state_mut().ledger.record_burn(reserve_id, amount)?;

        tracing::info!(reserve = reserve_id, account, amount, "burned");
        self.emit(
            now,
            account,
            EventKind::Burned {
                reserve: reserve_id.to_string(),
                account: account.to_string(),
                amount,
            },
        );
        Ok(())
    }

    /// Batch mint: one gate evaluation over the checked total, then a
    /// single token-ledger batch call, falling back to per-recipient
    /// transfers when the ledger does not support batches.
    pub fn request_mint_batch(
        &mut self,
        reserve_id: &str,
        recipients: &[(String, u64)],
    ) -> Result<(), MintError> {
        self.enter()?;
        let out = self.mint_batch_inner(reserve_id, recipients);
        self.exit();
        out
    }

    fn mint_batch_inner(
        &mut self,
        reserve_id: &str,
        recipients: &[(String, u64)],
    ) -> Result<(), MintError> {
        let now = self.txn_now();
        if recipients.is_empty() {
            return Err(MintError::EmptyBatch);
        }

        let params = self.params().clone();
        let mut total: u64 = 0;
        for (recipient, amount) in recipients {
            if recipient.trim().is_empty() {
                return Err(MintError::EmptyRecipient);
            }
            if *amount < params.min_mint_sats {
                return Err(MintError::BelowMinimum {
                    amount: *amount,
                    min: params.min_mint_sats,
                });
            }
            if *amount > params.max_single_mint_sats {
                return Err(MintError::AboveMaximum {
                    amount: *amount,
                    max: params.max_single_mint_sats,
                });
            }
            total = total
                .checked_add(*amount)
                .ok_or(MintError::BatchTotalOverflow)?;
        }

        let total_minted = self.state().ledger.total_minted();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        Self::check_mint_gates(&params, total_minted, reserve, total)?;

        match self.token_ledger().increase_balance_batch(recipients) {
            Ok(()) => {
                self.state_mut().ledger.record_mint(reserve_id, total)?;
            }
            Err(_) => {
                // Ledger has no batch support; issue per recipient. If a
                // transfer fails partway, account for what was actually
                // credited before surfacing the error — the books must
                // never understate issued supply.
                let mut credited: u64 = 0;
                for (recipient, amount) in recipients {
                    if let Err(err) = self.token_ledger().increase_balance(recipient, *amount) {
                        if credited > 0 {
                            self.state_mut().ledger.record_mint(reserve_id, credited)?;
                            self.emit(
                                now,
                                reserve_id,
                                EventKind::BatchMinted {
                                    reserve: reserve_id.to_string(),
                                    recipients: recipients.len(),
                                    total: credited,
                                },
                            );
                        }
                        tracing::warn!(
                            reserve = reserve_id,
                            recipient,
                            credited,
                            "batch mint fallback failed partway"
                        );
                        return Err(err.into());
                    }
                    credited += *amount;
                }
                self.state_mut().ledger.record_mint(reserve_id, total)?;
            }
        }

        tracing::info!(
            reserve = reserve_id,
            recipients = recipients.len(),
            total,
            "batch minted"
        );
        self.emit(
            now,
            reserve_id,
            EventKind::BatchMinted {
                reserve: reserve_id.to_string(),
                recipients: recipients.len(),
                total,
            },
        );
        Ok(())
    }

    /// Pure accounting credit: raises the reserve's minted figure with no
    /// token movement. Arbiter-only; used when migrating supply issued
    /// outside this engine. The full mint gate sequence still applies —
    /// an accounting credit is supply growth like any other.
    pub fn credit_minted(
        &mut self,
        actor: &Actor,
        reserve_id: &str,
        amount: u64,
    ) -> Result<(), MintError> {
        if actor.authority != Authority::Arbiter {
            return Err(MintError::Unauthorized {
                authority: actor.authority,
            });
        }
        let now = self.txn_now();
        let params = self.params().clone();
        let total_minted = self.state().ledger.total_minted();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        Self::check_mint_gates(&params, total_minted, reserve, amount)?;
        self.state_mut().ledger.record_mint(reserve_id, amount)?;
        let actor_id = actor.id.clone();
        self.emit(
            now,
            &actor_id,
            EventKind::MintedCredited {
                reserve: reserve_id.to_string(),
                amount,
            },
        );
        Ok(())
    }

    /// Pure accounting debit: lowers the reserve's minted figure with no
    /// token movement. Arbiter-only.
    pub fn debit_minted(
        &mut self,
        actor: &Actor,
        reserve_id: &str,
        amount: u64,
    ) -> Result<(), MintError> {
        if actor.authority != Authority::Arbiter {
            return Err(MintError::Unauthorized {
                authority: actor.authority,
            });
        }
        let now = self.txn_now();
        let reserve = self.state().ledger.reserve(reserve_id)?;
        if reserve.minted < amount {
            return Err(MintError::BurnExceedsMinted {
                reserve: reserve_id.to_string(),
                minted: reserve.minted,
                requested: amount,
            });
        }
        self.state_mut().ledger.record_burn(reserve_id, amount)?;
        let actor_id = actor.id.clone();
        self.emit(
            now,
            &actor_id,
            EventKind::MintedDebited {
                reserve: reserve_id.to_string(),
                amount,
            },
        );
        Ok(())
    }

    /// The shared gate sequence for single and batch mints, evaluated over
    /// the full requested amount.
    fn check_mint_gates(
        params: &crate::config::ProtocolParams,
        total_minted: u64,
        reserve: &crate::ledger::Reserve,
        amount: u64,
    ) -> Result<(), MintError> {
        if !reserve.minting_allowed() {
            return Err(MintError::MintingNotAllowed {
                reserve: reserve.address.clone(),
                status: reserve.status,
                emergency_paused: reserve.emergency_paused,
            });
        }
        let projected = reserve
            .minted
            .checked_add(amount)
            .ok_or_else(|| LedgerError::AccountingOverflow(reserve.address.clone()))?;
        if reserve.backing < projected {
            return Err(MintError::InsufficientBacking {
                backing: reserve.backing,
                minted: reserve.minted,
                requested: amount,
            });
        }
        if projected > reserve.minting_cap {
            return Err(MintError::ExceedsMintingCap {
                cap: reserve.minting_cap,
                minted: reserve.minted,
                requested: amount,
            });
        }
        if params.global_cap_sats > 0 {
            let projected_total = total_minted
                .checked_add(amount)
                .ok_or_else(|| LedgerError::AccountingOverflow(reserve.address.clone()))?;
            if projected_total > params.global_cap_sats {
                return Err(MintError::ExceedsGlobalCap {
                    cap: params.global_cap_sats,
                    total_minted,
                    requested: amount,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolParams;
    use crate::external::{
        DevProofValidator, FixedOracle, InMemoryTokenLedger, ManualClock, TokenLedger,
    };
    use chrono::TimeZone;
    use std::sync::Arc;

    const QC: &str = "qc-alpha";
    const CAP: u64 = 1_000_000_000; // 10 BTC

    fn arbiter() -> Actor {
        Actor::arbiter("gov-multisig")
    }

    fn setup() -> (CustodyEngine, Arc<FixedOracle>, Arc<InMemoryTokenLedger>) {
        let oracle = FixedOracle::new();
        let tokens = InMemoryTokenLedger::new();
        let clock = ManualClock::new(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let mut engine = CustodyEngine::new(
            ProtocolParams::default(),
            oracle.clone(),
            tokens.clone(),
            Arc::new(DevProofValidator),
            clock,
        );
        engine.register_reserve(&arbiter(), QC, CAP).unwrap();
        (engine, oracle, tokens)
    }

    /// Engine with a reserve whose attested backing is already synced.
    fn setup_backed(backing: u64) -> (CustodyEngine, Arc<FixedOracle>, Arc<InMemoryTokenLedger>) {
        let (mut engine, oracle, tokens) = setup();
        oracle.set(QC, backing, false);
        engine.sync_backing_from_oracle("syncer", QC).unwrap();
        (engine, oracle, tokens)
    }

    #[test]
    fn mint_credits_recipient_and_books() {
        let (mut engine, _, tokens) = setup_backed(500_000_000);
        engine.request_mint(QC, "alice", 100_000_000).unwrap();

        assert_eq!(tokens.balance_of("alice"), 100_000_000);
        let r = engine.reserve(QC).unwrap();
        assert_eq!(r.minted, 100_000_000);
        assert_eq!(engine.state().ledger.total_minted(), 100_000_000);
    }

    #[test]
    fn mint_refused_without_backing() {
        let (mut engine, _, tokens) = setup();
        let err = engine.request_mint(QC, "alice", 100_000).unwrap_err();
        assert!(matches!(err, MintError::InsufficientBacking { .. }));
        // External ledger untouched on refusal.
        assert_eq!(tokens.balance_of("alice"), 0);
    }

    #[test]
    fn mint_exactly_at_backing_boundary_succeeds() {
        let (mut engine, _, _) = setup_backed(100_000_000);
        engine.request_mint(QC, "alice", 100_000_000).unwrap();
        let err = engine.request_mint(QC, "alice", 10_000).unwrap_err();
        assert!(matches!(err, MintError::InsufficientBacking { .. }));
    }

    #[test]
    fn dust_and_whale_amounts_refused() {
        let (mut engine, _, _) = setup_backed(50_000 * crate::config::SATS_PER_BTC);
        assert!(matches!(
            engine.request_mint(QC, "alice", 9_999),
            Err(MintError::BelowMinimum { .. })
        ));
        assert!(matches!(
            engine.request_mint(QC, "alice", 101 * crate::config::SATS_PER_BTC),
            Err(MintError::AboveMaximum { .. })
        ));
    }

    #[test]
    fn per_reserve_cap_enforced() {
        // Backing far above the cap; the cap must still bind.
        let (mut engine, _, _) = setup_backed(50 * crate::config::SATS_PER_BTC);
        engine.request_mint(QC, "alice", CAP).unwrap();
        let err = engine.request_mint(QC, "bob", 10_000).unwrap_err();
        assert!(matches!(err, MintError::ExceedsMintingCap { .. }));
    }

    #[test]
    fn global_cap_binds_across_reserves() {
        let (mut engine, oracle, _) = setup_backed(5 * crate::config::SATS_PER_BTC);
        engine.state_mut().params.global_cap_sats = 300_000_000;

        engine.register_reserve(&arbiter(), "qc-beta", CAP).unwrap();
        oracle.set("qc-beta", 5 * crate::config::SATS_PER_BTC, false);
        engine.sync_backing_from_oracle("syncer", "qc-beta").unwrap();

        engine.request_mint(QC, "alice", 200_000_000).unwrap();
        let err = engine
            .request_mint("qc-beta", "bob", 150_000_000)
            .unwrap_err();
        assert!(matches!(err, MintError::ExceedsGlobalCap { .. }));
        engine.request_mint("qc-beta", "bob", 100_000_000).unwrap();
    }

    #[test]
    fn status_gates_minting() {
        let (mut engine, _, _) = setup_backed(500_000_000);
        engine
            .set_status(&arbiter(), QC, crate::ledger::ReserveStatus::MintingPaused, "ops")
            .unwrap();
        let err = engine.request_mint(QC, "alice", 100_000).unwrap_err();
        assert!(matches!(err, MintError::MintingNotAllowed { .. }));
    }

    #[test]
    fn burn_reduces_both_accounting_levels() {
        let (mut engine, _, tokens) = setup_backed(500_000_000);
        engine.request_mint(QC, "alice", 200_000_000).unwrap();
        engine.request_burn(QC, "alice", 50_000_000).unwrap();

        assert_eq!(tokens.balance_of("alice"), 150_000_000);
        assert_eq!(engine.reserve(QC).unwrap().minted, 150_000_000);
        assert_eq!(engine.state().ledger.total_minted(), 150_000_000);
    }

    #[test]
    fn burn_beyond_minted_refused_before_touching_tokens() {
        let (mut engine, _, tokens) = setup_backed(500_000_000);
        engine.request_mint(QC, "alice", 100_000).unwrap();
        let err = engine.request_burn(QC, "alice", 200_000).unwrap_err();
        assert!(matches!(err, MintError::BurnExceedsMinted { .. }));
        assert_eq!(tokens.balance_of("alice"), 100_000);
    }

    #[test]
    fn batch_mint_single_gate_over_total() {
        let (mut engine, _, tokens) = setup_backed(300_000);
        let batch = vec![
            ("alice".to_string(), 100_000),
            ("bob".to_string(), 100_000),
            ("carol".to_string(), 150_000),
        ];
        // Total 350k exceeds backing 300k even though each entry fits.
        let err = engine.request_mint_batch(QC, &batch).unwrap_err();
        assert!(matches!(err, MintError::InsufficientBacking { .. }));
        assert_eq!(tokens.balance_of("alice"), 0);

        let batch = vec![
            ("alice".to_string(), 100_000),
            ("bob".to_string(), 100_000),
        ];
        engine.request_mint_batch(QC, &batch).unwrap();
        assert_eq!(tokens.balance_of("bob"), 100_000);
        assert_eq!(engine.reserve(QC).unwrap().minted, 200_000);
    }

    #[test]
    fn batch_mint_falls_back_per_recipient() {
        let (mut engine, _, tokens) = setup_backed(500_000);
        tokens.set_batch_supported(false);

        let batch = vec![
            ("alice".to_string(), 100_000),
            ("bob".to_string(), 200_000),
        ];
        engine.request_mint_batch(QC, &batch).unwrap();
        assert_eq!(tokens.balance_of("alice"), 100_000);
        assert_eq!(tokens.balance_of("bob"), 200_000);
        assert_eq!(engine.reserve(QC).unwrap().minted, 300_000);
    }

    #[test]
    fn empty_batch_refused() {
        let (mut engine, _, _) = setup_backed(500_000);
        assert!(matches!(
            engine.request_mint_batch(QC, &[]),
            Err(MintError::EmptyBatch)
        ));
    }

    #[test]
    fn accounting_adjustments_are_arbiter_only() {
        let (mut engine, _, _) = setup_backed(500_000);
        let bot = Actor::enforcer("watchdog-7");
        assert!(matches!(
            engine.credit_minted(&bot, QC, 100_000),
            Err(MintError::Unauthorized { .. })
        ));

        engine.credit_minted(&arbiter(), QC, 100_000).unwrap();
        assert_eq!(engine.reserve(QC).unwrap().minted, 100_000);
        engine.debit_minted(&arbiter(), QC, 40_000).unwrap();
        assert_eq!(engine.reserve(QC).unwrap().minted, 60_000);
        assert_eq!(engine.state().ledger.total_minted(), 60_000);
    }

    #[test]
    fn credit_minted_still_honors_backing() {
        let (mut engine, _, _) = setup_backed(100_000);
        let err = engine.credit_minted(&arbiter(), QC, 100_001).unwrap_err();
        assert!(matches!(err, MintError::InsufficientBacking { .. }));
    }

    #[test]
    fn credit_minted_respects_minting_cap() {
        // Backing far above the cap: the cap must still bind an arbiter
        // credit, same as a regular mint.
        let (mut engine, _, _) = setup_backed(50 * crate::config::SATS_PER_BTC);
        engine.set_minting_cap(&arbiter(), QC, 100_000_000).unwrap();

        let err = engine.credit_minted(&arbiter(), QC, 500_000_000).unwrap_err();
        assert!(matches!(err, MintError::ExceedsMintingCap { .. }));
        assert_eq!(engine.reserve(QC).unwrap().minted, 0);

        engine.credit_minted(&arbiter(), QC, 100_000_000).unwrap();
        assert_eq!(engine.reserve(QC).unwrap().minted, 100_000_000);
    }

    #[test]
    fn credit_minted_respects_global_cap() {
        let (mut engine, _, _) = setup_backed(5 * crate::config::SATS_PER_BTC);
        engine.set_global_cap(&arbiter(), 100_000_000).unwrap();

        engine.credit_minted(&arbiter(), QC, 80_000_000).unwrap();
        let err = engine.credit_minted(&arbiter(), QC, 30_000_000).unwrap_err();
        assert!(matches!(err, MintError::ExceedsGlobalCap { .. }));
        assert_eq!(engine.state().ledger.total_minted(), 80_000_000);
    }
}
