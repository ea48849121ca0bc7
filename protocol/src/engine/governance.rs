//! # Governance Surface
//!
//! Registration, caps, emergency-pause clearing, and backlog tooling.
//! Everything here except wallet registration is arbiter-gated; wallet
//! registration is custodian-initiated but SPV-proof-gated, which is a
//! stronger check than identity.

use thiserror::Error;

use crate::events::EventKind;
use crate::ledger::{validate_btc_address, BtcAddressError, LedgerError, Reserve, ReserveId, Wallet};

use super::lifecycle::{Actor, Authority};
use super::redemption::RedemptionStatus;
use super::{CustodyEngine, ReentrancyError};
use chrono::{DateTime, Utc};

/// Errors from governance operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GovernanceError {
    /// Another externally-reaching operation is in flight.
    #[error(transparent)]
    Reentrancy(#[from] ReentrancyError),

    /// Reserve or wallet bookkeeping failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The actor's authority class does not cover this operation.
    #[error("{authority} authority may not perform governance operations")]
    Unauthorized {
        /// The acting authority class.
        authority: Authority,
    },

    /// Empty reserve address.
    #[error("reserve address must not be empty")]
    EmptyReserveAddress,

    /// The reserve is terminally revoked.
    #[error("reserve {0} is revoked")]
    ReserveRevoked(ReserveId),

    /// Lowering a cap below what is already minted would fabricate a
    /// violation out of thin air.
    #[error("cap of {cap} sats is below the {minted} already minted")]
    CapBelowMinted {
        /// The refused cap.
        cap: u64,
        /// The reserve's minted figure.
        minted: u64,
    },

    /// A nonzero global cap below the protocol-wide minted aggregate.
    #[error("global cap of {cap} sats is below the {total_minted} already minted")]
    GlobalCapBelowTotal {
        /// The refused cap.
        cap: u64,
        /// Protocol-wide minted aggregate.
        total_minted: u64,
    },

    /// The wallet address is malformed.
    #[error("invalid wallet address: {0}")]
    InvalidAddress(#[from] BtcAddressError),

    /// The SPV control proof did not verify.
    #[error("control proof rejected for wallet {address}")]
    ControlProofRejected {
        /// The wallet whose proof failed.
        address: String,
    },

    /// Clearing an emergency pause that is not set.
    #[error("reserve {0} is not emergency paused")]
    NotEmergencyPaused(ReserveId),
}

impl CustodyEngine {
    /// Registers a new reserve. Starts Active with zero backing and
    /// minted; the first oracle sync supplies the backing figure.
    pub fn register_reserve(
        &mut self,
        actor: &Actor,
        address: &str,
        minting_cap: u64,
    ) -> Result<(), GovernanceError> {
        if actor.authority != Authority::Arbiter {
            return Err(GovernanceError::Unauthorized {
                authority: actor.authority,
            });
        }
        if address.trim().is_empty() {
            return Err(GovernanceError::EmptyReserveAddress);
        }
        let now = self.txn_now();
        self.state_mut()
            .ledger
            .insert_reserve(Reserve::new(address.to_string(), minting_cap, now))?;

        tracing::info!(reserve = address, minting_cap, "reserve registered");
        let actor_id = actor.id.clone();
        self.emit(
            now,
            &actor_id,
            EventKind::ReserveRegistered {
                reserve: address.to_string(),
                minting_cap,
            },
        );
        Ok(())
    }

    /// Updates a reserve's minting cap. Never below what is already
    /// minted — a cap change must not retroactively create a violation.
    pub fn set_minting_cap(
        &mut self,
        actor: &Actor,
        reserve_id: &str,
        new_cap: u64,
    ) -> Result<(), GovernanceError> {
        if actor.authority != Authority::Arbiter {
            return Err(GovernanceError::Unauthorized {
                authority: actor.authority,
            });
        }
        let now = self.txn_now();
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        if reserve.status.is_terminal() {
            return Err(GovernanceError::ReserveRevoked(reserve_id.to_string()));
        }
        if new_cap < reserve.minted {
            return Err(GovernanceError::CapBelowMinted {
                cap: new_cap,
                minted: reserve.minted,
            });
        }
        let old = reserve.minting_cap;
        reserve.minting_cap = new_cap;

        let actor_id = actor.id.clone();
        self.emit(
            now,
            &actor_id,
            EventKind::MintingCapUpdated {
                reserve: reserve_id.to_string(),
                old,
                new: new_cap,
            },
        );
        Ok(())
    }

    /// Updates the protocol-wide cap. Zero disables it; a nonzero cap
    /// must cover the supply already minted.
    pub fn set_global_cap(&mut self, actor: &Actor, new_cap: u64) -> Result<(), GovernanceError> {
        if actor.authority != Authority::Arbiter {
            return Err(GovernanceError::Unauthorized {
                authority: actor.authority,
            });
        }
        let now = self.txn_now();
        let total_minted = self.state().ledger.total_minted();
        if new_cap > 0 && new_cap < total_minted {
            return Err(GovernanceError::GlobalCapBelowTotal {
                cap: new_cap,
                total_minted,
            });
        }
        let old = self.state().params.global_cap_sats;
        self.state_mut().params.global_cap_sats = new_cap;

        let actor_id = actor.id.clone();
        self.emit(now, &actor_id, EventKind::GlobalCapUpdated { old, new: new_cap });
        Ok(())
    }

    /// Registers a reserve wallet. The custodian proves control of the
    /// address with an SPV payment proof over at least the configured
    /// minimum amount; the address binds 1:1 across all reserves.
    pub fn register_wallet(
        &mut self,
        reserve_id: &str,
        btc_address: &str,
        control_proof: &[u8],
    ) -> Result<(), GovernanceError> {
        self.enter()?;
        let out = self.register_wallet_inner(reserve_id, btc_address, control_proof);
        self.exit();
        out
    }

    fn register_wallet_inner(
        &mut self,
        reserve_id: &str,
        btc_address: &str,
        control_proof: &[u8],
    ) -> Result<(), GovernanceError> {
        let now = self.txn_now();
        validate_btc_address(btc_address)?;

        let reserve = self.state().ledger.reserve(reserve_id)?;
        if reserve.status.is_terminal() {
            return Err(GovernanceError::ReserveRevoked(reserve_id.to_string()));
        }

        let min_proof_sats = self.params().wallet_control_proof_min_sats;
        if !self
            .proof_validator()
            .verify(btc_address, min_proof_sats, control_proof)
        {
            return Err(GovernanceError::ControlProofRejected {
                address: btc_address.to_string(),
            });
        }

        self.state_mut()
            .ledger
            .add_wallet(reserve_id, Wallet::new(btc_address.to_string(), now))?;

        tracing::info!(reserve = reserve_id, wallet = btc_address, "wallet registered");
        self.emit(
            now,
            reserve_id,
            EventKind::WalletRegistered {
                reserve: reserve_id.to_string(),
                address: btc_address.to_string(),
            },
        );
        Ok(())
    }

    /// Clears a reserve's emergency pause. Arbiter-only: the flag is set
    /// by automation but only human judgment removes it.
    pub fn clear_emergency_pause(
        &mut self,
        actor: &Actor,
        reserve_id: &str,
    ) -> Result<(), GovernanceError> {
        if actor.authority != Authority::Arbiter {
            return Err(GovernanceError::Unauthorized {
                authority: actor.authority,
            });
        }
        let now = self.txn_now();
        let reserve = self.state_mut().ledger.reserve_mut(reserve_id)?;
        if !reserve.emergency_paused {
            return Err(GovernanceError::NotEmergencyPaused(reserve_id.to_string()));
        }
        reserve.emergency_paused = false;

        tracing::info!(reserve = reserve_id, actor = %actor.id, "emergency pause cleared");
        let actor_id = actor.id.clone();
        self.emit(
            now,
            &actor_id,
            EventKind::EmergencyPauseCleared {
                reserve: reserve_id.to_string(),
            },
        );
        Ok(())
    }

    /// Removes Fulfilled/Defaulted redemption records resolved before
    /// `cutoff` from the working set. The audit trail keeps their events;
    /// this only trims the live book. Returns the number removed.
    pub fn prune_settled_redemptions(
        &mut self,
        actor: &Actor,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, GovernanceError> {
        if actor.authority != Authority::Arbiter {
            return Err(GovernanceError::Unauthorized {
                authority: actor.authority,
            });
        }
        let now = self.txn_now();
        let before = self.state.redemptions.len();
        self.state.redemptions.retain(|_, r| {
            r.status == RedemptionStatus::Pending
                || r.resolved_at.map_or(true, |resolved| resolved >= cutoff)
        });
        let removed = before - self.state.redemptions.len();

        if removed > 0 {
            tracing::info!(removed, %cutoff, "settled redemptions pruned");
            let actor_id = actor.id.clone();
            self.emit(now, &actor_id, EventKind::RedemptionsPruned { removed });
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolParams;
    use crate::external::{DevProofValidator, FixedOracle, InMemoryTokenLedger, ManualClock};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    const QC: &str = "qc-alpha";
    const WALLET: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

    fn arbiter() -> Actor {
        Actor::arbiter("gov-multisig")
    }

    fn setup() -> (CustodyEngine, Arc<FixedOracle>, Arc<ManualClock>) {
        let oracle = FixedOracle::new();
        let clock = ManualClock::new(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let mut engine = CustodyEngine::new(
            ProtocolParams::default(),
            oracle.clone(),
            InMemoryTokenLedger::new(),
            Arc::new(DevProofValidator),
            clock.clone(),
        );
        engine
            .register_reserve(&arbiter(), QC, 1_000_000_000)
            .unwrap();
        (engine, oracle, clock)
    }

    #[test]
    fn registration_is_arbiter_only_and_unique() {
        let (mut engine, _, _) = setup();
        let bot = Actor::enforcer("watchdog-7");
        assert!(matches!(
            engine.register_reserve(&bot, "qc-beta", 0),
            Err(GovernanceError::Unauthorized { .. })
        ));
        assert!(matches!(
            engine.register_reserve(&arbiter(), QC, 0),
            Err(GovernanceError::Ledger(LedgerError::ReserveAlreadyRegistered(_)))
        ));
        assert!(matches!(
            engine.register_reserve(&arbiter(), "  ", 0),
            Err(GovernanceError::EmptyReserveAddress)
        ));
    }

    #[test]
    fn cap_cannot_drop_below_minted() {
        let (mut engine, oracle, _) = setup();
        oracle.set(QC, 500_000_000, false);
        engine.sync_backing_from_oracle("syncer", QC).unwrap();
        engine.request_mint(QC, "alice", 100_000_000).unwrap();

        let err = engine
            .set_minting_cap(&arbiter(), QC, 99_999_999)
            .unwrap_err();
        assert!(matches!(err, GovernanceError::CapBelowMinted { .. }));

        engine.set_minting_cap(&arbiter(), QC, 100_000_000).unwrap();
        assert_eq!(engine.reserve(QC).unwrap().minting_cap, 100_000_000);
    }

    #[test]
    fn global_cap_zero_disables() {
        let (mut engine, oracle, _) = setup();
        oracle.set(QC, 500_000_000, false);
        engine.sync_backing_from_oracle("syncer", QC).unwrap();
        engine.request_mint(QC, "alice", 100_000_000).unwrap();

        let err = engine.set_global_cap(&arbiter(), 50_000_000).unwrap_err();
        assert!(matches!(err, GovernanceError::GlobalCapBelowTotal { .. }));

        engine.set_global_cap(&arbiter(), 0).unwrap();
        assert_eq!(engine.params().global_cap_sats, 0);
    }

    #[test]
    fn wallet_registration_requires_a_control_proof() {
        let (mut engine, _, _) = setup();
        let err = engine.register_wallet(QC, WALLET, b"").unwrap_err();
        assert!(matches!(err, GovernanceError::ControlProofRejected { .. }));

        engine.register_wallet(QC, WALLET, b"spv-proof").unwrap();
        assert!(engine.reserve(QC).unwrap().wallets.contains_key(WALLET));

        // 1:1 binding holds across reserves.
        engine.register_reserve(&arbiter(), "qc-beta", 0).unwrap();
        let err = engine
            .register_wallet("qc-beta", WALLET, b"spv-proof")
            .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Ledger(LedgerError::WalletAlreadyRegistered { .. })
        ));
    }

    #[test]
    fn emergency_pause_clearing_is_arbiter_only() {
        let (mut engine, _, _) = setup();
        assert!(matches!(
            engine.clear_emergency_pause(&arbiter(), QC),
            Err(GovernanceError::NotEmergencyPaused(_))
        ));

        engine.state_mut().ledger.reserve_mut(QC).unwrap().emergency_paused = true;
        let bot = Actor::enforcer("watchdog-7");
        assert!(matches!(
            engine.clear_emergency_pause(&bot, QC),
            Err(GovernanceError::Unauthorized { .. })
        ));

        engine.clear_emergency_pause(&arbiter(), QC).unwrap();
        assert!(!engine.reserve(QC).unwrap().emergency_paused);
    }

    #[test]
    fn pruning_removes_only_old_settled_records() {
        let (mut engine, oracle, clock) = setup();
        oracle.set(QC, 5_000_000_000, false);
        engine.sync_backing_from_oracle("syncer", QC).unwrap();
        engine.register_wallet(QC, WALLET, b"spv-proof").unwrap();
        engine.request_mint(QC, "alice", 900_000_000).unwrap();

        let user_btc = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        let fulfilled = engine
            .initiate_redemption("alice", QC, WALLET, user_btc, 50_000_000)
            .unwrap();
        let pending = engine
            .initiate_redemption("alice", QC, WALLET, user_btc, 50_000_000)
            .unwrap();
        engine
            .record_redemption_fulfillment("ops", &fulfilled, b"btc-tx-proof")
            .unwrap();

        clock.advance(Duration::days(30));
        let cutoff = engine.state().ledger.reserve(QC).unwrap().registered_at + Duration::days(7);
        let removed = engine.prune_settled_redemptions(&arbiter(), cutoff).unwrap();
        assert_eq!(removed, 1);
        assert!(engine.redemption(&fulfilled).is_none());
        assert!(engine.redemption(&pending).is_some(), "pending survives any cutoff");
    }
}
