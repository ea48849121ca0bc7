//! Lifecycle integration tests for the BASALT custody core.
//!
//! Covers the QC state machine under real operation sequences: redemption
//! defaults walking the discipline curve, the self-pause credit economy
//! and its permissionless escalation, wallet obligation gating, and the
//! audit trail the whole ride leaves behind.
//!
//! Each test stands alone with its own engine, oracle, and manual clock.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use basalt_protocol::config::{ProtocolParams, SATS_PER_BTC};
use basalt_protocol::external::{
    DevProofValidator, FixedOracle, InMemoryTokenLedger, ManualClock,
};
use basalt_protocol::{
    Actor, CustodyEngine, EventKind, LifecycleError, RedemptionError, RedemptionStatus,
    ReserveStatus, SelfPauseTarget, WalletStatus,
};

const QC: &str = "qc-alpha";
const WALLET: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
const USER_BTC: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn arbiter() -> Actor {
    Actor::arbiter("gov-multisig")
}

/// Engine with one reserve, attested backing, a registered wallet, and a
/// funded user account — ready to mint and redeem.
fn setup() -> (CustodyEngine, Arc<FixedOracle>, Arc<ManualClock>) {
    let oracle = FixedOracle::new();
    let tokens = InMemoryTokenLedger::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    let mut engine = CustodyEngine::new(
        ProtocolParams::default(),
        oracle.clone(),
        tokens,
        Arc::new(DevProofValidator),
        clock.clone(),
    );
    engine
        .register_reserve(&arbiter(), QC, 100 * SATS_PER_BTC)
        .unwrap();
    oracle.set(QC, 10 * SATS_PER_BTC, false);
    engine.sync_backing_from_oracle("syncer", QC).unwrap();
    engine.register_wallet(QC, WALLET, b"spv-proof").unwrap();
    engine.request_mint(QC, "alice", 2 * SATS_PER_BTC).unwrap();
    (engine, oracle, clock)
}

fn open_redemption(engine: &mut CustodyEngine, amount: u64) -> String {
    engine
        .initiate_redemption("alice", QC, WALLET, USER_BTC, amount)
        .unwrap()
}

// ---------------------------------------------------------------------------
// 1. Redemption default discipline (Scenario B)
// ---------------------------------------------------------------------------

#[test]
fn default_discipline_escalates_review_then_revocation() {
    let (mut engine, _, clock) = setup();
    let first = open_redemption(&mut engine, 10_000_000);
    let second = open_redemption(&mut engine, 10_000_000);

    clock.advance(Duration::hours(49));

    // First default while Active: UnderReview.
    engine
        .flag_defaulted_redemption(&arbiter(), &first, "no payment observed")
        .unwrap();
    assert_eq!(engine.reserve(QC).unwrap().status, ReserveStatus::UnderReview);
    assert_eq!(
        engine.redemption(&first).unwrap().status,
        RedemptionStatus::Defaulted
    );

    // Second default while UnderReview: terminal.
    engine
        .flag_defaulted_redemption(&arbiter(), &second, "still nothing")
        .unwrap();
    assert_eq!(engine.reserve(QC).unwrap().status, ReserveStatus::Revoked);

    // No path back, for anyone.
    let err = engine
        .set_status(&arbiter(), QC, ReserveStatus::Active, "plead")
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
}

#[test]
fn fulfillment_on_time_leaves_the_reserve_untouched() {
    let (mut engine, _, clock) = setup();
    let id = open_redemption(&mut engine, 10_000_000);

    clock.advance(Duration::hours(24));
    engine
        .record_redemption_fulfillment("ops", &id, b"btc-tx-proof")
        .unwrap();

    let r = engine.reserve(QC).unwrap();
    assert_eq!(r.status, ReserveStatus::Active);
    assert_eq!(r.active_redemptions, 0);
}

// ---------------------------------------------------------------------------
// 2. Self-pause economy (Scenario C)
// ---------------------------------------------------------------------------

#[test]
fn expired_self_pause_is_escalated_not_resumed() {
    let (mut engine, _, clock) = setup();
    engine.grant_pause_credit(&arbiter(), QC).unwrap();
    engine
        .self_pause(QC, SelfPauseTarget::Paused, "hsm maintenance")
        .unwrap();

    let r = engine.reserve(QC).unwrap();
    assert!(!r.pause_credit.has_credit);
    assert_eq!(r.status, ReserveStatus::Paused);

    // t = 49h: the custodian slept through the window.
    clock.advance(Duration::hours(49));
    assert!(matches!(
        engine.resume_self_pause(QC),
        Err(LifecycleError::SelfPauseExpired { .. })
    ));

    // Any second actor can escalate: Paused → UnderReview.
    engine.escalate_expired_self_pause("watchdog-9", QC).unwrap();
    let r = engine.reserve(QC).unwrap();
    assert_eq!(r.status, ReserveStatus::UnderReview);
    assert!(!r.pause_credit.is_paused);
}

#[test]
fn self_pause_cannot_dodge_an_imminent_redemption() {
    let (mut engine, _, _) = setup();
    engine.grant_pause_credit(&arbiter(), QC).unwrap();

    // Deadline at t+48h sits inside the 48h window + 12h buffer.
    let id = open_redemption(&mut engine, 10_000_000);
    let err = engine
        .self_pause(QC, SelfPauseTarget::Paused, "convenient timing")
        .unwrap_err();
    match err {
        LifecycleError::ImminentObligation { redemption_id, .. } => {
            assert_eq!(redemption_id, id);
        }
        other => panic!("expected ImminentObligation, got {other:?}"),
    }

    // The credit was not consumed by the refused attempt.
    assert!(engine.reserve(QC).unwrap().pause_credit.has_credit);

    // Settle the obligation; the pause now goes through.
    engine
        .record_redemption_fulfillment("ops", &id, b"btc-tx-proof")
        .unwrap();
    engine
        .self_pause(QC, SelfPauseTarget::Paused, "hsm maintenance")
        .unwrap();
    assert_eq!(engine.reserve(QC).unwrap().status, ReserveStatus::Paused);
}

#[test]
fn credit_lifecycle_grant_consume_renew() {
    let (mut engine, _, clock) = setup();
    engine.grant_pause_credit(&arbiter(), QC).unwrap();
    engine
        .self_pause(QC, SelfPauseTarget::MintingPaused, "key rotation")
        .unwrap();
    engine.resume_self_pause(QC).unwrap();

    // Consumed: a second pause is refused until renewal.
    assert!(matches!(
        engine.self_pause(QC, SelfPauseTarget::Paused, "again"),
        Err(LifecycleError::NoPauseCredit { .. })
    ));

    clock.advance(Duration::days(90));
    engine.renew_pause_credit(QC).unwrap();
    engine
        .self_pause(QC, SelfPauseTarget::Paused, "quarterly audit")
        .unwrap();
    assert_eq!(engine.reserve(QC).unwrap().status, ReserveStatus::Paused);
}

// ---------------------------------------------------------------------------
// 3. Wallet obligation gating (WOTS)
// ---------------------------------------------------------------------------

#[test]
fn wallet_cannot_leave_while_it_owes_redemptions() {
    let (mut engine, _, _) = setup();
    let id = open_redemption(&mut engine, 10_000_000);

    engine.request_wallet_deregistration(QC, WALLET).unwrap();
    assert_eq!(
        engine.reserve(QC).unwrap().wallets[WALLET].status,
        WalletStatus::PendingDeregistration
    );

    // Blocked while the obligation is open.
    assert!(matches!(
        engine.finalize_wallet_deregistration(QC, WALLET),
        Err(RedemptionError::ObligationsOutstanding { .. })
    ));

    engine
        .record_redemption_fulfillment("ops", &id, b"btc-tx-proof")
        .unwrap();
    engine.finalize_wallet_deregistration(QC, WALLET).unwrap();
    assert!(engine.reserve(QC).unwrap().wallets.is_empty());

    // The address is free to bind again, to any reserve.
    engine.register_wallet(QC, WALLET, b"spv-proof").unwrap();
}

// ---------------------------------------------------------------------------
// 4. Audit trail
// ---------------------------------------------------------------------------

#[test]
fn the_trail_records_the_whole_ride() {
    let (mut engine, _, clock) = setup();
    let id = open_redemption(&mut engine, 10_000_000);
    clock.advance(Duration::hours(49));
    engine
        .flag_defaulted_redemption(&arbiter(), &id, "unpaid")
        .unwrap();

    let kinds: Vec<&EventKind> = engine.events().all().iter().map(|e| &e.kind).collect();
    assert!(kinds.iter().any(|k| matches!(k, EventKind::ReserveRegistered { .. })));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::OracleSynced { .. })));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::WalletRegistered { .. })));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::Minted { .. })));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::RedemptionRequested { .. })));
    assert!(kinds.iter().any(|k| matches!(
        k,
        EventKind::StatusChanged { new: ReserveStatus::UnderReview, .. }
    )));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::RedemptionDefaulted { .. })));

    // Sequence numbers are strictly increasing; the cursor works.
    let seqs: Vec<u64> = engine.events().all().iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    let tail = engine.events().since(seqs[seqs.len() - 2]);
    assert_eq!(tail.len(), 2);
}
