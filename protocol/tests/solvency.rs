//! Solvency integration tests for the BASALT custody core.
//!
//! These tests exercise the invariant engine through the full public API:
//! registration, oracle sync, minting against attested backing, caps,
//! redemptions, and the watchdog escalation path. The one property every
//! test circles back to: attested backing covers minted supply on every
//! reachable path, and the engine refuses — rather than reconciles —
//! anything that would break it.
//!
//! Each test stands alone with its own engine, oracle, and manual clock.
//! No shared state, no test ordering dependencies.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use basalt_protocol::config::{ProtocolParams, SATS_PER_BTC};
use basalt_protocol::engine::watchdog::EscalationOutcome;
use basalt_protocol::external::{
    DevProofValidator, FixedOracle, InMemoryTokenLedger, ManualClock,
};
use basalt_protocol::{
    Actor, CustodyEngine, MintError, OracleSyncError, RedemptionError, ReserveStatus,
    ViolationReason,
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

/// Spins up an engine with one registered reserve and hands back the
/// shared collaborators so tests can steer the oracle and the clock.
fn setup(minting_cap: u64) -> (
    CustodyEngine,
    Arc<FixedOracle>,
    Arc<InMemoryTokenLedger>,
    Arc<ManualClock>,
) {
    let oracle = FixedOracle::new();
    let tokens = InMemoryTokenLedger::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    let mut engine = CustodyEngine::new(
        ProtocolParams::default(),
        oracle.clone(),
        tokens.clone(),
        Arc::new(DevProofValidator),
        clock.clone(),
    );
    engine.register_reserve(&arbiter(), QC, minting_cap).unwrap();
    (engine, oracle, tokens, clock)
}

/// Sets the attested figure and syncs it into the books, hopping the
/// rate limit via the clock.
fn attest(
    engine: &mut CustodyEngine,
    oracle: &FixedOracle,
    clock: &ManualClock,
    backing: u64,
) {
    clock.advance(Duration::hours(1));
    oracle.set(QC, backing, false);
    engine.sync_backing_from_oracle("syncer", QC).unwrap();
}

/// The invariant under test, spelled out once.
fn assert_solvent(engine: &CustodyEngine) {
    let r = engine.reserve(QC).unwrap();
    assert!(
        r.backing >= r.minted,
        "solvency broken: backing {} < minted {}",
        r.backing,
        r.minted
    );
}

// ---------------------------------------------------------------------------
// 1. Backing bounds minting (Scenario A)
// ---------------------------------------------------------------------------

#[test]
fn mint_succeeds_within_backing_and_fails_beyond_it() {
    let (mut engine, oracle, _, clock) = setup(100 * SATS_PER_BTC);
    attest(&mut engine, &oracle, &clock, SATS_PER_BTC); // 1 BTC attested

    engine.request_mint(QC, "alice", 60_000_000).unwrap();
    assert_eq!(engine.reserve(QC).unwrap().minted, 60_000_000);

    // 60 + 50 > 100: refused, books untouched.
    let err = engine.request_mint(QC, "alice", 50_000_000).unwrap_err();
    assert!(matches!(err, MintError::InsufficientBacking { .. }));
    assert_eq!(engine.reserve(QC).unwrap().minted, 60_000_000);
    assert_solvent(&engine);
}

#[test]
fn backing_drop_blocks_new_mints_but_keeps_old_supply() {
    let (mut engine, oracle, _, clock) = setup(100 * SATS_PER_BTC);
    attest(&mut engine, &oracle, &clock, SATS_PER_BTC);
    engine.request_mint(QC, "alice", 80_000_000).unwrap();

    // Attested figure drops below minted. Existing supply stays; any new
    // mint is refused.
    attest(&mut engine, &oracle, &clock, 50_000_000);
    let err = engine.request_mint(QC, "alice", 10_000).unwrap_err();
    assert!(matches!(err, MintError::InsufficientBacking { .. }));
    assert_eq!(engine.reserve(QC).unwrap().minted, 80_000_000);
}

// ---------------------------------------------------------------------------
// 2. Stale oracle data (Scenario D)
// ---------------------------------------------------------------------------

#[test]
fn stale_sync_writes_nothing_and_forces_review() {
    let (mut engine, oracle, _, _) = setup(100 * SATS_PER_BTC);
    oracle.set(QC, SATS_PER_BTC, true);

    let err = engine.sync_backing_from_oracle("syncer", QC).unwrap_err();
    assert!(matches!(err, OracleSyncError::StaleAttestation(_)));

    let r = engine.reserve(QC).unwrap();
    assert_eq!(r.backing, 0, "stale figure must never land in the books");
    assert_eq!(r.status, ReserveStatus::UnderReview);
    assert!(r.oracle_failure);
}

// ---------------------------------------------------------------------------
// 3. Mixed operation sequence holds the invariant
// ---------------------------------------------------------------------------

#[test]
fn solvency_holds_across_a_mixed_sequence() {
    let (mut engine, oracle, _, clock) = setup(1_000 * SATS_PER_BTC);
    attest(&mut engine, &oracle, &clock, 10 * SATS_PER_BTC);
    engine.register_wallet(QC, WALLET, b"spv-proof").unwrap();

    // A deterministic mixed script: mints, burns, redemptions, re-syncs.
    engine.request_mint(QC, "alice", 3 * SATS_PER_BTC).unwrap();
    assert_solvent(&engine);

    engine
        .request_mint_batch(
            QC,
            &[
                ("bob".to_string(), SATS_PER_BTC),
                ("carol".to_string(), 2 * SATS_PER_BTC),
            ],
        )
        .unwrap();
    assert_solvent(&engine);

    let id = engine
        .initiate_redemption("carol", QC, WALLET, USER_BTC, SATS_PER_BTC)
        .unwrap();
    assert_solvent(&engine);

    engine.request_burn(QC, "bob", SATS_PER_BTC / 2).unwrap();
    assert_solvent(&engine);

    attest(&mut engine, &oracle, &clock, 6 * SATS_PER_BTC);
    assert_solvent(&engine);

    engine
        .record_redemption_fulfillment("ops", &id, b"btc-tx-proof")
        .unwrap();
    assert_solvent(&engine);

    // Oversized mint attempts bounce off whichever gate binds first,
    // leaving the books unchanged each time.
    for amount in [10 * SATS_PER_BTC, 100 * SATS_PER_BTC] {
        let before = engine.reserve(QC).unwrap().minted;
        assert!(engine.request_mint(QC, "mallory", amount).is_err());
        assert_eq!(engine.reserve(QC).unwrap().minted, before);
        assert_solvent(&engine);
    }
}

// ---------------------------------------------------------------------------
// 4. Insufficiency escalation end to end
// ---------------------------------------------------------------------------

#[test]
fn sustained_insufficiency_walks_to_emergency_pause_and_back() {
    let (mut engine, oracle, _, clock) = setup(100 * SATS_PER_BTC);
    attest(&mut engine, &oracle, &clock, 5 * SATS_PER_BTC);
    engine.register_wallet(QC, WALLET, b"spv-proof").unwrap();
    engine.request_mint(QC, "alice", 4 * SATS_PER_BTC).unwrap();

    // Backing collapses below minted.
    attest(&mut engine, &oracle, &clock, SATS_PER_BTC);

    // Watchdog confirms the violation: review + armed timer.
    engine
        .enforce_objective_violation("watchdog-1", QC, ViolationReason::InsufficientReserves)
        .unwrap();
    assert_eq!(engine.reserve(QC).unwrap().status, ReserveStatus::UnderReview);

    // Grace elapses, the re-read still shows the hole: emergency pause.
    clock.advance(Duration::minutes(45));
    let outcome = engine.check_escalation("watchdog-2", QC).unwrap();
    assert_eq!(outcome, EscalationOutcome::EmergencyPaused);

    // The hard stop blocks minting *and* new redemptions.
    let r = engine.reserve(QC).unwrap();
    assert!(r.emergency_paused);
    assert!(matches!(
        engine.request_mint(QC, "alice", 10_000),
        Err(MintError::MintingNotAllowed { .. })
    ));
    assert!(matches!(
        engine.initiate_redemption("alice", QC, WALLET, USER_BTC, 2_000_000),
        Err(RedemptionError::RedemptionsNotAllowed { .. })
    ));

    // Recovery is human: arbiter clears the flag and resolves the review.
    engine.clear_emergency_pause(&arbiter(), QC).unwrap();
    engine
        .set_status(&arbiter(), QC, ReserveStatus::Active, "capital restored")
        .unwrap();
    attest(&mut engine, &oracle, &clock, 5 * SATS_PER_BTC);
    engine.request_mint(QC, "alice", 10_000).unwrap();
    assert_solvent(&engine);
}

// ---------------------------------------------------------------------------
// 5. Caps compose with backing
// ---------------------------------------------------------------------------

#[test]
fn tightest_gate_wins_between_backing_cap_and_global_cap() {
    let (mut engine, oracle, _, clock) = setup(2 * SATS_PER_BTC);
    attest(&mut engine, &oracle, &clock, 10 * SATS_PER_BTC);

    // Reserve cap (2 BTC) binds before backing (10 BTC).
    engine.request_mint(QC, "alice", 2 * SATS_PER_BTC).unwrap();
    assert!(matches!(
        engine.request_mint(QC, "alice", 10_000),
        Err(MintError::ExceedsMintingCap { .. })
    ));

    // A second reserve under a global cap: the aggregate binds last.
    engine.register_reserve(&arbiter(), "qc-beta", 10 * SATS_PER_BTC).unwrap();
    oracle.set("qc-beta", 10 * SATS_PER_BTC, false);
    engine.sync_backing_from_oracle("syncer", "qc-beta").unwrap();
    engine.set_global_cap(&arbiter(), 3 * SATS_PER_BTC).unwrap();

    assert!(matches!(
        engine.request_mint("qc-beta", "bob", 2 * SATS_PER_BTC),
        Err(MintError::ExceedsGlobalCap { .. })
    ));
    engine.request_mint("qc-beta", "bob", SATS_PER_BTC).unwrap();
    assert_eq!(engine.state().ledger.total_minted(), 3 * SATS_PER_BTC);
}
