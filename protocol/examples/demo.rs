//! Interactive CLI demo of the full BASALT custody lifecycle.
//!
//! Walks through reserve registration, oracle attestation sync, wallet
//! registration, minting against attested backing, a proof-gated redemption,
//! a watchdog enforcement round against a deliberately undercollateralized
//! reserve, and the custodian self-pause economy. The output uses ANSI
//! escape codes for colored, storytelling-style terminal rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, TimeZone, Utc};

use basalt_protocol::config::{ProtocolParams, SATS_PER_BTC};
use basalt_protocol::external::{DevProofValidator, FixedOracle, InMemoryTokenLedger, ManualClock};
use basalt_protocol::{
    Actor, CustodyEngine, EscalationOutcome, ReserveStatus, SelfPauseTarget, TokenLedger,
    ViolationReason,
};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    BASALT PROTOCOL  --  Interactive Custody Lifecycle Demo         {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    Version 0.1.0  |  Reserve-Backed Bitcoin Custody                {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn refused(text: &str) {
    println!("{RED}  [REFUSED] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn balance_row(name: &str, balance: u64, color: &str) {
    println!("  {color}{BOLD}{name:<12}{RESET}  {WHITE}{balance:>14}{RESET} {DIM}sats{RESET}");
}

fn reserve_row(engine: &CustodyEngine, id: &str, color: &str) {
    let r = engine.reserve(id).expect("reserve exists");
    let solvency = if r.is_solvent() {
        format!("{GREEN}solvent{RESET}")
    } else {
        format!("{RED}INSOLVENT{RESET}")
    };
    let pause = if r.emergency_paused {
        format!("  {RED}{BOLD}[EMERGENCY PAUSED]{RESET}")
    } else {
        String::new()
    };
    println!(
        "  {color}{BOLD}{:<10}{RESET}  {WHITE}{:<14}{RESET} backing {YELLOW}{:>12}{RESET}  minted {YELLOW}{:>12}{RESET}  {solvency}{pause}",
        r.address,
        r.status.to_string(),
        r.backing,
        r.minted,
    );
}

fn separator() {
    println!(
        "{DIM}{CYAN}  . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . {RESET}"
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

const QC_ALPHA: &str = "qc-alpha";
const QC_BETA: &str = "qc-beta";
const RESERVE_WALLET: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
const USER_BTC_ADDRESS: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

fn main() {
    let demo_start = Instant::now();

    banner();

    // -----------------------------------------------------------------------
    // Step 1: Engine bootstrap and reserve registration
    // -----------------------------------------------------------------------

    section(1, "Custody Engine Bootstrap & Reserve Registration");
    subsection("Wiring the engine to devnet collaborators (oracle, token ledger, SPV, clock)...");

    let oracle = FixedOracle::new();
    let tokens = InMemoryTokenLedger::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

    let t = Instant::now();
    let mut engine = CustodyEngine::new(
        ProtocolParams::default(),
        oracle.clone(),
        tokens.clone(),
        Arc::new(DevProofValidator),
        clock.clone(),
    );
    timing("engine setup", t.elapsed());

    let arbiter = Actor::arbiter("arbiter-1");
    engine
        .register_reserve(&arbiter, QC_ALPHA, 10 * SATS_PER_BTC)
        .unwrap();
    engine
        .register_reserve(&arbiter, QC_BETA, 5 * SATS_PER_BTC)
        .unwrap();
    engine.grant_pause_credit(&arbiter, QC_BETA).unwrap();

    info("Reserves registered", "qc-alpha (cap 10 BTC), qc-beta (cap 5 BTC)");
    info("Pause credit", "granted to qc-beta");
    success("Both custodians Active with zero backing and zero minted supply");

    // -----------------------------------------------------------------------
    // Step 2: Oracle attestation sync
    // -----------------------------------------------------------------------

    section(2, "Oracle Attestation Sync");
    subsection("Publishing attested balances and pulling them into the ledger...");

    oracle.set(QC_ALPHA, 5 * SATS_PER_BTC, false);
    oracle.set(QC_BETA, 2 * SATS_PER_BTC, false);

    let t = Instant::now();
    let alpha_backing = engine.sync_backing_from_oracle("demo-syncer", QC_ALPHA).unwrap();
    let beta_backing = engine.sync_backing_from_oracle("demo-syncer", QC_BETA).unwrap();
    timing("2x oracle sync", t.elapsed());

    info("qc-alpha backing", &format!("{alpha_backing} sats (5 BTC)"));
    info("qc-beta backing", &format!("{beta_backing} sats (2 BTC)"));

    // A second write inside the rate-limit interval is refused.
    match engine.sync_backing_from_oracle("demo-syncer", QC_ALPHA) {
        Err(err) => refused(&format!("immediate re-sync: {err}")),
        Ok(_) => unreachable!("rate limit must refuse the second write"),
    }
    success("Backing figures landed; the write rate limit is live");

    // -----------------------------------------------------------------------
    // Step 3: Reserve wallet registration
    // -----------------------------------------------------------------------

    section(3, "Reserve Wallet Registration (SPV Control Proof)");
    subsection("Custodian proves control of its Bitcoin wallet before it may take redemptions...");

    let t = Instant::now();
    engine
        .register_wallet(QC_ALPHA, RESERVE_WALLET, b"spv:control-proof")
        .unwrap();
    timing("wallet registration", t.elapsed());

    info("Wallet", RESERVE_WALLET);
    success("Wallet registered and Active under qc-alpha");

    // -----------------------------------------------------------------------
    // Step 4: Minting against attested backing
    // -----------------------------------------------------------------------

    section(4, "Minting Against Attested Backing");

    subsection("Single mint: 1.5 BTC of wrapped supply to Alice...");
    let t = Instant::now();
    engine
        .request_mint(QC_ALPHA, "alice", 3 * SATS_PER_BTC / 2)
        .unwrap();
    timing("mint", t.elapsed());

    subsection("Batch mint: 0.5 BTC each to Bob and the merchant...");
    let batch = vec![
        ("bob".to_string(), SATS_PER_BTC / 2),
        ("merchant".to_string(), SATS_PER_BTC / 2),
    ];
    let t = Instant::now();
    engine.request_mint_batch(QC_ALPHA, &batch).unwrap();
    timing("batch mint x2", t.elapsed());

    // A mint past the attested backing must be refused before any tokens move.
    match engine.request_mint(QC_ALPHA, "alice", 3 * SATS_PER_BTC) {
        Err(err) => refused(&format!("overshoot mint: {err}")),
        Ok(()) => unreachable!("backing gate must refuse the overshoot"),
    }

    separator();
    println!();
    println!("  {BOLD}{WHITE}--- Token Balances ---{RESET}");
    balance_row("Alice", tokens.balance_of("alice"), BLUE);
    balance_row("Bob", tokens.balance_of("bob"), GREEN);
    balance_row("Merchant", tokens.balance_of("merchant"), MAGENTA);
    println!();
    println!("  {BOLD}{WHITE}--- Reserve Book ---{RESET}");
    reserve_row(&engine, QC_ALPHA, BLUE);
    reserve_row(&engine, QC_BETA, GREEN);
    println!();
    success("2.5 BTC minted against 5 BTC of backing; every reserve solvent");

    // -----------------------------------------------------------------------
    // Step 5: Proof-gated redemption
    // -----------------------------------------------------------------------

    section(5, "Proof-Gated Redemption");
    subsection("Alice redeems 1 BTC; her tokens burn at initiation, not at fulfillment...");

    let t = Instant::now();
    let redemption_id = engine
        .initiate_redemption("alice", QC_ALPHA, RESERVE_WALLET, USER_BTC_ADDRESS, SATS_PER_BTC)
        .unwrap();
    timing("redemption initiation", t.elapsed());

    info("Redemption ID", &redemption_id[..16]);
    info("Alice's balance after burn", &tokens.balance_of("alice").to_string());
    let deadline = engine.redemption(&redemption_id).unwrap().deadline;
    info("Fulfillment deadline", &deadline.to_rfc3339());

    subsection("Custodian pays on-chain and submits the SPV payment proof...");
    let t = Instant::now();
    engine
        .record_redemption_fulfillment("relayer-7", &redemption_id, b"spv:payment-proof")
        .unwrap();
    timing("fulfillment verification", t.elapsed());

    let record = engine.redemption(&redemption_id).unwrap();
    info("Redemption status", &record.status.to_string());
    success("Obligation settled against the stored address and amount");

    // -----------------------------------------------------------------------
    // Step 6: Watchdog enforcement round
    // -----------------------------------------------------------------------

    section(6, "Watchdog Enforcement: Sustained Insufficiency");
    subsection("The attested backing collapses below the minted supply...");

    clock.advance(Duration::hours(2));
    oracle.set(QC_ALPHA, SATS_PER_BTC / 2, false);
    engine.sync_backing_from_oracle("demo-syncer", QC_ALPHA).unwrap();
    reserve_row(&engine, QC_ALPHA, BLUE);

    subsection("Anyone may report it; the engine re-derives the claim from live state...");
    engine
        .enforce_objective_violation("watchdog-anon", QC_ALPHA, ViolationReason::InsufficientReserves)
        .unwrap();
    info("qc-alpha status", &engine.reserve(QC_ALPHA).unwrap().status.to_string());
    success("Confirmed violation: reserve under review, escalation timer armed");

    subsection("Grace period elapses; the fresh re-read decides the outcome...");
    clock.advance(Duration::minutes(45));
    let t = Instant::now();
    let outcome = engine.check_escalation("watchdog-anon", QC_ALPHA).unwrap();
    timing("escalation check", t.elapsed());
    assert_eq!(outcome, EscalationOutcome::EmergencyPaused);
    reserve_row(&engine, QC_ALPHA, BLUE);

    match engine.request_mint(QC_ALPHA, "alice", SATS_PER_BTC / 10) {
        Err(err) => refused(&format!("mint while emergency paused: {err}")),
        Ok(()) => unreachable!("emergency pause must block minting"),
    }

    subsection("Custodian tops up; the arbiter reviews and restores service...");
    clock.advance(Duration::hours(2));
    oracle.set(QC_ALPHA, 5 * SATS_PER_BTC, false);
    engine.sync_backing_from_oracle("demo-syncer", QC_ALPHA).unwrap();
    engine.clear_emergency_pause(&arbiter, QC_ALPHA).unwrap();
    engine
        .set_status(&arbiter, QC_ALPHA, ReserveStatus::Active, "review resolved: backing restored")
        .unwrap();
    reserve_row(&engine, QC_ALPHA, BLUE);
    success("qc-alpha recovered through the only door out of review: the arbiter");

    // -----------------------------------------------------------------------
    // Step 7: Custodian self-pause economy
    // -----------------------------------------------------------------------

    section(7, "Custodian Self-Pause (One Renewable Credit)");
    subsection("qc-beta spends its credit for HSM maintenance, then resumes early...");

    engine
        .self_pause(QC_BETA, SelfPauseTarget::MintingPaused, "hsm maintenance")
        .unwrap();
    info("qc-beta status", &engine.reserve(QC_BETA).unwrap().status.to_string());

    clock.advance(Duration::hours(6));
    engine.resume_self_pause(QC_BETA).unwrap();
    info("qc-beta status", &engine.reserve(QC_BETA).unwrap().status.to_string());

    // The credit is spent: a second pause is refused until the 90-day renewal.
    match engine.self_pause(QC_BETA, SelfPauseTarget::Paused, "again") {
        Err(err) => refused(&format!("second self-pause: {err}")),
        Ok(()) => unreachable!("spent credit must refuse a second pause"),
    }
    success("Self-pause is an emergency brake, not a scheduling tool");

    // -----------------------------------------------------------------------
    // Final Summary
    // -----------------------------------------------------------------------

    let total_elapsed = demo_start.elapsed();

    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    DEMO COMPLETE -- Final Summary                                  {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();

    println!("  {BOLD}{WHITE}Protocol Statistics:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    info("Reserves registered", "2 (qc-alpha, qc-beta)");
    info("Wrapped supply minted", "2.5 BTC across 3 recipients");
    info("Redemptions", "1 initiated, 1 fulfilled with SPV proof");
    info("Violations enforced", "1 (insufficient reserves -> emergency pause)");
    info("Self-pauses", "1 consumed, resumed early");
    info(
        "Audit events recorded",
        &engine.events().len().to_string(),
    );
    println!();

    println!("  {BOLD}{WHITE}Final Reserve Book:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    reserve_row(&engine, QC_ALPHA, BLUE);
    reserve_row(&engine, QC_BETA, GREEN);
    println!();
    println!(
        "  {ITALIC}{DIM}Invariant held throughout: attested backing covered minted supply on every accepted operation{RESET}"
    );

    println!();
    println!(
        "  {BOLD}{GREEN}Total demo time: {:.2}s{RESET}",
        total_elapsed.as_secs_f64()
    );
    println!();
}
