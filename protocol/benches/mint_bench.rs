// Mint-path benchmarks for the BASALT custody core.
//
// Covers the single-mint gate sequence, batch minting, redemption
// initiation (hash derivation plus burn), and a full oracle sync write.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use basalt_protocol::config::{ProtocolParams, SATS_PER_BTC};
use basalt_protocol::external::{DevProofValidator, FixedOracle, InMemoryTokenLedger, SystemClock};
use basalt_protocol::{Actor, CustodyEngine};

const QC: &str = "qc-bench";
const WALLET: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
const USER_BTC: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

/// Engine with a deep-pocketed reserve so the gates pass on every
/// iteration and we measure the path, not refusals.
fn setup_engine() -> CustodyEngine {
    let oracle = FixedOracle::new();
    let tokens = InMemoryTokenLedger::new();
    let mut engine = CustodyEngine::new(
        ProtocolParams::default(),
        oracle.clone(),
        tokens.clone(),
        Arc::new(DevProofValidator),
        Arc::new(SystemClock),
    );
    engine
        .register_reserve(&Actor::arbiter("bench"), QC, u64::MAX / 2)
        .unwrap();
    oracle.set(QC, u64::MAX / 2, false);
    engine.sync_backing_from_oracle("bench", QC).unwrap();
    engine.register_wallet(QC, WALLET, b"spv-proof").unwrap();
    tokens.seed("redeemer", u64::MAX / 4);
    engine
}

fn bench_single_mint(c: &mut Criterion) {
    let mut engine = setup_engine();
    c.bench_function("mint/single", |b| {
        b.iter(|| engine.request_mint(QC, "alice", 10_000).unwrap());
    });
}

fn bench_batch_mint(c: &mut Criterion) {
    let mut group = c.benchmark_group("mint/batch");
    for size in [10usize, 100, 1_000] {
        let mut engine = setup_engine();
        let batch: Vec<(String, u64)> = (0..size)
            .map(|i| (format!("recipient-{i}"), 10_000))
            .collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| engine.request_mint_batch(QC, batch).unwrap());
        });
    }
    group.finish();
}

fn bench_redemption_initiation(c: &mut Criterion) {
    let mut engine = setup_engine();
    // Keep minted supply far above the redemption flow's drain.
    engine.request_mint(QC, "funder", 100 * SATS_PER_BTC).unwrap();
    engine
        .credit_minted(&Actor::arbiter("bench"), QC, u64::MAX / 8)
        .unwrap();

    c.bench_function("redemption/initiate", |b| {
        b.iter(|| {
            engine
                .initiate_redemption("redeemer", QC, WALLET, USER_BTC, 1_000_000)
                .unwrap()
        });
    });
}

fn bench_oracle_sync(c: &mut Criterion) {
    // A zero interval disables rate limiting so every iteration writes.
    let params = ProtocolParams {
        oracle_sync_interval_secs: 0,
        ..Default::default()
    };
    let oracle = FixedOracle::new();
    let mut engine = CustodyEngine::new(
        params,
        oracle.clone(),
        InMemoryTokenLedger::new(),
        Arc::new(DevProofValidator),
        Arc::new(SystemClock),
    );
    engine
        .register_reserve(&Actor::arbiter("bench"), QC, u64::MAX / 2)
        .unwrap();
    oracle.set(QC, 42 * SATS_PER_BTC, false);

    c.bench_function("oracle/sync", |b| {
        b.iter(|| engine.sync_backing_from_oracle("bench", QC).unwrap());
    });
}

criterion_group!(
    benches,
    bench_single_mint,
    bench_batch_mint,
    bench_redemption_initiation,
    bench_oracle_sync
);
criterion_main!(benches);
