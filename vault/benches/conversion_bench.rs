// Conversion and end-to-end deposit benchmarks for the vault.
//
// Covers the raw share/asset math at a few pool sizes and a full
// coordinator-driven deposit including the deferred status check.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use nova_vault::{
    AccountId, AggregateVault, Coordinator, CustodyKind, ExchangeRate, MultiClassLedger,
    Rounding, VaultConfig,
};

fn bench_to_shares(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion/to_shares");

    for (supply, assets) in [(0u64, 0u64), (1_000_000, 1_337_000), (u64::MAX / 2, u64::MAX / 3)] {
        let rate = ExchangeRate::new(supply, assets);
        group.bench_with_input(BenchmarkId::from_parameter(supply), &rate, |b, rate| {
            b.iter(|| rate.to_shares(black_box(123_456_789), Rounding::Down));
        });
    }

    group.finish();
}

fn bench_to_assets_rounding(c: &mut Criterion) {
    let rate = ExchangeRate::new(1_000_003, 1_337_011);

    c.bench_function("conversion/to_assets_down", |b| {
        b.iter(|| rate.to_assets(black_box(987_654), Rounding::Down));
    });
    c.bench_function("conversion/to_assets_up", |b| {
        b.iter(|| rate.to_assets(black_box(987_654), Rounding::Up));
    });
}

fn bench_deposit(c: &mut Criterion) {
    let mut group = c.benchmark_group("vault/deposit");
    group.throughput(Throughput::Elements(1));

    let asset = Arc::new(MultiClassLedger::new("nova:bench"));
    let config = VaultConfig::new("Bench", "vB", "vault", "admin", CustodyKind::Aggregate);
    let vault = Arc::new(AggregateVault::new(config, asset.clone()).expect("vault"));
    let coordinator = Coordinator::new();
    asset.register_receiver(vault.id(), &vault);
    coordinator.register_vault(vault.clone());
    coordinator.register_resource(asset.clone());

    let alice = AccountId::from("alice");
    asset.issue(&alice, 0, u64::MAX / 2).expect("issue");
    coordinator
        .call("alice", |ctx| {
            asset.set_approval_for_all(ctx, vault.id(), true);
            Ok(())
        })
        .expect("approve");

    group.bench_function("single", |b| {
        b.iter(|| {
            coordinator
                .call("alice", |ctx| vault.deposit(ctx, 0, black_box(1_000), &alice))
                .expect("deposit")
        });
    });

    group.finish();
}

criterion_group!(benches, bench_to_shares, bench_to_assets_rounding, bench_deposit);
criterion_main!(benches);
