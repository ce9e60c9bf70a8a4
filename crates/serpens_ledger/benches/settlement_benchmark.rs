//! Benchmark for deposit settlement and referral checks.
//!
//! Run with: cargo bench --package serpens_ledger --bench settlement_benchmark

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serpens_ledger::{LedgerConfig, Money, Platform, SignUpRequest, TransactionKind};

/// One referrer with `referrals` referred players, each holding a pending deposit.
fn create_test_platform(referrals: usize) -> (Platform, Vec<String>) {
    let mut platform = Platform::new(LedgerConfig::default())
        .unwrap()
        .with_rng_seed(7);
    let referrer = platform
        .sign_up(SignUpRequest::new("referrer", "referrer@bench.io", "pw"))
        .unwrap();

    let mut deposits = Vec::with_capacity(referrals);
    for i in 0..referrals {
        let name = format!("player{i}");
        platform
            .sign_up(
                SignUpRequest::new(&name, &format!("{name}@bench.io"), "pw")
                    .with_referral_code(&referrer.referral_code),
            )
            .unwrap();
        platform.login(&name, "pw").unwrap();
        deposits.push(platform.deposit(Money::from_whole(100), "proof").unwrap());
    }
    (platform, deposits)
}

fn benchmark_approve_deposit(c: &mut Criterion) {
    c.bench_function("approve_deposit_100_users", |b| {
        b.iter_batched(
            || create_test_platform(100),
            |(mut platform, deposits)| {
                black_box(
                    platform
                        .approve_transaction(&deposits[50], TransactionKind::Deposit)
                        .unwrap(),
                )
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn benchmark_qualifying_count(c: &mut Criterion) {
    let (mut platform, deposits) = create_test_platform(200);
    for id in &deposits {
        platform
            .approve_transaction(id, TransactionKind::Deposit)
            .unwrap();
    }
    platform.login("referrer", "pw").unwrap();

    c.bench_function("qualifying_referrals_200", |b| {
        b.iter(|| black_box(platform.qualifying_referrals_count()));
    });
}

fn benchmark_fee_math(c: &mut Criterion) {
    let amount = Money::from_cents(123_456);

    c.bench_function("withdrawal_reserve", |b| {
        b.iter(|| black_box(black_box(amount).with_surcharge_bp(300)));
    });
}

criterion_group!(
    benches,
    benchmark_approve_deposit,
    benchmark_qualifying_count,
    benchmark_fee_math
);
criterion_main!(benches);
