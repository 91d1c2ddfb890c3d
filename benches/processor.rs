// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchmarks for the transaction processor.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded win/lose throughput
//! - Duplicate rejection on the fast path
//! - Parallel applies on one user (contention) and on many users

use balance_ledger::{
    BalanceChange, Direction, ExternalId, MemoryStore, Money, SourceType, StoreConfig,
    TransactionProcessor, UserId,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Helper Functions
// =============================================================================

fn processor_with_users(users: u64) -> TransactionProcessor<MemoryStore> {
    let store = MemoryStore::new(StoreConfig::default());
    for id in 1..=users {
        store.ensure_user(UserId(id)).unwrap();
    }
    TransactionProcessor::new(store)
}

fn make_change(user_id: u64, key: u64, direction: Direction, cents: u64) -> BalanceChange {
    BalanceChange {
        user_id: UserId(user_id),
        external_id: ExternalId::new(format!("ev-{key}")).unwrap(),
        direction,
        amount: Money::from_minor(cents),
        source_type: SourceType::Game,
    }
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_win_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("win_throughput");

    for count in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let processor = processor_with_users(1);
                for key in 0..count {
                    processor
                        .apply(make_change(1, key, Direction::Win, 10_000))
                        .unwrap();
                }
                black_box(&processor);
            })
        });
    }
    group.finish();
}

fn bench_mixed_win_lose(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_win_lose");

    for count in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count * 2));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let processor = processor_with_users(1);
                for i in 0..count {
                    processor
                        .apply(make_change(1, i * 2, Direction::Win, 10_000))
                        .unwrap();
                    let _ = processor.apply(make_change(1, i * 2 + 1, Direction::Lose, 15_000));
                }
                black_box(&processor);
            })
        });
    }
    group.finish();
}

fn bench_duplicate_rejection(c: &mut Criterion) {
    let processor = processor_with_users(1);
    processor
        .apply(make_change(1, 0, Direction::Win, 100))
        .unwrap();

    c.bench_function("duplicate_rejection", |b| {
        b.iter(|| {
            let result = processor.apply(black_box(make_change(1, 0, Direction::Win, 100)));
            assert!(result.is_err());
        })
    });
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_same_user(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_same_user");
    let count = 10_000u64;
    group.throughput(Throughput::Elements(count));

    group.bench_function("wins", |b| {
        let key = AtomicU64::new(0);
        b.iter(|| {
            let processor = processor_with_users(1);
            (0..count).into_par_iter().for_each(|_| {
                let k = key.fetch_add(1, Ordering::Relaxed);
                processor
                    .apply(make_change(1, k, Direction::Win, 100))
                    .unwrap();
            });
            black_box(&processor);
        })
    });
    group.finish();
}

fn bench_parallel_many_users(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_many_users");
    let count = 10_000u64;
    group.throughput(Throughput::Elements(count));

    for users in [4u64, 64, 1_024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(users), users, |b, &users| {
            let key = AtomicU64::new(0);
            b.iter(|| {
                let processor = processor_with_users(users);
                (0..count).into_par_iter().for_each(|i| {
                    let k = key.fetch_add(1, Ordering::Relaxed);
                    processor
                        .apply(make_change(i % users + 1, k, Direction::Win, 100))
                        .unwrap();
                });
                black_box(&processor);
            })
        });
    }
    group.finish();
}

criterion_group!(
    single_threaded,
    bench_win_throughput,
    bench_mixed_win_lose,
    bench_duplicate_rejection,
);

criterion_group!(
    multi_threaded,
    bench_parallel_same_user,
    bench_parallel_many_users,
);

criterion_main!(single_threaded, multi_threaded);
