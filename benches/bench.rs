// Copyright (c) 2026-present, skipstore
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rng, seq::SliceRandom, RngCore};

use crossbeam_skiplist::SkipMap as CrossbeamSkipMap;
use skipstore::LockedSkipList;

const COUNTS: [usize; 3] = [1_000, 10_000, 100_000];
const MAX_LEVEL: usize = 16;

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &n in &COUNTS {
        group.bench_with_input(BenchmarkId::new("CrossbeamSkipMap", n), &n, |b, &n| {
            let mut keys: Vec<u64> = (0..n as u64).collect();
            keys.shuffle(&mut rng());
            b.iter(|| {
                let map = CrossbeamSkipMap::new();
                for &k in &keys {
                    map.insert(k, k);
                }
            });
        });
        group.bench_with_input(BenchmarkId::new("LockedSkipList", n), &n, |b, &n| {
            let mut keys: Vec<u64> = (0..n as u64).collect();
            keys.shuffle(&mut rng());
            b.iter(|| {
                let list = LockedSkipList::with_seed(MAX_LEVEL, rng().next_u32());
                for &k in &keys {
                    let _ = list.insert(k, k);
                }
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    for &n in &COUNTS {
        group.bench_with_input(BenchmarkId::new("CrossbeamSkipMap", n), &n, |b, &n| {
            let mut keys: Vec<u64> = (0..n as u64).collect();
            keys.shuffle(&mut rng());
            let map = CrossbeamSkipMap::new();
            for &k in &keys {
                map.insert(k, k);
            }
            let mut r = rng();
            b.iter(|| {
                let key = r.next_u64() % n as u64;
                black_box(map.get(&key));
            });
        });
        group.bench_with_input(BenchmarkId::new("LockedSkipList", n), &n, |b, &n| {
            let mut keys: Vec<u64> = (0..n as u64).collect();
            keys.shuffle(&mut rng());
            let list = LockedSkipList::with_seed(MAX_LEVEL, rng().next_u32());
            for &k in &keys {
                let _ = list.insert(k, k);
            }
            let mut r = rng();
            b.iter(|| {
                let key = r.next_u64() % n as u64;
                black_box(list.get(&key));
            });
        });
    }
    group.finish();
}

fn bench_remove_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_insert");
    for &n in &COUNTS {
        group.bench_with_input(BenchmarkId::new("LockedSkipList", n), &n, |b, &n| {
            let mut keys: Vec<u64> = (0..n as u64).collect();
            keys.shuffle(&mut rng());
            let list = LockedSkipList::with_seed(MAX_LEVEL, rng().next_u32());
            for &k in &keys {
                let _ = list.insert(k, k);
            }
            let mut r = rng();
            b.iter(|| {
                let key = r.next_u64() % n as u64;
                if let Some(value) = list.remove(&key) {
                    let _ = list.insert(key, value);
                }
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_insert, bench_get, bench_remove_insert
}
criterion_main!(benches);
