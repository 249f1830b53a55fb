//! Hash store benchmarks: bulk insert, point lookup, delete-all.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use dynhash::{DynamicHash, HashConfig, Item};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

const RECORD_COUNT: u64 = 4_096;
const LOOKUP_SAMPLES: usize = 1_024;

struct FreshStore {
    _dir: TempDir,
    store: DynamicHash<Item>,
}

impl FreshStore {
    fn new(config: &HashConfig) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let store = DynamicHash::open(dir.path(), config.clone().without_sync()).expect("open store");
        Self { _dir: dir, store }
    }

    fn loaded(config: &HashConfig, keys: &[u64]) -> Self {
        let mut fresh = Self::new(config);
        for &id in keys {
            fresh.store.insert(Item::new(id, "bench")).expect("insert");
        }
        fresh
    }
}

fn shuffled_keys(seed: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..RECORD_COUNT).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(seed));
    keys
}

fn hash_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynhash");
    group.sample_size(20);

    let keys = shuffled_keys(0xBEEF_F00D);
    let configs = [
        ("default", HashConfig::default()),
        ("compact", HashConfig::compact()),
        ("wide", HashConfig::wide()),
    ];

    for (name, config) in &configs {
        group.throughput(Throughput::Elements(RECORD_COUNT));
        group.bench_function(BenchmarkId::new("insert", name), |b| {
            b.iter_batched(
                || FreshStore::new(config),
                |mut fresh| {
                    for &id in &keys {
                        fresh.store.insert(Item::new(id, "bench")).expect("insert");
                    }
                    black_box(fresh.store.len());
                },
                BatchSize::LargeInput,
            );
        });

        let loaded = FreshStore::loaded(config, &keys);
        group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
        group.bench_function(BenchmarkId::new("find", name), |b| {
            b.iter(|| {
                for id in keys.iter().take(LOOKUP_SAMPLES) {
                    black_box(loaded.store.find(id).expect("find"));
                }
            });
        });

        group.throughput(Throughput::Elements(RECORD_COUNT));
        group.bench_function(BenchmarkId::new("delete_all", name), |b| {
            b.iter_batched(
                || FreshStore::loaded(config, &keys),
                |mut fresh| {
                    for id in keys.iter().rev() {
                        fresh.store.delete(id).expect("delete");
                    }
                    black_box(fresh.store.len());
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, hash_store);
criterion_main!(benches);
