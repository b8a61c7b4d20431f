//! Prefix search benchmarks: in-memory, memory-mapped and seek-based sources

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hashvault::config::GenerateConfig;
use hashvault::search::{prefix_search, Query};
use hashvault::vault_file::VaultFile;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn benchmark_prefix_search(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.bin");
    hashvault::generate_vault(&GenerateConfig::new(16, num_cpus::get()).with_seed(1), &path)
        .unwrap();
    let vault = VaultFile::open_with_exponent(&path, 16).unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    let queries: Vec<Query> = (0..1024)
        .map(|_| Query::random(&mut rng, 3).unwrap())
        .collect();

    let mut group = c.benchmark_group("prefix_search_k16");

    let mut in_memory: Vec<_> = vault.stream().unwrap().map(|r| r.unwrap()).collect();
    group.bench_function("in_memory", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % queries.len();
            black_box(prefix_search(&mut in_memory, black_box(&queries[i])).unwrap())
        })
    });

    let mut mapped = vault.mapped().unwrap();
    group.bench_function("mapped", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % queries.len();
            black_box(prefix_search(&mut mapped, black_box(&queries[i])).unwrap())
        })
    });

    let mut seek = vault.seek_reader().unwrap();
    group.bench_function("seek", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % queries.len();
            black_box(prefix_search(&mut seek, black_box(&queries[i])).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_prefix_search);
criterion_main!(benches);
