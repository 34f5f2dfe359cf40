//! Benchmarks for the fused factorization sweeps
//!
//! Run with: cargo bench --package factorization
//!
//! Uses a synthetic dataset so no data files are needed.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use data_loader::SparseMatrix;
use factorization::{FactorizationConfig, FusedTrainer, ModelState, SweepBuffers, TrainingData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const USERS: usize = 2_000;
const ITEMS: usize = 1_000;
const CONTENT_DIM: usize = 64;

fn random_matrix(rows: usize, columns: usize, per_row: usize, seed: u64) -> SparseMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let triplets: Vec<(usize, usize, f64)> = (0..rows)
        .flat_map(|r| {
            (0..per_row)
                .map(|_| (r, rng.random_range(0..columns), rng.random_range(1..=5) as f64))
                .collect::<Vec<_>>()
        })
        .collect();
    SparseMatrix::from_triplets(rows, columns, triplets).expect("valid synthetic matrix")
}

fn bench_iteration(c: &mut Criterion) {
    let ratings = random_matrix(USERS, ITEMS, 40, 1);
    let relations = random_matrix(ITEMS, ITEMS, 5, 2);
    let content = random_matrix(CONTENT_DIM, ITEMS, 100, 3);

    let config = FactorizationConfig::default().with_factors(16);
    let trainer = FusedTrainer::new(config.clone()).expect("valid config");

    let mut group = c.benchmark_group("fused_iteration");
    group.sample_size(10);

    group.bench_function("ratings_only", |b| {
        let data = TrainingData::new(&ratings);
        let mut state = ModelState::initialize(&config, &ratings, None).expect("init");
        let mut buffers = SweepBuffers::new(USERS, ITEMS);
        b.iter(|| {
            trainer
                .run_iteration(black_box(&mut state), data, &mut buffers)
                .expect("iteration")
        })
    });

    group.bench_function("fused", |b| {
        let data = TrainingData::new(&ratings)
            .with_relations(Some(&relations))
            .with_content(Some(&content));
        let mut state = ModelState::initialize(&config, &ratings, Some(&content)).expect("init");
        let mut buffers = SweepBuffers::new(USERS, ITEMS);
        b.iter(|| {
            trainer
                .run_iteration(black_box(&mut state), data, &mut buffers)
                .expect("iteration")
        })
    });

    group.finish();
}

fn bench_gram(c: &mut Criterion) {
    let config = FactorizationConfig::default().with_factors(32);
    let ratings = random_matrix(USERS, ITEMS, 10, 4);
    let state = ModelState::initialize(&config, &ratings, None).expect("init");

    c.bench_function("gram_32_factors", |b| {
        b.iter(|| black_box(state.user_factors().gram()))
    });
}

criterion_group!(benches, bench_iteration, bench_gram);
criterion_main!(benches);
