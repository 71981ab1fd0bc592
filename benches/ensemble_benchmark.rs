//! Benchmarks for ensemble evaluation against evaluating each member alone.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ensemble_svm::{BinaryModel, Kernel, SVMEnsemble, SVMModel, SparseVector};

const DIMENSION: u32 = 50;
const POOL_SIZE: usize = 400;
const MODEL_SIZE: usize = 150;

/// Deterministic pseudo-random sequence in [-1, 1)
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 52) as f64 - 1.0
    }
}

fn random_vector(rng: &mut Lcg) -> SparseVector {
    let entries = (1..=DIMENSION)
        .filter_map(|i| {
            let v = rng.next();
            (v.abs() > 0.5).then_some((i, v))
        })
        .collect();
    SparseVector::new(entries).unwrap()
}

/// Members drawing their support vectors from one shared pool
fn overlapping_models(num_models: usize) -> Vec<SVMModel> {
    let mut rng = Lcg(42);
    let pool: Vec<SparseVector> = (0..POOL_SIZE).map(|_| random_vector(&mut rng)).collect();
    (0..num_models)
        .map(|m| {
            let start = (m * 37) % POOL_SIZE;
            let svs: Vec<SparseVector> = (0..MODEL_SIZE)
                .map(|k| pool[(start + k) % POOL_SIZE].clone())
                .collect();
            let weights = (0..MODEL_SIZE).map(|_| rng.next()).collect();
            SVMModel::new(
                svs,
                weights,
                vec![("+1".to_string(), MODEL_SIZE / 2), ("-1".to_string(), MODEL_SIZE - MODEL_SIZE / 2)],
                vec![rng.next()],
                Kernel::rbf(0.1),
            )
            .unwrap()
        })
        .collect()
}

fn bench_ensemble_vs_separate(c: &mut Criterion) {
    let mut group = c.benchmark_group("ensemble_decision_values");
    let mut rng = Lcg(7);
    let instances: Vec<SparseVector> = (0..100).map(|_| random_vector(&mut rng)).collect();

    for num_models in [2usize, 8, 32].iter() {
        let separate = overlapping_models(*num_models);
        let ensemble = SVMEnsemble::from_models(overlapping_models(*num_models)).unwrap();

        group.bench_with_input(BenchmarkId::new("separate", num_models), num_models, |b, _| {
            b.iter(|| {
                for x in &instances {
                    for model in &separate {
                        black_box(model.decision_value(black_box(x)).unwrap());
                    }
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("ensemble", num_models), num_models, |b, _| {
            b.iter(|| {
                for x in &instances {
                    black_box(ensemble.decision_value(black_box(x)).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_dense_prediction(c: &mut Criterion) {
    let mut rng = Lcg(11);
    let instances: Vec<Vec<f64>> = (0..100)
        .map(|_| random_vector(&mut rng).dense())
        .collect();
    let ensemble = SVMEnsemble::from_models(overlapping_models(8)).unwrap();

    c.bench_function("ensemble_predict_dense", |b| {
        b.iter(|| {
            for x in &instances {
                black_box(ensemble.predict_dense(black_box(x)).unwrap());
            }
        });
    });
}

criterion_group!(benches, bench_ensemble_vs_separate, bench_dense_prediction);
criterion_main!(benches);
