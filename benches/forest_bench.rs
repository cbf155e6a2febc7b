//! Criterion benchmarks for patchforest: forest training and prediction.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use patchforest::{ForestConfig, Patch, Rect};

/// Dense single-channel patch with a private summed-area table.
#[derive(Clone)]
struct BenchPatch {
    size: usize,
    integral: Vec<f64>,
}

impl BenchPatch {
    fn new(size: usize, pixels: &[f64]) -> Self {
        let w1 = size + 1;
        let mut integral = vec![0.0; w1 * w1];
        for y in 0..size {
            let mut row_sum = 0.0;
            for x in 0..size {
                row_sum += pixels[y * size + x];
                integral[(y + 1) * w1 + (x + 1)] = integral[y * w1 + (x + 1)] + row_sum;
            }
        }
        Self { size, integral }
    }
}

impl Patch for BenchPatch {
    fn size(&self) -> usize {
        self.size
    }

    fn n_channels(&self) -> usize {
        1
    }

    fn sum(&self, rect: Rect, _channel: usize) -> f64 {
        let w1 = self.size + 1;
        let ii = &self.integral;
        ii[(rect.y1() + 1) * w1 + (rect.x1() + 1)] + ii[rect.y0() * w1 + rect.x0()]
            - ii[rect.y0() * w1 + (rect.x1() + 1)]
            - ii[(rect.y1() + 1) * w1 + rect.x0()]
    }
}

fn make_pools(n_each: usize, size: usize, seed: u64) -> (Vec<BenchPatch>, Vec<BenchPatch>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let pos = (0..n_each)
        .map(|_| {
            // Vertical edge plus noise.
            let pixels: Vec<f64> = (0..size * size)
                .map(|i| {
                    let base = if i % size < size / 2 { 1.0 } else { 0.0 };
                    base + rng.r#gen::<f64>() * 0.2
                })
                .collect();
            BenchPatch::new(size, &pixels)
        })
        .collect();
    let neg = (0..n_each)
        .map(|_| {
            let pixels: Vec<f64> = (0..size * size).map(|_| rng.r#gen::<f64>() * 0.2).collect();
            BenchPatch::new(size, &pixels)
        })
        .collect();
    (pos, neg)
}

fn bench_forest_train(c: &mut Criterion) {
    let (pos, neg) = make_pools(100, 16, 42);
    let cfg = ForestConfig::new(10)
        .unwrap()
        .with_n_candidate_tests(200)
        .with_max_depth(6)
        .with_seed(42);

    c.bench_function("forest_train_100x16px_10trees", |b| {
        b.iter(|| cfg.fit(&pos, &neg).unwrap());
    });
}

fn bench_forest_predict(c: &mut Criterion) {
    let (pos, neg) = make_pools(100, 16, 42);
    let forest = ForestConfig::new(10)
        .unwrap()
        .with_n_candidate_tests(200)
        .with_max_depth(6)
        .with_seed(42)
        .fit(&pos, &neg)
        .unwrap();
    let probes: Vec<BenchPatch> = pos.iter().chain(neg.iter()).cloned().collect();

    c.bench_function("forest_predict_200x16px_10trees", |b| {
        b.iter(|| forest.predict(&probes).unwrap());
    });
}

criterion_group!(benches, bench_forest_train, bench_forest_predict);
criterion_main!(benches);
