//! Bagged forest training with parallel per-tree bootstrap.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::error::ForestError;
use crate::gain::GainCriterion;
use crate::patch::Patch;
use crate::tree::{GrowthStrategy, Tree, TreeConfig, validate_pools};

/// Configuration for forest training.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
/// Tree-level parameters are applied identically to every member tree.
///
/// # Defaults
///
/// | Parameter                | Default        |
/// |--------------------------|----------------|
/// | `max_depth`              | 10             |
/// | `n_candidate_tests`      | 1000           |
/// | `criterion`              | `Gini`         |
/// | `strategy`               | `DepthFirst`   |
/// | `bootstrap_fraction_pos` | 0.9            |
/// | `bootstrap_fraction_neg` | 0.9            |
/// | `n_workers`              | `None` (global rayon pool) |
/// | `seed`                   | 42             |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_depth: usize,
    pub(crate) n_candidate_tests: usize,
    pub(crate) criterion: GainCriterion,
    pub(crate) strategy: GrowthStrategy,
    pub(crate) bootstrap_fraction_pos: f64,
    pub(crate) bootstrap_fraction_neg: f64,
    pub(crate) n_workers: Option<usize>,
    pub(crate) seed: u64,
}

impl ForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, ForestError> {
        if n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            max_depth: 10,
            n_candidate_tests: 1000,
            criterion: GainCriterion::Gini,
            strategy: GrowthStrategy::DepthFirst,
            bootstrap_fraction_pos: 0.9,
            bootstrap_fraction_neg: 0.9,
            n_workers: None,
            seed: 42,
        })
    }

    // --- Setters ---

    /// Set the maximum depth of every member tree.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the number of random candidate tests scored per node.
    #[must_use]
    pub fn with_n_candidate_tests(mut self, n_candidate_tests: usize) -> Self {
        self.n_candidate_tests = n_candidate_tests;
        self
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: GainCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the induction order of every member tree.
    #[must_use]
    pub fn with_strategy(mut self, strategy: GrowthStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the fraction of the positive pool drawn (with replacement) per tree.
    #[must_use]
    pub fn with_bootstrap_fraction_pos(mut self, fraction: f64) -> Self {
        self.bootstrap_fraction_pos = fraction;
        self
    }

    /// Set the fraction of the negative pool drawn (with replacement) per tree.
    #[must_use]
    pub fn with_bootstrap_fraction_neg(mut self, fraction: f64) -> Self {
        self.bootstrap_fraction_neg = fraction;
        self
    }

    /// Set the training worker-pool width.
    ///
    /// `None` runs on the global rayon pool; `Some(w)` builds a dedicated
    /// pool of `w` threads for the duration of `fit`.
    #[must_use]
    pub fn with_n_workers(mut self, n_workers: Option<usize>) -> Self {
        self.n_workers = n_workers;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the maximum tree depth.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Return the number of candidate tests per node.
    #[must_use]
    pub fn n_candidate_tests(&self) -> usize {
        self.n_candidate_tests
    }

    /// Return the split criterion.
    #[must_use]
    pub fn criterion(&self) -> GainCriterion {
        self.criterion
    }

    /// Return the induction order.
    #[must_use]
    pub fn strategy(&self) -> GrowthStrategy {
        self.strategy
    }

    /// Return the positive-pool bootstrap fraction.
    #[must_use]
    pub fn bootstrap_fraction_pos(&self) -> f64 {
        self.bootstrap_fraction_pos
    }

    /// Return the negative-pool bootstrap fraction.
    #[must_use]
    pub fn bootstrap_fraction_neg(&self) -> f64 {
        self.bootstrap_fraction_neg
    }

    /// Return the worker-pool width, if set.
    #[must_use]
    pub fn n_workers(&self) -> Option<usize> {
        self.n_workers
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train a forest on shared positive and negative patch pools.
    ///
    /// Each member tree draws a private bootstrap sample (uniform with
    /// replacement, `round(|pool| * fraction)` draws per pool) and trains
    /// independently; trees run in parallel across the configured worker
    /// pool and no state is shared besides read-only access to the pools.
    /// `fit` blocks until every tree completes, and any per-tree failure
    /// aborts the whole call — a partial forest is never returned.
    ///
    /// # Errors
    ///
    /// All tree-level validation errors (see [`TreeConfig::fit`]), plus:
    ///
    /// | Variant                                    | When                               |
    /// |--------------------------------------------|------------------------------------|
    /// | [`ForestError::InvalidBootstrapFraction`]  | either fraction outside (0.0, 1.0] |
    /// | [`ForestError::InvalidWorkerCount`]        | `n_workers` is `Some(0)`           |
    /// | [`ForestError::WorkerPool`]                | dedicated pool cannot be built     |
    #[instrument(skip(self, pos, neg), fields(n_trees = self.n_trees, n_pos = pos.len(), n_neg = neg.len()))]
    pub fn fit<P>(&self, pos: &[P], neg: &[P]) -> Result<Forest<P>, ForestError>
    where
        P: Patch + Clone + Send + Sync,
    {
        if self.n_candidate_tests == 0 {
            return Err(ForestError::InvalidCandidateCount { n_candidates: 0 });
        }
        for fraction in [self.bootstrap_fraction_pos, self.bootstrap_fraction_neg] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(ForestError::InvalidBootstrapFraction { fraction });
            }
        }
        if self.n_workers == Some(0) {
            return Err(ForestError::InvalidWorkerCount);
        }
        let (patch_size, n_channels) = validate_pools(pos, neg)?;

        info!(
            n_trees = self.n_trees,
            patch_size,
            n_channels,
            max_depth = self.max_depth,
            n_candidate_tests = self.n_candidate_tests,
            "training patch forest"
        );

        // Per-tree seeds from the master RNG, so trees are independent and
        // the run is reproducible regardless of worker scheduling.
        let mut master_rng = ChaCha8Rng::seed_from_u64(self.seed);
        let tree_seeds: Vec<u64> = (0..self.n_trees).map(|_| master_rng.r#gen()).collect();

        let tree_config = TreeConfig::new()
            .with_max_depth(self.max_depth)
            .with_n_candidate_tests(self.n_candidate_tests)
            .with_criterion(self.criterion)
            .with_strategy(self.strategy);

        let train_all = || -> Result<Vec<Tree<P>>, ForestError> {
            tree_seeds
                .into_par_iter()
                .map(|seed| {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    let boot_pos = bootstrap(pos, self.bootstrap_fraction_pos, &mut rng);
                    let boot_neg = bootstrap(neg, self.bootstrap_fraction_neg, &mut rng);
                    tree_config
                        .clone()
                        .with_seed(rng.r#gen())
                        .fit(boot_pos, boot_neg)
                })
                .collect()
        };

        let trees = match self.n_workers {
            Some(width) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(width)
                    .build()
                    .map_err(|source| ForestError::WorkerPool { source })?;
                pool.install(train_all)?
            }
            None => train_all()?,
        };

        debug!(n_trees_trained = trees.len(), "forest training complete");

        Ok(Forest {
            trees,
            patch_size,
            n_channels,
        })
    }
}

/// Draw `round(|pool| * fraction)` samples uniformly with replacement.
fn bootstrap<P: Clone>(pool: &[P], fraction: f64, rng: &mut impl Rng) -> Vec<P> {
    if pool.is_empty() {
        return Vec::new();
    }
    let draw_count = (pool.len() as f64 * fraction).round() as usize;
    (0..draw_count)
        .map(|_| pool[rng.gen_range(0..pool.len())].clone())
        .collect()
}

/// A trained ensemble of patch-classification trees.
///
/// Read-only after training; prediction averages the per-tree leaf
/// probabilities.
#[derive(Debug, Clone)]
pub struct Forest<P> {
    pub(crate) trees: Vec<Tree<P>>,
    pub(crate) patch_size: usize,
    pub(crate) n_channels: usize,
}

impl<P: Patch> Forest<P> {
    /// Averaged positive-class probability for a single patch, in [0, 1].
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionShapeMismatch`] when the patch's
    /// size or channel count differs from the training data.
    pub fn predict_one(&self, patch: &P) -> Result<f64, ForestError> {
        if patch.size() != self.patch_size || patch.n_channels() != self.n_channels {
            return Err(ForestError::PredictionShapeMismatch {
                expected_size: self.patch_size,
                expected_channels: self.n_channels,
                got_size: patch.size(),
                got_channels: patch.n_channels(),
            });
        }
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.predict_one(patch)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    /// Averaged positive-class probabilities for a batch of patches,
    /// computed in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionShapeMismatch`] if any patch has
    /// the wrong shape.
    pub fn predict(&self, patches: &[P]) -> Result<Vec<f64>, ForestError>
    where
        P: Sync,
    {
        patches
            .into_par_iter()
            .map(|patch| self.predict_one(patch))
            .collect()
    }
}

impl<P> Forest<P> {
    /// Borrow a single member tree.
    ///
    /// # Panics
    ///
    /// Panics if `i >= n_trees()`.
    #[must_use]
    pub fn tree(&self, i: usize) -> &Tree<P> {
        &self.trees[i]
    }

    /// Borrow all member trees.
    #[must_use]
    pub fn trees(&self) -> &[Tree<P>] {
        &self.trees
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the patch side length this forest was trained on.
    #[must_use]
    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// Return the channel count this forest was trained on.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::{ForestConfig, bootstrap};
    use crate::error::ForestError;
    use crate::patch::{Patch, Rect};

    /// Dense single-channel test patch with brute-force rectangle sums.
    #[derive(Clone, Debug)]
    struct GridPatch {
        size: usize,
        pixels: Vec<f64>,
    }

    impl GridPatch {
        fn new(size: usize, pixels: Vec<f64>) -> Self {
            assert_eq!(pixels.len(), size * size);
            Self { size, pixels }
        }

        fn vertical_edge(size: usize, left: f64, right: f64) -> Self {
            let pixels = (0..size * size)
                .map(|i| if i % size < size / 2 { left } else { right })
                .collect();
            Self::new(size, pixels)
        }

        fn uniform(size: usize, value: f64) -> Self {
            Self::new(size, vec![value; size * size])
        }

        fn noise(size: usize, rng: &mut impl Rng) -> Self {
            Self::new(size, (0..size * size).map(|_| rng.r#gen::<f64>()).collect())
        }
    }

    impl Patch for GridPatch {
        fn size(&self) -> usize {
            self.size
        }

        fn n_channels(&self) -> usize {
            1
        }

        fn sum(&self, rect: Rect, _channel: usize) -> f64 {
            let mut total = 0.0;
            for y in rect.y0()..=rect.y1() {
                for x in rect.x0()..=rect.x1() {
                    total += self.pixels[y * self.size + x];
                }
            }
            total
        }
    }

    fn separable_pools(n_each: usize) -> (Vec<GridPatch>, Vec<GridPatch>) {
        let pos = (0..n_each)
            .map(|_| GridPatch::vertical_edge(4, 1.0, 0.0))
            .collect();
        let neg = (0..n_each).map(|_| GridPatch::uniform(4, 0.0)).collect();
        (pos, neg)
    }

    #[test]
    fn zero_trees_is_an_error() {
        assert!(matches!(
            ForestConfig::new(0).unwrap_err(),
            ForestError::InvalidTreeCount { n_trees: 0 }
        ));
    }

    #[test]
    fn fraction_above_one_is_an_error() {
        let (pos, neg) = separable_pools(4);
        let err = ForestConfig::new(2)
            .unwrap()
            .with_bootstrap_fraction_pos(1.5)
            .fit(&pos, &neg)
            .unwrap_err();
        assert!(matches!(
            err,
            ForestError::InvalidBootstrapFraction { fraction } if fraction == 1.5
        ));
    }

    #[test]
    fn zero_fraction_is_an_error() {
        let (pos, neg) = separable_pools(4);
        let err = ForestConfig::new(2)
            .unwrap()
            .with_bootstrap_fraction_neg(0.0)
            .fit(&pos, &neg)
            .unwrap_err();
        assert!(matches!(err, ForestError::InvalidBootstrapFraction { .. }));
    }

    #[test]
    fn zero_workers_is_an_error() {
        let (pos, neg) = separable_pools(4);
        let err = ForestConfig::new(2)
            .unwrap()
            .with_n_workers(Some(0))
            .fit(&pos, &neg)
            .unwrap_err();
        assert!(matches!(err, ForestError::InvalidWorkerCount));
    }

    #[test]
    fn shape_mismatch_propagates() {
        let pos = vec![GridPatch::uniform(4, 1.0)];
        let neg = vec![GridPatch::uniform(6, 0.0)];
        let err = ForestConfig::new(2).unwrap().fit(&pos, &neg).unwrap_err();
        assert!(matches!(err, ForestError::PatchShapeMismatch { .. }));
    }

    #[test]
    fn bootstrap_draw_count_is_rounded() {
        let pool: Vec<u32> = (0..10).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(bootstrap(&pool, 0.9, &mut rng).len(), 9);
        assert_eq!(bootstrap(&pool, 1.0, &mut rng).len(), 10);
        assert_eq!(bootstrap(&pool, 0.26, &mut rng).len(), 3);
    }

    #[test]
    fn bootstrap_of_empty_pool_is_empty() {
        let pool: Vec<u32> = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(bootstrap(&pool, 0.9, &mut rng).is_empty());
    }

    #[test]
    fn bootstrap_draws_with_replacement() {
        // Drawing as many samples as a 2-element pool holds will repeat an
        // element sooner or later; check across several seeds.
        let pool = vec![0u32, 1];
        let mut saw_repeat = false;
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let draw = bootstrap(&pool, 1.0, &mut rng);
            if draw[0] == draw[1] {
                saw_repeat = true;
                break;
            }
        }
        assert!(saw_repeat);
    }

    #[test]
    fn separable_pools_predict_pure_probabilities() {
        let (pos, neg) = separable_pools(8);
        let forest = ForestConfig::new(20)
            .unwrap()
            .with_n_candidate_tests(200)
            .with_seed(42)
            .fit(&pos, &neg)
            .unwrap();

        assert_eq!(forest.n_trees(), 20);
        assert!(forest.predict_one(&pos[0]).unwrap() > 0.99);
        assert!(forest.predict_one(&neg[0]).unwrap() < 0.01);
    }

    #[test]
    fn predictions_stay_in_unit_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(77);
        let pos: Vec<GridPatch> = (0..20).map(|_| GridPatch::noise(6, &mut rng)).collect();
        let neg: Vec<GridPatch> = (0..20).map(|_| GridPatch::noise(6, &mut rng)).collect();
        let probes: Vec<GridPatch> = (0..30).map(|_| GridPatch::noise(6, &mut rng)).collect();

        let forest = ForestConfig::new(10)
            .unwrap()
            .with_n_candidate_tests(50)
            .with_max_depth(4)
            .fit(&pos, &neg)
            .unwrap();

        for p in forest.predict(&probes).unwrap() {
            assert!((0.0..=1.0).contains(&p), "prediction {p} out of range");
        }
    }

    #[test]
    fn empty_positive_pool_gives_all_zero_forest() {
        let neg: Vec<GridPatch> = (0..6).map(|_| GridPatch::uniform(4, 0.5)).collect();
        let forest = ForestConfig::new(5)
            .unwrap()
            .with_n_candidate_tests(50)
            .fit(&[] as &[GridPatch], &neg)
            .unwrap();

        for tree in forest.trees() {
            assert_eq!(tree.n_nodes(), 1);
        }
        assert_eq!(forest.predict_one(&neg[0]).unwrap(), 0.0);
    }

    #[test]
    fn single_tree_forest_matches_its_tree() {
        let (pos, neg) = separable_pools(8);
        let probes = [pos[0].clone(), neg[0].clone()];
        let forest = ForestConfig::new(1)
            .unwrap()
            .with_n_candidate_tests(200)
            .with_seed(7)
            .fit(&pos, &neg)
            .unwrap();

        for probe in &probes {
            assert_eq!(
                forest.predict_one(probe).unwrap(),
                forest.tree(0).predict_one(probe).unwrap()
            );
        }
    }

    #[test]
    fn deterministic_with_same_seed() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let pos: Vec<GridPatch> = (0..15).map(|_| GridPatch::noise(6, &mut rng)).collect();
        let neg: Vec<GridPatch> = (0..15).map(|_| GridPatch::noise(6, &mut rng)).collect();
        let probes: Vec<GridPatch> = (0..10).map(|_| GridPatch::noise(6, &mut rng)).collect();

        let config = ForestConfig::new(8)
            .unwrap()
            .with_n_candidate_tests(50)
            .with_seed(99);
        let preds1 = config.fit(&pos, &neg).unwrap().predict(&probes).unwrap();
        let preds2 = config.fit(&pos, &neg).unwrap().predict(&probes).unwrap();
        assert_eq!(preds1, preds2);
    }

    #[test]
    fn worker_pool_width_does_not_change_results() {
        let (pos, neg) = separable_pools(8);
        let probes = [pos[0].clone(), neg[0].clone()];

        let base = ForestConfig::new(6)
            .unwrap()
            .with_n_candidate_tests(100)
            .with_seed(13);
        let global = base.clone().fit(&pos, &neg).unwrap();
        let two_workers = base.with_n_workers(Some(2)).fit(&pos, &neg).unwrap();

        for probe in &probes {
            assert_eq!(
                global.predict_one(probe).unwrap(),
                two_workers.predict_one(probe).unwrap()
            );
        }
    }

    #[test]
    fn predict_rejects_foreign_patch_shape() {
        let (pos, neg) = separable_pools(4);
        let forest = ForestConfig::new(2)
            .unwrap()
            .with_n_candidate_tests(50)
            .fit(&pos, &neg)
            .unwrap();
        let err = forest.predict_one(&GridPatch::uniform(8, 0.0)).unwrap_err();
        assert!(matches!(err, ForestError::PredictionShapeMismatch { .. }));
    }
}
