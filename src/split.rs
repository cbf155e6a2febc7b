//! Randomized Haar-like split tests and the Monte-Carlo split search.

use rand::Rng;

use crate::gain::{GainCriterion, MIN_GAIN};
use crate::patch::{Patch, Rect};

/// Minimum side length of a split rectangle, in pixels.
const MIN_RECT_EXTENT: usize = 2;

/// A randomized weak learner: the difference of two area-normalized
/// rectangle sums on one channel, thresholded.
///
/// The feature value for a patch is
/// `sum(p, channel) / area(p) - sum(q, channel) / area(q)`, and the test
/// routes a patch left when the feature exceeds the threshold. A test is
/// immutable once constructed; `gain` records the score it achieved during
/// the search that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitTest {
    p: Rect,
    q: Rect,
    channel: usize,
    threshold: f64,
    gain: f64,
}

impl SplitTest {
    /// The zero-gain sentinel returned when no improving split exists.
    ///
    /// Its rectangles are degenerate single-pixel placeholders; tree
    /// induction turns the node into a leaf without ever evaluating it.
    pub(crate) fn sentinel() -> Self {
        Self {
            p: Rect::new_unchecked(0, 0, 0, 0),
            q: Rect::new_unchecked(0, 0, 0, 0),
            channel: 0,
            threshold: 0.0,
            gain: MIN_GAIN,
        }
    }

    /// Draw a uniformly random candidate test from a non-empty sample pool.
    ///
    /// The channel is uniform over the pool's channels, both rectangles are
    /// uniform in-bounds rectangles with sides in `[2, size]`, and the
    /// threshold is the feature value of one uniformly drawn pool sample,
    /// so every candidate threshold is realizable on the training data.
    pub(crate) fn random<P: Patch>(pool: &[P], rng: &mut impl Rng) -> Self {
        debug_assert!(!pool.is_empty(), "candidate draw requires a non-empty pool");
        let size = pool[0].size();
        let mut test = Self {
            p: random_rect(size, rng),
            q: random_rect(size, rng),
            channel: rng.gen_range(0..pool[0].n_channels()),
            threshold: 0.0,
            gain: MIN_GAIN,
        };
        let sample = &pool[rng.gen_range(0..pool.len())];
        test.threshold = test.feature(sample);
        test
    }

    /// Monte-Carlo search for the best of `n_candidates` random tests.
    ///
    /// Each candidate is drawn via [`SplitTest::random`] from the positive
    /// pool, scored by routing both pools through it and handing the four
    /// left/right counts to `criterion`, and the strictly greatest gain wins
    /// (first seen on ties). When either pool is empty the search returns
    /// the [`MIN_GAIN`] sentinel immediately — that is the stopping signal
    /// tree induction consumes, not an error.
    ///
    /// Cost is O(`n_candidates` · (|pos| + |neg|)); no threshold sweep.
    pub fn best<P: Patch>(
        pos: &[P],
        neg: &[P],
        n_candidates: usize,
        criterion: GainCriterion,
        rng: &mut impl Rng,
    ) -> Self {
        let mut curr_best = Self::sentinel();

        if pos.is_empty() || neg.is_empty() {
            return curr_best;
        }

        for _ in 0..n_candidates {
            let mut test = Self::random(pos, rng);

            let n_l_pos = pos.iter().filter(|p| test.evaluate(p)).count();
            let n_r_pos = pos.len() - n_l_pos;
            let n_l_neg = neg.iter().filter(|p| test.evaluate(p)).count();
            let n_r_neg = neg.len() - n_l_neg;

            test.gain = criterion.gain(n_l_pos, n_l_neg, n_r_pos, n_r_neg);

            if test.gain > curr_best.gain {
                curr_best = test;
            }
        }
        curr_best
    }

    /// The raw Haar-like feature response for a patch.
    #[must_use]
    pub fn feature<P: Patch>(&self, patch: &P) -> f64 {
        debug_assert!(self.p.require_within(patch.size()).is_ok());
        debug_assert!(self.q.require_within(patch.size()).is_ok());
        patch.sum(self.p, self.channel) / self.p.area() as f64
            - patch.sum(self.q, self.channel) / self.q.area() as f64
    }

    /// Apply the test: `true` routes the patch to the left child.
    #[must_use]
    pub fn evaluate<P: Patch>(&self, patch: &P) -> bool {
        self.feature(patch) > self.threshold
    }

    /// Partition an owned set of patches into (left, right) by this test.
    pub fn partition<P: Patch>(&self, patches: Vec<P>) -> (Vec<P>, Vec<P>) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for patch in patches {
            if self.evaluate(&patch) {
                left.push(patch);
            } else {
                right.push(patch);
            }
        }
        (left, right)
    }

    /// The positive rectangle.
    #[must_use]
    pub fn p(&self) -> Rect {
        self.p
    }

    /// The negative rectangle.
    #[must_use]
    pub fn q(&self) -> Rect {
        self.q
    }

    /// The channel both rectangle sums are taken on.
    #[must_use]
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The decision threshold on the feature value.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The gain this test scored during the search that selected it.
    #[must_use]
    pub fn gain(&self) -> f64 {
        self.gain
    }
}

/// Draw a uniform in-bounds rectangle with both sides in `[2, size]`.
fn random_rect(size: usize, rng: &mut impl Rng) -> Rect {
    debug_assert!(size >= MIN_RECT_EXTENT);
    let x0 = rng.gen_range(0..=size - MIN_RECT_EXTENT);
    let y0 = rng.gen_range(0..=size - MIN_RECT_EXTENT);
    let w = rng.gen_range(MIN_RECT_EXTENT..=size - x0);
    let h = rng.gen_range(MIN_RECT_EXTENT..=size - y0);
    Rect::new_unchecked(x0, y0, x0 + w - 1, y0 + h - 1)
}
