//! Impurity and gain math for scoring binary partitions.

/// Sentinel gain meaning "no improving split found".
///
/// Both criteria are true gains (parent impurity minus weighted child
/// impurities), so zero is their common minimum: a candidate that fails to
/// reduce impurity scores 0, and tree induction turns a node whose best
/// candidate scores 0 into a leaf.
pub const MIN_GAIN: f64 = 0.0;

/// Probability clamp applied before taking logarithms in [`entropy`].
const ENTROPY_EPS: f64 = 1e-3;

/// Binary Shannon entropy of a (pos, neg) count pair, in nats.
///
/// Returns 0.0 for a pure or empty node. The positive-class probability is
/// clamped to `[1e-3, 1 - 1e-3]` before the logarithms.
#[must_use]
pub fn entropy(n_pos: usize, n_neg: usize) -> f64 {
    if n_pos == 0 || n_neg == 0 {
        return 0.0;
    }
    let p = (n_pos as f64 / (n_pos + n_neg) as f64).clamp(ENTROPY_EPS, 1.0 - ENTROPY_EPS);
    -(p * p.ln() + (1.0 - p) * (1.0 - p).ln())
}

/// Gini impurity of a (pos, neg) count pair.
///
/// Returns 0.0 for an empty node; `1 - p² - (1-p)²` otherwise.
#[must_use]
pub fn gini(n_pos: usize, n_neg: usize) -> f64 {
    if n_pos + n_neg == 0 {
        return 0.0;
    }
    let p = n_pos as f64 / (n_pos + n_neg) as f64;
    1.0 - (p * p + (1.0 - p) * (1.0 - p))
}

/// Gini gain of splitting a parent set into the given left/right children.
///
/// Computed as parent impurity minus size-weighted child impurities.
/// Returns [`MIN_GAIN`] when either child is empty: a split that routes
/// everything one way carries no information.
#[must_use]
pub fn gini_gain(n_l_pos: usize, n_l_neg: usize, n_r_pos: usize, n_r_neg: usize) -> f64 {
    let n_left = n_l_pos + n_l_neg;
    let n_right = n_r_pos + n_r_neg;
    if n_left == 0 || n_right == 0 {
        return MIN_GAIN;
    }
    let n_total = (n_left + n_right) as f64;

    gini(n_l_pos + n_r_pos, n_l_neg + n_r_neg)
        - n_left as f64 / n_total * gini(n_l_pos, n_l_neg)
        - n_right as f64 / n_total * gini(n_r_pos, n_r_neg)
}

/// Entropy gain of splitting a parent set into the given left/right children.
///
/// Computed as parent entropy minus size-weighted child entropies, the same
/// polarity as [`gini_gain`], so both criteria maximize against the shared
/// [`MIN_GAIN`] sentinel. Returns [`MIN_GAIN`] when either child is empty.
/// The probability clamp in [`entropy`] can push the raw difference
/// marginally below zero near purity; the result is floored at 0.
#[must_use]
pub fn entropy_gain(n_l_pos: usize, n_l_neg: usize, n_r_pos: usize, n_r_neg: usize) -> f64 {
    let n_left = n_l_pos + n_l_neg;
    let n_right = n_r_pos + n_r_neg;
    if n_left == 0 || n_right == 0 {
        return MIN_GAIN;
    }
    let n_total = (n_left + n_right) as f64;

    let raw = entropy(n_l_pos + n_r_pos, n_l_neg + n_r_neg)
        - n_left as f64 / n_total * entropy(n_l_pos, n_l_neg)
        - n_right as f64 / n_total * entropy(n_r_pos, n_r_neg);
    raw.max(MIN_GAIN)
}

/// Criterion for scoring candidate split tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainCriterion {
    /// Gini impurity decrease: 1 - p² - (1-p)²
    Gini,
    /// Binary Shannon entropy decrease: -(p·ln(p) + (1-p)·ln(1-p))
    Entropy,
}

impl GainCriterion {
    /// Impurity of a node from its (pos, neg) counts.
    #[must_use]
    pub fn impurity(&self, n_pos: usize, n_neg: usize) -> f64 {
        match self {
            GainCriterion::Gini => gini(n_pos, n_neg),
            GainCriterion::Entropy => entropy(n_pos, n_neg),
        }
    }

    /// Gain of a binary partition from its left/right (pos, neg) counts.
    #[must_use]
    pub fn gain(&self, n_l_pos: usize, n_l_neg: usize, n_r_pos: usize, n_r_neg: usize) -> f64 {
        match self {
            GainCriterion::Gini => gini_gain(n_l_pos, n_l_neg, n_r_pos, n_r_neg),
            GainCriterion::Entropy => entropy_gain(n_l_pos, n_l_neg, n_r_pos, n_r_neg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GainCriterion, MIN_GAIN, entropy, entropy_gain, gini, gini_gain};

    // --- gini ---

    #[test]
    fn gini_pure_pos() {
        assert_eq!(gini(7, 0), 0.0);
    }

    #[test]
    fn gini_pure_neg() {
        assert_eq!(gini(0, 3), 0.0);
    }

    #[test]
    fn gini_empty() {
        assert_eq!(gini(0, 0), 0.0);
    }

    #[test]
    fn gini_balanced() {
        assert!((gini(5, 5) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn gini_skewed() {
        // p = 0.25: 1 - (0.0625 + 0.5625) = 0.375
        assert!((gini(1, 3) - 0.375).abs() < 1e-12);
    }

    // --- entropy ---

    #[test]
    fn entropy_pure() {
        assert_eq!(entropy(5, 0), 0.0);
        assert_eq!(entropy(0, 5), 0.0);
    }

    #[test]
    fn entropy_balanced_is_ln_two() {
        assert!((entropy(5, 5) - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn entropy_clamp_keeps_value_finite() {
        // Extremely skewed counts hit the 1e-3 clamp instead of a log singularity.
        let e = entropy(1, 1_000_000);
        assert!(e.is_finite() && e > 0.0);
    }

    // --- gini_gain ---

    #[test]
    fn gini_gain_empty_left_child() {
        assert_eq!(gini_gain(0, 0, 5, 5), MIN_GAIN);
    }

    #[test]
    fn gini_gain_empty_right_child() {
        assert_eq!(gini_gain(5, 5, 0, 0), MIN_GAIN);
    }

    #[test]
    fn gini_gain_perfect_split() {
        // Parent (5,5) has impurity 0.5; pure children have 0.
        assert!((gini_gain(5, 0, 0, 5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn gini_gain_useless_split() {
        // Both children mirror the parent distribution: no information.
        assert!(gini_gain(3, 3, 2, 2).abs() < 1e-12);
    }

    #[test]
    fn gini_gain_partial_split() {
        // gini(6,4) = 0.48, children: gini(5,1) = 5/18, gini(1,3) = 0.375
        let expected = 0.48 - 0.6 * (5.0 / 18.0) - 0.4 * 0.375;
        assert!((gini_gain(5, 1, 1, 3) - expected).abs() < 1e-12);
    }

    // --- entropy_gain ---

    #[test]
    fn entropy_gain_empty_child() {
        assert_eq!(entropy_gain(0, 0, 4, 4), MIN_GAIN);
        assert_eq!(entropy_gain(4, 4, 0, 0), MIN_GAIN);
    }

    #[test]
    fn entropy_gain_perfect_split() {
        // Parent (5,5) has entropy ln 2; pure children have 0.
        assert!((entropy_gain(5, 0, 0, 5) - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn entropy_gain_never_negative() {
        for (lp, ln, rp, rn) in [(3, 3, 2, 2), (1, 0, 0, 1), (9, 1, 1, 9), (1, 1, 1, 1)] {
            assert!(entropy_gain(lp, ln, rp, rn) >= 0.0);
        }
    }

    // --- GainCriterion dispatch ---

    #[test]
    fn criterion_gini_matches_free_function() {
        let c = GainCriterion::Gini;
        assert_eq!(c.impurity(5, 5), gini(5, 5));
        assert_eq!(c.gain(5, 0, 0, 5), gini_gain(5, 0, 0, 5));
    }

    #[test]
    fn criterion_entropy_matches_free_function() {
        let c = GainCriterion::Entropy;
        assert_eq!(c.impurity(5, 5), entropy(5, 5));
        assert_eq!(c.gain(5, 0, 0, 5), entropy_gain(5, 0, 0, 5));
    }
}
