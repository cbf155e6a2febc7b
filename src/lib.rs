//! Binary patch classification with random forests of Haar-like features.
//!
//! Provides randomized decision trees whose split tests are differences of
//! two area-normalized rectangle sums on a chosen channel, evaluated in O(1)
//! against any [`Patch`] backed by a summed-area table. Trees grow by
//! Monte-Carlo split search (Gini or entropy gain), forests train their
//! members on independent bootstrap samples in parallel via rayon, and
//! prediction averages per-tree leaf probabilities.
//!
//! The crate never touches pixels or files: training and prediction data
//! enter through the [`Patch`] trait, and a surrounding driver owns image
//! decoding and integral-image construction.

mod error;
mod forest;
mod gain;
mod node;
mod patch;
mod split;
mod tree;

pub use error::ForestError;
pub use forest::{Forest, ForestConfig};
pub use gain::{GainCriterion, MIN_GAIN, entropy, entropy_gain, gini, gini_gain};
pub use node::{Node, NodeIndex};
pub use patch::{Patch, Rect};
pub use split::SplitTest;
pub use tree::{GrowthStrategy, Tree, TreeConfig};
