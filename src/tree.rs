use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::error::ForestError;
use crate::gain::{GainCriterion, MIN_GAIN};
use crate::node::{Node, NodeIndex};
use crate::patch::Patch;
use crate::split::SplitTest;

/// Order in which tree nodes are grown.
///
/// Both strategies honor the same stopping rule and produce logically
/// identical trees for a given candidate draw sequence; they differ only in
/// arena node ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthStrategy {
    /// Grow one subtree to completion before the next, via an explicit
    /// work stack. Node indices follow a pre-order layout.
    DepthFirst,
    /// Grow one full depth layer at a time, searching the layer's candidate
    /// splits in parallel. Node indices follow a level-order layout.
    BreadthFirst,
}

/// Configuration for a single patch-classification tree.
///
/// Construct via [`TreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default      |
/// |---------------------|--------------|
/// | `max_depth`         | 10           |
/// | `n_candidate_tests` | 1000         |
/// | `criterion`         | `Gini`       |
/// | `strategy`          | `DepthFirst` |
/// | `seed`              | 42           |
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub(crate) max_depth: usize,
    pub(crate) n_candidate_tests: usize,
    pub(crate) criterion: GainCriterion,
    pub(crate) strategy: GrowthStrategy,
    pub(crate) seed: u64,
}

impl TreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: 10,
            n_candidate_tests: 1000,
            criterion: GainCriterion::Gini,
            strategy: GrowthStrategy::DepthFirst,
            seed: 42,
        }
    }

    /// Set the maximum tree depth. The root is depth 0, so `0` yields a
    /// single-leaf tree.
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

    /// Set the induction order.
    #[must_use]
    pub fn with_strategy(mut self, strategy: GrowthStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the maximum depth.
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

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train a tree on owned positive and negative patch pools.
    ///
    /// Either pool may be empty; the tree then degenerates to a single
    /// leaf. The trained tree owns its samples: leaves keep the subsets
    /// that reached them.
    ///
    /// # Errors
    ///
    /// | Variant                                | When                                   |
    /// |----------------------------------------|----------------------------------------|
    /// | [`ForestError::InvalidCandidateCount`] | `n_candidate_tests` is zero            |
    /// | [`ForestError::EmptyTrainingSet`]      | both pools are empty                   |
    /// | [`ForestError::PatchTooSmall`]         | patch side length is below 2           |
    /// | [`ForestError::ZeroChannels`]          | patches report zero channels           |
    /// | [`ForestError::PatchShapeMismatch`]    | samples disagree on size or channels   |
    #[instrument(skip(self, pos, neg), fields(n_pos = pos.len(), n_neg = neg.len()))]
    pub fn fit<P>(&self, pos: Vec<P>, neg: Vec<P>) -> Result<Tree<P>, ForestError>
    where
        P: Patch + Send + Sync,
    {
        if self.n_candidate_tests == 0 {
            return Err(ForestError::InvalidCandidateCount { n_candidates: 0 });
        }
        let (patch_size, n_channels) = validate_pools(&pos, &neg)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let nodes = match self.strategy {
            GrowthStrategy::DepthFirst => self.grow_depth_first(pos, neg, &mut rng),
            GrowthStrategy::BreadthFirst => self.grow_breadth_first(pos, neg, &mut rng),
        };

        debug!(n_nodes = nodes.len(), "tree built");

        Ok(Tree {
            nodes,
            patch_size,
            n_channels,
        })
    }

    /// Depth-first induction over an explicit work stack.
    ///
    /// Each frame carries the arena slot its resolved index must be written
    /// to: split nodes are appended with placeholder children, and the
    /// placeholders are patched as the child frames resolve. The root frame
    /// is processed first, so the root always lands at index 0.
    fn grow_depth_first<P: Patch>(
        &self,
        pos: Vec<P>,
        neg: Vec<P>,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Node<P>> {
        struct Frame<P> {
            pos: Vec<P>,
            neg: Vec<P>,
            depth: usize,
            slot: ParentSlot,
        }

        let mut nodes: Vec<Node<P>> = Vec::new();
        let mut stack = vec![Frame {
            pos,
            neg,
            depth: 0,
            slot: ParentSlot::Root,
        }];

        while let Some(frame) = stack.pop() {
            let test = SplitTest::best(
                &frame.pos,
                &frame.neg,
                self.n_candidate_tests,
                self.criterion,
                rng,
            );

            let idx = nodes.len();
            if test.gain() == MIN_GAIN || frame.depth == self.max_depth {
                nodes.push(Node::leaf(frame.pos, frame.neg));
                resolve_slot(&mut nodes, frame.slot, idx);
                continue;
            }

            let (l_pos, r_pos) = test.partition(frame.pos);
            let (l_neg, r_neg) = test.partition(frame.neg);

            nodes.push(Node::Split {
                test,
                left: NodeIndex::new(idx),
                right: NodeIndex::new(idx),
            });
            resolve_slot(&mut nodes, frame.slot, idx);

            stack.push(Frame {
                pos: r_pos,
                neg: r_neg,
                depth: frame.depth + 1,
                slot: ParentSlot::RightOf(idx),
            });
            stack.push(Frame {
                pos: l_pos,
                neg: l_neg,
                depth: frame.depth + 1,
                slot: ParentSlot::LeftOf(idx),
            });
        }

        nodes
    }

    /// Breadth-first induction, one full depth layer at a time.
    ///
    /// The candidate search for all open subtrees of a layer is independent
    /// and read-only, so it runs under rayon with a private per-subtree RNG
    /// seeded from the tree RNG. Nodes for the layer are then appended
    /// contiguously with sequential child index pairs.
    fn grow_breadth_first<P>(
        &self,
        pos: Vec<P>,
        neg: Vec<P>,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Node<P>>
    where
        P: Patch + Send + Sync,
    {
        let mut nodes: Vec<Node<P>> = Vec::new();
        let mut prev: Vec<(Vec<P>, Vec<P>)> = vec![(pos, neg)];

        for depth in 0..=self.max_depth {
            if prev.is_empty() {
                break;
            }

            let tests: Vec<SplitTest> = if depth == self.max_depth {
                vec![SplitTest::sentinel(); prev.len()]
            } else {
                let seeds: Vec<u64> = (0..prev.len()).map(|_| rng.r#gen()).collect();
                (0..prev.len())
                    .into_par_iter()
                    .map(|i| {
                        let mut subtree_rng = ChaCha8Rng::seed_from_u64(seeds[i]);
                        SplitTest::best(
                            &prev[i].0,
                            &prev[i].1,
                            self.n_candidate_tests,
                            self.criterion,
                            &mut subtree_rng,
                        )
                    })
                    .collect()
            };

            // First child index of the next layer: past this layer's nodes.
            let mut idx = nodes.len() + prev.len();
            let mut curr = Vec::new();
            for ((pos, neg), test) in prev.into_iter().zip(tests) {
                if test.gain() == MIN_GAIN || depth == self.max_depth {
                    nodes.push(Node::leaf(pos, neg));
                } else {
                    let (l_pos, r_pos) = test.partition(pos);
                    let (l_neg, r_neg) = test.partition(neg);

                    nodes.push(Node::Split {
                        test,
                        left: NodeIndex::new(idx),
                        right: NodeIndex::new(idx + 1),
                    });
                    idx += 2;

                    curr.push((l_pos, l_neg));
                    curr.push((r_pos, r_neg));
                }
            }
            prev = curr;
        }

        nodes
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena slot a resolved node index must be written back to.
enum ParentSlot {
    Root,
    LeftOf(usize),
    RightOf(usize),
}

/// Patch a freshly appended node's index into its parent's child slot.
fn resolve_slot<P>(nodes: &mut [Node<P>], slot: ParentSlot, idx: usize) {
    match slot {
        ParentSlot::Root => debug_assert_eq!(idx, 0, "root frame resolves first"),
        ParentSlot::LeftOf(parent) => match &mut nodes[parent] {
            Node::Split { left, .. } => *left = NodeIndex::new(idx),
            Node::Leaf { .. } => unreachable!("parent slot always names a split"),
        },
        ParentSlot::RightOf(parent) => match &mut nodes[parent] {
            Node::Split { right, .. } => *right = NodeIndex::new(idx),
            Node::Leaf { .. } => unreachable!("parent slot always names a split"),
        },
    }
}

/// Validate that both pools hold patches of one common, usable shape.
///
/// Returns the shared `(size, n_channels)`. The shared shape is taken from
/// the first sample across `pos` then `neg`; `sample_index` in the mismatch
/// error counts in that same concatenated order.
pub(crate) fn validate_pools<P: Patch>(
    pos: &[P],
    neg: &[P],
) -> Result<(usize, usize), ForestError> {
    let first = pos.first().or_else(|| neg.first());
    let Some(first) = first else {
        return Err(ForestError::EmptyTrainingSet);
    };

    let size = first.size();
    let n_channels = first.n_channels();
    if size < 2 {
        return Err(ForestError::PatchTooSmall { size });
    }
    if n_channels == 0 {
        return Err(ForestError::ZeroChannels);
    }

    for (sample_index, patch) in pos.iter().chain(neg.iter()).enumerate() {
        if patch.size() != size || patch.n_channels() != n_channels {
            return Err(ForestError::PatchShapeMismatch {
                expected_size: size,
                expected_channels: n_channels,
                got_size: patch.size(),
                got_channels: patch.n_channels(),
                sample_index,
            });
        }
    }

    Ok((size, n_channels))
}

/// A trained patch-classification tree.
///
/// Stored as an arena-based `Vec<Node>` with the root at index 0 and index
/// references between nodes. Fully built before any prediction call; nodes
/// are never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Tree<P> {
    pub(crate) nodes: Vec<Node<P>>,
    pub(crate) patch_size: usize,
    pub(crate) n_channels: usize,
}

impl<P: Patch> Tree<P> {
    /// Walk from the root to the leaf this patch falls into.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionShapeMismatch`] when the patch's
    /// size or channel count differs from the training data.
    pub fn locate(&self, patch: &P) -> Result<&Node<P>, ForestError> {
        if patch.size() != self.patch_size || patch.n_channels() != self.n_channels {
            return Err(ForestError::PredictionShapeMismatch {
                expected_size: self.patch_size,
                expected_channels: self.n_channels,
                got_size: patch.size(),
                got_channels: patch.n_channels(),
            });
        }

        let mut curr = &self.nodes[0];
        loop {
            match curr {
                Node::Leaf { .. } => return Ok(curr),
                Node::Split { test, left, right } => {
                    let next = if test.evaluate(patch) { left } else { right };
                    curr = &self.nodes[next.index()];
                }
            }
        }
    }

    /// Positive-class probability of the leaf this patch falls into.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionShapeMismatch`] on a shape mismatch.
    pub fn predict_one(&self, patch: &P) -> Result<f64, ForestError> {
        match self.locate(patch)? {
            Node::Leaf { p_pos, .. } => Ok(*p_pos),
            Node::Split { .. } => unreachable!("locate always returns a leaf"),
        }
    }

    /// Lazily map each patch to its leaf's positive-class probability.
    ///
    /// The returned iterator borrows the tree and the input slice; it can be
    /// dropped and recreated at will.
    pub fn predict<'a>(
        &'a self,
        patches: &'a [P],
    ) -> impl Iterator<Item = Result<f64, ForestError>> + 'a {
        patches.iter().map(move |patch| self.predict_one(patch))
    }
}

impl<P> Tree<P> {
    /// Borrow the node arena. The root is at index 0.
    #[must_use]
    pub fn nodes(&self) -> &[Node<P>] {
        &self.nodes
    }

    /// Return the total number of nodes (splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the patch side length this tree was trained on.
    #[must_use]
    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// Return the channel count this tree was trained on.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Return the maximum leaf depth; a single-leaf tree has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));

        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => {
                    if d > max_depth {
                        max_depth = d;
                    }
                }
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }

        max_depth
    }
}

impl<P> fmt::Display for Tree<P> {
    /// Render one line per node, indented by depth, pre-order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(0usize, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Split { test, left, right } => {
                    writeln!(f, "{}Split(gain:{:.2})", "-".repeat(depth), test.gain())?;
                    stack.push((right.index(), depth + 1));
                    stack.push((left.index(), depth + 1));
                }
                Node::Leaf { pos, neg, .. } => {
                    writeln!(f, "{}Leaf({},{})", "-".repeat(depth), pos.len(), neg.len())?;
                }
            }
        }
        Ok(())
    }
}
