use std::fmt;

use crate::split::SplitTest;

/// Index into a tree's `Vec<Node>` arena, identifying a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in a tree arena.
///
/// Trees are stored as `Vec<Node>` where children are referenced by
/// [`NodeIndex`] rather than pointers, so arena growth never invalidates a
/// reference and traversal is cache-friendly.
#[derive(Debug, Clone)]
pub enum Node<P> {
    /// An interior node holding a split test.
    Split {
        /// The Haar-like test that routes patches left or right.
        test: SplitTest,
        /// Index of the left child (test evaluates true).
        left: NodeIndex,
        /// Index of the right child (test evaluates false).
        right: NodeIndex,
    },
    /// A terminal node owning its final sample subsets.
    Leaf {
        /// Positive training samples that ended up in this leaf.
        pos: Vec<P>,
        /// Negative training samples that ended up in this leaf.
        neg: Vec<P>,
        /// Fraction of positives among the leaf's samples, in [0, 1].
        p_pos: f64,
    },
}

impl<P> Node<P> {
    /// Build a leaf from its final sample subsets, deriving `p_pos`.
    ///
    /// A leaf with both subsets empty cannot arise from a well-formed
    /// partition of a non-empty parent; the constructor asserts it.
    pub(crate) fn leaf(pos: Vec<P>, neg: Vec<P>) -> Self {
        debug_assert!(
            !pos.is_empty() || !neg.is_empty(),
            "a leaf must hold at least one sample"
        );
        let p_pos = pos.len() as f64 / (pos.len() + neg.len()) as f64;
        Node::Leaf { pos, neg, p_pos }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Return the leaf's positive-class probability, or `None` for splits.
    #[must_use]
    pub fn p_pos(&self) -> Option<f64> {
        match self {
            Node::Leaf { p_pos, .. } => Some(*p_pos),
            Node::Split { .. } => None,
        }
    }
}
