/// Errors from patch-forest training and prediction.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when n_candidate_tests is zero.
    #[error("n_candidate_tests must be at least 1, got {n_candidates}")]
    InvalidCandidateCount {
        /// The invalid n_candidate_tests value provided.
        n_candidates: usize,
    },

    /// Returned when a bootstrap fraction is not in (0.0, 1.0].
    #[error("bootstrap fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidBootstrapFraction {
        /// The invalid fraction value provided.
        fraction: f64,
    },

    /// Returned when the worker-pool width is explicitly set to zero.
    #[error("n_workers must be at least 1 when set, got 0")]
    InvalidWorkerCount,

    /// Returned when both the positive and negative training pools are empty.
    #[error("training requires at least one positive or negative sample")]
    EmptyTrainingSet,

    /// Returned when the patch side length cannot host a minimum-extent rectangle.
    #[error("patch size must be at least 2 to host a split rectangle, got {size}")]
    PatchTooSmall {
        /// The invalid patch side length.
        size: usize,
    },

    /// Returned when a training patch reports zero channels.
    #[error("patches must expose at least one channel")]
    ZeroChannels,

    /// Returned when a training patch differs in shape from the first sample.
    #[error(
        "patch {sample_index} has size {got_size} and {got_channels} channels, \
         expected size {expected_size} and {expected_channels} channels"
    )]
    PatchShapeMismatch {
        /// The patch side length of the first training sample.
        expected_size: usize,
        /// The channel count of the first training sample.
        expected_channels: usize,
        /// The side length of the offending sample.
        got_size: usize,
        /// The channel count of the offending sample.
        got_channels: usize,
        /// The zero-based index of the offending sample within its pool.
        sample_index: usize,
    },

    /// Returned when a prediction patch differs in shape from the training data.
    #[error(
        "prediction patch has size {got_size} and {got_channels} channels, \
         expected size {expected_size} and {expected_channels} channels"
    )]
    PredictionShapeMismatch {
        /// The patch side length the model was trained on.
        expected_size: usize,
        /// The channel count the model was trained on.
        expected_channels: usize,
        /// The side length of the offending patch.
        got_size: usize,
        /// The channel count of the offending patch.
        got_channels: usize,
    },

    /// Returned when rectangle bounds are inverted.
    #[error("rectangle bounds are inverted: ({x0},{y0})..=({x1},{y1})")]
    InvalidRect {
        /// Left bound.
        x0: usize,
        /// Top bound.
        y0: usize,
        /// Right bound.
        x1: usize,
        /// Bottom bound.
        y1: usize,
    },

    /// Returned when a rectangle extends past the patch boundary.
    #[error("rectangle end ({x1},{y1}) lies outside a patch of size {size}")]
    RectOutOfBounds {
        /// Right bound of the offending rectangle.
        x1: usize,
        /// Bottom bound of the offending rectangle.
        y1: usize,
        /// The patch side length.
        size: usize,
    },

    /// Returned when the dedicated worker pool cannot be built.
    #[error("failed to build the training worker pool")]
    WorkerPool {
        /// The underlying rayon error.
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}
