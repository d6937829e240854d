use thiserror::Error;

/// Failures raised while fitting or applying a projection.
///
/// Public functions return `anyhow::Result`; the concrete variant can be
/// recovered with `err.downcast_ref::<ProjectorError>()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectorError {
    #[error("the point collection holds no parameter vectors")]
    EmptyInput,

    #[error("input contains NaN or infinite values")]
    NonFiniteInput,

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error(
        "component indices {indices:?} need {required} fitted components, but only {available} are available"
    )]
    InvalidIndices {
        indices: (usize, usize),
        required: usize,
        available: usize,
    },

    #[error("cannot fit {requested} components, between 1 and {available} are available")]
    InvalidComponentCount { requested: usize, available: usize },

    #[error("SVD computation failed: {0}")]
    Decomposition(String),
}
