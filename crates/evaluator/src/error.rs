//! Error types for the evaluator crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Invalid evaluation config: {0}")]
    InvalidConfig(String),

    /// Train and test matrices must cover the same users and items
    #[error("Test matrix is {test:?} but train matrix is {train:?}")]
    ShapeMismatch {
        train: (usize, usize),
        test: (usize, usize),
    },

    #[error("Failed to build evaluation thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Unknown measure: {0}")]
    UnknownMeasure(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;
