//! Error types for the factorization crate.

use data_loader::DataLoadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    /// A hyper-parameter is out of its valid range
    #[error("Invalid factorization config: {0}")]
    InvalidConfig(String),

    /// An input matrix does not line up with the rating matrix
    #[error("{what} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A factor became NaN or infinite
    #[error("Training diverged at iteration {iteration}")]
    Diverged { iteration: usize },

    /// Factor allocation failed
    #[error(transparent)]
    Data(#[from] DataLoadError),
}

pub type Result<T> = std::result::Result<T, TrainError>;
