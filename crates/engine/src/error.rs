//! Error types for the engine crate.

use crate::lifecycle::LifecycleState;
use data_loader::DataLoadError;
use evaluator::EvalError;
use factorization::TrainError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Lifecycle steps only move forward
    #[error("Invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// Configuration is missing or out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A required input is absent or empty
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// The model has nothing to persist
    #[error("Model {0} does not support persistence")]
    Unsupported(String),

    #[error(transparent)]
    Data(#[from] DataLoadError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
