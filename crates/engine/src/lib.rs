//! # Engine Crate
//!
//! Runs a recommender model from configuration to a reported evaluation.
//!
//! ## Main Components
//!
//! - **config**: `RecommenderConfig`, the JSON run configuration
//! - **session**: `SessionContext`, per-run data statistics and settings
//! - **models**: `RecommenderModel` seam and the `FusedModel` adapter
//! - **lifecycle**: `Recommender`, the forward-only run state machine
//! - **store**: `JsonModelStore` for model snapshots
//! - **experiment**: file loading and splitting around a lifecycle run

pub mod config;
pub mod error;
pub mod experiment;
pub mod lifecycle;
pub mod models;
pub mod session;
pub mod store;

pub use config::RecommenderConfig;
pub use error::{EngineError, Result};
pub use experiment::{ExperimentInputs, ExperimentReport, run_experiment};
pub use lifecycle::{LifecycleState, Recommender};
pub use models::{FusedModel, FusedSnapshot, IterationMonitor, RecommenderModel, RunToCompletion, TrainInputs};
pub use session::SessionContext;
pub use store::JsonModelStore;
