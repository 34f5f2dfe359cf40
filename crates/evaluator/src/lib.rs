//! # Evaluator Crate
//!
//! Concurrent top-N ranking evaluation of a trained recommender.
//!
//! ## Main Components
//!
//! - **traits**: `RankingScorer`, the seam a model plugs into
//! - **ranking**: `RankingEvaluator` and its `EvalConfig`
//! - **metrics**: Precision, Recall, AP and NDCG for one ranked list
//! - **measure**: `Measure` names and the aggregated `EvaluationResult`
//! - **error**: Error types for evaluation
//!
//! ## Example Usage
//!
//! ```ignore
//! use evaluator::{EvalConfig, RankingEvaluator};
//!
//! let evaluator = RankingEvaluator::new(EvalConfig::default().with_top_n(10))?;
//! let result = evaluator.evaluate(&train, &test, &model, None)?;
//! println!("{result}");
//! ```

pub mod error;
pub mod measure;
pub mod metrics;
pub mod ranking;
pub mod traits;

pub use error::{EvalError, Result};
pub use measure::{EvaluationResult, Measure};
pub use ranking::{CandidatePool, EvalConfig, RankingEvaluator, TestView};
pub use traits::RankingScorer;
