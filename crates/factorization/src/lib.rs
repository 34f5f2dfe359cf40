//! # Factorization Crate
//!
//! Multi-source latent factor model for implicit feedback. User and item
//! factors are fitted to the interaction matrix with confidence weights,
//! while item factors are also tied to an item relation graph and to a
//! linear projection of item content features.
//!
//! ## Components
//!
//! - **config**: `FactorizationConfig` hyper-parameters
//! - **model**: `ModelState` (factors, Gram caches, content scores, scoring)
//! - **trainer**: `FusedTrainer`, the coordinate-descent sweeps
//! - **error**: `TrainError`
//!
//! ## Example Usage
//!
//! ```ignore
//! use factorization::{FactorizationConfig, FusedTrainer, TrainingData};
//!
//! let trainer = FusedTrainer::new(FactorizationConfig::default().with_factors(20))?;
//! let data = TrainingData::new(&train)
//!     .with_relations(side.relations.as_ref())
//!     .with_content(side.content.as_ref());
//! let model = trainer.fit(data)?;
//!
//! let score = model.score(user, item);
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod trainer;

pub use config::FactorizationConfig;
pub use error::{Result, TrainError};
pub use model::ModelState;
pub use trainer::{FusedTrainer, SweepBuffers, TrainingData};
