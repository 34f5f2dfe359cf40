//! # Similarity Crate
//!
//! Correlation measures between rating vectors, and the shared cache the
//! evaluator uses for diversity metrics.
//!
//! ## Components
//!
//! ### Correlation Engine
//! Pearson (default), cosine, full-vector cosine, MSD, constrained Pearson
//! and extended Jaccard, with optional significance shrinkage.
//!
//! ### Correlation Cache
//! Upper-triangular, get-or-compute storage over user rows or item columns.
//! Safe to share across evaluation workers.
//!
//! ### Diversity
//! `diversity_at` scores how dissimilar the items of a ranked list are.
//!
//! ## Example Usage
//!
//! ```ignore
//! use similarity::{CorrelationCache, CorrelationEngine, CorrelationSpace, SimilarityMethod};
//! use std::sync::Arc;
//!
//! let engine = CorrelationEngine::new(SimilarityMethod::Pcc)
//!     .with_shrinkage(10.0)
//!     .with_midpoint(scale.midpoint());
//! let cache = CorrelationCache::new(Arc::new(train), CorrelationSpace::Items, engine);
//!
//! let diversity = similarity::diversity_at(&cache, &ranked_items, 10);
//! ```

pub mod cache;
pub mod correlation;
pub mod diversity;

pub use cache::{CorrelationCache, CorrelationSpace};
pub use correlation::{CorrelationEngine, SimilarityMethod};
pub use diversity::diversity_at;
