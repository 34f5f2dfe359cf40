//! Run configuration, loaded from JSON.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```json
//! { "k": 20, "iterations": 30, "cutoffs": [5, 10], "early_stop": "NDCG@10" }
//! ```

use crate::error::{EngineError, Result};
use evaluator::{CandidatePool, EvalConfig, Measure, TestView};
use factorization::FactorizationConfig;
use serde::{Deserialize, Serialize};
use similarity::SimilarityMethod;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    // Model
    #[serde(alias = "k")]
    pub factors: usize,
    pub reg_user: f64,
    pub reg_item: f64,
    /// Ridge penalty `λE` on the content projection
    pub reg_content: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub iterations: usize,
    pub seed: u64,
    pub init_std: f64,

    // Similarity (diversity measures)
    pub similarity: SimilarityMethod,
    pub shrinkage: f64,
    pub diversity: bool,

    // Evaluation
    pub top_n: usize,
    pub cutoffs: Vec<usize>,
    /// Evaluation threads, 0 uses the available parallelism
    pub num_cpus: usize,
    pub test_view: TestView,
    pub candidates: CandidatePool,
    pub cold_start_threshold: usize,

    // Splitting
    /// Share of all ratings kept for training, the rest is the test set
    pub train_ratio: f64,
    /// Share of the training partition held out for validation; disabled outside (0, 1)
    pub validation_ratio: f64,
    pub split_by_date: bool,
    /// Validation measure checked after every iteration
    pub early_stop: Option<Measure>,

    // Persistence
    pub save_model: bool,
    pub model_dir: PathBuf,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        let model = FactorizationConfig::default();
        let eval = EvalConfig::default();
        Self {
            factors: model.factors,
            reg_user: model.reg_user,
            reg_item: model.reg_item,
            reg_content: model.reg_content,
            alpha: model.alpha,
            beta: model.beta,
            gamma: model.gamma,
            iterations: model.iterations,
            seed: model.seed,
            init_std: model.init_std,
            similarity: SimilarityMethod::default(),
            shrinkage: 0.0,
            diversity: false,
            top_n: eval.top_n,
            cutoffs: eval.cutoffs,
            num_cpus: eval.num_threads,
            test_view: eval.test_view,
            candidates: eval.candidates,
            cold_start_threshold: eval.cold_start_threshold,
            train_ratio: 0.8,
            validation_ratio: 0.0,
            split_by_date: false,
            early_stop: None,
            save_model: false,
            model_dir: PathBuf::from("models"),
        }
    }
}

impl RecommenderConfig {
    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from {:?}", path);
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_factors(mut self, factors: usize) -> Self {
        self.factors = factors;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_cutoffs(mut self, cutoffs: Vec<usize>) -> Self {
        self.cutoffs = cutoffs;
        self
    }

    pub fn with_num_cpus(mut self, num_cpus: usize) -> Self {
        self.num_cpus = num_cpus;
        self
    }

    pub fn with_validation(mut self, ratio: f64, early_stop: Option<Measure>) -> Self {
        self.validation_ratio = ratio;
        self.early_stop = early_stop;
        self
    }

    pub fn with_diversity(mut self, diversity: bool) -> Self {
        self.diversity = diversity;
        self
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_model = true;
        self.model_dir = dir.into();
        self
    }

    /// Whether the training partition is split again for validation
    pub fn uses_validation(&self) -> bool {
        self.validation_ratio > 0.0 && self.validation_ratio < 1.0
    }

    pub fn factorization(&self) -> FactorizationConfig {
        FactorizationConfig {
            factors: self.factors,
            reg_user: self.reg_user,
            reg_item: self.reg_item,
            reg_content: self.reg_content,
            alpha: self.alpha,
            beta: self.beta,
            gamma: self.gamma,
            iterations: self.iterations,
            seed: self.seed,
            init_std: self.init_std,
        }
    }

    /// Evaluation settings; `num_threads` is resolved by the session
    pub fn evaluation(&self, num_threads: usize) -> EvalConfig {
        EvalConfig {
            top_n: self.top_n,
            cutoffs: self.cutoffs.clone(),
            num_threads,
            test_view: self.test_view,
            candidates: self.candidates,
            cold_start_threshold: self.cold_start_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.factorization()
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        self.evaluation(self.num_cpus)
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(EngineError::Config(format!(
                "train_ratio must lie in (0, 1), got {}",
                self.train_ratio
            )));
        }
        if !self.shrinkage.is_finite() || self.shrinkage < 0.0 {
            return Err(EngineError::Config(format!(
                "shrinkage must be non-negative, got {}",
                self.shrinkage
            )));
        }

        if let Some(measure) = self.early_stop {
            let cutoff = match measure {
                Measure::Precision(c) | Measure::Recall(c) | Measure::Map(c) | Measure::Ndcg(c) => c,
                _ => {
                    return Err(EngineError::Config(format!(
                        "{measure} cannot drive early stopping"
                    )));
                }
            };
            if !self.cutoffs.contains(&cutoff) {
                return Err(EngineError::Config(format!(
                    "early stop measure {measure} needs cutoff {cutoff} in {:?}",
                    self.cutoffs
                )));
            }
        }
        Ok(())
    }
}
