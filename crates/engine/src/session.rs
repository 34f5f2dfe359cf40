//! Per-run context shared by every component of a run.
//!
//! Built once from the configuration and the loaded data, then shared by
//! `Arc`. A different configuration gets a new context through `rearm`;
//! nothing in a context changes after it is built.

use crate::config::RecommenderConfig;
use crate::error::{EngineError, Result};
use data_loader::{DataIndex, RatingScale};
use evaluator::EvalConfig;
use similarity::CorrelationEngine;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SessionContext {
    rating_scale: RatingScale,
    num_users: usize,
    num_items: usize,
    timestamp_range: Option<(i64, i64)>,
    num_cpus: usize,
    correlation: CorrelationEngine,
    diversity: bool,
    eval: EvalConfig,
}

impl SessionContext {
    /// Derive the context for `config` over `data`
    pub fn bootstrap(config: &RecommenderConfig, data: &DataIndex) -> Result<Arc<Self>> {
        let rating_scale = data
            .rating_scale()
            .cloned()
            .ok_or_else(|| EngineError::MissingInput("rating scale (no ratings loaded)".into()))?;

        let context = Self::build(
            config,
            rating_scale,
            data.num_users(),
            data.num_items(),
            data.timestamp_range(),
        )?;
        info!(
            "Session: {} users, {} items, scale [{}, {}], {} cpus",
            context.num_users,
            context.num_items,
            context.rating_scale.min(),
            context.rating_scale.max(),
            context.num_cpus
        );
        Ok(Arc::new(context))
    }

    /// Same data statistics, settings taken from `config`
    pub fn rearm(&self, config: &RecommenderConfig) -> Result<Arc<Self>> {
        let context = Self::build(
            config,
            self.rating_scale.clone(),
            self.num_users,
            self.num_items,
            self.timestamp_range,
        )?;
        Ok(Arc::new(context))
    }

    fn build(
        config: &RecommenderConfig,
        rating_scale: RatingScale,
        num_users: usize,
        num_items: usize,
        timestamp_range: Option<(i64, i64)>,
    ) -> Result<Self> {
        config.validate()?;

        let num_cpus = match config.num_cpus {
            0 => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        };
        let correlation = CorrelationEngine::new(config.similarity)
            .with_shrinkage(config.shrinkage)
            .with_midpoint(rating_scale.midpoint());

        Ok(Self {
            rating_scale,
            num_users,
            num_items,
            timestamp_range,
            num_cpus,
            correlation,
            diversity: config.diversity,
            eval: config.evaluation(num_cpus),
        })
    }

    pub fn rating_scale(&self) -> &RatingScale {
        &self.rating_scale
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// `(earliest, latest)` rating timestamp, when the data has any
    pub fn timestamp_range(&self) -> Option<(i64, i64)> {
        self.timestamp_range
    }

    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    pub fn correlation(&self) -> &CorrelationEngine {
        &self.correlation
    }

    pub fn diversity_enabled(&self) -> bool {
        self.diversity
    }

    pub fn eval_config(&self) -> &EvalConfig {
        &self.eval
    }
}
