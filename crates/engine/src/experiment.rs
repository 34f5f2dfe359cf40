//! # Experiment Runner
//!
//! Wires the whole run together for the binary:
//! 1. Load and index the ratings
//! 2. Load relation and content files (in parallel)
//! 3. Hold out the test partition
//! 4. Bootstrap the session
//! 5. Run the fused model through the lifecycle

use crate::config::RecommenderConfig;
use crate::lifecycle::Recommender;
use crate::models::FusedModel;
use crate::session::SessionContext;
use anyhow::{Context, Result};
use data_loader::DataIndex;
use data_loader::split::{split_by_date, split_by_ratio};
use evaluator::EvaluationResult;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Input files of one run
#[derive(Debug, Clone, Default)]
pub struct ExperimentInputs {
    pub ratings: PathBuf,
    pub relations: Option<PathBuf>,
    pub content: Option<PathBuf>,
}

/// Everything the binary reports about a run
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub model: String,
    pub users: usize,
    pub items: usize,
    pub ratings: usize,
    pub train_ratings: usize,
    pub test_ratings: usize,
    pub has_relations: bool,
    pub has_content: bool,
    pub result: EvaluationResult,
}

pub fn run_experiment(config: &RecommenderConfig, inputs: &ExperimentInputs) -> Result<ExperimentReport> {
    let start = Instant::now();

    let data = DataIndex::load_from_files(&inputs.ratings)
        .with_context(|| format!("Failed to load ratings from {:?}", inputs.ratings))?;
    let side = data
        .load_side_information(inputs.relations.as_deref(), inputs.content.as_deref())
        .context("Failed to load side information")?;

    let split = match (config.split_by_date, data.time_matrix()) {
        (true, Some(timestamps)) => split_by_date(data.rate_matrix(), config.train_ratio, timestamps),
        _ => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            split_by_ratio(data.rate_matrix(), config.train_ratio, &mut rng)
        }
    }
    .context("Failed to split ratings into train and test")?;
    info!(
        "Test split: {} train, {} test ratings",
        split.train.len(),
        split.held_out.len()
    );

    let session = SessionContext::bootstrap(config, &data).context("Failed to bootstrap session")?;
    let model = FusedModel::new(config.factorization()).context("Invalid model configuration")?;

    let (users, items, ratings) = data.counts();
    let (train_ratings, test_ratings) = (split.train.len(), split.held_out.len());
    let (has_relations, has_content) = (side.relations.is_some(), side.content.is_some());

    let mut recommender = Recommender::new(session, config.clone(), model, split.train, split.held_out)
        .context("Failed to set up the recommender")?
        .with_side_information(side)
        .with_timestamps(data.time_matrix().cloned());
    let result = recommender.execute().context("Recommender run failed")?;

    info!("Experiment finished in {:.2?}", start.elapsed());
    Ok(ExperimentReport {
        model: FusedModel::NAME.to_string(),
        users,
        items,
        ratings,
        train_ratings,
        test_ratings,
        has_relations,
        has_content,
        result,
    })
}
