//! Model seam of the lifecycle.
//!
//! The lifecycle only sees `RecommenderModel`: it initializes, trains,
//! scores (through `RankingScorer`) and snapshots a model without knowing
//! its algorithm. `FusedModel` plugs the fused factorization in.

use crate::error::{EngineError, Result};
use crate::session::SessionContext;
use data_loader::{ItemId, SideInformation, SparseMatrix, UserId};
use evaluator::RankingScorer;
use factorization::{FactorizationConfig, FusedTrainer, ModelState, TrainingData};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use tracing::info;

/// Inputs shared by `initialize` and `train`
#[derive(Clone, Copy)]
pub struct TrainInputs<'a> {
    pub train: &'a SparseMatrix,
    pub side: &'a SideInformation,
    pub session: &'a SessionContext,
}

/// Observes training after every outer iteration
pub trait IterationMonitor {
    /// `Break` stops training
    fn after_iteration(&mut self, iteration: usize, scorer: &dyn RankingScorer) -> ControlFlow<()>;
}

/// Monitor that never stops training
pub struct RunToCompletion;

impl IterationMonitor for RunToCompletion {
    fn after_iteration(&mut self, _iteration: usize, _scorer: &dyn RankingScorer) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// A trainable model the lifecycle can drive.
///
/// `RankingScorer::name` doubles as the model name in logs and the store.
pub trait RecommenderModel: RankingScorer {
    /// Allocate parameters for the training partition
    fn initialize(&mut self, inputs: TrainInputs<'_>) -> Result<()>;

    /// Fit the model, reporting every iteration to `monitor`
    fn train(&mut self, inputs: TrainInputs<'_>, monitor: &mut dyn IterationMonitor) -> Result<()>;

    /// Hook run after training and before evaluation
    fn post_train(&mut self) -> Result<()> {
        Ok(())
    }

    /// Serializable snapshot for the model store, `None` if unsupported
    fn snapshot(&self) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

/// Scores straight from a training state
struct StateScorer<'a>(&'a ModelState);

impl RankingScorer for StateScorer<'_> {
    fn name(&self) -> &str {
        FusedModel::NAME
    }

    fn score(&self, user: UserId, item: ItemId) -> f64 {
        self.0.score(user, item)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedSnapshot {
    pub config: FactorizationConfig,
    pub state: ModelState,
}

/// Fused factorization behind the lifecycle seam
pub struct FusedModel {
    trainer: FusedTrainer,
    state: Option<ModelState>,
}

impl FusedModel {
    pub const NAME: &'static str = "fused-mf";

    pub fn new(config: FactorizationConfig) -> Result<Self> {
        Ok(Self {
            trainer: FusedTrainer::new(config)?,
            state: None,
        })
    }

    /// Rebuild a trained model from a stored snapshot
    pub fn from_snapshot(snapshot: FusedSnapshot) -> Result<Self> {
        Ok(Self {
            trainer: FusedTrainer::new(snapshot.config)?,
            state: Some(snapshot.state),
        })
    }

    pub fn config(&self) -> &FactorizationConfig {
        self.trainer.config()
    }

    pub fn state(&self) -> Option<&ModelState> {
        self.state.as_ref()
    }

    fn training_data<'a>(inputs: &TrainInputs<'a>) -> TrainingData<'a> {
        TrainingData::new(inputs.train)
            .with_relations(inputs.side.relations.as_ref())
            .with_content(inputs.side.content.as_ref())
    }
}

impl RankingScorer for FusedModel {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// `NaN` until the model is initialized
    fn score(&self, user: UserId, item: ItemId) -> f64 {
        self.state.as_ref().map_or(f64::NAN, |state| state.score(user, item))
    }
}

impl RecommenderModel for FusedModel {
    fn initialize(&mut self, inputs: TrainInputs<'_>) -> Result<()> {
        let state = ModelState::initialize(
            self.trainer.config(),
            inputs.train,
            inputs.side.content.as_ref(),
        )?;
        info!(
            "Initialized {}: {} users, {} items, k={}",
            Self::NAME,
            state.num_users(),
            state.num_items(),
            state.num_factors()
        );
        self.state = Some(state);
        Ok(())
    }

    fn train(&mut self, inputs: TrainInputs<'_>, monitor: &mut dyn IterationMonitor) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| EngineError::MissingInput("initialized model state".into()))?;

        self.trainer
            .train_state(state, Self::training_data(&inputs), |iteration, state| {
                monitor.after_iteration(iteration, &StateScorer(state))
            })?;
        Ok(())
    }

    fn snapshot(&self) -> Result<Option<serde_json::Value>> {
        let Some(state) = &self.state else {
            return Ok(None);
        };
        let snapshot = FusedSnapshot {
            config: self.trainer.config().clone(),
            state: state.clone(),
        };
        Ok(Some(serde_json::to_value(snapshot)?))
    }
}
