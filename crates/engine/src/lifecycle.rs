//! # Recommender Lifecycle
//!
//! Drives one model through a run:
//!
//! ```text
//! Uninitialized -> Initialized -> Trained -> (Validated) -> Evaluated -> (Persisted)
//! ```
//!
//! Steps only move forward; calling one out of order is an
//! `EngineError::InvalidTransition` and leaves the lifecycle untouched.
//!
//! ## Steps
//! 1. `initialize`: optional validation split of the training partition,
//!    then model parameters are allocated
//! 2. `train`: fit the model (stopping early on a validation measure when
//!    configured), create the correlation cache when diversity is
//!    enabled, run the post-train hook
//! 3. `validate`: evaluate on the validation partition
//! 4. `evaluate`: evaluate on the test partition, adding TrainTime and
//!    TestTime in milliseconds
//! 5. `persist`: write a model snapshot to the store

use crate::config::RecommenderConfig;
use crate::error::{EngineError, Result};
use crate::models::{IterationMonitor, RecommenderModel, RunToCompletion, TrainInputs};
use crate::session::SessionContext;
use crate::store::JsonModelStore;
use data_loader::split::{split_by_date, split_by_ratio};
use data_loader::{SideInformation, SparseMatrix};
use evaluator::{EvaluationResult, Measure, RankingEvaluator, RankingScorer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use similarity::{CorrelationCache, CorrelationSpace};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Trained,
    Validated,
    Evaluated,
    Persisted,
}

impl LifecycleState {
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uninitialized, Initialized)
                | (Initialized, Trained)
                | (Trained, Validated)
                | (Trained, Evaluated)
                | (Validated, Evaluated)
                | (Evaluated, Persisted)
        )
    }
}

pub struct Recommender<M: RecommenderModel> {
    session: Arc<SessionContext>,
    config: RecommenderConfig,
    model: M,
    train: Arc<SparseMatrix>,
    validation: Option<SparseMatrix>,
    test: SparseMatrix,
    side: SideInformation,
    timestamps: Option<SparseMatrix>,
    evaluator: RankingEvaluator,
    correlations: Option<CorrelationCache>,
    state: LifecycleState,
    train_time: Duration,
}

impl<M: RecommenderModel> Recommender<M> {
    /// Set up a lifecycle over a train/test split.
    ///
    /// Fails when the configuration is invalid or `train` holds no
    /// interactions.
    pub fn new(
        session: Arc<SessionContext>,
        config: RecommenderConfig,
        model: M,
        train: SparseMatrix,
        test: SparseMatrix,
    ) -> Result<Self> {
        config.validate()?;
        if train.is_empty() {
            return Err(EngineError::MissingInput("training interactions".into()));
        }
        let evaluator = RankingEvaluator::new(session.eval_config().clone())?;

        Ok(Self {
            session,
            config,
            model,
            train: Arc::new(train),
            validation: None,
            test,
            side: SideInformation::default(),
            timestamps: None,
            evaluator,
            correlations: None,
            state: LifecycleState::Uninitialized,
            train_time: Duration::ZERO,
        })
    }

    pub fn with_side_information(mut self, side: SideInformation) -> Self {
        self.side = side;
        self
    }

    /// Rating timestamps (same shape as `train`) for the temporal validation split
    pub fn with_timestamps(mut self, timestamps: Option<SparseMatrix>) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Partition the model is fitted on
    pub fn train_matrix(&self) -> &SparseMatrix {
        &self.train
    }

    pub fn validation_matrix(&self) -> Option<&SparseMatrix> {
        self.validation.as_ref()
    }

    pub fn correlations(&self) -> Option<&CorrelationCache> {
        self.correlations.as_ref()
    }

    fn ensure_next(&self, next: LifecycleState) -> Result<()> {
        if self.state.can_advance_to(next) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: self.state,
                to: next,
            })
        }
    }

    /// Run every step in order and return the test result
    #[instrument(skip_all, fields(model = self.model.name()))]
    pub fn execute(&mut self) -> Result<EvaluationResult> {
        self.initialize()?;
        self.train()?;
        if self.validation.is_some() {
            self.validate()?;
        }
        let result = self.evaluate()?;

        if self.config.save_model {
            let store = JsonModelStore::new(&self.config.model_dir);
            self.persist(&store)?;
        }
        Ok(result)
    }

    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_next(LifecycleState::Initialized)?;

        if self.config.uses_validation() {
            // Share of the training partition kept for fitting
            let ratio = 1.0 - self.config.validation_ratio;
            let split = match (&self.timestamps, self.config.split_by_date) {
                (Some(timestamps), true) => split_by_date(&self.train, ratio, timestamps)?,
                (None, true) => {
                    warn!("split_by_date requested without timestamps, splitting at random");
                    let mut rng = StdRng::seed_from_u64(self.config.seed);
                    split_by_ratio(&self.train, ratio, &mut rng)?
                }
                (_, false) => {
                    let mut rng = StdRng::seed_from_u64(self.config.seed);
                    split_by_ratio(&self.train, ratio, &mut rng)?
                }
            };
            info!(
                "Validation split: {} fitting, {} validation ratings",
                split.train.len(),
                split.held_out.len()
            );
            self.train = Arc::new(split.train);
            self.validation = Some(split.held_out);
        }

        let inputs = TrainInputs {
            train: &self.train,
            side: &self.side,
            session: &self.session,
        };
        self.model.initialize(inputs)?;
        self.state = LifecycleState::Initialized;
        Ok(())
    }

    pub fn train(&mut self) -> Result<()> {
        self.ensure_next(LifecycleState::Trained)?;
        let start = Instant::now();

        let inputs = TrainInputs {
            train: &self.train,
            side: &self.side,
            session: &self.session,
        };
        match (self.config.early_stop, &self.validation) {
            (Some(measure), Some(validation)) => {
                let mut monitor = EarlyStopping {
                    measure,
                    evaluator: &self.evaluator,
                    train: &self.train,
                    validation,
                    best: None,
                };
                self.model.train(inputs, &mut monitor)?;
            }
            (Some(measure), None) => {
                warn!("Early stop on {} needs a validation partition, ignoring it", measure);
                self.model.train(inputs, &mut RunToCompletion)?;
            }
            (None, _) => self.model.train(inputs, &mut RunToCompletion)?,
        }

        if self.session.diversity_enabled() {
            self.correlations = Some(CorrelationCache::new(
                Arc::clone(&self.train),
                CorrelationSpace::Items,
                *self.session.correlation(),
            ));
            debug!("Created item correlation cache for diversity");
        }
        self.model.post_train()?;

        self.train_time = start.elapsed();
        info!("Trained {} in {:.2?}", self.model.name(), self.train_time);
        self.state = LifecycleState::Trained;
        Ok(())
    }

    /// Evaluate on the validation partition. Its duration counts as training.
    pub fn validate(&mut self) -> Result<EvaluationResult> {
        self.ensure_next(LifecycleState::Validated)?;
        let validation = self
            .validation
            .as_ref()
            .ok_or_else(|| EngineError::MissingInput("validation partition".into()))?;

        let start = Instant::now();
        let result = self.evaluator.evaluate(
            &self.train,
            validation,
            &self.model,
            self.correlations.as_ref(),
        )?;
        self.train_time += start.elapsed();

        info!("Validation: {}", result);
        self.state = LifecycleState::Validated;
        Ok(result)
    }

    pub fn evaluate(&mut self) -> Result<EvaluationResult> {
        self.ensure_next(LifecycleState::Evaluated)?;

        let start = Instant::now();
        let mut result = self.evaluator.evaluate(
            &self.train,
            &self.test,
            &self.model,
            self.correlations.as_ref(),
        )?;
        let test_time = start.elapsed();

        result.insert(Measure::TrainTime, millis(self.train_time));
        result.insert(Measure::TestTime, millis(test_time));
        info!("Evaluation: {}", result);
        self.state = LifecycleState::Evaluated;
        Ok(result)
    }

    /// Write a model snapshot under the model's name
    pub fn persist(&mut self, store: &JsonModelStore) -> Result<PathBuf> {
        self.ensure_next(LifecycleState::Persisted)?;
        let name = self.model.name().to_string();
        let snapshot = self
            .model
            .snapshot()?
            .ok_or_else(|| EngineError::Unsupported(name.clone()))?;

        let path = store.save(&name, &snapshot)?;
        self.state = LifecycleState::Persisted;
        Ok(path)
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Stops training once the validation measure fails to improve
struct EarlyStopping<'a> {
    measure: Measure,
    evaluator: &'a RankingEvaluator,
    train: &'a SparseMatrix,
    validation: &'a SparseMatrix,
    best: Option<f64>,
}

impl IterationMonitor for EarlyStopping<'_> {
    fn after_iteration(&mut self, iteration: usize, scorer: &dyn RankingScorer) -> ControlFlow<()> {
        let value = match self.evaluator.evaluate(self.train, self.validation, scorer, None) {
            Ok(result) => result.get(self.measure),
            Err(e) => {
                warn!("Validation after iteration {} failed: {}", iteration, e);
                return ControlFlow::Continue(());
            }
        };
        let Some(value) = value else {
            debug!("No {} on validation after iteration {}", self.measure, iteration);
            return ControlFlow::Continue(());
        };

        info!("Iteration {}: validation {} = {:.6}", iteration, self.measure, value);
        match self.best {
            Some(best) if value <= best => {
                info!("{} stopped improving ({:.6} <= {:.6})", self.measure, value, best);
                ControlFlow::Break(())
            }
            _ => {
                self.best = Some(value);
                ControlFlow::Continue(())
            }
        }
    }
}
