//! # Ranking Evaluator
//!
//! Scores every eligible test user against the candidate pool and averages
//! rank metrics over the users.
//!
//! ## Algorithm
//! 1. Select test users with at least one held-out item (and, in the
//!    cold-start view, at least one held-out item that is popular in
//!    training)
//! 2. Spawn one task per user on the evaluation pool:
//!    a. Candidates = pool minus the user's training items
//!    b. Score candidates, dropping `NaN`
//!    c. Keep the best `max(top_n, max cutoff)`, ties broken by item index
//!    d. Compute metrics at every cutoff
//! 3. Tasks send their outcome over a channel; the pool scope is the
//!    completion barrier
//! 4. Aggregate in user order, so the result does not depend on the pool
//!    size or on task completion order
//!
//! A task that panics is logged and counted as failed; the others carry on.

use crate::error::{EvalError, Result};
use crate::measure::{EvaluationResult, Measure};
use crate::metrics;
use crate::traits::RankingScorer;
use data_loader::{ItemId, SparseMatrix, UserId};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use similarity::{CorrelationCache, diversity_at};
use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Which test users are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestView {
    #[default]
    All,
    /// Users with a held-out item that has more than
    /// `cold_start_threshold` training interactions
    ColdStart,
}

/// Items every user is ranked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidatePool {
    /// Every item column of the training matrix
    #[default]
    AllItems,
    /// Items with at least one training interaction
    TrainedItems,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Length of the final recommendation list, 0 keeps every scored item
    pub top_n: usize,
    pub cutoffs: Vec<usize>,
    /// Evaluation threads, 0 uses the available parallelism
    pub num_threads: usize,
    pub test_view: TestView,
    pub candidates: CandidatePool,
    pub cold_start_threshold: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            top_n: 0,
            cutoffs: vec![5, 10],
            num_threads: 0,
            test_view: TestView::All,
            candidates: CandidatePool::AllItems,
            cold_start_threshold: 5,
        }
    }
}

impl EvalConfig {
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_cutoffs(mut self, cutoffs: Vec<usize>) -> Self {
        self.cutoffs = cutoffs;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_test_view(mut self, test_view: TestView) -> Self {
        self.test_view = test_view;
        self
    }

    pub fn with_candidates(mut self, candidates: CandidatePool) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cutoffs.is_empty() {
            return Err(EvalError::InvalidConfig("at least one cutoff is required".into()));
        }
        if self.cutoffs.contains(&0) {
            return Err(EvalError::InvalidConfig("cutoffs must be positive".into()));
        }
        Ok(())
    }

    fn max_cutoff(&self) -> usize {
        self.cutoffs.iter().copied().max().unwrap_or(0)
    }
}

/// Per-user result sent from a worker to the aggregator
#[derive(Debug)]
enum UserOutcome {
    Scored { user: UserId, values: Vec<Option<f64>> },
    Skipped { user: UserId },
    Failed { user: UserId },
}

impl UserOutcome {
    fn user(&self) -> UserId {
        match self {
            UserOutcome::Scored { user, .. }
            | UserOutcome::Skipped { user }
            | UserOutcome::Failed { user } => *user,
        }
    }
}

/// Shared read-only inputs of one evaluation run
struct EvalContext<'a, S: ?Sized> {
    train: &'a SparseMatrix,
    test: &'a SparseMatrix,
    candidates: &'a [ItemId],
    scorer: &'a S,
    diversity: Option<&'a CorrelationCache>,
    measures: &'a [Measure],
}

pub struct RankingEvaluator {
    config: EvalConfig,
    pool: ThreadPool,
}

impl RankingEvaluator {
    /// Create an evaluator with its own fixed-size thread pool
    pub fn new(config: EvalConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("eval-{i}"))
            .build()?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Measures this evaluator reports, in aggregation order
    pub fn measures(&self, with_diversity: bool) -> Vec<Measure> {
        let mut measures: Vec<Measure> = self
            .config
            .cutoffs
            .iter()
            .flat_map(|&c| Measure::ranking_at(c))
            .collect();
        if with_diversity {
            measures.extend(self.config.cutoffs.iter().map(|&c| Measure::Diversity(c)));
        }
        measures
    }

    /// Evaluate `scorer` on the held-out `test` matrix.
    ///
    /// `diversity` adds `Diversity@c` measures computed from the cache.
    #[instrument(skip_all, fields(scorer = scorer.name(), threads = self.num_threads()))]
    pub fn evaluate<S>(
        &self,
        train: &SparseMatrix,
        test: &SparseMatrix,
        scorer: &S,
        diversity: Option<&CorrelationCache>,
    ) -> Result<EvaluationResult>
    where
        S: RankingScorer + ?Sized,
    {
        if train.num_rows() != test.num_rows() || train.num_columns() != test.num_columns() {
            return Err(EvalError::ShapeMismatch {
                train: (train.num_rows(), train.num_columns()),
                test: (test.num_rows(), test.num_columns()),
            });
        }
        let start = Instant::now();

        // Step 1: eligible users and the shared candidate pool
        let users: Vec<UserId> = test
            .nonempty_rows()
            .filter(|&u| self.is_testable(u, train, test))
            .collect();
        let candidates: Vec<ItemId> = match self.config.candidates {
            CandidatePool::AllItems => (0..train.num_columns()).collect(),
            CandidatePool::TrainedItems => train.nonempty_columns().collect(),
        };
        let measures = self.measures(diversity.is_some());
        info!(
            "Evaluating {} test users against {} candidate items",
            users.len(),
            candidates.len()
        );

        let ctx = EvalContext {
            train,
            test,
            candidates: &candidates,
            scorer,
            diversity,
            measures: &measures,
        };

        // Step 2-3: one task per user, outcomes through the channel
        let (tx, rx) = mpsc::channel::<UserOutcome>();
        self.pool.scope(|scope| {
            for &user in &users {
                let tx = tx.clone();
                let ctx = &ctx;
                scope.spawn(move |_| {
                    let outcome =
                        match panic::catch_unwind(AssertUnwindSafe(|| self.evaluate_user(user, ctx))) {
                            Ok(Some(values)) => UserOutcome::Scored { user, values },
                            Ok(None) => UserOutcome::Skipped { user },
                            Err(payload) => {
                                error!("Evaluation of user {} failed: {}", user, panic_message(payload.as_ref()));
                                UserOutcome::Failed { user }
                            }
                        };
                    // The receiver outlives the scope
                    let _ = tx.send(outcome);
                });
            }
        });
        drop(tx);

        // Step 4: aggregate in user order
        let mut outcomes: Vec<UserOutcome> = rx.into_iter().collect();
        outcomes.sort_by_key(UserOutcome::user);
        let result = aggregate(&measures, &outcomes);

        debug!(
            "Evaluation finished in {:.2?}: {} evaluated, {} skipped, {} failed",
            start.elapsed(),
            result.evaluated_users,
            result.skipped_users,
            result.failed_users
        );
        Ok(result)
    }

    fn is_testable(&self, user: UserId, train: &SparseMatrix, test: &SparseMatrix) -> bool {
        match self.config.test_view {
            TestView::All => true,
            TestView::ColdStart => test
                .row(user)
                .indices()
                .iter()
                .any(|&j| train.column_len(j) > self.config.cold_start_threshold),
        }
    }

    /// Metric values for one user, `None` when nothing could be scored
    fn evaluate_user<S>(&self, user: UserId, ctx: &EvalContext<'_, S>) -> Option<Vec<Option<f64>>>
    where
        S: RankingScorer + ?Sized,
    {
        let relevant: HashSet<ItemId> = ctx.test.row(user).indices().iter().copied().collect();
        let rated = ctx.train.row(user);

        // Step 2a-b: score unrated candidates
        let mut scored: Vec<(ItemId, f64)> = ctx
            .candidates
            .iter()
            .filter(|&&item| !rated.contains(item))
            .map(|&item| (item, ctx.scorer.score(user, item)))
            .filter(|(_, score)| !score.is_nan())
            .collect();
        if scored.is_empty() {
            return None;
        }

        // Step 2c: deterministic top-k
        let keep = self.config.top_n.max(self.config.max_cutoff()).min(scored.len());
        let by_rank = |a: &(ItemId, f64), b: &(ItemId, f64)| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        };
        if keep < scored.len() {
            scored.select_nth_unstable_by(keep - 1, by_rank);
            scored.truncate(keep);
        }
        scored.sort_unstable_by(by_rank);
        if self.config.top_n > 0 {
            scored.truncate(self.config.top_n);
        }
        let ranked: Vec<ItemId> = scored.into_iter().map(|(item, _)| item).collect();

        // Step 2d
        let values = ctx
            .measures
            .iter()
            .map(|measure| match *measure {
                Measure::Precision(c) => Some(metrics::precision_at(&ranked, &relevant, c)),
                Measure::Recall(c) => Some(metrics::recall_at(&ranked, &relevant, c)),
                Measure::Map(c) => Some(metrics::average_precision_at(&ranked, &relevant, c)),
                Measure::Ndcg(c) => Some(metrics::ndcg_at(&ranked, &relevant, c)),
                Measure::Diversity(c) => ctx.diversity.and_then(|cache| diversity_at(cache, &ranked, c)),
                Measure::TrainTime | Measure::TestTime => None,
            })
            .collect();
        Some(values)
    }
}

/// Mean of every measure over the users that produced a value for it
fn aggregate(measures: &[Measure], outcomes: &[UserOutcome]) -> EvaluationResult {
    let mut sums = vec![0.0; measures.len()];
    let mut counts = vec![0usize; measures.len()];
    let mut result = EvaluationResult::default();

    for outcome in outcomes {
        match outcome {
            UserOutcome::Scored { values, .. } => {
                result.evaluated_users += 1;
                for (idx, value) in values.iter().enumerate() {
                    if let Some(v) = value {
                        sums[idx] += v;
                        counts[idx] += 1;
                    }
                }
            }
            UserOutcome::Skipped { .. } => result.skipped_users += 1,
            UserOutcome::Failed { .. } => result.failed_users += 1,
        }
    }

    for (idx, &measure) in measures.iter().enumerate() {
        if counts[idx] > 0 {
            result.insert(measure, sums[idx] / counts[idx] as f64);
        }
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_train() -> SparseMatrix {
        SparseMatrix::from_triplets(
            3,
            4,
            vec![(0, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0), (1, 2, 1.0), (2, 0, 1.0)],
        )
        .unwrap()
    }

    fn create_test() -> SparseMatrix {
        SparseMatrix::from_triplets(3, 4, vec![(0, 2, 1.0), (1, 3, 1.0)]).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(RankingEvaluator::new(EvalConfig::default().with_cutoffs(vec![])).is_err());
        assert!(RankingEvaluator::new(EvalConfig::default().with_cutoffs(vec![0, 5])).is_err());
    }

    #[test]
    fn test_ties_break_by_item_index() {
        let evaluator =
            RankingEvaluator::new(EvalConfig::default().with_cutoffs(vec![1]).with_num_threads(1))
                .unwrap();
        let (train, test) = (create_train(), create_test());

        // Constant scores: user 0 gets item 2 first (lowest unrated index)
        let result = evaluator.evaluate(&train, &test, &|_: UserId, _: ItemId| 1.0, None).unwrap();
        // user 0: [2, 3] -> hit; user 1: [0, 3] -> miss
        assert_eq!(result.get(Measure::Precision(1)), Some(0.5));
    }

    #[test]
    fn test_nan_only_users_are_skipped() {
        let evaluator = RankingEvaluator::new(EvalConfig::default().with_num_threads(2)).unwrap();
        let (train, test) = (create_train(), create_test());

        let scorer = |u: UserId, _: ItemId| if u == 1 { f64::NAN } else { 1.0 };
        let result = evaluator.evaluate(&train, &test, &scorer, None).unwrap();
        assert_eq!(result.evaluated_users, 1);
        assert_eq!(result.skipped_users, 1);
        assert_eq!(result.failed_users, 0);
    }

    #[test]
    fn test_panicking_scorer_is_counted_as_failure() {
        let evaluator = RankingEvaluator::new(EvalConfig::default().with_num_threads(2)).unwrap();
        let (train, test) = (create_train(), create_test());

        let scorer = |u: UserId, i: ItemId| {
            if u == 0 {
                panic!("scorer exploded");
            }
            i as f64
        };
        let result = evaluator.evaluate(&train, &test, &scorer, None).unwrap();
        assert_eq!(result.failed_users, 1);
        assert_eq!(result.evaluated_users, 1);
        // User 1 ranks item 3 first
        assert_eq!(result.get(Measure::Recall(5)), Some(1.0));
    }

    #[test]
    fn test_cold_start_view_filters_users() {
        let evaluator = RankingEvaluator::new(
            EvalConfig::default().with_test_view(TestView::ColdStart),
        )
        .unwrap();
        let (train, test) = (create_train(), create_test());

        // No test item has more than 5 training interactions
        let result = evaluator.evaluate(&train, &test, &|_: UserId, _: ItemId| 1.0, None).unwrap();
        assert_eq!(result.evaluated_users, 0);
        assert!(result.measures.is_empty());
    }

    #[test]
    fn test_trained_items_pool_excludes_unrated_items() {
        let evaluator = RankingEvaluator::new(
            EvalConfig::default()
                .with_candidates(CandidatePool::TrainedItems)
                .with_num_threads(1),
        )
        .unwrap();
        let (train, test) = (create_train(), create_test());

        // Item 3 never appears in training, so user 1 can never hit
        let result = evaluator.evaluate(&train, &test, &|_: UserId, i: ItemId| i as f64, None).unwrap();
        assert_eq!(result.get(Measure::Recall(10)), Some(0.5));
    }

    #[test]
    fn test_shape_mismatch() {
        let evaluator = RankingEvaluator::new(EvalConfig::default()).unwrap();
        let other = SparseMatrix::new(2, 4);
        let result = evaluator.evaluate(&create_train(), &other, &|_: UserId, _: ItemId| 1.0, None);
        assert!(matches!(result, Err(EvalError::ShapeMismatch { .. })));
    }
}
