use data_loader::{DataIndex, ItemId, RawRating, SparseMatrix, UserId};
use engine::{
    EngineError, ExperimentInputs, FusedModel, FusedSnapshot, IterationMonitor, JsonModelStore,
    LifecycleState, Recommender, RecommenderConfig, RecommenderModel, SessionContext, TrainInputs,
    run_experiment,
};
use evaluator::{Measure, RankingScorer};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

/// Scores items by their number of training interactions
#[derive(Default)]
struct PopularityModel {
    counts: Vec<f64>,
}

impl RankingScorer for PopularityModel {
    fn name(&self) -> &str {
        "popularity"
    }

    fn score(&self, _user: UserId, item: ItemId) -> f64 {
        self.counts.get(item).copied().unwrap_or(f64::NAN)
    }
}

impl RecommenderModel for PopularityModel {
    fn initialize(&mut self, inputs: TrainInputs<'_>) -> engine::Result<()> {
        self.counts = vec![0.0; inputs.train.num_columns()];
        Ok(())
    }

    fn train(
        &mut self,
        inputs: TrainInputs<'_>,
        monitor: &mut dyn IterationMonitor,
    ) -> engine::Result<()> {
        for (j, count) in self.counts.iter_mut().enumerate() {
            *count = inputs.train.column_len(j) as f64;
        }
        let _ = monitor.after_iteration(1, &*self);
        Ok(())
    }
}

fn raw(user: &str, item: &str, value: f64, timestamp: i64) -> RawRating {
    RawRating {
        user: user.to_string(),
        item: item.to_string(),
        value,
        timestamp: Some(timestamp),
    }
}

/// 3 users x 4 items.
///
/// train: u0 {i0, i1}, u1 {i1, i2}, u2 {i0}
/// test:  u0 {i2},     u1 {i3}
fn scenario() -> (DataIndex, SparseMatrix, SparseMatrix) {
    let ratings = vec![
        raw("u0", "i0", 1.0, 1),
        raw("u0", "i1", 1.0, 2),
        raw("u1", "i1", 1.0, 3),
        raw("u1", "i2", 1.0, 4),
        raw("u2", "i0", 1.0, 5),
        raw("u0", "i2", 1.0, 6),
        raw("u1", "i3", 1.0, 7),
    ];
    let index = DataIndex::from_ratings(ratings).unwrap();
    let train = SparseMatrix::from_triplets(
        3,
        4,
        vec![(0, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0), (1, 2, 1.0), (2, 0, 1.0)],
    )
    .unwrap();
    let test = SparseMatrix::from_triplets(3, 4, vec![(0, 2, 1.0), (1, 3, 1.0)]).unwrap();
    (index, train, test)
}

fn scenario_recommender(config: RecommenderConfig) -> Recommender<PopularityModel> {
    let (index, train, test) = scenario();
    let session = SessionContext::bootstrap(&config, &index).unwrap();
    Recommender::new(session, config, PopularityModel::default(), train, test).unwrap()
}

/// Two taste groups over 30 users x 20 items with a few holes
fn block_ratings() -> Vec<RawRating> {
    let mut ratings = Vec::new();
    for u in 0..30i64 {
        for i in 0..20i64 {
            if i % 2 == u % 2 && (u * 7 + i * 3) % 5 != 0 {
                let value = 1.0 + (i % 5) as f64;
                ratings.push(raw(&format!("u{u}"), &format!("i{i}"), value, u * 100 + i));
            }
        }
    }
    ratings
}

fn block_config() -> RecommenderConfig {
    RecommenderConfig::default()
        .with_factors(4)
        .with_iterations(8)
        .with_seed(11)
        .with_cutoffs(vec![5])
        .with_num_cpus(2)
}

fn fused_recommender(config: RecommenderConfig) -> Recommender<FusedModel> {
    let index = DataIndex::from_ratings(block_ratings()).unwrap();
    let session = SessionContext::bootstrap(&config, &index).unwrap();
    let model = FusedModel::new(config.factorization()).unwrap();
    let test = SparseMatrix::new(index.num_users(), index.num_items());

    Recommender::new(session, config, model, index.rate_matrix().clone(), test)
        .unwrap()
        .with_timestamps(index.time_matrix().cloned())
}

fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("engine-{}-{}", tag, std::process::id()))
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_popularity_scenario_end_to_end() {
    let config = RecommenderConfig::default()
        .with_top_n(2)
        .with_cutoffs(vec![2])
        .with_num_cpus(2);
    let mut recommender = scenario_recommender(config);

    let result = recommender.execute().unwrap();

    assert_eq!(recommender.state(), LifecycleState::Evaluated);
    assert_eq!(result.evaluated_users, 2);
    assert_eq!(result.get(Measure::Precision(2)), Some(0.5));
    assert_eq!(result.get(Measure::Recall(2)), Some(1.0));
    assert!(result.get(Measure::TrainTime).is_some_and(|t| t >= 0.0));
    assert!(result.get(Measure::TestTime).is_some_and(|t| t >= 0.0));
}

#[test]
fn test_out_of_order_steps_are_rejected() {
    let mut recommender = scenario_recommender(RecommenderConfig::default());

    let result = recommender.train();
    assert!(matches!(
        result,
        Err(EngineError::InvalidTransition {
            from: LifecycleState::Uninitialized,
            to: LifecycleState::Trained
        })
    ));
    assert!(recommender.evaluate().is_err());
    assert_eq!(recommender.state(), LifecycleState::Uninitialized);

    recommender.initialize().unwrap();
    assert!(recommender.initialize().is_err());
    recommender.train().unwrap();
    // No validation partition was configured
    assert!(matches!(recommender.validate(), Err(EngineError::MissingInput(_))));
    assert_eq!(recommender.state(), LifecycleState::Trained);

    recommender.evaluate().unwrap();
    assert!(recommender.train().is_err());
}

#[test]
fn test_persist_without_snapshot_support() {
    let mut recommender = scenario_recommender(RecommenderConfig::default());
    recommender.execute().unwrap();

    let store = JsonModelStore::new(temp_dir("unsupported"));
    let result = recommender.persist(&store);
    assert!(matches!(result, Err(EngineError::Unsupported(name)) if name == "popularity"));
    assert_eq!(recommender.state(), LifecycleState::Evaluated);
}

#[test]
fn test_empty_training_matrix_is_fatal() {
    let (index, _, test) = scenario();
    let config = RecommenderConfig::default();
    let session = SessionContext::bootstrap(&config, &index).unwrap();

    let result = Recommender::new(
        session,
        config,
        PopularityModel::default(),
        SparseMatrix::new(3, 4),
        test,
    );
    assert!(matches!(result, Err(EngineError::MissingInput(_))));
}

#[test]
fn test_invalid_config_is_fatal() {
    let (index, train, test) = scenario();
    let session = SessionContext::bootstrap(&RecommenderConfig::default(), &index).unwrap();
    let config = RecommenderConfig::default().with_factors(0);

    let result = Recommender::new(Arc::clone(&session), config, PopularityModel::default(), train, test);
    assert!(matches!(result, Err(EngineError::Config(_))));
}

// =============================================================================
// Fused model runs
// =============================================================================

#[test]
fn test_validation_partition_holds_the_configured_share() {
    let config = block_config().with_validation(0.1, None);
    let mut recommender = fused_recommender(config);
    let total = recommender.train_matrix().len();

    recommender.initialize().unwrap();

    let fitting = recommender.train_matrix().len();
    let validation = recommender.validation_matrix().unwrap().len();
    assert_eq!(fitting + validation, total);
    assert!(validation < fitting, "{validation} validation vs {fitting} fitting ratings");

    let share = validation as f64 / total as f64;
    assert!(share > 0.02 && share < 0.25, "validation share {share:.3}");
}

#[test]
fn test_temporal_validation_split() {
    let mut config = block_config().with_validation(0.25, None);
    config.split_by_date = true;
    let mut recommender = fused_recommender(config);
    let total = recommender.train_matrix().len();

    recommender.initialize().unwrap();

    let train = recommender.train_matrix();
    let validation = recommender.validation_matrix().unwrap();
    assert_eq!(train.len() + validation.len(), total);
    assert!(validation.len() < train.len());

    // Item indices follow first appearance, so order by the recorded timestamps
    let index = DataIndex::from_ratings(block_ratings()).unwrap();
    let times = index.time_matrix().unwrap();
    let stamp = |u: usize, i: usize| times.get(u, i).unwrap();

    let mut users_with_held_out = 0;
    for u in 0..train.num_rows() {
        let latest_train = train.row(u).indices().iter().map(|&i| stamp(u, i)).reduce(f64::max);
        let earliest_held = validation.row(u).indices().iter().map(|&i| stamp(u, i)).reduce(f64::min);
        if let (Some(a), Some(b)) = (latest_train, earliest_held) {
            assert!(a < b, "user {u}: train rating at {a} is newer than held-out rating at {b}");
            users_with_held_out += 1;
        }
    }
    assert!(users_with_held_out > 0);
}

#[test]
fn test_fused_run_with_early_stop_diversity_and_store() {
    let dir = temp_dir("fused");
    let config = block_config()
        .with_validation(0.2, Some(Measure::Ndcg(5)))
        .with_diversity(true)
        .with_model_dir(&dir);

    // The full matrix doubles as the test set
    let index = DataIndex::from_ratings(block_ratings()).unwrap();
    let session = SessionContext::bootstrap(&config, &index).unwrap();
    let model = FusedModel::new(config.factorization()).unwrap();
    let mut recommender = Recommender::new(
        session,
        config,
        model,
        index.rate_matrix().clone(),
        index.rate_matrix().clone(),
    )
    .unwrap();

    let result = recommender.execute().unwrap();

    assert_eq!(recommender.state(), LifecycleState::Persisted);
    assert!(recommender.correlations().is_some());
    assert!(result.evaluated_users > 0);
    for (measure, value) in result.iter() {
        assert!(value.is_finite(), "{measure} is not finite");
    }
    assert!(result.get(Measure::Ndcg(5)).is_some());

    let iterations = recommender.model().state().unwrap().iterations_run();
    assert!((1..=8).contains(&iterations));

    let store = JsonModelStore::new(&dir);
    let snapshot: FusedSnapshot = store.load(FusedModel::NAME).unwrap();
    let restored = FusedModel::from_snapshot(snapshot).unwrap();
    for (u, i) in [(0, 0), (3, 7), (29, 19)] {
        let diff = (restored.score(u, i) - recommender.model().score(u, i)).abs();
        assert!(diff < 1e-9);
    }

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_run_experiment_from_files() {
    let dir = temp_dir("experiment");
    fs::create_dir_all(&dir).unwrap();
    let ratings_path = dir.join("ratings.csv");
    let lines: Vec<String> = block_ratings()
        .iter()
        .map(|r| format!("{},{},{},{}", r.user, r.item, r.value, r.timestamp.unwrap_or(0)))
        .collect();
    fs::write(&ratings_path, lines.join("\n")).unwrap();

    let config = block_config().with_iterations(3);
    let inputs = ExperimentInputs {
        ratings: ratings_path,
        ..Default::default()
    };
    let report = run_experiment(&config, &inputs).unwrap();

    assert_eq!(report.model, "fused-mf");
    assert_eq!(report.users, 30);
    assert_eq!(report.items, 20);
    assert_eq!(report.ratings, block_ratings().len());
    assert_eq!(report.train_ratings + report.test_ratings, report.ratings);
    assert!(!report.has_relations);
    assert!(report.result.get(Measure::TestTime).is_some());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_run_experiment_missing_ratings() {
    let inputs = ExperimentInputs {
        ratings: temp_dir("missing").join("ratings.csv"),
        ..Default::default()
    };
    let err = run_experiment(&RecommenderConfig::default(), &inputs).unwrap_err();
    assert!(err.to_string().contains("Failed to load ratings"));
}
