//! Fused Factorization Trainer
//!
//! Weighted coordinate descent over four factor blocks: users (P), items
//! (Q), item relations (Z) and the content projection (E). Item factors are
//! pulled towards the interaction data, towards the factors of related
//! items and towards their content representation `XᵗE`.
//!
//! ## Algorithm (one outer iteration)
//! 1. `Sq = QᵗQ`
//! 2. User sweep: per user and factor, a closed-form update that only
//!    touches the user's observed items; the full (implicit) zero-weight
//!    part is carried by `Sq`
//! 3. `Sp = PᵗP`, `Sz = ZᵗZ`
//! 4. Item sweep: interaction part against P, relation part against Z,
//!    content term against `XᵗE`
//! 5. `Sq = QᵗQ`, relation sweep over Z
//! 6. Ridge update of every content projection entry
//! 7. `Sz = ZᵗZ`, `XᵗE` refreshed
//!
//! Prediction buffers hold `p_u · q_i` for the entries of the current row
//! or column and are updated incrementally as each factor changes.
//! Sweeps are strictly sequential (Gauss-Seidel order).

use crate::config::FactorizationConfig;
use crate::error::{Result, TrainError};
use crate::model::ModelState;
use data_loader::SparseMatrix;
use std::ops::ControlFlow;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Inputs of one fit. Matrices are read-only for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct TrainingData<'a> {
    /// users x items
    pub ratings: &'a SparseMatrix,
    /// items x items, `relations[i][g]` when item `i` lists `g`
    pub relations: Option<&'a SparseMatrix>,
    /// content_dim x items
    pub content: Option<&'a SparseMatrix>,
}

impl<'a> TrainingData<'a> {
    pub fn new(ratings: &'a SparseMatrix) -> Self {
        Self {
            ratings,
            relations: None,
            content: None,
        }
    }

    pub fn with_relations(mut self, relations: Option<&'a SparseMatrix>) -> Self {
        self.relations = relations;
        self
    }

    pub fn with_content(mut self, content: Option<&'a SparseMatrix>) -> Self {
        self.content = content;
        self
    }

    fn check_shapes(&self) -> Result<()> {
        let n = self.ratings.num_columns();
        if let Some(rel) = self.relations {
            if rel.num_rows() != n || rel.num_columns() != n {
                return Err(TrainError::ShapeMismatch {
                    what: "relation matrix",
                    expected: (n, n),
                    found: (rel.num_rows(), rel.num_columns()),
                });
            }
        }
        if let Some(x) = self.content {
            if x.num_columns() != n {
                return Err(TrainError::ShapeMismatch {
                    what: "content matrix",
                    expected: (x.num_rows(), n),
                    found: (x.num_rows(), x.num_columns()),
                });
            }
        }
        Ok(())
    }
}

/// Per-fit scratch space, sized to the entity counts once
#[derive(Debug, Clone)]
pub struct SweepBuffers {
    /// indexed by item during the user sweep
    item_prediction: Vec<f64>,
    item_confidence: Vec<f64>,
    /// indexed by user during the item sweep
    user_prediction: Vec<f64>,
    user_confidence: Vec<f64>,
    /// indexed by item in the item and relation sweeps
    relation_prediction: Vec<f64>,
    relation_confidence: Vec<f64>,
}

impl SweepBuffers {
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Self {
            item_prediction: vec![0.0; num_items],
            item_confidence: vec![0.0; num_items],
            user_prediction: vec![0.0; num_users],
            user_confidence: vec![0.0; num_users],
            relation_prediction: vec![0.0; num_items],
            relation_confidence: vec![0.0; num_items],
        }
    }
}

pub struct FusedTrainer {
    config: FactorizationConfig,
}

impl FusedTrainer {
    pub fn new(config: FactorizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FactorizationConfig {
        &self.config
    }

    /// Initialize a model and run every configured iteration
    pub fn fit(&self, data: TrainingData<'_>) -> Result<ModelState> {
        self.fit_with(data, |_, _| ControlFlow::Continue(()))
    }

    /// Like `fit`, calling `on_iteration(iteration, &state)` after every
    /// completed iteration. Returning `Break` stops training early.
    #[instrument(skip_all, fields(
        users = data.ratings.num_rows(),
        items = data.ratings.num_columns(),
        k = self.config.factors,
    ))]
    pub fn fit_with<F>(&self, data: TrainingData<'_>, on_iteration: F) -> Result<ModelState>
    where
        F: FnMut(usize, &ModelState) -> ControlFlow<()>,
    {
        data.check_shapes()?;
        let mut state = ModelState::initialize(&self.config, data.ratings, data.content)?;
        self.train_state(&mut state, data, on_iteration)?;
        Ok(state)
    }

    /// Run the configured iterations on an already initialized state
    pub fn train_state<F>(
        &self,
        state: &mut ModelState,
        data: TrainingData<'_>,
        mut on_iteration: F,
    ) -> Result<()>
    where
        F: FnMut(usize, &ModelState) -> ControlFlow<()>,
    {
        info!(
            "Training fused model: {} ratings, relations={}, content={}",
            data.ratings.len(),
            data.relations.is_some(),
            data.content.is_some()
        );
        let mut buffers = SweepBuffers::new(state.num_users(), state.num_items());
        let start = Instant::now();
        let first = state.iterations_run + 1;

        for iteration in first..first + self.config.iterations {
            let iter_start = Instant::now();
            self.run_iteration(state, data, &mut buffers)?;
            state.iterations_run = iteration;
            debug!("Iteration {} finished in {:.2?}", iteration, iter_start.elapsed());

            if !state.is_finite() {
                warn!("Non-finite factors after iteration {}", iteration);
                return Err(TrainError::Diverged { iteration });
            }
            if on_iteration(iteration, state).is_break() {
                info!("Stopping early after iteration {}", iteration);
                break;
            }
        }

        info!(
            "Training finished: {} iterations in {:.2?}",
            state.iterations_run,
            start.elapsed()
        );
        Ok(())
    }

    /// One outer iteration over an initialized state
    pub fn run_iteration(
        &self,
        state: &mut ModelState,
        data: TrainingData<'_>,
        buffers: &mut SweepBuffers,
    ) -> Result<()> {
        data.check_shapes()?;
        let expected = (state.num_users(), state.num_items());
        let found = (data.ratings.num_rows(), data.ratings.num_columns());
        if expected != found {
            return Err(TrainError::ShapeMismatch {
                what: "rating matrix",
                expected,
                found,
            });
        }
        if let Some(x) = data.content {
            if x.num_rows() != state.content_dim() {
                return Err(TrainError::ShapeMismatch {
                    what: "content matrix",
                    expected: (state.content_dim(), state.num_items()),
                    found: (x.num_rows(), x.num_columns()),
                });
            }
        }

        // Step 1-2
        state.sq = state.item_factors.gram();
        self.sweep_users(state, data.ratings, buffers);

        // Step 3-4
        state.sp = state.user_factors.gram();
        state.sz = state.relation_factors.gram();
        self.sweep_items(state, data, buffers);

        // Step 5
        state.sq = state.item_factors.gram();
        if let Some(relations) = data.relations {
            self.sweep_relations(state, relations, buffers);
        }

        // Step 6-7
        if let Some(content) = data.content {
            self.update_content_projection(state, content);
            state.refresh_content_scores(content);
        }
        state.sz = state.relation_factors.gram();
        Ok(())
    }

    fn sweep_users(&self, state: &mut ModelState, ratings: &SparseMatrix, buf: &mut SweepBuffers) {
        let k = state.num_factors();
        let alpha = self.config.alpha;
        let ModelState {
            user_factors: p,
            item_factors: q,
            sq,
            ..
        } = state;

        for u in ratings.nonempty_rows() {
            let row = ratings.row(u);
            for (i, r) in row.iter() {
                buf.item_prediction[i] = p.row_dot(u, q, i);
                buf.item_confidence[i] = 1.0 + alpha * r;
            }

            for f in 0..k {
                let mut numer = 0.0;
                let mut denom = self.config.reg_user + sq.get(f, f);
                for other in (0..k).filter(|&other| other != f) {
                    numer -= p.get(u, other) * sq.get(f, other);
                }

                let puf = p.get(u, f);
                for &i in row.indices() {
                    let qif = q.get(i, f);
                    buf.item_prediction[i] -= puf * qif;
                    let w = buf.item_confidence[i];
                    numer += (w - (w - 1.0) * buf.item_prediction[i]) * qif;
                    denom += (w - 1.0) * qif * qif;
                }

                let puf = numer / denom;
                p.set(u, f, puf);
                for &i in row.indices() {
                    buf.item_prediction[i] += puf * q.get(i, f);
                }
            }
        }
    }

    fn sweep_items(&self, state: &mut ModelState, data: TrainingData<'_>, buf: &mut SweepBuffers) {
        let k = state.num_factors();
        let FactorizationConfig {
            alpha,
            beta,
            gamma,
            reg_item,
            ..
        } = self.config;
        let ModelState {
            user_factors: p,
            item_factors: q,
            relation_factors: z,
            sp,
            sz,
            content_scores,
            ..
        } = state;

        for i in 0..data.ratings.num_columns() {
            let column = data.ratings.column(i);
            let related = data.relations.map(|m| m.row(i));
            if column.is_empty() && related.is_none_or(|r| r.is_empty()) {
                continue;
            }

            for (u, r) in column.iter() {
                buf.user_prediction[u] = p.row_dot(u, q, i);
                buf.user_confidence[u] = 1.0 + alpha * r;
            }
            if let Some(related) = related {
                for (g, v) in related.iter() {
                    buf.relation_prediction[g] = q.row_dot(i, z, g);
                    buf.relation_confidence[g] = 1.0 + alpha * v;
                }
            }

            for f in 0..k {
                let mut numer = 0.0;
                let mut denom = sp.get(f, f) + reg_item;
                let mut rel_numer = 0.0;
                let mut rel_denom = sz.get(f, f);
                for other in (0..k).filter(|&other| other != f) {
                    numer -= q.get(i, other) * sp.get(other, f);
                    rel_numer -= q.get(i, other) * sz.get(other, f);
                }

                let qif = q.get(i, f);
                for &u in column.indices() {
                    let puf = p.get(u, f);
                    buf.user_prediction[u] -= puf * qif;
                    let w = buf.user_confidence[u];
                    numer += (w - (w - 1.0) * buf.user_prediction[u]) * puf;
                    denom += (w - 1.0) * puf * puf;
                }
                if let Some(related) = related {
                    for &g in related.indices() {
                        let zgf = z.get(g, f);
                        buf.relation_prediction[g] -= zgf * qif;
                        let c = buf.relation_confidence[g];
                        rel_numer += (c - (c - 1.0) * buf.relation_prediction[g]) * zgf;
                        rel_denom += (c - 1.0) * zgf * zgf;
                    }
                    numer += beta * rel_numer;
                    denom += beta * rel_denom;
                }
                if data.content.is_some() {
                    numer += gamma * content_scores.get(i, f);
                    denom += gamma;
                }

                let qif = numer / denom;
                q.set(i, f, qif);
                for &u in column.indices() {
                    buf.user_prediction[u] += p.get(u, f) * qif;
                }
                if let Some(related) = related {
                    for &g in related.indices() {
                        buf.relation_prediction[g] += z.get(g, f) * qif;
                    }
                }
            }
        }
    }

    fn sweep_relations(
        &self,
        state: &mut ModelState,
        relations: &SparseMatrix,
        buf: &mut SweepBuffers,
    ) {
        let k = state.num_factors();
        let FactorizationConfig {
            alpha,
            beta,
            reg_item,
            ..
        } = self.config;
        let ModelState {
            item_factors: q,
            relation_factors: z,
            sq,
            ..
        } = state;

        for g in relations.nonempty_columns() {
            // Items that list g
            let sources = relations.column(g);
            for (i, v) in sources.iter() {
                buf.relation_prediction[i] = q.row_dot(i, z, g);
                buf.relation_confidence[i] = 1.0 + alpha * v;
            }

            for f in 0..k {
                let mut numer = 0.0;
                let mut denom = sq.get(f, f);
                for other in (0..k).filter(|&other| other != f) {
                    numer -= z.get(g, other) * sq.get(f, other);
                }

                let zgf = z.get(g, f);
                for &i in sources.indices() {
                    let qif = q.get(i, f);
                    buf.relation_prediction[i] -= zgf * qif;
                    let c = buf.relation_confidence[i];
                    numer += (c - (c - 1.0) * buf.relation_prediction[i]) * qif;
                    denom += (c - 1.0) * qif * qif;
                }

                let zgf = beta * numer / (beta * denom + reg_item);
                z.set(g, f, zgf);
                for &i in sources.indices() {
                    buf.relation_prediction[i] += zgf * q.get(i, f);
                }
            }
        }
    }

    /// Ridge update of E, one entry at a time.
    ///
    /// `residual` tracks `XᵗE` while entries change; it starts from the
    /// scores of the previous E and is patched after every update.
    fn update_content_projection(&self, state: &mut ModelState, content: &SparseMatrix) {
        let k = state.num_factors();
        let FactorizationConfig {
            gamma, reg_content, ..
        } = self.config;
        let mut residual = state.content_scores.clone();
        let ModelState {
            item_factors: q,
            content_projection: e,
            content_norms,
            ..
        } = state;

        for f in 0..k {
            for d in content.nonempty_rows() {
                let features = content.row(d);
                let edf = e.get(d, f);
                let mut numer = 0.0;
                for (j, x) in features.iter() {
                    residual.add(j, f, -edf * x);
                    numer += (q.get(j, f) - residual.get(j, f)) * x;
                }

                let edf = numer * gamma / (gamma * content_norms[d] + reg_content);
                e.set(d, f, edf);
                for (j, x) in features.iter() {
                    residual.add(j, f, edf * x);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two user groups with disjoint tastes: users 0-2 like items 0-2,
    /// users 3-5 like items 3-5. Each user leaves one in-group item unrated.
    fn create_block_ratings() -> SparseMatrix {
        let mut triplets = Vec::new();
        for u in 0..6 {
            let group = (u / 3) * 3;
            for i in group..group + 3 {
                if i - group != u % 3 {
                    triplets.push((u, i, 1.0));
                }
            }
        }
        SparseMatrix::from_triplets(6, 7, triplets).unwrap()
    }

    fn create_relations() -> SparseMatrix {
        SparseMatrix::from_triplets(7, 7, vec![(0, 1, 1.0), (1, 2, 1.0), (3, 4, 1.0), (4, 5, 1.0)])
            .unwrap()
    }

    /// Item 6 has no ratings but shares content with items 3-5
    fn create_content() -> SparseMatrix {
        let mut triplets = Vec::new();
        for i in 0..3 {
            triplets.push((0, i, 1.0));
        }
        for i in 3..7 {
            triplets.push((1, i, 1.0));
        }
        SparseMatrix::from_triplets(2, 7, triplets).unwrap()
    }

    fn test_config() -> FactorizationConfig {
        FactorizationConfig::default()
            .with_factors(2)
            .with_iterations(15)
            .with_reg_content(0.1)
            .with_seed(42)
    }

    #[test]
    fn test_gram_caches_consistent_after_every_iteration() {
        let ratings = create_block_ratings();
        let relations = create_relations();
        let content = create_content();
        let data = TrainingData::new(&ratings)
            .with_relations(Some(&relations))
            .with_content(Some(&content));

        let trainer = FusedTrainer::new(test_config()).unwrap();
        let mut checked = 0;
        trainer
            .fit_with(data, |_, state| {
                let (sq, sp, sz) = state.gram_caches();
                assert!(sq.max_abs_diff(&state.item_factors().gram()) < 1e-12);
                assert!(sp.max_abs_diff(&state.user_factors().gram()) < 1e-12);
                assert!(sz.max_abs_diff(&state.relation_factors().gram()) < 1e-12);
                checked += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(checked, 15);
    }

    #[test]
    fn test_held_out_in_group_item_ranks_above_other_group() {
        let ratings = create_block_ratings();
        let config = test_config().with_factors(4).with_iterations(30);
        let state = FusedTrainer::new(config)
            .unwrap()
            .fit(TrainingData::new(&ratings))
            .unwrap();

        // User 0 did not rate item 0 but its group did
        for u in 0..6 {
            let group = (u / 3) * 3;
            let held_out = group + u % 3;
            let other_group = if group == 0 { 3..6 } else { 0..3 };
            let other_mean = other_group.map(|i| state.score(u, i)).sum::<f64>() / 3.0;
            assert!(
                state.score(u, held_out) > other_mean,
                "user {u}: item {held_out} scores {} against {other_mean} for the other group",
                state.score(u, held_out)
            );
        }
    }

    #[test]
    fn test_fused_training_scores_cold_item_through_content() {
        let ratings = create_block_ratings();
        let relations = create_relations();
        let content = create_content();
        let data = TrainingData::new(&ratings)
            .with_relations(Some(&relations))
            .with_content(Some(&content));

        let state = FusedTrainer::new(test_config()).unwrap().fit(data).unwrap();
        assert!(state.is_finite());
        assert!(state.is_cold(6));
        // Item 6 looks like items 3-5, so it suits the second group
        assert!(state.score(4, 6) > state.score(1, 6));
    }

    #[test]
    fn test_early_stop_via_callback() {
        let ratings = create_block_ratings();
        let state = FusedTrainer::new(test_config())
            .unwrap()
            .fit_with(TrainingData::new(&ratings), |iteration, _| {
                if iteration == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(state.iterations_run(), 2);
    }

    #[test]
    fn test_train_state_continues_iteration_count() {
        let ratings = create_block_ratings();
        let config = test_config().with_iterations(3);
        let trainer = FusedTrainer::new(config.clone()).unwrap();
        let data = TrainingData::new(&ratings);

        let mut state = ModelState::initialize(&config, &ratings, None).unwrap();
        let mut seen = Vec::new();
        trainer
            .train_state(&mut state, data, |iteration, _| {
                seen.push(iteration);
                ControlFlow::Continue(())
            })
            .unwrap();
        trainer
            .train_state(&mut state, data, |iteration, _| {
                seen.push(iteration);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(state.iterations_run(), 6);
    }

    #[test]
    fn test_non_finite_input_is_reported_as_divergence() {
        let ratings = SparseMatrix::from_triplets(1, 2, vec![(0, 0, f64::NAN), (0, 1, 1.0)]).unwrap();
        let result = FusedTrainer::new(test_config())
            .unwrap()
            .fit(TrainingData::new(&ratings));
        assert!(matches!(result, Err(TrainError::Diverged { iteration: 1 })));
    }

    #[test]
    fn test_shape_mismatch() {
        let ratings = create_block_ratings();
        let wrong = SparseMatrix::new(3, 3);
        let result = FusedTrainer::new(test_config())
            .unwrap()
            .fit(TrainingData::new(&ratings).with_relations(Some(&wrong)));
        assert!(matches!(result, Err(TrainError::ShapeMismatch { .. })));
    }
}
