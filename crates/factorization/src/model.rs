//! Latent factors and derived caches of a fused factorization model.
//!
//! | matrix               | shape        |
//! |----------------------|--------------|
//! | `user_factors` P     | users x k    |
//! | `item_factors` Q     | items x k    |
//! | `relation_factors` Z | items x k    |
//! | `content_projection` E | content_dim x k |
//! | `content_scores` XᵗE | items x k    |
//!
//! The Gram caches `sq`, `sp` and `sz` hold `QᵗQ`, `PᵗP` and `ZᵗZ`. Outside
//! of a running iteration they always match their factor matrix.

use crate::config::FactorizationConfig;
use crate::error::Result;
use data_loader::{DenseMatrix, ItemId, RatingScale, SparseMatrix, UserId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub(crate) user_factors: DenseMatrix,
    pub(crate) item_factors: DenseMatrix,
    pub(crate) relation_factors: DenseMatrix,
    pub(crate) content_projection: DenseMatrix,

    pub(crate) sq: DenseMatrix,
    pub(crate) sp: DenseMatrix,
    pub(crate) sz: DenseMatrix,

    /// `D[d] = Σ_j x_dj²`
    pub(crate) content_norms: Vec<f64>,
    pub(crate) content_scores: DenseMatrix,

    /// Training interactions per item; zero marks a cold item
    pub(crate) item_counts: Vec<usize>,
    pub(crate) iterations_run: usize,
}

impl ModelState {
    /// Allocate seeded `N(0, init_std²)` factors and derive every cache.
    ///
    /// `content` is the `content_dim x items` feature matrix, if any.
    pub fn initialize(
        config: &FactorizationConfig,
        ratings: &SparseMatrix,
        content: Option<&SparseMatrix>,
    ) -> Result<Self> {
        let k = config.factors;
        let (num_users, num_items) = (ratings.num_rows(), ratings.num_columns());
        let content_dim = content.map_or(0, |x| x.num_rows());

        let mut rng = StdRng::seed_from_u64(config.seed);
        let user_factors = DenseMatrix::random_normal(num_users, k, 0.0, config.init_std, &mut rng)?;
        let item_factors = DenseMatrix::random_normal(num_items, k, 0.0, config.init_std, &mut rng)?;
        let relation_factors =
            DenseMatrix::random_normal(num_items, k, 0.0, config.init_std, &mut rng)?;
        let content_projection =
            DenseMatrix::random_normal(content_dim, k, 0.0, config.init_std, &mut rng)?;

        let content_norms = match content {
            Some(x) => (0..content_dim).map(|d| x.row(d).norm_sq()).collect(),
            None => Vec::new(),
        };

        let mut state = Self {
            sq: item_factors.gram(),
            sp: user_factors.gram(),
            sz: relation_factors.gram(),
            user_factors,
            item_factors,
            relation_factors,
            content_projection,
            content_norms,
            content_scores: DenseMatrix::zeros(num_items, k),
            item_counts: (0..num_items).map(|j| ratings.column_len(j)).collect(),
            iterations_run: 0,
        };
        if let Some(x) = content {
            state.refresh_content_scores(x);
        }
        Ok(state)
    }

    pub fn num_users(&self) -> usize {
        self.user_factors.num_rows()
    }

    pub fn num_items(&self) -> usize {
        self.item_factors.num_rows()
    }

    pub fn num_factors(&self) -> usize {
        self.user_factors.num_columns()
    }

    pub fn content_dim(&self) -> usize {
        self.content_projection.num_rows()
    }

    pub fn iterations_run(&self) -> usize {
        self.iterations_run
    }

    pub fn user_factors(&self) -> &DenseMatrix {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &DenseMatrix {
        &self.item_factors
    }

    pub fn relation_factors(&self) -> &DenseMatrix {
        &self.relation_factors
    }

    pub fn content_projection(&self) -> &DenseMatrix {
        &self.content_projection
    }

    pub fn content_scores(&self) -> &DenseMatrix {
        &self.content_scores
    }

    /// `(QᵗQ, PᵗP, ZᵗZ)`
    pub fn gram_caches(&self) -> (&DenseMatrix, &DenseMatrix, &DenseMatrix) {
        (&self.sq, &self.sp, &self.sz)
    }

    pub fn content_norms(&self) -> &[f64] {
        &self.content_norms
    }

    /// An item with no training interaction
    pub fn is_cold(&self, item: ItemId) -> bool {
        self.item_counts.get(item).is_none_or(|&n| n == 0)
    }

    /// Raw preference score of `user` for `item`.
    ///
    /// Cold items are scored through their content representation when the
    /// model has content features. Out-of-range ids score `NaN`.
    pub fn score(&self, user: UserId, item: ItemId) -> f64 {
        if user >= self.num_users() || item >= self.num_items() {
            return f64::NAN;
        }
        if self.is_cold(item) && self.content_dim() > 0 {
            self.user_factors.row_dot(user, &self.content_scores, item)
        } else {
            self.user_factors.row_dot(user, &self.item_factors, item)
        }
    }

    /// `score` clamped into the rating scale
    pub fn predict_bounded(&self, user: UserId, item: ItemId, scale: &RatingScale) -> f64 {
        let score = self.score(user, item);
        if score.is_nan() { score } else { scale.clamp(score) }
    }

    /// True when no factor is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.user_factors.is_finite()
            && self.item_factors.is_finite()
            && self.relation_factors.is_finite()
            && self.content_projection.is_finite()
    }

    /// Recompute `QᵗQ`, `PᵗP` and `ZᵗZ`
    pub fn refresh_grams(&mut self) {
        self.sq = self.item_factors.gram();
        self.sp = self.user_factors.gram();
        self.sz = self.relation_factors.gram();
    }

    /// Recompute `XᵗE` from scratch
    pub(crate) fn refresh_content_scores(&mut self, content: &SparseMatrix) {
        let k = self.num_factors();
        let mut scores = DenseMatrix::zeros(self.num_items(), k);
        for d in 0..content.num_rows() {
            let e_d = self.content_projection.row(d);
            for (j, x) in content.row(d).iter() {
                let out = scores.row_mut(j);
                for f in 0..k {
                    out[f] += x * e_d[f];
                }
            }
        }
        self.content_scores = scores;
    }
}
