//! Lazily filled, shareable correlation cache.
//!
//! One physical entry per unordered pair: `(i, j)` and `(j, i)` both live
//! in row `min(i, j)` under key `max(i, j)`. Each row sits behind its own
//! `RwLock`, so evaluator workers can read and fill the cache concurrently.
//!
//! ## Staleness
//! Correlations are derived from the training matrix, which is immutable
//! for the lifetime of the cache. Entries are therefore never invalidated.
//! A new training matrix needs a new cache.
//!
//! Undefined (`NaN`) correlations are never stored.

use crate::correlation::CorrelationEngine;
use data_loader::{SparseMatrix, SparseVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument};

/// Which vectors of the training matrix are correlated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationSpace {
    /// Rows: user-user correlations
    Users,
    /// Columns: item-item correlations
    #[default]
    Items,
}

pub struct CorrelationCache {
    train: Arc<SparseMatrix>,
    space: CorrelationSpace,
    engine: CorrelationEngine,
    /// `rows[i]` holds correlations with every `j > i` computed so far
    rows: Vec<RwLock<HashMap<usize, f64>>>,
}

impl CorrelationCache {
    /// Create an empty cache over `train`
    pub fn new(train: Arc<SparseMatrix>, space: CorrelationSpace, engine: CorrelationEngine) -> Self {
        let size = match space {
            CorrelationSpace::Users => train.num_rows(),
            CorrelationSpace::Items => train.num_columns(),
        };
        Self {
            train,
            space,
            engine,
            rows: (0..size).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    pub fn space(&self) -> CorrelationSpace {
        self.space
    }

    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }

    /// Number of users or items the cache covers
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Number of stored correlations
    pub fn len(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn vector(&self, index: usize) -> SparseVector<'_> {
        match self.space {
            CorrelationSpace::Users => self.train.row(index),
            CorrelationSpace::Items => self.train.column(index),
        }
    }

    fn key(i: usize, j: usize) -> (usize, usize) {
        if i <= j { (i, j) } else { (j, i) }
    }

    /// Stored correlation of `(i, j)`, without computing it
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        let (lo, hi) = Self::key(i, j);
        let row = self.rows.get(lo)?;
        let guard = row.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&hi).copied()
    }

    /// Correlation of `(i, j)`, computed and memoized on first use.
    ///
    /// Returns `None` when the correlation is undefined or an index is out
    /// of range.
    pub fn get_or_compute(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.size() || j >= self.size() {
            return None;
        }
        if let Some(corr) = self.get(i, j) {
            return Some(corr);
        }

        let (lo, hi) = Self::key(i, j);
        let corr = self.engine.correlate(&self.vector(lo), &self.vector(hi));
        if corr.is_nan() {
            return None;
        }

        // Two workers may race on the same pair; both compute the same value
        self.rows[lo]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hi, corr);
        Some(corr)
    }

    /// Eagerly compute every pair `i < j` with a non-empty vector `i`.
    ///
    /// Returns the number of stored (defined) correlations.
    #[instrument(skip(self), fields(space = ?self.space, size = self.size()))]
    pub fn build_all(&self) -> usize {
        info!("Building {:?} correlation cache with {}", self.space, self.engine.method());
        let size = self.size();

        let stored: usize = (0..size)
            .into_par_iter()
            .map(|i| {
                let iv = self.vector(i);
                if iv.is_empty() {
                    return 0;
                }
                let computed: HashMap<usize, f64> = ((i + 1)..size)
                    .filter_map(|j| {
                        let corr = self.engine.correlate(&iv, &self.vector(j));
                        (!corr.is_nan()).then_some((j, corr))
                    })
                    .collect();
                let count = computed.len();
                self.rows[i]
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(computed);
                count
            })
            .sum();

        debug!("Stored {} defined correlations", stored);
        stored
    }
}
