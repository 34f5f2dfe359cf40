//! Core domain types for rating datasets.
//!
//! External user/item identifiers are arbitrary strings in the data files.
//! Everything downstream works on dense internal indices, so the two
//! `IdMap`s are the only place the string form survives.

use crate::matrix::SparseMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Type Aliases
// =============================================================================

/// Internal user index (row of the interaction matrix)
pub type UserId = usize;

/// Internal item index (column of the interaction matrix)
pub type ItemId = usize;

// =============================================================================
// Id mapping
// =============================================================================

/// Bidirectional mapping between external string ids and internal indices.
///
/// Indices are assigned densely in first-seen order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdMap {
    to_inner: HashMap<String, usize>,
    to_outer: Vec<String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index for `external`, assigning the next one if unseen
    pub fn get_or_insert(&mut self, external: &str) -> usize {
        if let Some(&inner) = self.to_inner.get(external) {
            return inner;
        }
        let inner = self.to_outer.len();
        self.to_inner.insert(external.to_string(), inner);
        self.to_outer.push(external.to_string());
        inner
    }

    pub fn inner(&self, external: &str) -> Option<usize> {
        self.to_inner.get(external).copied()
    }

    pub fn outer(&self, inner: usize) -> Option<&str> {
        self.to_outer.get(inner).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.to_outer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_outer.is_empty()
    }
}

// =============================================================================
// Rating Types
// =============================================================================

/// One parsed line of a rating file, still keyed by external ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRating {
    pub user: String,
    pub item: String,
    pub value: f64,
    /// Unix timestamp when present in the source file
    pub timestamp: Option<i64>,
}

/// Sorted set of distinct rating levels.
///
/// `min()`/`max()` bound the prediction clamp range and drive
/// `normalize`/`denormalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    levels: Vec<f64>,
}

impl RatingScale {
    /// Build from any collection of observed values (sorted and deduplicated).
    ///
    /// Returns `None` when no finite value is present.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut levels: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if levels.is_empty() {
            return None;
        }
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup();
        Some(Self { levels })
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn min(&self) -> f64 {
        self.levels[0]
    }

    pub fn max(&self) -> f64 {
        self.levels[self.levels.len() - 1]
    }

    /// Midpoint of the scale, the anchor of constrained Pearson correlation
    pub fn midpoint(&self) -> f64 {
        (self.min() + self.max()) / 2.0
    }

    /// Map a rating into [0, 1]
    pub fn normalize(&self, rate: f64) -> f64 {
        let span = self.max() - self.min();
        if span == 0.0 {
            return 0.0;
        }
        (rate - self.min()) / span
    }

    /// Inverse of `normalize`
    pub fn denormalize(&self, pred: f64) -> f64 {
        self.min() + pred * (self.max() - self.min())
    }

    /// Bound a raw prediction to `[min, max]`
    pub fn clamp(&self, pred: f64) -> f64 {
        pred.clamp(self.min(), self.max())
    }
}

// =============================================================================
// DataIndex - the loaded dataset
// =============================================================================

/// A rating dataset indexed into sparse matrices.
///
/// `rate_matrix` is users x items; `time_matrix` (same shape) holds rating
/// timestamps as seconds when the source provided them.
#[derive(Debug, Clone)]
pub struct DataIndex {
    pub(crate) user_ids: IdMap,
    pub(crate) item_ids: IdMap,
    pub(crate) rate_matrix: SparseMatrix,
    pub(crate) time_matrix: Option<SparseMatrix>,
    pub(crate) rating_scale: Option<RatingScale>,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            user_ids: IdMap::new(),
            item_ids: IdMap::new(),
            rate_matrix: SparseMatrix::new(0, 0),
            time_matrix: None,
            rating_scale: None,
        }
    }

    pub fn user_ids(&self) -> &IdMap {
        &self.user_ids
    }

    pub fn item_ids(&self) -> &IdMap {
        &self.item_ids
    }

    pub fn rate_matrix(&self) -> &SparseMatrix {
        &self.rate_matrix
    }

    pub fn time_matrix(&self) -> Option<&SparseMatrix> {
        self.time_matrix.as_ref()
    }

    pub fn rating_scale(&self) -> Option<&RatingScale> {
        self.rating_scale.as_ref()
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_ids.len()
    }

    /// Earliest and latest rating timestamp, if any were loaded
    pub fn timestamp_range(&self) -> Option<(i64, i64)> {
        self.time_matrix
            .as_ref()
            .and_then(|m| m.value_range())
            .map(|(lo, hi)| (lo as i64, hi as i64))
    }

    /// Get counts for debugging/validation: (users, items, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.num_users(), self.num_items(), self.rate_matrix.len())
    }
}

// Implement Default trait for convenience
impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}
