//! Sparse and dense matrix containers.
//!
//! `SparseMatrix` keeps a CSR and a CSC copy of the same entries so that
//! both `row(i)` and `column(j)` cost O(nnz of that row/column). Trainers
//! sweep users by row and items by column, so both orientations are hot.
//!
//! `DenseMatrix` is a row-major buffer used for latent factors and their
//! k x k Gram matrices. Products go through `faer` views of that buffer.

use crate::error::{DataLoadError, Result};
use faer::linalg::matmul::matmul;
use faer::{Accum, Mat, MatRef, Par};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

// =============================================================================
// SparseVector
// =============================================================================

/// Borrowed view of one row or column of a `SparseMatrix`.
///
/// Indices are strictly ascending, which lets `dot` and `overlap` run as a
/// linear merge.
#[derive(Debug, Clone, Copy)]
pub struct SparseVector<'a> {
    indices: &'a [usize],
    values: &'a [f64],
}

impl<'a> SparseVector<'a> {
    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &'a [usize] {
        self.indices
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    /// Iterate over `(index, value)` pairs in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + use<'a> {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.indices
            .binary_search(&index)
            .ok()
            .map(|pos| self.values[pos])
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// Inner product over the full vectors (one-sided entries contribute 0)
    pub fn dot(&self, other: &SparseVector<'_>) -> f64 {
        self.overlap(other).map(|(_, a, b)| a * b).sum()
    }

    /// Sum of squared values
    pub fn norm_sq(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// Entries present in both vectors as `(index, self_value, other_value)`
    pub fn overlap<'b>(
        &self,
        other: &SparseVector<'b>,
    ) -> impl Iterator<Item = (usize, f64, f64)> + use<'a, 'b> {
        Overlap {
            left: *self,
            right: *other,
            i: 0,
            j: 0,
        }
    }
}

/// Merge-join iterator behind `SparseVector::overlap`
struct Overlap<'a, 'b> {
    left: SparseVector<'a>,
    right: SparseVector<'b>,
    i: usize,
    j: usize,
}

impl Iterator for Overlap<'_, '_> {
    type Item = (usize, f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.i < self.left.indices.len() && self.j < self.right.indices.len() {
            let a = self.left.indices[self.i];
            let b = self.right.indices[self.j];
            match a.cmp(&b) {
                std::cmp::Ordering::Less => self.i += 1,
                std::cmp::Ordering::Greater => self.j += 1,
                std::cmp::Ordering::Equal => {
                    let item = (a, self.left.values[self.i], self.right.values[self.j]);
                    self.i += 1;
                    self.j += 1;
                    return Some(item);
                }
            }
        }
        None
    }
}

// =============================================================================
// SparseMatrix
// =============================================================================

/// Immutable sparse matrix with both row (CSR) and column (CSC) access.
#[derive(Debug, Clone, Default)]
pub struct SparseMatrix {
    rows: usize,
    columns: usize,

    // CSR
    row_ptr: Vec<usize>,
    row_cols: Vec<usize>,
    row_vals: Vec<f64>,

    // CSC
    col_ptr: Vec<usize>,
    col_rows: Vec<usize>,
    col_vals: Vec<f64>,
}

impl SparseMatrix {
    /// Empty `rows x columns` matrix
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            row_ptr: vec![0; rows + 1],
            col_ptr: vec![0; columns + 1],
            ..Default::default()
        }
    }

    /// Build from `(row, column, value)` triplets.
    ///
    /// Duplicate coordinates keep the last value seen.
    pub fn from_triplets<I>(rows: usize, columns: usize, triplets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut entries: Vec<(usize, usize, f64)> = Vec::new();
        for (row, column, value) in triplets {
            if row >= rows || column >= columns {
                return Err(DataLoadError::OutOfBounds {
                    row,
                    column,
                    rows,
                    columns,
                });
            }
            entries.push((row, column, value));
        }

        // Stable sort: among duplicates the last inserted stays last
        entries.sort_by_key(|&(r, c, _)| (r, c));
        let mut deduped: Vec<(usize, usize, f64)> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last_mut() {
                Some(last) if last.0 == entry.0 && last.1 == entry.1 => *last = entry,
                _ => deduped.push(entry),
            }
        }

        let mut matrix = Self::new(rows, columns);

        // CSR: entries are already in row-major order
        for &(r, c, v) in &deduped {
            matrix.row_ptr[r + 1] += 1;
            matrix.row_cols.push(c);
            matrix.row_vals.push(v);
        }
        for r in 0..rows {
            matrix.row_ptr[r + 1] += matrix.row_ptr[r];
        }

        // CSC via counting sort on the column index
        for &(_, c, _) in &deduped {
            matrix.col_ptr[c + 1] += 1;
        }
        for c in 0..columns {
            matrix.col_ptr[c + 1] += matrix.col_ptr[c];
        }
        let nnz = deduped.len();
        matrix.col_rows = vec![0; nnz];
        matrix.col_vals = vec![0.0; nnz];
        let mut next = matrix.col_ptr.clone();
        for &(r, c, v) in &deduped {
            let pos = next[c];
            matrix.col_rows[pos] = r;
            matrix.col_vals[pos] = v;
            next[c] += 1;
        }

        Ok(matrix)
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns
    }

    /// Total number of stored entries
    pub fn len(&self) -> usize {
        self.row_vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_vals.is_empty()
    }

    pub fn row(&self, row: usize) -> SparseVector<'_> {
        let (start, end) = (self.row_ptr[row], self.row_ptr[row + 1]);
        SparseVector {
            indices: &self.row_cols[start..end],
            values: &self.row_vals[start..end],
        }
    }

    pub fn column(&self, column: usize) -> SparseVector<'_> {
        let (start, end) = (self.col_ptr[column], self.col_ptr[column + 1]);
        SparseVector {
            indices: &self.col_rows[start..end],
            values: &self.col_vals[start..end],
        }
    }

    pub fn row_len(&self, row: usize) -> usize {
        self.row_ptr[row + 1] - self.row_ptr[row]
    }

    pub fn column_len(&self, column: usize) -> usize {
        self.col_ptr[column + 1] - self.col_ptr[column]
    }

    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        if row >= self.rows {
            return None;
        }
        self.row(row).get(column)
    }

    /// Iterate all entries in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |r| self.row(r).iter().map(move |(c, v)| (r, c, v)))
    }

    pub fn sum(&self) -> f64 {
        self.row_vals.iter().sum()
    }

    /// Smallest and largest stored value, `None` for an empty matrix
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.row_vals.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Apply `f` to every stored value, keeping the sparsity pattern
    pub fn map_values(&mut self, f: impl Fn(f64) -> f64) {
        self.row_vals.iter_mut().for_each(|v| *v = f(*v));
        self.col_vals.iter_mut().for_each(|v| *v = f(*v));
    }

    /// Min-max normalize all stored values into [0, 1].
    ///
    /// A degenerate range (`max == min`) maps every value to 1.0.
    pub fn normalize(&mut self, min: f64, max: f64) {
        let span = max - min;
        if span > 0.0 {
            self.map_values(|v| (v - min) / span);
        } else {
            self.map_values(|_| 1.0);
        }
    }

    /// Row indices with at least one entry
    pub fn nonempty_rows(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.rows).filter(move |&r| self.row_len(r) > 0)
    }

    /// Column indices with at least one entry
    pub fn nonempty_columns(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.columns).filter(move |&c| self.column_len(c) > 0)
    }
}

// =============================================================================
// DenseMatrix
// =============================================================================

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix {
    rows: usize,
    columns: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    pub fn zeros(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            data: vec![0.0; rows * columns],
        }
    }

    /// Matrix filled with draws from `N(mean, std^2)`
    pub fn random_normal<R: Rng + ?Sized>(
        rows: usize,
        columns: usize,
        mean: f64,
        std: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let normal = Normal::new(mean, std).map_err(|e| DataLoadError::InvalidValue {
            field: "normal std".to_string(),
            value: format!("{std} ({e})"),
        })?;
        let data = (0..rows * columns).map(|_| normal.sample(rng)).collect();
        Ok(Self {
            rows,
            columns,
            data,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.data[row * self.columns + column]
    }

    #[inline]
    pub fn set(&mut self, row: usize, column: usize, value: f64) {
        self.data[row * self.columns + column] = value;
    }

    #[inline]
    pub fn add(&mut self, row: usize, column: usize, delta: f64) {
        self.data[row * self.columns + column] += delta;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.columns..(row + 1) * self.columns]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.columns..(row + 1) * self.columns]
    }

    /// Dot product of `self.row(i)` and `other.row(j)`
    #[inline]
    pub fn row_dot(&self, i: usize, other: &DenseMatrix, j: usize) -> f64 {
        dot(self.row(i), other.row(j))
    }

    /// Borrow as a `faer` matrix view
    pub fn as_mat_ref(&self) -> MatRef<'_, f64> {
        MatRef::from_row_major_slice(&self.data, self.rows, self.columns)
    }

    /// `selfᵗ · self`, a `columns x columns` symmetric matrix.
    ///
    /// Runs sequentially: training is single-threaded and the Gram caches
    /// must not depend on the thread count.
    pub fn gram(&self) -> DenseMatrix {
        let k = self.columns;
        let y = self.as_mat_ref();

        let mut g = Mat::<f64>::zeros(k, k);
        matmul(g.as_mut(), Accum::Replace, y.transpose(), y, 1.0, Par::Seq);

        let mut data = Vec::with_capacity(k * k);
        for a in 0..k {
            for b in 0..k {
                data.push(g[(a, b)]);
            }
        }
        DenseMatrix {
            rows: k,
            columns: k,
            data,
        }
    }

    /// True when no entry is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Largest absolute element-wise difference, used by tests and checks
    pub fn max_abs_diff(&self, other: &DenseMatrix) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Plain dot product of two equal-length slices
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
