//! Train/held-out splitting of a rating matrix.
//!
//! Used for the test holdout in the binary and for the validation holdout
//! inside the recommender lifecycle.

use crate::error::{DataLoadError, Result};
use crate::matrix::SparseMatrix;
use rand::Rng;

/// Two partitions with the shape of the source matrix
#[derive(Debug, Clone)]
pub struct Split {
    pub train: SparseMatrix,
    pub held_out: SparseMatrix,
}

fn check_ratio(ratio: f64) -> Result<()> {
    if ratio > 0.0 && ratio < 1.0 {
        Ok(())
    } else {
        Err(DataLoadError::InvalidValue {
            field: "split ratio".to_string(),
            value: ratio.to_string(),
        })
    }
}

/// Uniform random split: every rating lands in `train` with probability `ratio`
pub fn split_by_ratio<R: Rng + ?Sized>(
    matrix: &SparseMatrix,
    ratio: f64,
    rng: &mut R,
) -> Result<Split> {
    check_ratio(ratio)?;

    let (mut train, mut held_out) = (Vec::new(), Vec::new());
    for entry in matrix.iter() {
        if rng.random::<f64>() < ratio {
            train.push(entry);
        } else {
            held_out.push(entry);
        }
    }
    build(matrix, train, held_out)
}

/// Temporal split per user.
///
/// Each user's ratings are ordered by timestamp; the earliest
/// `floor(n * ratio)` go to `train`, the rest are held out. Ratings without a
/// timestamp sort first.
pub fn split_by_date(
    matrix: &SparseMatrix,
    ratio: f64,
    timestamps: &SparseMatrix,
) -> Result<Split> {
    check_ratio(ratio)?;

    let (mut train, mut held_out) = (Vec::new(), Vec::new());
    for u in 0..matrix.num_rows() {
        let mut row: Vec<(usize, f64, f64)> = matrix
            .row(u)
            .iter()
            .map(|(i, v)| (i, v, timestamps.get(u, i).unwrap_or(0.0)))
            .collect();
        row.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));

        let train_size = (row.len() as f64 * ratio) as usize;
        for (pos, (i, v, _)) in row.into_iter().enumerate() {
            if pos < train_size {
                train.push((u, i, v));
            } else {
                held_out.push((u, i, v));
            }
        }
    }
    build(matrix, train, held_out)
}

fn build(
    source: &SparseMatrix,
    train: Vec<(usize, usize, f64)>,
    held_out: Vec<(usize, usize, f64)>,
) -> Result<Split> {
    let (rows, columns) = (source.num_rows(), source.num_columns());
    Ok(Split {
        train: SparseMatrix::from_triplets(rows, columns, train)?,
        held_out: SparseMatrix::from_triplets(rows, columns, held_out)?,
    })
}
