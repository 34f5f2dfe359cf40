//! Correlation between two sparse rating vectors.
//!
//! ## Algorithm
//! 1. Collect the co-rated indices of both vectors (merge join)
//! 2. Apply the configured method to the overlapping values
//!    (`cos-binary` instead uses the full vectors)
//! 3. Shrink towards zero by `n / (n + shrinkage)` when shrinkage is on
//!
//! A correlation that cannot be computed (no overlap, zero variance, ...)
//! comes back as `NaN`. Callers treat `NaN` as "no correlation".

use data_loader::SparseVector;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Supported correlation methods, named as in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SimilarityMethod {
    /// Pearson correlation over co-rated entries
    #[default]
    Pcc,
    /// Cosine over co-rated entries
    Cos,
    /// Cosine over the full vectors, one-sided entries included
    CosBinary,
    /// Mean squared difference similarity
    Msd,
    /// Constrained Pearson, centered on the rating-scale midpoint
    Cpc,
    /// Extended Jaccard (Tanimoto)
    ExJaccard,
}

impl SimilarityMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SimilarityMethod::Pcc => "pcc",
            SimilarityMethod::Cos => "cos",
            SimilarityMethod::CosBinary => "cos-binary",
            SimilarityMethod::Msd => "msd",
            SimilarityMethod::Cpc => "cpc",
            SimilarityMethod::ExJaccard => "exjaccard",
        }
    }
}

impl FromStr for SimilarityMethod {
    type Err = Infallible;

    /// Case-insensitive. Unknown names fall back to Pearson.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = match s.trim().to_lowercase().as_str() {
            "pcc" => SimilarityMethod::Pcc,
            "cos" => SimilarityMethod::Cos,
            "cos-binary" => SimilarityMethod::CosBinary,
            "msd" => SimilarityMethod::Msd,
            "cpc" => SimilarityMethod::Cpc,
            "exjaccard" => SimilarityMethod::ExJaccard,
            other => {
                warn!("Unknown similarity method '{}', using pcc", other);
                SimilarityMethod::Pcc
            }
        };
        Ok(method)
    }
}

impl From<String> for SimilarityMethod {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }
}

impl From<SimilarityMethod> for String {
    fn from(method: SimilarityMethod) -> Self {
        method.name().to_string()
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Computes correlations with a fixed method and shrinkage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationEngine {
    method: SimilarityMethod,
    shrinkage: f64,
    /// Anchor for `cpc`, the midpoint of the rating scale
    midpoint: f64,
}

impl CorrelationEngine {
    /// Create an engine with no shrinkage and a zero `cpc` anchor
    pub fn new(method: SimilarityMethod) -> Self {
        Self {
            method,
            shrinkage: 0.0,
            midpoint: 0.0,
        }
    }

    /// Configure shrinkage (default: 0, disabled)
    pub fn with_shrinkage(mut self, shrinkage: f64) -> Self {
        self.shrinkage = shrinkage;
        self
    }

    /// Configure the `cpc` anchor, normally `RatingScale::midpoint()`
    pub fn with_midpoint(mut self, midpoint: f64) -> Self {
        self.midpoint = midpoint;
        self
    }

    pub fn method(&self) -> SimilarityMethod {
        self.method
    }

    pub fn shrinkage(&self) -> f64 {
        self.shrinkage
    }

    /// Correlation of two vectors, `NaN` when undefined
    pub fn correlate(&self, a: &SparseVector<'_>, b: &SparseVector<'_>) -> f64 {
        // Step 1: co-rated values
        let (xs, ys): (Vec<f64>, Vec<f64>) = a.overlap(b).map(|(_, x, y)| (x, y)).unzip();
        let n = xs.len();

        // Step 2: raw similarity
        let sim = match self.method {
            SimilarityMethod::Pcc => pcc(&xs, &ys),
            SimilarityMethod::Cos => cos(&xs, &ys),
            SimilarityMethod::CosBinary => a.dot(b) / (a.norm_sq().sqrt() * b.norm_sq().sqrt()),
            SimilarityMethod::Msd => msd(&xs, &ys),
            SimilarityMethod::Cpc => cpc(&xs, &ys, self.midpoint),
            SimilarityMethod::ExJaccard => ex_jaccard(&xs, &ys),
        };

        // Step 3: shrinkage
        shrink(sim, n, self.shrinkage)
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new(SimilarityMethod::default())
    }
}

/// Scale `sim` by `n / (n + shrinkage)`; identity when shrinkage <= 0
pub fn shrink(sim: f64, n: usize, shrinkage: f64) -> f64 {
    if sim.is_nan() || shrinkage <= 0.0 {
        return sim;
    }
    let n = n as f64;
    sim * n / (n + shrinkage)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Correlation of centered values, shared by `pcc` and `cpc`
fn centered(xs: &[f64], ys: &[f64], x_center: f64, y_center: f64) -> f64 {
    let (mut num, mut x_sq, mut y_sq) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - x_center, y - y_center);
        num += dx * dy;
        x_sq += dx * dx;
        y_sq += dy * dy;
    }
    let denom = x_sq.sqrt() * y_sq.sqrt();
    if denom == 0.0 { f64::NAN } else { num / denom }
}

/// Pearson correlation
pub fn pcc(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    centered(xs, ys, mean(xs), mean(ys))
}

/// Cosine similarity
pub fn cos(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let num: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let x_sq: f64 = xs.iter().map(|x| x * x).sum();
    let y_sq: f64 = ys.iter().map(|y| y * y).sum();
    let denom = (x_sq * y_sq).sqrt();
    if denom == 0.0 { f64::NAN } else { num / denom }
}

/// Mean squared difference similarity, `1 / (msd + 1)`
pub fn msd(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let sq_diff: f64 = xs.iter().zip(ys).map(|(x, y)| (x - y) * (x - y)).sum();
    1.0 / (sq_diff / xs.len() as f64 + 1.0)
}

/// Constrained Pearson correlation around `midpoint`
pub fn cpc(xs: &[f64], ys: &[f64], midpoint: f64) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    centered(xs, ys, midpoint, midpoint)
}

/// Extended Jaccard coefficient
pub fn ex_jaccard(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let num: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let x_sq: f64 = xs.iter().map(|x| x * x).sum();
    let y_sq: f64 = ys.iter().map(|y| y * y).sum();
    let denom = x_sq + y_sq - num;
    if denom == 0.0 { f64::NAN } else { num / denom }
}
