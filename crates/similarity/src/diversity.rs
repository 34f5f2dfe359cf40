//! Intra-list diversity of a ranked recommendation list.

use crate::cache::CorrelationCache;
use data_loader::ItemId;

/// Diversity of the first `cutoff` items of `ranked`.
///
/// `0.5 * mean(1 - corr(i, j))` over every unordered pair whose correlation
/// is defined. `None` when fewer than two items are considered or no pair
/// has a defined correlation.
pub fn diversity_at(cache: &CorrelationCache, ranked: &[ItemId], cutoff: usize) -> Option<f64> {
    let top = &ranked[..cutoff.min(ranked.len())];
    if top.len() < 2 {
        return None;
    }

    let mut sum = 0.0;
    let mut pairs = 0usize;
    for (pos, &i) in top.iter().enumerate() {
        for &j in &top[pos + 1..] {
            if let Some(corr) = cache.get_or_compute(i, j) {
                sum += 1.0 - corr;
                pairs += 1;
            }
        }
    }

    (pairs > 0).then(|| 0.5 * sum / pairs as f64)
}
