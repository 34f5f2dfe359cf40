//! Rank-based accuracy metrics for one user.
//!
//! `ranked` is the recommendation list, best first; `relevant` is the
//! user's held-out item set. A cutoff larger than the list counts the
//! missing positions as misses.

use data_loader::ItemId;
use std::collections::HashSet;

fn top<'a>(ranked: &'a [ItemId], cutoff: usize) -> &'a [ItemId] {
    &ranked[..cutoff.min(ranked.len())]
}

/// Relevant items within the first `cutoff` positions
pub fn hits_at(ranked: &[ItemId], relevant: &HashSet<ItemId>, cutoff: usize) -> usize {
    top(ranked, cutoff)
        .iter()
        .filter(|item| relevant.contains(item))
        .count()
}

/// `hits / cutoff`
pub fn precision_at(ranked: &[ItemId], relevant: &HashSet<ItemId>, cutoff: usize) -> f64 {
    if cutoff == 0 {
        return 0.0;
    }
    hits_at(ranked, relevant, cutoff) as f64 / cutoff as f64
}

/// `hits / |relevant|`
pub fn recall_at(ranked: &[ItemId], relevant: &HashSet<ItemId>, cutoff: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits_at(ranked, relevant, cutoff) as f64 / relevant.len() as f64
}

/// Average precision: mean of precision at each hit rank, over `|relevant|`
pub fn average_precision_at(ranked: &[ItemId], relevant: &HashSet<ItemId>, cutoff: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let mut hits = 0usize;
    let mut sum = 0.0;
    for (pos, item) in top(ranked, cutoff).iter().enumerate() {
        if relevant.contains(item) {
            hits += 1;
            sum += hits as f64 / (pos + 1) as f64;
        }
    }
    sum / relevant.len() as f64
}

/// Normalized DCG with binary gain `1 / log2(rank + 1)`
pub fn ndcg_at(ranked: &[ItemId], relevant: &HashSet<ItemId>, cutoff: usize) -> f64 {
    let dcg: f64 = top(ranked, cutoff)
        .iter()
        .enumerate()
        .filter(|(_, item)| relevant.contains(item))
        .map(|(pos, _)| discount(pos))
        .sum();

    let ideal: f64 = (0..relevant.len().min(cutoff)).map(discount).sum();
    if ideal == 0.0 { 0.0 } else { dcg / ideal }
}

/// Gain of a hit at zero-based position `pos`
fn discount(pos: usize) -> f64 {
    1.0 / ((pos + 2) as f64).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relevant(items: &[ItemId]) -> HashSet<ItemId> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_precision_and_recall() {
        let ranked = [3, 1, 4, 5, 9];
        let rel = relevant(&[1, 9, 7]);

        assert_eq!(precision_at(&ranked, &rel, 2), 0.5);
        assert_eq!(precision_at(&ranked, &rel, 5), 0.4);
        // Cutoff beyond the list still divides by the cutoff
        assert_eq!(precision_at(&ranked, &rel, 10), 0.2);

        assert!((recall_at(&ranked, &rel, 2) - 1.0 / 3.0).abs() < 1e-12);
        assert!((recall_at(&ranked, &rel, 5) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_precision() {
        let ranked = [1, 2, 3, 4];
        let rel = relevant(&[1, 3]);
        // (1/1 + 2/3) / 2
        let ap = average_precision_at(&ranked, &rel, 4);
        assert!((ap - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        // Only the first hit is inside cutoff 2
        assert!((average_precision_at(&ranked, &rel, 2) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ndcg() {
        let rel = relevant(&[1]);
        assert_eq!(ndcg_at(&[1, 2, 3], &rel, 3), 1.0);
        // Hit at rank 2: 1/log2(3)
        let expected = 1.0 / 3f64.log2();
        assert!((ndcg_at(&[2, 1, 3], &rel, 3) - expected).abs() < 1e-12);
        assert_eq!(ndcg_at(&[2, 3, 1], &rel, 2), 0.0);
    }

    #[test]
    fn test_empty_inputs() {
        let empty = HashSet::new();
        assert_eq!(recall_at(&[1, 2], &empty, 2), 0.0);
        assert_eq!(ndcg_at(&[1, 2], &empty, 2), 0.0);
        assert_eq!(precision_at(&[], &relevant(&[1]), 5), 0.0);
    }
}
