//! Scoring seam between a trained model and the evaluator.

use data_loader::{ItemId, UserId};

/// Anything that can score a `(user, item)` pair for ranking.
///
/// ## Design Note
/// - `Send + Sync` because every evaluation worker shares one scorer
/// - A `NaN` score means "cannot score"; the item is left out of the ranking
/// - Closures `Fn(UserId, ItemId) -> f64` implement this trait directly
pub trait RankingScorer: Send + Sync {
    /// Returns the name of this scorer (for logging/debugging)
    fn name(&self) -> &str {
        "scorer"
    }

    /// Ranking score of `item` for `user`, higher is better
    fn score(&self, user: UserId, item: ItemId) -> f64;
}

impl<F> RankingScorer for F
where
    F: Fn(UserId, ItemId) -> f64 + Send + Sync,
{
    fn score(&self, user: UserId, item: ItemId) -> f64 {
        self(user, item)
    }
}
