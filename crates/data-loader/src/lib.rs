//! # Data Loader Crate
//!
//! Loads rating data and item side information, and provides the matrix
//! containers every other crate works on.
//!
//! ## Main Components
//!
//! - **matrix**: `SparseMatrix` (CSR + CSC), `SparseVector`, `DenseMatrix`
//! - **types**: id aliases, `IdMap`, `RatingScale`, `DataIndex`
//! - **parser**: rating, relation and content feature files
//! - **index**: `DataIndex` construction and side-information joins
//! - **split**: ratio and date based train/held-out splits
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use std::path::Path;
//!
//! let index = DataIndex::load_from_files(Path::new("data/ratings.csv"))?;
//! let side = index.load_side_information(
//!     Some(Path::new("data/relations.csv")),
//!     Some(Path::new("data/content.csv")),
//! )?;
//!
//! let (users, items, ratings) = index.counts();
//! println!("{users} users rated {items} items {ratings} times");
//! ```

// Public modules
pub mod error;
pub mod index;
pub mod matrix;
pub mod parser;
pub mod split;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use index::SideInformation;
pub use matrix::{DenseMatrix, SparseMatrix, SparseVector};
pub use split::Split;
pub use types::{DataIndex, IdMap, ItemId, RatingScale, RawRating, UserId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_index_creation() {
        // Test that we can create an empty DataIndex
        let index = DataIndex::new();
        let (users, items, ratings) = index.counts();

        assert_eq!(users, 0);
        assert_eq!(items, 0);
        assert_eq!(ratings, 0);
        assert!(index.validate().is_err());
    }

    #[test]
    fn test_rating_scale_round_trip() {
        let scale = RatingScale::from_values(vec![5.0, 1.0, 3.0, 2.0, 4.0, 3.0]).unwrap();
        assert_eq!(scale.num_levels(), 5);
        assert_eq!(scale.midpoint(), 3.0);

        let mut r = scale.min();
        while r <= scale.max() {
            let back = scale.denormalize(scale.normalize(r));
            assert!((back - r).abs() < 1e-12, "round trip failed for {r}");
            r += 0.25;
        }
    }

    #[test]
    fn test_rating_scale_clamp() {
        let scale = RatingScale::from_values(vec![1.0, 5.0]).unwrap();
        assert_eq!(scale.clamp(7.2), 5.0);
        assert_eq!(scale.clamp(-1.0), 1.0);
        assert_eq!(scale.clamp(2.5), 2.5);
    }

    #[test]
    fn test_id_map() {
        let mut ids = IdMap::new();
        assert_eq!(ids.get_or_insert("a"), 0);
        assert_eq!(ids.get_or_insert("b"), 1);
        assert_eq!(ids.get_or_insert("a"), 0);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.outer(1), Some("b"));
        assert!(ids.inner("c").is_none());
    }
}
