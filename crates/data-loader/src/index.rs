//! DataIndex building and side-information joins.
//!
//! Ratings define the id space. Relation and content files are joined on
//! external item ids; rows naming items that never appear in the ratings are
//! dropped, exactly like unknown ids inside a relation list.

use crate::error::{DataLoadError, Result};
use crate::matrix::SparseMatrix;
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Item-side matrices loaded next to the ratings
#[derive(Debug, Clone, Default)]
pub struct SideInformation {
    /// items x items, `relations[i][g] = 1` when item `i` lists `g`
    pub relations: Option<SparseMatrix>,
    /// content_dim x items, min-max normalized
    pub content: Option<SparseMatrix>,
}

impl DataIndex {
    /// Load a rating file and index it.
    ///
    /// Steps:
    /// 1. Parse the rating lines
    /// 2. Assign dense user/item indices
    /// 3. Build the rating and timestamp matrices
    /// 4. Derive the rating scale and validate
    pub fn load_from_files(ratings_path: &Path) -> Result<Self> {
        info!("Loading ratings from {:?}", ratings_path);
        let ratings = parser::parse_ratings(ratings_path)?;
        let index = Self::from_ratings(ratings)?;

        let (users, items, ratings) = index.counts();
        info!("Indexed {} users, {} items, {} ratings", users, items, ratings);
        Ok(index)
    }

    /// Build an index from already-parsed ratings
    pub fn from_ratings(ratings: Vec<RawRating>) -> Result<Self> {
        let mut index = DataIndex::new();

        let mut rate_triplets = Vec::with_capacity(ratings.len());
        let mut time_triplets = Vec::new();
        for rating in &ratings {
            if !rating.value.is_finite() {
                return Err(DataLoadError::InvalidValue {
                    field: "rating".to_string(),
                    value: rating.value.to_string(),
                });
            }
            let u = index.user_ids.get_or_insert(&rating.user);
            let i = index.item_ids.get_or_insert(&rating.item);
            rate_triplets.push((u, i, rating.value));
            if let Some(ts) = rating.timestamp {
                time_triplets.push((u, i, ts as f64));
            }
        }

        let (num_users, num_items) = (index.user_ids.len(), index.item_ids.len());
        index.rate_matrix = SparseMatrix::from_triplets(num_users, num_items, rate_triplets)?;
        if !time_triplets.is_empty() {
            index.time_matrix = Some(SparseMatrix::from_triplets(
                num_users,
                num_items,
                time_triplets,
            )?);
        }
        index.rating_scale = RatingScale::from_values(ratings.iter().map(|r| r.value));

        index.validate()?;
        Ok(index)
    }

    /// Load the optional relation and content files in parallel
    pub fn load_side_information(
        &self,
        relations_path: Option<&Path>,
        content_path: Option<&Path>,
    ) -> Result<SideInformation> {
        let (relations, content) = rayon::join(
            || relations_path.map(|p| self.load_relations(p)).transpose(),
            || content_path.map(|p| self.load_content_features(p)).transpose(),
        );
        Ok(SideInformation {
            relations: relations?,
            content: content?,
        })
    }

    /// Load an item relation file into an items x items binary matrix
    pub fn load_relations(&self, path: &Path) -> Result<SparseMatrix> {
        let rows = parser::parse_relations(path)?;
        let triplets: Vec<(usize, usize, f64)> = rows
            .par_iter()
            .filter_map(|(item, related)| {
                let i = self.item_ids.inner(item)?;
                Some(
                    related
                        .iter()
                        .filter_map(|r| self.item_ids.inner(r))
                        .map(|g| (i, g, 1.0))
                        .collect::<Vec<_>>(),
                )
            })
            .flatten()
            .collect();

        debug!("Relation file {:?}: {} known pairs", path, triplets.len());
        let n = self.num_items();
        SparseMatrix::from_triplets(n, n, triplets)
    }

    /// Load a content feature file into a content_dim x items matrix.
    ///
    /// Only positive values are stored. Stored values are min-max normalized
    /// with the global min/max across the whole matrix.
    pub fn load_content_features(&self, path: &Path) -> Result<SparseMatrix> {
        let rows = parser::parse_content_features(path)?;
        let dim = rows.first().map(|(_, v)| v.len()).unwrap_or(0);

        let mut triplets = Vec::new();
        for (item, values) in &rows {
            let Some(j) = self.item_ids.inner(item) else {
                continue;
            };
            for (d, &v) in values.iter().enumerate() {
                if v > 0.0 {
                    triplets.push((d, j, v));
                }
            }
        }

        let mut content = SparseMatrix::from_triplets(dim, self.num_items(), triplets)?;
        if let Some((min, max)) = content.value_range() {
            content.normalize(min, max);
        }
        debug!(
            "Content file {:?}: dim={}, {} stored values",
            path,
            dim,
            content.len()
        );
        Ok(content)
    }

    /// Validate data integrity
    ///
    /// A usable dataset has at least one rating and a rating scale.
    pub fn validate(&self) -> Result<()> {
        if self.rate_matrix.is_empty() {
            return Err(DataLoadError::ValidationError(
                "rating data is empty".to_string(),
            ));
        }
        if self.rating_scale.is_none() {
            return Err(DataLoadError::ValidationError(
                "no rating scale could be derived".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(user: &str, item: &str, value: f64, ts: Option<i64>) -> RawRating {
        RawRating {
            user: user.to_string(),
            item: item.to_string(),
            value,
            timestamp: ts,
        }
    }

    /// Items a, b and c get indices 0, 1 and 2
    fn abc_index() -> DataIndex {
        DataIndex::from_ratings(vec![
            raw("u1", "a", 4.0, None),
            raw("u1", "b", 2.0, None),
            raw("u2", "c", 5.0, None),
        ])
        .unwrap()
    }

    fn temp_file(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("data-loader-index-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_from_ratings_assigns_dense_ids() {
        let index = DataIndex::from_ratings(vec![
            raw("alice", "x", 5.0, Some(10)),
            raw("bob", "y", 3.0, Some(20)),
            raw("alice", "y", 1.0, Some(5)),
        ])
        .unwrap();

        assert_eq!(index.counts(), (2, 2, 3));
        assert_eq!(index.user_ids().inner("bob"), Some(1));
        assert_eq!(index.item_ids().outer(0), Some("x"));
        assert_eq!(index.rate_matrix().get(0, 1), Some(1.0));
        assert_eq!(index.timestamp_range(), Some((5, 20)));

        let scale = index.rating_scale().unwrap();
        assert_eq!(scale.levels(), &[1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_empty_ratings_are_rejected() {
        let result = DataIndex::from_ratings(vec![]);
        assert!(matches!(result, Err(DataLoadError::ValidationError(_))));
    }

    #[test]
    fn test_nan_rating_is_rejected() {
        let result = DataIndex::from_ratings(vec![raw("u", "i", f64::NAN, None)]);
        assert!(matches!(result, Err(DataLoadError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_relations_keeps_direction_and_drops_unknown_items() {
        let index = abc_index();
        let path = temp_file("relations.csv", "a,b,zzz\nb,c\nzzz,a\n");
        let relations = index.load_relations(&path).unwrap();

        assert_eq!(relations.num_rows(), 3);
        assert_eq!(relations.num_columns(), 3);
        assert_eq!(relations.len(), 2);
        // a lists b, b does not list a
        assert_eq!(relations.get(0, 1), Some(1.0));
        assert_eq!(relations.get(1, 0), None);
        assert_eq!(relations.get(1, 2), Some(1.0));
        assert_eq!(relations.get(2, 1), None);
        assert!(relations.row(2).is_empty());
    }

    #[test]
    fn test_load_content_features_normalizes_positive_values_globally() {
        let index = abc_index();
        let path = temp_file("content.csv", "a,0,2,4\nb,6,0,0\nzzz,9,9,9\nc,-1,0,0\n");
        let content = index.load_content_features(&path).unwrap();

        // content_dim x items
        assert_eq!(content.num_rows(), 3);
        assert_eq!(content.num_columns(), 3);
        assert_eq!(content.len(), 3);

        // Stored values span 2..6 once the unknown item is dropped
        assert_eq!(content.get(1, 0), Some(0.0));
        assert_eq!(content.get(2, 0), Some(0.5));
        assert_eq!(content.get(0, 1), Some(1.0));

        assert_eq!(content.get(0, 0), None);
        assert_eq!(content.get(1, 1), None);
        assert!(content.column(2).is_empty());
    }

    #[test]
    fn test_load_side_information_reads_both_files() {
        let index = abc_index();
        let relations = temp_file("side-relations.csv", "c,a\n");
        let content = temp_file("side-content.csv", "a,1\nb,3\n");

        let side = index
            .load_side_information(Some(&relations), Some(&content))
            .unwrap();
        assert_eq!(side.relations.unwrap().get(2, 0), Some(1.0));
        let content = side.content.unwrap();
        assert_eq!(content.get(0, 0), Some(0.0));
        assert_eq!(content.get(0, 1), Some(1.0));

        let none = index.load_side_information(None, None).unwrap();
        assert!(none.relations.is_none() && none.content.is_none());
    }
}
