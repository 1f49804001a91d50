//! Neighborhood collaborative filtering.
//!
//! The primary path delegates to the store's neighbor-overlap query over
//! implicit feedback. When that yields nothing, predictions fall back to
//! user-user Pearson correlation over explicit ratings.

use crate::cache::ModelCache;
use crate::exclusion::ExclusionSet;
use crate::scorer::{sort_by_rank, Candidates, Scorer};
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::store::BookStore;
use bookrec_core::types::{Source, UserProfile};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_RATING: f64 = 5.0;

/// Sparse user -> book -> rating matrix.
#[derive(Debug, Clone, Default)]
pub struct RatingMatrix {
    ratings: HashMap<i64, HashMap<i64, f64>>,
}

impl RatingMatrix {
    /// Later triples for the same (user, book) overwrite earlier ones.
    pub fn from_triples(triples: impl IntoIterator<Item = (i64, i64, f64)>) -> Self {
        let mut ratings: HashMap<i64, HashMap<i64, f64>> = HashMap::new();
        for (user, book, rating) in triples {
            ratings.entry(user).or_default().insert(book, rating);
        }
        Self { ratings }
    }

    pub fn user_ratings(&self, user_id: i64) -> Option<&HashMap<i64, f64>> {
        self.ratings.get(&user_id)
    }

    pub fn num_users(&self) -> usize {
        self.ratings.len()
    }

    pub fn mean_rating(&self, user_id: i64) -> Option<f64> {
        self.ratings.get(&user_id).and_then(mean)
    }

    /// Pearson correlation between two users over their common books.
    pub fn user_similarity(&self, a: i64, b: i64) -> f64 {
        match (self.ratings.get(&a), self.ratings.get(&b)) {
            (Some(ra), Some(rb)) => pearson(ra, rb),
            _ => 0.0,
        }
    }

    /// Users with strictly positive correlation to `user_id`, most similar
    /// first.
    pub fn positive_neighbors(&self, user_id: i64) -> Vec<(i64, f64)> {
        let Some(own) = self.ratings.get(&user_id) else {
            return Vec::new();
        };
        let mut neighbors: Vec<(i64, f64)> = self
            .ratings
            .iter()
            .filter(|(other, _)| **other != user_id)
            .map(|(other, theirs)| (*other, pearson(own, theirs)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();
        neighbors.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        neighbors
    }

    /// Mean-centered weighted prediction over the top `k` positive neighbors
    /// who rated the book. Always within `[0, 5]`.
    pub fn predict(&self, user_id: i64, book_id: i64, k: usize) -> f64 {
        let neighbors = self.positive_neighbors(user_id);
        self.predict_with(user_id, book_id, k, &neighbors)
    }

    fn predict_with(&self, user_id: i64, book_id: i64, k: usize, neighbors: &[(i64, f64)]) -> f64 {
        let Some(base) = self.mean_rating(user_id) else {
            return 0.0;
        };

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (neighbor, sim) in neighbors
            .iter()
            .filter(|(n, _)| self.rated(*n, book_id))
            .take(k)
        {
            let theirs = &self.ratings[neighbor];
            let Some(neighbor_mean) = mean(theirs) else {
                continue;
            };
            numerator += sim * (theirs[&book_id] - neighbor_mean);
            denominator += sim.abs();
        }

        let predicted = if denominator > 0.0 {
            base + numerator / denominator
        } else {
            base
        };
        predicted.clamp(0.0, MAX_RATING)
    }

    fn rated(&self, user_id: i64, book_id: i64) -> bool {
        self.ratings
            .get(&user_id)
            .is_some_and(|r| r.contains_key(&book_id))
    }
}

fn mean(ratings: &HashMap<i64, f64>) -> Option<f64> {
    if ratings.is_empty() {
        None
    } else {
        Some(ratings.values().sum::<f64>() / ratings.len() as f64)
    }
}

/// Pearson correlation restricted to commonly rated books. Fewer than two
/// common books, or zero variance on either side, gives 0.
pub fn pearson(a: &HashMap<i64, f64>, b: &HashMap<i64, f64>) -> f64 {
    let common: Vec<(f64, f64)> = a
        .iter()
        .filter_map(|(book, ra)| b.get(book).map(|rb| (*ra, *rb)))
        .collect();
    if common.len() < 2 {
        return 0.0;
    }

    let n = common.len() as f64;
    let mean_a = common.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_b = common.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &common {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (cov / denom).clamp(-1.0, 1.0)
    }
}

pub struct CollaborativeScorer {
    store: Arc<dyn BookStore>,
    cache: Arc<ModelCache>,
    neighbor_k: usize,
}

impl CollaborativeScorer {
    pub fn new(store: Arc<dyn BookStore>, cache: Arc<ModelCache>, neighbor_k: usize) -> Self {
        Self {
            store,
            cache,
            neighbor_k,
        }
    }

    fn rating_matrix(&self) -> RecResult<Arc<RatingMatrix>> {
        self.cache.ratings_or_build(|| {
            let triples = self.store.explicit_ratings()?;
            Ok(RatingMatrix::from_triples(triples))
        })
    }

    fn from_neighbor_overlap(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Candidates> {
        // Over-fetch so excluded books do not starve the result.
        let fetch = limit.saturating_add(exclude.len());
        let (scored, reasons) = self.store.neighbor_overlap_candidates(profile.user_id, fetch)?;
        let books = scored
            .into_iter()
            .filter(|s| !exclude.contains(s.book.id))
            .take(limit)
            .map(|s| {
                let mut book = s.book;
                book.rank_score = Some(s.score);
                book
            })
            .collect();
        Ok(Candidates { books, reasons })
    }

    fn from_ratings(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Candidates> {
        let matrix = self.rating_matrix()?;
        let Some(own) = matrix.user_ratings(profile.user_id) else {
            return Err(RecError::ComputationDegraded(
                "user has no explicit ratings".to_string(),
            ));
        };

        let neighbors = matrix.positive_neighbors(profile.user_id);
        let candidate_ids: BTreeSet<i64> = neighbors
            .iter()
            .filter_map(|(n, _)| matrix.user_ratings(*n))
            .flat_map(|r| r.keys().copied())
            .filter(|id| !own.contains_key(id) && !exclude.contains(*id))
            .collect();

        let mut books = Vec::new();
        for book_id in candidate_ids {
            let predicted = matrix.predict_with(profile.user_id, book_id, self.neighbor_k, &neighbors);
            if predicted < profile.rating_threshold {
                continue;
            }
            if let Some(mut book) = self.store.book(book_id)? {
                book.rank_score = Some(predicted / MAX_RATING);
                books.push(book);
            }
        }
        sort_by_rank(&mut books);
        books.truncate(limit);

        debug!(
            user_id = profile.user_id,
            neighbors = neighbors.len(),
            candidates = books.len(),
            "Pearson predictions computed"
        );

        Ok(Candidates {
            books,
            reasons: vec!["Predicted from readers who rate books the way you do".to_string()],
        })
    }
}

impl Scorer for CollaborativeScorer {
    fn source(&self) -> Source {
        Source::Collaborative
    }

    fn score(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Candidates> {
        match self.from_neighbor_overlap(profile, limit, exclude) {
            Ok(candidates) if !candidates.is_empty() => return Ok(candidates),
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = profile.user_id, error = %e, "Neighbor overlap query failed, using rating matrix");
            }
        }

        let candidates = self.from_ratings(profile, limit, exclude)?;
        if candidates.is_empty() {
            return Err(RecError::ComputationDegraded(
                "no collaborative predictions above threshold".to_string(),
            ));
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratings(pairs: &[(i64, f64)]) -> HashMap<i64, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_pearson_positive_for_agreeing_users() {
        let a = ratings(&[(1, 5.0), (2, 5.0), (3, 1.0)]);
        let b = ratings(&[(1, 4.0), (2, 4.0), (3, 2.0)]);
        let sim = pearson(&a, &b);
        assert!(sim > 0.0);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_zero_with_fewer_than_two_common_books() {
        let a = ratings(&[(1, 5.0), (2, 3.0)]);
        let b = ratings(&[(2, 4.0), (3, 1.0)]);
        assert_eq!(pearson(&a, &b), 0.0);
        assert_eq!(pearson(&a, &HashMap::new()), 0.0);
    }

    #[test]
    fn test_pearson_zero_for_constant_ratings() {
        let a = ratings(&[(1, 3.0), (2, 3.0)]);
        let b = ratings(&[(1, 1.0), (2, 5.0)]);
        assert_eq!(pearson(&a, &b), 0.0);
    }

    #[test]
    fn test_user_similarity_over_matrix() {
        let matrix = RatingMatrix::from_triples(vec![
            (1, 1, 5.0),
            (1, 2, 5.0),
            (1, 3, 1.0),
            (2, 1, 4.0),
            (2, 2, 4.0),
            (2, 3, 2.0),
            (3, 1, 1.0),
            (3, 2, 1.0),
            (3, 3, 5.0),
        ]);
        assert!(matrix.user_similarity(1, 2) > 0.0);
        assert!(matrix.user_similarity(1, 3) < 0.0);
        assert!((matrix.user_similarity(1, 1) - 1.0).abs() < 1e-9);
        assert_eq!(matrix.user_similarity(1, 99), 0.0);
    }

    #[test]
    fn test_prediction_uses_neighbor_deviation() {
        let matrix = RatingMatrix::from_triples(vec![
            (1, 10, 5.0),
            (1, 11, 5.0),
            (1, 12, 1.0),
            (2, 10, 4.0),
            (2, 11, 4.0),
            (2, 12, 2.0),
            (2, 13, 5.0),
        ]);
        // User 1 mean 11/3; user 2 mean 15/4, rated book 13 at +1.25.
        let predicted = matrix.predict(1, 13, 10);
        assert!((predicted - (11.0 / 3.0 + 1.25)).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_without_neighbors_is_user_mean() {
        let matrix = RatingMatrix::from_triples(vec![(1, 10, 4.0), (1, 11, 2.0), (2, 12, 5.0)]);
        assert!((matrix.predict(1, 12, 10) - 3.0).abs() < 1e-9);
        assert_eq!(matrix.predict(99, 12, 10), 0.0);
    }

    #[test]
    fn test_prediction_is_clamped() {
        let matrix = RatingMatrix::from_triples(vec![
            (1, 10, 5.0),
            (1, 11, 5.0),
            (1, 12, 4.0),
            (2, 10, 2.0),
            (2, 11, 2.0),
            (2, 12, 1.0),
            (2, 13, 5.0),
        ]);
        let predicted = matrix.predict(1, 13, 10);
        assert!((0.0..=5.0).contains(&predicted));
        assert_eq!(predicted, 5.0);
    }

    #[test]
    fn test_predictions_always_within_rating_range() {
        let mut triples = Vec::new();
        for user in 0..6_i64 {
            for book in 0..8_i64 {
                if (user + book) % 3 != 0 {
                    let rating = ((user * 7 + book * 3) % 5 + 1) as f64;
                    triples.push((user, book, rating));
                }
            }
        }
        let matrix = RatingMatrix::from_triples(triples);
        for user in 0..6 {
            for book in 0..8 {
                let p = matrix.predict(user, book, 10);
                assert!((0.0..=5.0).contains(&p), "prediction {p} out of range");
            }
        }
    }
}
