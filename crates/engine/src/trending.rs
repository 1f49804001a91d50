//! Popularity scoring from rating and interaction volume.

use crate::exclusion::ExclusionSet;
use crate::scorer::{sort_by_rank, Candidates, Scorer};
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::store::BookStore;
use bookrec_core::types::{Book, Source, UserProfile};
use std::collections::HashSet;
use std::sync::Arc;

/// Raw popularity scores are divided by this before clamping to [0, 1].
const NORMALIZER: f64 = 20.0;
const GENRE_BOOST: f64 = 1.3;

/// `rating * ln(1 + interactions)`.
pub fn popularity_score(rating: f64, interactions: u64) -> f64 {
    rating * (1.0 + interactions as f64).ln()
}

pub fn normalize(raw: f64) -> f64 {
    (raw / NORMALIZER).clamp(0.0, 1.0)
}

pub struct TrendingScorer {
    store: Arc<dyn BookStore>,
    scan_limit: usize,
}

impl TrendingScorer {
    pub fn new(store: Arc<dyn BookStore>, scan_limit: usize) -> Self {
        Self { store, scan_limit }
    }

    fn trending_books(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Vec<Book>> {
        let popular = self.store.popular_candidates(self.scan_limit)?;
        let mut books: Vec<Book> = popular
            .into_iter()
            .filter(|(book, count)| {
                *count > 0 && !exclude.contains(book.id) && book.meets_rating(profile.rating_threshold)
            })
            .map(|(mut book, count)| {
                let rating = book.rating.unwrap_or_default();
                let mut score = normalize(popularity_score(rating, count));
                if book.genre_matches(&profile.selected_genres) {
                    score = (score * GENRE_BOOST).min(1.0);
                }
                book.rank_score = Some(score);
                book
            })
            .collect();
        sort_by_rank(&mut books);
        books.truncate(limit);
        Ok(books)
    }

    /// Trending books topped up with the best-rated catalog books, for when
    /// every personalised strategy came back empty. The top-up books may have
    /// no interactions at all; fusion still reports the whole list under
    /// [`Source::Trending`].
    pub fn fallback(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Vec<Book>> {
        let mut books = self.trending_books(profile, limit, exclude)?;
        if books.len() >= limit {
            return Ok(books);
        }

        let chosen: HashSet<i64> = books.iter().map(|b| b.id).collect();
        let mut top_rated: Vec<Book> = self
            .store
            .sample_catalog(self.scan_limit)?
            .into_iter()
            .filter(|b| {
                !exclude.contains(b.id)
                    && !chosen.contains(&b.id)
                    && b.meets_rating(profile.rating_threshold)
            })
            .map(|mut b| {
                b.rank_score = b.rating.map(|r| (r / 5.0).clamp(0.0, 1.0));
                b
            })
            .collect();
        sort_by_rank(&mut top_rated);
        books.extend(top_rated.into_iter().take(limit - books.len()));
        Ok(books)
    }
}

impl Scorer for TrendingScorer {
    fn source(&self) -> Source {
        Source::Trending
    }

    fn score(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Candidates> {
        let books = self.trending_books(profile, limit, exclude)?;
        if books.is_empty() {
            return Err(RecError::ComputationDegraded(
                "no trending books above the rating threshold".to_string(),
            ));
        }
        Ok(Candidates {
            books,
            reasons: vec!["Trending with readers right now".to_string()],
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bookrec_core::types::{Interaction, InteractionKind};
    use bookrec_store::InMemoryStore;
    use chrono::Utc;

    fn views(store: &InMemoryStore, book_id: i64, n: i64) {
        for user_id in 0..n {
            store.push_interaction(Interaction {
                user_id,
                book_id,
                kind: InteractionKind::View,
                rating: None,
                occurred_at: Utc::now(),
            });
        }
    }

    #[test]
    fn test_popularity_strictly_increases_with_volume() {
        let mut previous = popularity_score(4.0, 0);
        for count in 1..200 {
            let current = popularity_score(4.0, count);
            assert!(current > previous);
            previous = current;
        }
    }

    #[test]
    fn test_normalization_is_clamped() {
        assert_eq!(normalize(40.0), 1.0);
        assert!((normalize(10.0) - 0.5).abs() < 1e-12);
        assert_eq!(normalize(-1.0), 0.0);
    }

    #[test]
    fn test_filters_threshold_and_applies_genre_boost() {
        let store = InMemoryStore::with_books(vec![
            Book::new(1, "A", "X").with_genre("Mystery").with_rating(4.0),
            Book::new(2, "B", "Y").with_genre("Horror").with_rating(4.0),
            Book::new(3, "C", "Z").with_genre("Mystery").with_rating(2.0),
            Book::new(4, "D", "W").with_genre("Horror").with_rating(4.8),
        ]);
        views(&store, 1, 3);
        views(&store, 2, 3);
        views(&store, 3, 50);
        let scorer = TrendingScorer::new(Arc::new(store), 100);

        let mut profile = UserProfile::new(100);
        profile.selected_genres = vec!["mystery".to_string()];
        let candidates = scorer.score(&profile, 10, &ExclusionSet::empty()).unwrap();

        let ids: Vec<i64> = candidates.ids().collect();
        // Book 3 is below threshold, book 4 has no interactions.
        assert_eq!(ids, vec![1, 2]);
        let boosted = candidates.books[0].rank_score.unwrap();
        let plain = candidates.books[1].rank_score.unwrap();
        assert!((boosted - plain * 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_exclusions_and_degraded_when_empty() {
        let store = InMemoryStore::with_books(vec![Book::new(1, "A", "X").with_rating(4.0)]);
        views(&store, 1, 2);
        let scorer = TrendingScorer::new(Arc::new(store), 100);
        let exclude: ExclusionSet = [1].into_iter().collect();
        let err = scorer
            .score(&UserProfile::new(100), 5, &exclude)
            .unwrap_err();
        assert!(err.is_degraded());
    }

    #[test]
    fn test_fallback_tops_up_with_best_rated() {
        let store = InMemoryStore::with_books(vec![
            Book::new(1, "A", "X").with_rating(4.0),
            Book::new(2, "B", "Y").with_rating(4.9),
            Book::new(3, "C", "Z").with_rating(3.6),
            Book::new(4, "D", "W").with_rating(1.0),
        ]);
        views(&store, 1, 1);
        let scorer = TrendingScorer::new(Arc::new(store), 100);
        let books = scorer
            .fallback(&UserProfile::new(100), 10, &ExclusionSet::empty())
            .unwrap();
        let ids: Vec<i64> = books.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
