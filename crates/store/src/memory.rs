//! In-process storage collaborator backed by DashMap for lock-free
//! concurrent access. Serves snapshots, tests and benchmarks.

use crate::snapshot::Snapshot;
use bookrec_core::error::RecResult;
use bookrec_core::store::BookStore;
use bookrec_core::types::{Book, Interaction, InteractionKind, ScoredBook};
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Ratings at or above this count as positive engagement for neighbor overlap.
const POSITIVE_RATING: f64 = 4.0;

pub struct InMemoryStore {
    books: DashMap<i64, Book>,
    /// Per-user interaction log in insertion order.
    interactions: DashMap<i64, Vec<Interaction>>,
    interests: DashMap<i64, u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            interactions: DashMap::new(),
            interests: DashMap::new(),
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let store = Self::new();
        for book in &snapshot.books {
            store.insert_book(book.clone());
        }
        for interaction in &snapshot.interactions {
            store.push_interaction(interaction.clone());
        }
        for (user_id, count) in &snapshot.interests {
            store.set_interests(*user_id, *count);
        }
        store
    }

    pub fn with_books(books: impl IntoIterator<Item = Book>) -> Self {
        let store = Self::new();
        for book in books {
            store.insert_book(book);
        }
        store
    }

    pub fn insert_book(&self, mut book: Book) {
        book.rank_score = None;
        self.books.insert(book.id, book);
    }

    pub fn push_interaction(&self, interaction: Interaction) {
        self.interactions
            .entry(interaction.user_id)
            .or_default()
            .push(interaction);
    }

    pub fn set_interests(&self, user_id: i64, count: u64) {
        self.interests.insert(user_id, count);
    }

    pub fn book_count(&self) -> usize {
        self.books.len()
    }

    /// Catalog snapshot ordered by id, so every query is deterministic.
    fn sorted_books(&self) -> Vec<Book> {
        let mut books: Vec<Book> = self.books.iter().map(|b| b.value().clone()).collect();
        books.sort_by_key(|b| b.id);
        books
    }

    fn best_rated(mut books: Vec<Book>, limit: usize) -> Vec<Book> {
        books.sort_by(|a, b| {
            let ra = a.rating.unwrap_or(f64::NEG_INFINITY);
            let rb = b.rating.unwrap_or(f64::NEG_INFINITY);
            rb.total_cmp(&ra).then_with(|| a.id.cmp(&b.id))
        });
        books.truncate(limit);
        books
    }

    fn positive_books(interactions: &[Interaction]) -> BTreeSet<i64> {
        interactions
            .iter()
            .filter(|i| match i.kind {
                InteractionKind::Like | InteractionKind::WishlistAdd => true,
                InteractionKind::Rate => i.rating.is_some_and(|r| r >= POSITIVE_RATING),
                _ => false,
            })
            .map(|i| i.book_id)
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookStore for InMemoryStore {
    fn sample_catalog(&self, limit: usize) -> RecResult<Vec<Book>> {
        let mut books = self.sorted_books();
        books.truncate(limit);
        Ok(books)
    }

    fn recent_interactions(&self, user_id: i64, limit: usize) -> RecResult<Vec<Interaction>> {
        let mut log = self
            .interactions
            .get(&user_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        // Stable sort keeps later insertions first among equal timestamps.
        log.reverse();
        log.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        log.truncate(limit);
        Ok(log)
    }

    fn items_by_genre(
        &self,
        genre: &str,
        limit: usize,
        exclude: &HashSet<i64>,
    ) -> RecResult<Vec<Book>> {
        let query = [genre.to_string()];
        let matches = self
            .sorted_books()
            .into_iter()
            .filter(|b| !exclude.contains(&b.id) && b.genre_matches(&query))
            .collect();
        Ok(Self::best_rated(matches, limit))
    }

    fn items_by_author(
        &self,
        author: &str,
        limit: usize,
        exclude: &HashSet<i64>,
    ) -> RecResult<Vec<Book>> {
        let author = author.trim().to_lowercase();
        let matches = self
            .sorted_books()
            .into_iter()
            .filter(|b| !exclude.contains(&b.id) && b.author.trim().to_lowercase() == author)
            .collect();
        Ok(Self::best_rated(matches, limit))
    }

    fn neighbor_overlap_candidates(
        &self,
        user_id: i64,
        limit: usize,
    ) -> RecResult<(Vec<ScoredBook>, Vec<String>)> {
        let own_log = self
            .interactions
            .get(&user_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        let own_positive = Self::positive_books(&own_log);
        if own_positive.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let seen: HashSet<i64> = own_log.iter().map(|i| i.book_id).collect();

        let mut scores: HashMap<i64, f64> = HashMap::new();
        let mut neighbors = 0usize;
        for entry in self.interactions.iter() {
            if *entry.key() == user_id {
                continue;
            }
            let theirs = Self::positive_books(entry.value());
            let overlap = theirs.intersection(&own_positive).count();
            if overlap == 0 {
                continue;
            }
            neighbors += 1;
            for book_id in theirs.difference(&own_positive) {
                if !seen.contains(book_id) {
                    *scores.entry(*book_id).or_insert(0.0) += overlap as f64;
                }
            }
        }

        let max = scores.values().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut ranked: Vec<ScoredBook> = scores
            .into_iter()
            .filter_map(|(id, score)| {
                self.books.get(&id).map(|b| ScoredBook {
                    book: b.value().clone(),
                    score: score / max,
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.book.id.cmp(&b.book.id))
        });
        ranked.truncate(limit);

        debug!(user_id, neighbors, candidates = ranked.len(), "Neighbor overlap computed");

        let reasons = vec![format!(
            "Readers with similar taste ({neighbors} of them) also enjoyed these"
        )];
        Ok((ranked, reasons))
    }

    fn count_interactions(&self, user_id: i64) -> RecResult<u64> {
        Ok(self
            .interactions
            .get(&user_id)
            .map_or(0, |v| v.len() as u64))
    }

    fn count_interests(&self, user_id: i64) -> RecResult<u64> {
        Ok(self.interests.get(&user_id).map_or(0, |c| *c))
    }

    fn distinct_genres(&self, limit: usize) -> RecResult<Vec<String>> {
        let genres: BTreeSet<String> = self
            .books
            .iter()
            .filter_map(|b| b.value().genre.clone())
            .filter(|g| !g.trim().is_empty())
            .collect();
        Ok(genres.into_iter().take(limit).collect())
    }

    fn book(&self, book_id: i64) -> RecResult<Option<Book>> {
        Ok(self.books.get(&book_id).map(|b| b.value().clone()))
    }

    fn explicit_ratings(&self) -> RecResult<Vec<(i64, i64, f64)>> {
        let mut ratings: Vec<(i64, i64, f64)> = self
            .interactions
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|i| i.kind == InteractionKind::Rate)
                    .filter_map(|i| i.rating.map(|r| (i.user_id, i.book_id, r)))
                    .collect::<Vec<_>>()
            })
            .collect();
        ratings.sort_by_key(|(user, book, _)| (*user, *book));
        Ok(ratings)
    }

    fn popular_candidates(&self, limit: usize) -> RecResult<Vec<(Book, u64)>> {
        let mut counts: HashMap<i64, u64> = HashMap::new();
        for entry in self.interactions.iter() {
            for interaction in entry.value() {
                *counts.entry(interaction.book_id).or_insert(0) += 1;
            }
        }
        let mut popular: Vec<(Book, u64)> = counts
            .into_iter()
            .filter_map(|(id, count)| self.books.get(&id).map(|b| (b.value().clone(), count)))
            .collect();
        popular.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        popular.truncate(limit);
        Ok(popular)
    }

    fn record_interaction(&self, interaction: Interaction) -> RecResult<()> {
        self.push_interaction(interaction);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn interaction(user_id: i64, book_id: i64, kind: InteractionKind, rating: Option<f64>) -> Interaction {
        Interaction {
            user_id,
            book_id,
            kind,
            rating,
            occurred_at: Utc::now(),
        }
    }

    fn catalog() -> InMemoryStore {
        InMemoryStore::with_books(vec![
            Book::new(1, "Emma", "Jane Austen").with_genre("Classics").with_rating(4.1),
            Book::new(2, "Persuasion", "Jane Austen").with_genre("Classics").with_rating(4.3),
            Book::new(3, "Dune", "Frank Herbert").with_genre("Science Fiction").with_rating(4.6),
            Book::new(4, "Neuromancer", "William Gibson").with_genre("Science Fiction").with_rating(3.9),
            Book::new(5, "Untitled Draft", "Anon"),
        ])
    }

    #[test]
    fn test_recent_interactions_newest_first() {
        let store = catalog();
        let now = Utc::now();
        for (i, book_id) in [1, 2, 3].into_iter().enumerate() {
            store.push_interaction(Interaction {
                user_id: 7,
                book_id,
                kind: InteractionKind::View,
                rating: None,
                occurred_at: now - Duration::minutes(10 - i as i64),
            });
        }
        let recent = store.recent_interactions(7, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].book_id, 3);
        assert_eq!(recent[1].book_id, 2);
        assert!(store.recent_interactions(8, 10).unwrap().is_empty());
    }

    #[test]
    fn test_items_by_genre_orders_by_rating_and_excludes() {
        let store = catalog();
        let books = store.items_by_genre("fiction", 10, &HashSet::new()).unwrap();
        assert_eq!(books.iter().map(|b| b.id).collect::<Vec<_>>(), vec![3, 4]);

        let exclude: HashSet<i64> = [3].into_iter().collect();
        let books = store.items_by_genre("Science Fiction", 10, &exclude).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, 4);
    }

    #[test]
    fn test_items_by_author_is_case_insensitive() {
        let store = catalog();
        let books = store.items_by_author("jane austen", 1, &HashSet::new()).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, 2);
    }

    #[test]
    fn test_neighbor_overlap_recommends_unseen_positive_books() {
        let store = catalog();
        store.push_interaction(interaction(1, 1, InteractionKind::Like, None));
        store.push_interaction(interaction(2, 1, InteractionKind::Rate, Some(5.0)));
        store.push_interaction(interaction(2, 3, InteractionKind::WishlistAdd, None));
        store.push_interaction(interaction(2, 4, InteractionKind::Rate, Some(2.0)));

        let (candidates, reasons) = store.neighbor_overlap_candidates(1, 10).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].book.id, 3);
        assert!((candidates[0].score - 1.0).abs() < 1e-9);
        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn test_neighbor_overlap_empty_without_positive_history() {
        let store = catalog();
        store.push_interaction(interaction(1, 1, InteractionKind::View, None));
        let (candidates, reasons) = store.neighbor_overlap_candidates(1, 10).unwrap();
        assert!(candidates.is_empty());
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_counts_and_genres() {
        let store = catalog();
        store.push_interaction(interaction(1, 1, InteractionKind::View, None));
        store.push_interaction(interaction(1, 2, InteractionKind::Click, None));
        store.set_interests(1, 4);
        assert_eq!(store.count_interactions(1).unwrap(), 2);
        assert_eq!(store.count_interests(1).unwrap(), 4);
        assert_eq!(store.count_interests(2).unwrap(), 0);
        assert_eq!(
            store.distinct_genres(10).unwrap(),
            vec!["Classics".to_string(), "Science Fiction".to_string()]
        );
    }

    #[test]
    fn test_explicit_ratings_only_include_rate_events() {
        let store = catalog();
        store.push_interaction(interaction(1, 1, InteractionKind::Rate, Some(4.0)));
        store.push_interaction(interaction(1, 2, InteractionKind::View, Some(3.0)));
        store.push_interaction(interaction(2, 1, InteractionKind::Rate, None));
        assert_eq!(store.explicit_ratings().unwrap(), vec![(1, 1, 4.0)]);
    }

    #[test]
    fn test_popular_candidates_by_interaction_volume() {
        let store = catalog();
        store.push_interaction(interaction(1, 3, InteractionKind::View, None));
        store.push_interaction(interaction(2, 3, InteractionKind::View, None));
        store.push_interaction(interaction(2, 1, InteractionKind::View, None));
        let popular = store.popular_candidates(10).unwrap();
        assert_eq!(popular[0].0.id, 3);
        assert_eq!(popular[0].1, 2);
        assert_eq!(popular[1].1, 1);
    }

    #[test]
    fn test_from_snapshot() {
        let snapshot = Snapshot {
            books: vec![Book::new(1, "Emma", "Jane Austen")],
            interests: [(3, 2)].into_iter().collect(),
            ..Default::default()
        };
        let store = InMemoryStore::from_snapshot(&snapshot);
        assert_eq!(store.book_count(), 1);
        assert_eq!(store.count_interests(3).unwrap(), 2);
        assert!(store.book(1).unwrap().is_some());
        assert!(store.book(2).unwrap().is_none());
    }
}
