//! Storage collaborator abstraction.
//!
//! The engine only needs query-shaped reads over the catalog and the
//! interaction log. Backends (relational database, in-memory snapshot)
//! implement [`BookStore`], keeping schema and connection management out of
//! the scoring code.

use crate::error::RecResult;
use crate::types::{Book, Interaction, ScoredBook};
use std::collections::HashSet;

pub trait BookStore: Send + Sync {
    /// A bounded sample of the catalog used as the text-similarity corpus.
    fn sample_catalog(&self, limit: usize) -> RecResult<Vec<Book>>;

    /// Most recent interactions for a user, newest first.
    fn recent_interactions(&self, user_id: i64, limit: usize) -> RecResult<Vec<Interaction>>;

    /// Books whose genre contains `genre` (case-insensitive), best rated first.
    fn items_by_genre(
        &self,
        genre: &str,
        limit: usize,
        exclude: &HashSet<i64>,
    ) -> RecResult<Vec<Book>>;

    /// Books written by `author`, best rated first.
    fn items_by_author(
        &self,
        author: &str,
        limit: usize,
        exclude: &HashSet<i64>,
    ) -> RecResult<Vec<Book>>;

    /// Ranked candidates from readers whose positive engagement overlaps with
    /// the user's, plus human-readable reasons.
    fn neighbor_overlap_candidates(
        &self,
        user_id: i64,
        limit: usize,
    ) -> RecResult<(Vec<ScoredBook>, Vec<String>)>;

    fn count_interactions(&self, user_id: i64) -> RecResult<u64>;

    fn count_interests(&self, user_id: i64) -> RecResult<u64>;

    fn distinct_genres(&self, limit: usize) -> RecResult<Vec<String>>;

    fn book(&self, book_id: i64) -> RecResult<Option<Book>>;

    /// Every explicit rating as `(user_id, book_id, rating)`.
    fn explicit_ratings(&self) -> RecResult<Vec<(i64, i64, f64)>>;

    /// Books paired with their total interaction count, most interacted first.
    fn popular_candidates(&self, limit: usize) -> RecResult<Vec<(Book, u64)>>;

    /// Append an interaction to the log.
    fn record_interaction(&self, interaction: Interaction) -> RecResult<()>;
}
