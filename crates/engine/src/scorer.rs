//! Common scorer contract.
//!
//! Every strategy implements [`Scorer`], so the fusion pipeline can run them
//! uniformly and treat a failed scorer exactly like an empty one.

use crate::exclusion::ExclusionSet;
use bookrec_core::error::RecResult;
use bookrec_core::types::{Book, Source, UserProfile};

/// Ranked books from one strategy, each carrying `rank_score`, plus the
/// reasons shown to the reader.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub books: Vec<Book>,
    pub reasons: Vec<String>,
}

impl Candidates {
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.books.iter().map(|b| b.id)
    }
}

pub trait Scorer: Send + Sync {
    fn source(&self) -> Source;

    /// Score at most `limit` books, never returning an id in `exclude`.
    fn score(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Candidates>;
}

/// Sort by `rank_score` descending, ties broken by id.
pub fn sort_by_rank(books: &mut [Book]) {
    books.sort_by(|a, b| {
        let sa = a.rank_score.unwrap_or(0.0);
        let sb = b.rank_score.unwrap_or(0.0);
        sb.total_cmp(&sa).then_with(|| a.id.cmp(&b.id))
    });
}
