//! Recommends unseen books by the authors a reader engages with most.

use crate::exclusion::ExclusionSet;
use crate::scorer::{Candidates, Scorer};
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::store::BookStore;
use bookrec_core::types::{Source, UserProfile};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const AUTHOR_AFFINITY: f64 = 0.8;

pub struct AuthorAffinityScorer {
    store: Arc<dyn BookStore>,
    top_k: usize,
    history_limit: usize,
}

impl AuthorAffinityScorer {
    pub fn new(store: Arc<dyn BookStore>, top_k: usize, history_limit: usize) -> Self {
        Self {
            store,
            top_k,
            history_limit,
        }
    }

    /// Authors ranked by rate/wishlist/like count, falling back to the
    /// profile's favourites when history gives none.
    pub fn top_authors(&self, profile: &UserProfile) -> RecResult<Vec<String>> {
        let history = self
            .store
            .recent_interactions(profile.user_id, self.history_limit)?;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for interaction in history.iter().filter(|i| i.kind.is_affinity_signal()) {
            if let Some(book) = self.store.book(interaction.book_id)? {
                let author = book.author.trim();
                if !author.is_empty() {
                    *counts.entry(author.to_string()).or_insert(0) += 1;
                }
            }
        }

        if counts.is_empty() {
            return Ok(profile
                .favorite_authors
                .iter()
                .filter(|a| !a.trim().is_empty())
                .take(self.top_k)
                .cloned()
                .collect());
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked
            .into_iter()
            .take(self.top_k)
            .map(|(author, _)| author)
            .collect())
    }
}

impl Scorer for AuthorAffinityScorer {
    fn source(&self) -> Source {
        Source::Author
    }

    fn score(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Candidates> {
        let authors = self.top_authors(profile)?;
        let mut excluded = exclude.to_set();
        let mut candidates = Candidates::default();

        for author in &authors {
            let remaining = limit.saturating_sub(candidates.len());
            if remaining == 0 {
                break;
            }
            let books = self.store.items_by_author(author, remaining, &excluded)?;
            if books.is_empty() {
                continue;
            }
            for mut book in books.into_iter().take(remaining) {
                excluded.insert(book.id);
                book.rank_score = Some(AUTHOR_AFFINITY);
                candidates.books.push(book);
            }
            candidates
                .reasons
                .push(format!("Because you enjoy books by {author}"));
        }

        debug!(
            user_id = profile.user_id,
            authors = authors.len(),
            books = candidates.len(),
            "Author affinity scored"
        );

        if candidates.is_empty() {
            return Err(RecError::ComputationDegraded(
                "no unseen books by favoured authors".to_string(),
            ));
        }
        Ok(candidates)
    }
}
