//! Injects well-rated books from genres the reader has not explored.

use crate::exclusion::ExclusionSet;
use crate::scorer::{Candidates, Scorer};
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::store::BookStore;
use bookrec_core::types::{Source, UserProfile};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const DIVERSITY_AFFINITY: f64 = 0.4;
const MAX_NEW_GENRES: usize = 3;

pub struct DiversityInjector {
    store: Arc<dyn BookStore>,
    genre_scan_limit: usize,
}

impl DiversityInjector {
    pub fn new(store: Arc<dyn BookStore>, genre_scan_limit: usize) -> Self {
        Self {
            store,
            genre_scan_limit,
        }
    }

    /// Selected genres plus interaction-weight keys, lowercased.
    pub fn explored_genres(profile: &UserProfile) -> HashSet<String> {
        profile
            .selected_genres
            .iter()
            .chain(profile.interaction_weights.keys())
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty())
            .collect()
    }

    /// Up to three unexplored catalog genres, or three random ones when the
    /// reader has explored them all.
    pub fn pick_genres(&self, profile: &UserProfile) -> RecResult<Vec<String>> {
        let catalog = self.store.distinct_genres(self.genre_scan_limit)?;
        let explored = Self::explored_genres(profile);

        let unexplored: Vec<String> = catalog
            .iter()
            .filter(|g| !explored.contains(&g.trim().to_lowercase()))
            .take(MAX_NEW_GENRES)
            .cloned()
            .collect();
        if !unexplored.is_empty() {
            return Ok(unexplored);
        }

        let mut rng = rand::thread_rng();
        Ok(catalog
            .choose_multiple(&mut rng, MAX_NEW_GENRES)
            .cloned()
            .collect())
    }
}

impl Scorer for DiversityInjector {
    fn source(&self) -> Source {
        Source::Diversity
    }

    fn score(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Candidates> {
        let genres = self.pick_genres(profile)?;
        if genres.is_empty() || limit == 0 {
            return Err(RecError::ComputationDegraded(
                "no genres available for diversity".to_string(),
            ));
        }

        let per_genre = limit.div_ceil(genres.len());
        let mut excluded = exclude.to_set();
        let mut candidates = Candidates::default();
        let mut contributing = Vec::new();

        for genre in &genres {
            let remaining = limit.saturating_sub(candidates.len());
            if remaining == 0 {
                break;
            }
            let share = per_genre.min(remaining);
            let books = self.store.items_by_genre(genre, share, &excluded)?;
            let before = candidates.len();
            for mut book in books
                .into_iter()
                .filter(|b| b.meets_rating(profile.rating_threshold))
                .take(share)
            {
                excluded.insert(book.id);
                book.rank_score = Some(DIVERSITY_AFFINITY);
                candidates.books.push(book);
            }
            if candidates.len() > before {
                contributing.push(genre.as_str());
            }
        }

        debug!(
            user_id = profile.user_id,
            genres = ?genres,
            books = candidates.len(),
            "Diversity injected"
        );

        if candidates.is_empty() {
            return Err(RecError::ComputationDegraded(
                "no well-rated books in unexplored genres".to_string(),
            ));
        }
        candidates.reasons.push(format!(
            "Something different: exploring {}",
            contributing.join(", ")
        ));
        Ok(candidates)
    }
}
