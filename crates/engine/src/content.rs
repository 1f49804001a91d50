//! Content-based filtering over TF-IDF item vectors.

use crate::cache::{ModelCache, TfIdfModel};
use crate::exclusion::ExclusionSet;
use crate::scorer::{sort_by_rank, Candidates, Scorer};
use crate::text::{cosine_similarity, SparseVector};
use bookrec_core::config::EngineConfig;
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::store::BookStore;
use bookrec_core::types::{Book, Interaction, InteractionKind, Source, UserProfile};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Base score for a cold-start genre match.
const COLD_START_BASE: f64 = 0.7;
/// Maximum rating boost on top of the cold-start base.
const COLD_START_RATING_BOOST: f64 = 0.3;

/// How strongly one interaction pulls the taste vector toward its book.
pub fn interaction_weight(interaction: &Interaction) -> f64 {
    let base = match interaction.kind {
        InteractionKind::Rate => 3.0,
        InteractionKind::WishlistAdd | InteractionKind::Like => 2.0,
        InteractionKind::View => 1.0,
        InteractionKind::Search => 0.5,
        _ => 1.0,
    };
    match interaction.rating {
        Some(rating) => base * (rating / 5.0),
        None => base,
    }
}

pub struct ContentScorer {
    store: Arc<dyn BookStore>,
    cache: Arc<ModelCache>,
    catalog_sample_size: usize,
    history_limit: usize,
    similarity_threshold: f64,
}

impl ContentScorer {
    pub fn new(store: Arc<dyn BookStore>, cache: Arc<ModelCache>, config: &EngineConfig) -> Self {
        Self {
            store,
            cache,
            catalog_sample_size: config.catalog_sample_size,
            history_limit: config.history_limit,
            similarity_threshold: config.similarity_threshold,
        }
    }

    pub fn model(&self) -> RecResult<Arc<TfIdfModel>> {
        self.cache.tfidf_or_build(|| {
            let books = self.store.sample_catalog(self.catalog_sample_size)?;
            if books.is_empty() {
                return Err(RecError::DataUnavailable("catalog sample is empty".to_string()));
            }
            debug!(books = books.len(), "Building TF-IDF model");
            Ok(TfIdfModel::build(books))
        })
    }

    /// Books most similar to one seed book.
    pub fn similar_items(&self, seed_id: i64, limit: usize) -> RecResult<Vec<Book>> {
        let model = self.model()?;
        let seed = match model.vector(seed_id) {
            Some(v) => v.clone(),
            None => {
                let book = self
                    .store
                    .book(seed_id)?
                    .ok_or_else(|| RecError::InvalidInput(format!("unknown book id {seed_id}")))?;
                model.vectorize_book(&book)
            }
        };
        let exclude: ExclusionSet = [seed_id].into_iter().collect();
        Ok(self.rank_against(&model, &seed, limit, &exclude))
    }

    fn rank_against(
        &self,
        model: &TfIdfModel,
        target: &SparseVector,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> Vec<Book> {
        let mut books: Vec<Book> = model
            .books
            .iter()
            .filter(|b| !exclude.contains(b.id))
            .filter_map(|b| {
                let sim = cosine_similarity(target, model.vector(b.id)?);
                (sim > self.similarity_threshold).then(|| {
                    let mut book = b.clone();
                    book.rank_score = Some(sim);
                    book
                })
            })
            .collect();
        sort_by_rank(&mut books);
        books.truncate(limit);
        books
    }

    /// Weight-normalized average of the vectors of interacted books.
    fn taste_vector(
        &self,
        model: &TfIdfModel,
        history: &[Interaction],
    ) -> RecResult<Option<SparseVector>> {
        let mut sum = SparseVector::new();
        let mut total_weight = 0.0;
        let mut outside: HashMap<i64, SparseVector> = HashMap::new();

        for interaction in history {
            let weight = interaction_weight(interaction);
            if weight <= 0.0 {
                continue;
            }
            let vector = match model.vector(interaction.book_id) {
                Some(v) => v,
                None => {
                    if !outside.contains_key(&interaction.book_id) {
                        let v = match self.store.book(interaction.book_id)? {
                            Some(book) => model.vectorize_book(&book),
                            None => SparseVector::new(),
                        };
                        outside.insert(interaction.book_id, v);
                    }
                    &outside[&interaction.book_id]
                }
            };
            if vector.is_empty() {
                continue;
            }
            for (index, value) in vector {
                *sum.entry(*index).or_insert(0.0) += weight * value;
            }
            total_weight += weight;
        }

        if total_weight <= 0.0 || sum.is_empty() {
            return Ok(None);
        }
        for value in sum.values_mut() {
            *value /= total_weight;
        }
        Ok(Some(sum))
    }

    fn cold_start(
        &self,
        profile: &UserProfile,
        model: &TfIdfModel,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> Candidates {
        let mut books: Vec<Book> = model
            .books
            .iter()
            .filter(|b| !exclude.contains(b.id) && b.genre_matches(&profile.selected_genres))
            .map(|b| {
                let mut score = COLD_START_BASE;
                if let Some(rating) = b.rating.filter(|r| *r >= profile.rating_threshold) {
                    score += COLD_START_RATING_BOOST * (rating / 5.0);
                }
                let mut book = b.clone();
                book.rank_score = Some(score);
                book
            })
            .collect();
        sort_by_rank(&mut books);
        books.truncate(limit);

        let reasons = if books.is_empty() {
            Vec::new()
        } else {
            vec![format!(
                "Matches your favourite genres: {}",
                profile.selected_genres.join(", ")
            )]
        };
        Candidates { books, reasons }
    }
}

impl Scorer for ContentScorer {
    fn source(&self) -> Source {
        Source::Content
    }

    fn score(
        &self,
        profile: &UserProfile,
        limit: usize,
        exclude: &ExclusionSet,
    ) -> RecResult<Candidates> {
        let model = self.model()?;
        let history = self
            .store
            .recent_interactions(profile.user_id, self.history_limit)?;

        let taste = if history.is_empty() {
            None
        } else {
            self.taste_vector(&model, &history)?
        };

        let candidates = match taste {
            Some(taste) => Candidates {
                books: self.rank_against(&model, &taste, limit, exclude),
                reasons: vec!["Similar in theme to books you have engaged with".to_string()],
            },
            None => self.cold_start(profile, &model, limit, exclude),
        };

        if candidates.is_empty() {
            return Err(RecError::ComputationDegraded(
                "no content matches above threshold".to_string(),
            ));
        }
        Ok(candidates)
    }
}
