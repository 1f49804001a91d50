//! Hybrid fusion: runs the five strategies as an explicit pipeline, merges
//! their candidates, applies the quality gate and packages the result.
//!
//! Pipeline stages and the exclusions each receives:
//!   1. content, collaborative, author  <- reading history + wishlist
//!   2. trending                        <- stage 1 + everything stage 1 chose
//!   3. diversity                       <- stage 2 + trending picks
//!
//! A failing strategy is logged and treated as empty; fusion itself only
//! fails when there is no catalog data at all.

use crate::author::AuthorAffinityScorer;
use crate::cache::ModelCache;
use crate::collaborative::CollaborativeScorer;
use crate::confidence;
use crate::content::ContentScorer;
use crate::diversity::DiversityInjector;
use crate::exclusion::ExclusionSet;
use crate::scorer::{Candidates, Scorer};
use crate::trending::TrendingScorer;
use bookrec_core::config::EngineConfig;
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::store::BookStore;
use bookrec_core::types::{
    Book, Interaction, InteractionKind, RecommendationResult, Source, UserProfile,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bonus for a book proposed by more than one strategy. Flat, regardless of
/// how many strategies agree.
const CORROBORATION_BONUS: f64 = 0.1;
/// Score assumed for candidates that arrive without one.
const DEFAULT_CANDIDATE_SCORE: f64 = 0.5;
const FALLBACK_CONFIDENCE: f64 = 0.6;
const FALLBACK_REASON: &str = "high-quality trending books as fallback";

pub const LABEL_NEW_USER: &str = "Trending (New User)";
pub const LABEL_FALLBACK: &str = "Trending (Fallback)";
pub const LABEL_CF_HYBRID: &str = "Hybrid (CF + CBF + Trending)";
pub const LABEL_FULL_HYBRID: &str = "Hybrid (CBF + Trending + Author + Diversity + CF)";

/// Per-source budget: `floor(total * weight)`.
pub fn sub_limit(total_limit: usize, source: Source) -> usize {
    (total_limit as f64 * source.weight()).floor() as usize
}

#[derive(Debug, Clone)]
struct MergedEntry {
    book: Book,
    score: f64,
    sources: BTreeSet<Source>,
}

/// Merge candidates by id. A repeat from another source takes the larger
/// weighted score plus the corroboration bonus.
fn merge(outputs: &[(Source, Candidates)]) -> Vec<MergedEntry> {
    let mut entries: HashMap<i64, MergedEntry> = HashMap::new();
    for (source, candidates) in outputs {
        for book in &candidates.books {
            let raw = book.rank_score.unwrap_or(DEFAULT_CANDIDATE_SCORE);
            let weighted = raw * source.weight();
            match entries.get_mut(&book.id) {
                None => {
                    entries.insert(
                        book.id,
                        MergedEntry {
                            book: book.clone(),
                            score: weighted,
                            sources: BTreeSet::from([*source]),
                        },
                    );
                }
                Some(entry) if entry.sources.contains(source) => {
                    entry.score = entry.score.max(weighted);
                }
                Some(entry) => {
                    entry.score = entry.score.max(weighted) + CORROBORATION_BONUS;
                    entry.sources.insert(*source);
                }
            }
        }
    }

    let mut merged: Vec<MergedEntry> = entries.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.book.id.cmp(&b.book.id))
    });
    merged
}

fn secure_cover(book: &mut Book) {
    if let Some(url) = book.cover_url.as_mut() {
        if let Some(rest) = url.strip_prefix("http://") {
            *url = format!("https://{rest}");
        }
    }
}

fn dedup_reasons(reasons: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    reasons
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

pub struct FusionEngine {
    store: Arc<dyn BookStore>,
    cache: Arc<ModelCache>,
    content: ContentScorer,
    collaborative: CollaborativeScorer,
    trending: TrendingScorer,
    author: AuthorAffinityScorer,
    diversity: DiversityInjector,
}

impl FusionEngine {
    pub fn new(store: Arc<dyn BookStore>, config: &EngineConfig) -> Self {
        let cache = Arc::new(ModelCache::new(Duration::from_secs(config.cache_ttl_secs)));
        Self::with_cache(store, cache, config)
    }

    /// Build an engine around an externally owned cache, e.g. one shared by
    /// several engines over the same store.
    pub fn with_cache(
        store: Arc<dyn BookStore>,
        cache: Arc<ModelCache>,
        config: &EngineConfig,
    ) -> Self {
        info!(
            catalog_sample_size = config.catalog_sample_size,
            history_limit = config.history_limit,
            cache_ttl_secs = config.cache_ttl_secs,
            "Fusion engine initialized"
        );
        Self {
            content: ContentScorer::new(store.clone(), cache.clone(), config),
            collaborative: CollaborativeScorer::new(store.clone(), cache.clone(), config.neighbor_k),
            trending: TrendingScorer::new(store.clone(), config.catalog_sample_size),
            author: AuthorAffinityScorer::new(store.clone(), config.author_top_k, config.history_limit),
            diversity: DiversityInjector::new(store.clone(), config.genre_scan_limit),
            store,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Run one scorer. Errors never escape: they are logged and counted, and
    /// the stage continues with no candidates.
    fn run_stage(
        &self,
        scorer: &dyn Scorer,
        profile: &UserProfile,
        total_limit: usize,
        exclude: &ExclusionSet,
    ) -> Candidates {
        let source = scorer.source();
        let limit = sub_limit(total_limit, source);
        if limit == 0 {
            return Candidates::default();
        }

        match scorer.score(profile, limit, exclude) {
            Ok(mut candidates) => {
                candidates.books.retain(|b| !exclude.contains(b.id));
                candidates.books.truncate(limit);
                debug!(user_id = profile.user_id, %source, books = candidates.len(), "Scorer finished");
                candidates
            }
            Err(e) if e.is_degraded() => {
                metrics::counter!("fusion.scorer_empty", "source" => source.as_str()).increment(1);
                debug!(user_id = profile.user_id, %source, reason = %e, "Scorer produced no candidates");
                Candidates::default()
            }
            Err(e) => {
                metrics::counter!("fusion.scorer_errors", "source" => source.as_str()).increment(1);
                warn!(user_id = profile.user_id, %source, error = %e, "Scorer failed");
                Candidates::default()
            }
        }
    }

    fn count_or_zero(&self, what: &str, user_id: i64, result: RecResult<u64>) -> u64 {
        result.unwrap_or_else(|e| {
            warn!(user_id, count = what, error = %e, "Count query failed");
            0
        })
    }

    /// Fuse every strategy into at most `total_limit` books.
    pub fn fuse(&self, profile: &UserProfile, total_limit: usize) -> RecResult<RecommendationResult> {
        if total_limit == 0 {
            return Err(RecError::InvalidInput("total_limit must be positive".to_string()));
        }
        let started = Instant::now();
        metrics::counter!("fusion.requests").increment(1);

        let history = ExclusionSet::from_history(profile);

        let content = self.run_stage(&self.content, profile, total_limit, &history);
        let collaborative = self.run_stage(&self.collaborative, profile, total_limit, &history);
        let author = self.run_stage(&self.author, profile, total_limit, &history);

        let stage_one = history.extended(
            content
                .ids()
                .chain(collaborative.ids())
                .chain(author.ids()),
        );
        let trending = self.run_stage(&self.trending, profile, total_limit, &stage_one);

        let stage_two = stage_one.extended(trending.ids());
        let diversity = self.run_stage(&self.diversity, profile, total_limit, &stage_two);

        let outputs = [
            (Source::Content, content),
            (Source::Collaborative, collaborative),
            (Source::Trending, trending),
            (Source::Author, author),
            (Source::Diversity, diversity),
        ];

        let interaction_count = self.count_or_zero(
            "interactions",
            profile.user_id,
            self.store.count_interactions(profile.user_id),
        );
        let interest_count = self.count_or_zero(
            "interests",
            profile.user_id,
            self.store.count_interests(profile.user_id),
        );
        let new_user = interaction_count == 0 && interest_count == 0;

        if outputs.iter().all(|(_, c)| c.is_empty()) {
            return self.fallback(profile, total_limit, &history, interaction_count, new_user, started);
        }

        let mut merged = merge(&outputs);
        merged.retain(|e| e.book.passes_quality(profile.rating_threshold));
        let mut top_up_reasons = Vec::new();

        if merged.len() < total_limit {
            let chosen = history.extended(merged.iter().map(|e| e.book.id));
            let missing = total_limit - merged.len();
            match self.trending.score(profile, missing, &chosen) {
                Ok(top_up) => {
                    debug!(user_id = profile.user_id, books = top_up.len(), "Topped up from trending");
                    top_up_reasons = top_up.reasons;
                    for book in top_up.books.into_iter().take(missing) {
                        let score = book.rank_score.unwrap_or(DEFAULT_CANDIDATE_SCORE)
                            * Source::Trending.weight();
                        merged.push(MergedEntry {
                            book,
                            score,
                            sources: BTreeSet::from([Source::Trending]),
                        });
                    }
                }
                Err(e) => debug!(user_id = profile.user_id, reason = %e, "No trending top-up"),
            }
        }
        merged.truncate(total_limit);

        let mut source_counts: BTreeMap<Source, usize> = BTreeMap::new();
        for entry in &merged {
            for source in &entry.sources {
                *source_counts.entry(*source).or_insert(0) += 1;
            }
        }

        let algorithm = if new_user {
            LABEL_NEW_USER
        } else if source_counts.get(&Source::Collaborative).copied().unwrap_or(0) > 0 {
            LABEL_CF_HYBRID
        } else {
            LABEL_FULL_HYBRID
        };

        let confidence = confidence::estimate(profile, &source_counts, total_limit);
        let reasons = dedup_reasons(
            outputs
                .into_iter()
                .filter(|(source, _)| source_counts.contains_key(source))
                .flat_map(|(_, c)| c.reasons)
                .chain(top_up_reasons),
        );

        let books: Vec<Book> = merged
            .into_iter()
            .map(|entry| {
                let mut book = entry.book;
                book.rank_score = Some(entry.score);
                secure_cover(&mut book);
                book
            })
            .collect();

        let elapsed = started.elapsed();
        metrics::histogram!("fusion.latency_us").record(elapsed.as_micros() as f64);
        info!(
            user_id = profile.user_id,
            books = books.len(),
            algorithm,
            confidence = confidence.score,
            latency_us = elapsed.as_micros() as u64,
            "Recommendations fused"
        );

        Ok(RecommendationResult {
            request_id: Uuid::new_v4(),
            books,
            algorithm: algorithm.to_string(),
            confidence_score: confidence.score,
            reasons,
            generated_at: Utc::now(),
            source_counts,
            interaction_count,
        })
    }

    fn fallback(
        &self,
        profile: &UserProfile,
        total_limit: usize,
        history: &ExclusionSet,
        interaction_count: u64,
        new_user: bool,
        started: Instant,
    ) -> RecResult<RecommendationResult> {
        metrics::counter!("fusion.fallback").increment(1);
        warn!(user_id = profile.user_id, "Every strategy came back empty, serving trending fallback");

        let books = match self.trending.fallback(profile, total_limit, history) {
            Ok(books) => books,
            Err(e) => {
                warn!(user_id = profile.user_id, error = %e, "Trending fallback failed");
                Vec::new()
            }
        };

        if books.is_empty() {
            let catalog = self.store.sample_catalog(1).unwrap_or_default();
            if catalog.is_empty() {
                return Err(RecError::DataUnavailable(
                    "no catalog data available".to_string(),
                ));
            }
        }

        let books: Vec<Book> = books
            .into_iter()
            .take(total_limit)
            .map(|mut book| {
                secure_cover(&mut book);
                book
            })
            .collect();

        // Catalog top-ups count as trending too.
        let mut source_counts = BTreeMap::new();
        if !books.is_empty() {
            source_counts.insert(Source::Trending, books.len());
        }

        metrics::histogram!("fusion.latency_us").record(started.elapsed().as_micros() as f64);

        Ok(RecommendationResult {
            request_id: Uuid::new_v4(),
            books,
            algorithm: (if new_user { LABEL_NEW_USER } else { LABEL_FALLBACK }).to_string(),
            confidence_score: FALLBACK_CONFIDENCE,
            reasons: vec![FALLBACK_REASON.to_string()],
            generated_at: Utc::now(),
            source_counts,
            interaction_count,
        })
    }

    /// Books similar in text to one seed book.
    pub fn similar_items(&self, book_id: i64, limit: usize) -> RecResult<Vec<Book>> {
        if limit == 0 {
            return Err(RecError::InvalidInput("limit must be positive".to_string()));
        }
        let mut books = self.content.similar_items(book_id, limit)?;
        books.iter_mut().for_each(secure_cover);
        Ok(books)
    }

    /// Books from any of `genres`, in genre order, without duplicates.
    pub fn items_by_genres(&self, genres: &[String], limit: usize) -> RecResult<Vec<Book>> {
        if limit == 0 {
            return Err(RecError::InvalidInput("limit must be positive".to_string()));
        }
        let mut seen = HashSet::new();
        let mut books = Vec::new();
        for genre in genres.iter().filter(|g| !g.trim().is_empty()) {
            let remaining = limit.saturating_sub(books.len());
            if remaining == 0 {
                break;
            }
            let batch = self.store.items_by_genre(genre, remaining, &seen)?;
            for mut book in batch.into_iter().take(remaining) {
                if seen.insert(book.id) {
                    secure_cover(&mut book);
                    books.push(book);
                }
            }
        }
        books.truncate(limit);
        Ok(books)
    }

    /// Forward an interaction to storage and invalidate cached models.
    pub fn record_interaction(&self, user_id: i64, book_id: i64, kind: &str) -> RecResult<()> {
        if user_id <= 0 || book_id <= 0 {
            return Err(RecError::InvalidInput(format!(
                "ids must be positive (user={user_id}, book={book_id})"
            )));
        }
        let kind: InteractionKind = kind.parse()?;
        self.store.record_interaction(Interaction {
            user_id,
            book_id,
            kind,
            rating: None,
            occurred_at: Utc::now(),
        })?;
        let epoch = self.cache.invalidate();
        metrics::counter!("interactions.recorded", "kind" => kind.as_str()).increment(1);
        debug!(user_id, book_id, %kind, epoch, "Interaction recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(ids_scores: &[(i64, Option<f64>)]) -> Candidates {
        Candidates {
            books: ids_scores
                .iter()
                .map(|(id, score)| {
                    let mut book = Book::new(*id, format!("Book {id}"), "Author");
                    book.rank_score = *score;
                    book
                })
                .collect(),
            reasons: Vec::new(),
        }
    }

    #[test]
    fn test_sub_limits_floor_weights() {
        assert_eq!(sub_limit(10, Source::Content), 3);
        assert_eq!(sub_limit(10, Source::Collaborative), 2);
        assert_eq!(sub_limit(10, Source::Trending), 2);
        assert_eq!(sub_limit(10, Source::Author), 1);
        assert_eq!(sub_limit(10, Source::Diversity), 0);
        assert_eq!(sub_limit(20, Source::Diversity), 1);
    }

    #[test]
    fn test_merge_applies_weights_and_corroboration_bonus() {
        let outputs = [
            (Source::Content, candidates(&[(1, Some(0.8)), (2, None)])),
            (Source::Author, candidates(&[(1, Some(0.8))])),
            (Source::Trending, candidates(&[(1, Some(1.0))])),
        ];
        let merged = merge(&outputs);
        assert_eq!(merged.len(), 2);

        let first = &merged[0];
        assert_eq!(first.book.id, 1);
        // content 0.28; author max(0.28, 0.12)+0.1 = 0.38; trending max(0.38, 0.2)+0.1 = 0.48
        assert!((first.score - 0.48).abs() < 1e-9);
        assert_eq!(first.sources.len(), 3);

        let second = &merged[1];
        assert!((second.score - 0.5 * 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_secure_cover_rewrites_http_only() {
        let mut book = Book::new(1, "T", "A").with_cover_url("http://covers.example/1.jpg");
        secure_cover(&mut book);
        assert_eq!(book.cover_url.as_deref(), Some("https://covers.example/1.jpg"));

        let mut book = Book::new(2, "T", "A").with_cover_url("https://covers.example/2.jpg");
        secure_cover(&mut book);
        assert_eq!(book.cover_url.as_deref(), Some("https://covers.example/2.jpg"));
    }

    #[test]
    fn test_dedup_reasons_keeps_first_occurrence() {
        let reasons = dedup_reasons(vec!["a".to_string(), "b".to_string(), "a".to_string()]);
        assert_eq!(reasons, vec!["a".to_string(), "b".to_string()]);
    }
}
