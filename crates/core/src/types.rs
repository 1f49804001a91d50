use crate::config::default_rating_threshold;
use crate::error::RecError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A catalog book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub published_on: Option<NaiveDate>,
    #[serde(default)]
    pub external_id: Option<String>,
    /// Set while scoring; never read back from storage.
    #[serde(default, skip_deserializing)]
    pub rank_score: Option<f64>,
}

impl Book {
    pub fn new(id: i64, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            author: author.into(),
            genre: None,
            description: None,
            cover_url: None,
            rating: None,
            published_on: None,
            external_id: None,
            rank_score: None,
        }
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    /// Case-insensitive substring match of this book's genre against any of
    /// `genres`. Books without a genre never match.
    pub fn genre_matches(&self, genres: &[String]) -> bool {
        let Some(genre) = self.genre.as_deref() else {
            return false;
        };
        let genre = genre.to_lowercase();
        genres
            .iter()
            .filter(|g| !g.trim().is_empty())
            .any(|g| genre.contains(&g.to_lowercase()))
    }

    /// Unknown ratings pass; known ratings must reach `threshold`.
    pub fn passes_quality(&self, threshold: f64) -> bool {
        self.rating.map_or(true, |r| r >= threshold)
    }

    pub fn meets_rating(&self, threshold: f64) -> bool {
        self.rating.is_some_and(|r| r >= threshold)
    }
}

/// A book scored by an external collaborator (e.g. the neighbor-overlap query).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredBook {
    pub book: Book,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    WishlistAdd,
    WishlistRemove,
    Search,
    Click,
    Like,
    Dislike,
    Rate,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 8] = [
        InteractionKind::View,
        InteractionKind::WishlistAdd,
        InteractionKind::WishlistRemove,
        InteractionKind::Search,
        InteractionKind::Click,
        InteractionKind::Like,
        InteractionKind::Dislike,
        InteractionKind::Rate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::WishlistAdd => "wishlist_add",
            InteractionKind::WishlistRemove => "wishlist_remove",
            InteractionKind::Search => "search",
            InteractionKind::Click => "click",
            InteractionKind::Like => "like",
            InteractionKind::Dislike => "dislike",
            InteractionKind::Rate => "rate",
        }
    }

    /// Kinds that signal a positive opinion of the book's author.
    pub fn is_affinity_signal(&self) -> bool {
        matches!(
            self,
            InteractionKind::Rate | InteractionKind::WishlistAdd | InteractionKind::Like
        )
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = RecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        InteractionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| RecError::InvalidInput(format!("unknown interaction kind: {s:?}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: i64,
    pub book_id: i64,
    pub kind: InteractionKind,
    #[serde(default)]
    pub rating: Option<f64>,
    pub occurred_at: DateTime<Utc>,
}

/// Fully hydrated user profile. List fields are always present, possibly
/// empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    #[serde(default)]
    pub external_ref: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub selected_genres: Vec<String>,
    #[serde(default)]
    pub reading_history: Vec<i64>,
    #[serde(default)]
    pub wishlist: Vec<i64>,
    #[serde(default)]
    pub interaction_weights: HashMap<String, f64>,
    #[serde(default)]
    pub favorite_authors: Vec<String>,
    #[serde(default = "default_rating_threshold")]
    pub rating_threshold: f64,
}

impl UserProfile {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            external_ref: String::new(),
            email: String::new(),
            selected_genres: Vec::new(),
            reading_history: Vec::new(),
            wishlist: Vec::new(),
            interaction_weights: HashMap::new(),
            favorite_authors: Vec::new(),
            rating_threshold: default_rating_threshold(),
        }
    }

    /// Books the user already read or wishlisted.
    pub fn seen_ids(&self) -> HashSet<i64> {
        self.reading_history
            .iter()
            .chain(self.wishlist.iter())
            .copied()
            .collect()
    }
}

/// Profile as received from an upstream collaborator; any field may be
/// missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialProfile {
    pub user_id: i64,
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub selected_genres: Option<Vec<String>>,
    #[serde(default)]
    pub reading_history: Option<Vec<i64>>,
    #[serde(default)]
    pub wishlist: Option<Vec<i64>>,
    #[serde(default)]
    pub interaction_weights: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub favorite_authors: Option<Vec<String>>,
    #[serde(default)]
    pub rating_threshold: Option<f64>,
}

/// The five scoring strategies fused by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Content,
    Collaborative,
    Trending,
    Author,
    Diversity,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Content,
        Source::Collaborative,
        Source::Trending,
        Source::Author,
        Source::Diversity,
    ];

    /// Fixed share of the result budget and fusion multiplier. Sums to 1.0.
    pub fn weight(&self) -> f64 {
        match self {
            Source::Content => 0.35,
            Source::Collaborative => 0.25,
            Source::Trending => 0.20,
            Source::Author => 0.15,
            Source::Diversity => 0.05,
        }
    }

    /// Contribution to the confidence quality index when the source
    /// supplied at least one final book.
    pub fn quality_flag(&self) -> f64 {
        match self {
            Source::Content => 0.35,
            Source::Collaborative => 0.35,
            Source::Author => 0.15,
            Source::Trending => 0.10,
            Source::Diversity => 0.05,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Content => "content",
            Source::Collaborative => "collaborative",
            Source::Trending => "trending",
            Source::Author => "author",
            Source::Diversity => "diversity",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final ranked output of one fusion request. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub request_id: Uuid,
    pub books: Vec<Book>,
    pub algorithm: String,
    pub confidence_score: f64,
    pub reasons: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub source_counts: BTreeMap<Source, usize>,
    pub interaction_count: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_kind_parsing() {
        assert_eq!(
            "wishlist_add".parse::<InteractionKind>().unwrap(),
            InteractionKind::WishlistAdd
        );
        assert_eq!(" RATE ".parse::<InteractionKind>().unwrap(), InteractionKind::Rate);
        assert!(matches!(
            "bookmark".parse::<InteractionKind>(),
            Err(RecError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_source_weights_sum_to_one() {
        let total: f64 = Source::ALL.iter().map(Source::weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_genre_matching_is_substring_and_case_insensitive() {
        let book = Book::new(1, "Dune", "Frank Herbert").with_genre("Science Fiction");
        assert!(book.genre_matches(&["fiction".to_string()]));
        assert!(!book.genre_matches(&["Fantasy".to_string()]));
        assert!(!Book::new(2, "Untitled", "Anon").genre_matches(&["fiction".to_string()]));
    }

    #[test]
    fn test_profile_deserializes_missing_lists_as_empty() {
        let profile: UserProfile = serde_json::from_str(r#"{"user_id": 7}"#).unwrap();
        assert!(profile.selected_genres.is_empty());
        assert!(profile.reading_history.is_empty());
        assert!(profile.interaction_weights.is_empty());
        assert!((profile.rating_threshold - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rank_score_is_not_read_from_storage() {
        let book: Book = serde_json::from_str(
            r#"{"id": 1, "title": "T", "author": "A", "rank_score": 0.9}"#,
        )
        .unwrap();
        assert!(book.rank_score.is_none());
    }
}
