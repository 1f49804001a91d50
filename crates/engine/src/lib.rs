//! Hybrid book recommendation engine: TF-IDF content similarity, Pearson
//! collaborative filtering, trending, author affinity and diversity
//! injection, fused into one ranked result with a confidence estimate.

#![warn(clippy::unwrap_used)]

pub mod author;
pub mod cache;
pub mod collaborative;
pub mod confidence;
pub mod content;
pub mod diversity;
pub mod exclusion;
pub mod fusion;
pub mod profile;
pub mod scorer;
pub mod text;
pub mod trending;

pub use cache::ModelCache;
pub use exclusion::ExclusionSet;
pub use fusion::FusionEngine;
pub use profile::hydrate_profile;
pub use scorer::{Candidates, Scorer};
pub use text::{cosine_similarity, TextVectorizer};
