//! Confidence estimate for a fused result set.
//!
//! `confidence = 0.35*R + 0.25*D + 0.20*C + 0.20*Q`, clamped to [0, 1]:
//! - R: profile richness (genres, reading history, favourite authors,
//!   interaction-weight keys), each capped and worth a quarter;
//! - D: fraction of the five strategies that placed a book in the result;
//! - C: how much of the requested limit was filled;
//! - Q: quality flags summed over contributing strategies.

use bookrec_core::types::{Source, UserProfile};
use serde::Serialize;
use std::collections::BTreeMap;

const RICHNESS_WEIGHT: f64 = 0.35;
const DIVERSITY_WEIGHT: f64 = 0.25;
const COVERAGE_WEIGHT: f64 = 0.20;
const QUALITY_WEIGHT: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub richness: f64,
    pub diversity: f64,
    pub coverage: f64,
    pub quality: f64,
    pub score: f64,
}

fn capped_ratio(count: usize, target: f64) -> f64 {
    (count as f64 / target).min(1.0)
}

pub fn profile_richness(profile: &UserProfile) -> f64 {
    0.25 * (capped_ratio(profile.selected_genres.len(), 5.0)
        + capped_ratio(profile.reading_history.len(), 20.0)
        + capped_ratio(profile.favorite_authors.len(), 5.0)
        + capped_ratio(profile.interaction_weights.len(), 5.0))
}

pub fn estimate(
    profile: &UserProfile,
    source_counts: &BTreeMap<Source, usize>,
    total_limit: usize,
) -> ConfidenceBreakdown {
    let contributing: Vec<Source> = Source::ALL
        .into_iter()
        .filter(|s| source_counts.get(s).copied().unwrap_or(0) > 0)
        .collect();

    let richness = profile_richness(profile);
    let diversity = contributing.len() as f64 / Source::ALL.len() as f64;
    let total_contributed: usize = source_counts.values().sum();
    let coverage = if total_limit == 0 {
        0.0
    } else {
        capped_ratio(total_contributed, total_limit as f64)
    };
    let quality: f64 = contributing.iter().map(Source::quality_flag).sum();

    let score = (RICHNESS_WEIGHT * richness
        + DIVERSITY_WEIGHT * diversity
        + COVERAGE_WEIGHT * coverage
        + QUALITY_WEIGHT * quality)
        .clamp(0.0, 1.0);

    ConfidenceBreakdown {
        richness,
        diversity,
        coverage,
        quality,
        score,
    }
}
