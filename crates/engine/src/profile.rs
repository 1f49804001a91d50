//! Profile hydration: turns a partially populated upstream profile into a
//! complete [`UserProfile`].
//!
//! Missing scalar fields take their documented defaults. A missing reading
//! history or wishlist is reconstructed from the interaction log; if the log
//! cannot be read the lists stay empty.

use bookrec_core::store::BookStore;
use bookrec_core::types::{Interaction, InteractionKind, PartialProfile, UserProfile};
use std::collections::HashSet;
use tracing::warn;

pub fn hydrate_profile(
    partial: PartialProfile,
    store: &dyn BookStore,
    history_limit: usize,
    default_threshold: f64,
) -> UserProfile {
    let needs_log = partial.reading_history.is_none() || partial.wishlist.is_none();
    let log = if needs_log {
        store
            .recent_interactions(partial.user_id, history_limit)
            .unwrap_or_else(|e| {
                warn!(user_id = partial.user_id, error = %e, "Interaction log unavailable during hydration");
                Vec::new()
            })
    } else {
        Vec::new()
    };

    UserProfile {
        user_id: partial.user_id,
        external_ref: partial.external_ref.unwrap_or_default(),
        email: partial.email.unwrap_or_default(),
        selected_genres: partial.selected_genres.unwrap_or_default(),
        reading_history: partial
            .reading_history
            .unwrap_or_else(|| reading_history_from(&log)),
        wishlist: partial.wishlist.unwrap_or_else(|| wishlist_from(&log)),
        interaction_weights: partial.interaction_weights.unwrap_or_default(),
        favorite_authors: partial.favorite_authors.unwrap_or_default(),
        rating_threshold: partial
            .rating_threshold
            .filter(|t| t.is_finite())
            .unwrap_or(default_threshold),
    }
}

/// Viewed or rated books, most recent first, without duplicates.
fn reading_history_from(log: &[Interaction]) -> Vec<i64> {
    let mut seen = HashSet::new();
    log.iter()
        .filter(|i| matches!(i.kind, InteractionKind::View | InteractionKind::Rate))
        .filter(|i| seen.insert(i.book_id))
        .map(|i| i.book_id)
        .collect()
}

/// Books whose latest wishlist event is an add. `log` is newest first.
fn wishlist_from(log: &[Interaction]) -> Vec<i64> {
    let mut decided = HashSet::new();
    let mut wishlist = Vec::new();
    for interaction in log {
        match interaction.kind {
            InteractionKind::WishlistAdd if decided.insert(interaction.book_id) => {
                wishlist.push(interaction.book_id);
            }
            InteractionKind::WishlistRemove => {
                decided.insert(interaction.book_id);
            }
            _ => {}
        }
    }
    wishlist
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bookrec_store::InMemoryStore;
    use chrono::{Duration, Utc};

    fn log_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let start = Utc::now() - Duration::hours(1);
        let events = [
            (1, InteractionKind::View),
            (2, InteractionKind::WishlistAdd),
            (3, InteractionKind::WishlistAdd),
            (2, InteractionKind::WishlistRemove),
            (4, InteractionKind::Rate),
            (1, InteractionKind::View),
            (5, InteractionKind::Click),
        ];
        for (offset, (book_id, kind)) in events.into_iter().enumerate() {
            store.push_interaction(Interaction {
                user_id: 7,
                book_id,
                kind,
                rating: None,
                occurred_at: start + Duration::minutes(offset as i64),
            });
        }
        store
    }

    #[test]
    fn test_missing_lists_are_rebuilt_from_log() {
        let store = log_store();
        let profile = hydrate_profile(
            PartialProfile {
                user_id: 7,
                ..Default::default()
            },
            &store,
            50,
            3.5,
        );
        assert_eq!(profile.reading_history, vec![1, 4]);
        assert_eq!(profile.wishlist, vec![3]);
        assert!(profile.selected_genres.is_empty());
        assert!(profile.favorite_authors.is_empty());
        assert!((profile.rating_threshold - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_present_fields_are_kept() {
        let store = log_store();
        let profile = hydrate_profile(
            PartialProfile {
                user_id: 7,
                reading_history: Some(vec![]),
                wishlist: Some(vec![9]),
                selected_genres: Some(vec!["Poetry".to_string()]),
                rating_threshold: Some(4.0),
                ..Default::default()
            },
            &store,
            50,
            3.5,
        );
        assert!(profile.reading_history.is_empty());
        assert_eq!(profile.wishlist, vec![9]);
        assert_eq!(profile.selected_genres, vec!["Poetry".to_string()]);
        assert!((profile.rating_threshold - 4.0).abs() < f64::EPSILON);
    }
}
