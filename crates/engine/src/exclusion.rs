//! Immutable exclusion sets threaded through the fusion pipeline.
//!
//! Stage one (content, collaborative, author) runs against the reader's
//! history. Trending runs against history plus everything stage one chose,
//! and diversity against that plus trending. Each stage receives its own
//! frozen set; extending returns a new one.

use bookrec_core::types::UserProfile;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    ids: HashSet<i64>,
}

impl ExclusionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Books already read or wishlisted.
    pub fn from_history(profile: &UserProfile) -> Self {
        Self {
            ids: profile.seen_ids(),
        }
    }

    /// A new set containing these ids plus `more`.
    #[must_use]
    pub fn extended(&self, more: impl IntoIterator<Item = i64>) -> Self {
        let mut ids = self.ids.clone();
        ids.extend(more);
        Self { ids }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Mutable copy for scorers that grow their own exclusions while
    /// selecting.
    pub fn to_set(&self) -> HashSet<i64> {
        self.ids.clone()
    }
}

impl FromIterator<i64> for ExclusionSet {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_covers_read_and_wishlist() {
        let mut profile = UserProfile::new(1);
        profile.reading_history = vec![1, 2];
        profile.wishlist = vec![2, 3];
        let set = ExclusionSet::from_history(&profile);
        assert_eq!(set.len(), 3);
        assert!(set.contains(3));
        assert!(!set.contains(4));
    }

    #[test]
    fn test_extended_leaves_original_untouched() {
        let base: ExclusionSet = [1, 2].into_iter().collect();
        let next = base.extended([3]);
        assert!(!base.contains(3));
        assert!(next.contains(3));
        assert!(next.contains(1));
    }
}
