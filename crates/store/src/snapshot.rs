//! JSON snapshot format used to seed the in-memory store.

use bookrec_core::error::RecResult;
use bookrec_core::types::{Book, Interaction, PartialProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    /// Stored interest count per user.
    #[serde(default)]
    pub interests: HashMap<i64, u64>,
    #[serde(default)]
    pub profiles: Vec<PartialProfile>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> RecResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> RecResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let snapshot = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            books = snapshot.books.len(),
            interactions = snapshot.interactions.len(),
            profiles = snapshot.profiles.len(),
            "Loaded catalog snapshot"
        );
        Ok(snapshot)
    }

    pub fn profile(&self, user_id: i64) -> Option<&PartialProfile> {
        self.profiles.iter().find(|p| p.user_id == user_id)
    }
}
