use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `BOOKREC__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Tunables for the hybrid recommendation engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of catalog books sampled to build the TF-IDF corpus.
    #[serde(default = "default_catalog_sample_size")]
    pub catalog_sample_size: usize,
    /// Most recent interactions read per user.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_author_top_k")]
    pub author_top_k: usize,
    #[serde(default = "default_neighbor_k")]
    pub neighbor_k: usize,
    /// Minimum cosine similarity for a content match.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Lifetime of cached TF-IDF and rating models. Zero rebuilds them on
    /// every request.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_rating_threshold")]
    pub default_rating_threshold: f64,
    #[serde(default = "default_genre_scan_limit")]
    pub genre_scan_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot loaded into the in-memory store.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

// Default functions
fn default_node_id() -> String {
    "bookrec-01".to_string()
}
fn default_catalog_sample_size() -> usize {
    1000
}
fn default_history_limit() -> usize {
    50
}
fn default_author_top_k() -> usize {
    5
}
fn default_neighbor_k() -> usize {
    10
}
fn default_similarity_threshold() -> f64 {
    0.1
}
fn default_cache_ttl_secs() -> u64 {
    300
}
pub fn default_rating_threshold() -> f64 {
    3.5
}
fn default_genre_scan_limit() -> usize {
    50
}
fn default_snapshot_path() -> String {
    "data/catalog.json".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_sample_size: default_catalog_sample_size(),
            history_limit: default_history_limit(),
            author_top_k: default_author_top_k(),
            neighbor_k: default_neighbor_k(),
            similarity_threshold: default_similarity_threshold(),
            cache_ttl_secs: default_cache_ttl_secs(),
            default_rating_threshold: default_rating_threshold(),
            genre_scan_limit: default_genre_scan_limit(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("BOOKREC")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.catalog_sample_size, 1000);
        assert_eq!(config.engine.history_limit, 50);
        assert_eq!(config.engine.neighbor_k, 10);
        assert!((config.engine.default_rating_threshold - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let engine: EngineConfig =
            serde_json::from_str(r#"{"cache_ttl_secs": 0, "author_top_k": 3}"#)
                .expect("valid engine config");
        assert_eq!(engine.cache_ttl_secs, 0);
        assert_eq!(engine.author_top_k, 3);
        assert_eq!(engine.history_limit, 50);
    }
}
