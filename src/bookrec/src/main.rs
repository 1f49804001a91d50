//! bookrec: hybrid book recommendations over a catalog snapshot.
//!
//! Loads a JSON snapshot into the in-memory store, builds the fusion engine
//! and prints results as JSON on stdout. Logs go to stderr.

use bookrec_core::config::AppConfig;
use bookrec_core::store::BookStore;
use bookrec_core::types::PartialProfile;
use bookrec_engine::{hydrate_profile, FusionEngine};
use bookrec_store::{InMemoryStore, Snapshot};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bookrec")]
#[command(about = "Hybrid book recommendation engine")]
#[command(version)]
struct Cli {
    /// Catalog snapshot to load (overrides config)
    #[arg(long, env = "BOOKREC__STORE__SNAPSHOT_PATH")]
    snapshot: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, env = "BOOKREC__NODE_ID")]
    node_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fused recommendations for one user
    Recommend {
        user_id: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Books similar in text to one book
    Similar {
        book_id: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Best-rated books from the given genres
    Genres {
        #[arg(required = true)]
        genres: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Record an interaction, then print the user's refreshed recommendations
    Record {
        user_id: i64,
        book_id: i64,
        /// view, wishlist_add, wishlist_remove, search, click, like, dislike or rate
        kind: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookrec=info,bookrec_engine=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(path) = cli.snapshot {
        config.store.snapshot_path = path;
    }
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }

    info!(
        node_id = %config.node_id,
        snapshot = %config.store.snapshot_path,
        cache_ttl_secs = config.engine.cache_ttl_secs,
        "Configuration loaded"
    );

    let snapshot = Snapshot::load(&config.store.snapshot_path)?;
    let store = Arc::new(InMemoryStore::from_snapshot(&snapshot));
    let engine = FusionEngine::new(store.clone(), &config.engine);

    let recommend = |user_id: i64, limit: usize| -> anyhow::Result<serde_json::Value> {
        let partial = snapshot.profile(user_id).cloned().unwrap_or(PartialProfile {
            user_id,
            ..Default::default()
        });
        let profile = hydrate_profile(
            partial,
            store.as_ref(),
            config.engine.history_limit,
            config.engine.default_rating_threshold,
        );
        let result = engine.fuse(&profile, limit)?;
        Ok(serde_json::to_value(result)?)
    };

    let output = match cli.command {
        Command::Recommend { user_id, limit } => recommend(user_id, limit)?,
        Command::Similar { book_id, limit } => {
            json!({ "book_id": book_id, "books": engine.similar_items(book_id, limit)? })
        }
        Command::Genres { genres, limit } => {
            json!({ "genres": genres, "books": engine.items_by_genres(&genres, limit)? })
        }
        Command::Record {
            user_id,
            book_id,
            kind,
            limit,
        } => {
            engine.record_interaction(user_id, book_id, &kind)?;
            json!({
                "recorded": { "user_id": user_id, "book_id": book_id, "kind": kind },
                "interaction_count": store.count_interactions(user_id)?,
                "recommendations": recommend(user_id, limit)?,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
