//! Benchmarks for the fusion pipeline over a synthetic catalog.
//! Run with: cargo bench -p bookrec-engine

#![allow(clippy::unwrap_used)]

use bookrec_core::config::EngineConfig;
use bookrec_core::types::{Book, Interaction, InteractionKind, UserProfile};
use bookrec_engine::FusionEngine;
use bookrec_store::InMemoryStore;
use chrono::{Duration, Utc};
use std::sync::Arc;

const GENRES: [&str; 8] = [
    "Fantasy",
    "Science Fiction",
    "Mystery",
    "History",
    "Poetry",
    "Romance",
    "Biography",
    "Cooking",
];
const WORDS: [&str; 12] = [
    "dragon", "empire", "detective", "voyage", "garden", "river", "letters", "winter", "machine",
    "kingdom", "recipe", "memory",
];

fn create_store(books: i64, users: i64) -> InMemoryStore {
    let store = InMemoryStore::with_books((1..=books).map(|id| {
        let w = |k: i64| WORDS[((id * k) % WORDS.len() as i64) as usize];
        Book::new(id, format!("The {} {}", w(3), w(7)), format!("Author {}", id % 40))
            .with_genre(GENRES[(id % GENRES.len() as i64) as usize])
            .with_rating(2.5 + (id % 26) as f64 / 10.0)
            .with_description(format!("A story of {} and {} across the {}", w(5), w(11), w(13)))
    }));

    let now = Utc::now();
    for user_id in 1..=users {
        for step in 0..30 {
            let book_id = (user_id * 17 + step * 31) % books + 1;
            let (kind, rating) = match step % 4 {
                0 => (InteractionKind::Rate, Some(1.0 + ((user_id + step) % 5) as f64)),
                1 => (InteractionKind::Like, None),
                _ => (InteractionKind::View, None),
            };
            store.push_interaction(Interaction {
                user_id,
                book_id,
                kind,
                rating,
                occurred_at: now - Duration::minutes(step),
            });
        }
    }
    store
}

fn create_test_profile() -> UserProfile {
    let mut profile = UserProfile::new(7);
    profile.selected_genres = vec!["Fantasy".to_string(), "Mystery".to_string()];
    profile.favorite_authors = vec!["Author 3".to_string()];
    profile.interaction_weights.insert("Fantasy".to_string(), 2.0);
    profile
}

fn main() {
    let store = Arc::new(create_store(2_000, 300));
    let engine = FusionEngine::new(store, &EngineConfig::default());
    let profile = create_test_profile();
    let limit = 20;

    // Warmup, also fills the model cache
    for _ in 0..5 {
        engine.fuse(&profile, limit).unwrap();
    }

    let iterations = 200;
    let start = std::time::Instant::now();

    for _ in 0..iterations {
        let _ = engine.fuse(&profile, limit).unwrap();
    }

    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations;

    println!("=== Fusion Benchmark ===");
    println!("Iterations:  {}", iterations);
    println!("Total time:  {:?}", elapsed);
    println!("Per call:    {:?}", per_iter);
    println!("Throughput:  {:.0} requests/sec", iterations as f64 / elapsed.as_secs_f64());
    println!("Limit:       {}", limit);

    // Cold path: every request rebuilds the models
    let cold = FusionEngine::new(Arc::new(create_store(2_000, 300)), &EngineConfig {
        cache_ttl_secs: 0,
        ..Default::default()
    });
    let start = std::time::Instant::now();
    for _ in 0..20 {
        let _ = cold.fuse(&profile, limit).unwrap();
    }
    println!("Uncached:    {:?} per call", start.elapsed() / 20);
}
