//! Explicit, epoch-versioned model cache.
//!
//! Holds the TF-IDF model over the catalog sample and the explicit rating
//! matrix. Entries are reused while their epoch matches the cache epoch and
//! they are younger than the TTL. Recording an interaction bumps the epoch,
//! so the next request rebuilds from fresh data. A zero TTL rebuilds on
//! every request.

use crate::collaborative::RatingMatrix;
use crate::text::{item_document, SparseVector, TextVectorizer};
use bookrec_core::error::RecResult;
use bookrec_core::types::Book;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// TF-IDF vocabulary plus a vector for every sampled book.
#[derive(Debug, Clone)]
pub struct TfIdfModel {
    pub vectorizer: TextVectorizer,
    pub books: Vec<Book>,
    vectors: HashMap<i64, SparseVector>,
}

impl TfIdfModel {
    pub fn build(books: Vec<Book>) -> Self {
        let documents: Vec<String> = books.iter().map(item_document).collect();
        let vectorizer = TextVectorizer::build_vocabulary(&documents);
        let vectors = books
            .iter()
            .zip(documents.iter())
            .map(|(book, doc)| (book.id, vectorizer.vectorize(doc)))
            .collect();
        Self {
            vectorizer,
            books,
            vectors,
        }
    }

    pub fn vector(&self, book_id: i64) -> Option<&SparseVector> {
        self.vectors.get(&book_id)
    }

    /// Vector for a book outside the sample, using the sample's vocabulary.
    pub fn vectorize_book(&self, book: &Book) -> SparseVector {
        self.vectorizer.vectorize(&item_document(book))
    }
}

struct Stamped<T> {
    value: Arc<T>,
    epoch: u64,
    built_at: Instant,
}

pub struct ModelCache {
    epoch: AtomicU64,
    ttl: Duration,
    tfidf: RwLock<Option<Stamped<TfIdfModel>>>,
    ratings: RwLock<Option<Stamped<RatingMatrix>>>,
}

impl ModelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            epoch: AtomicU64::new(0),
            ttl,
            tfidf: RwLock::new(None),
            ratings: RwLock::new(None),
        }
    }

    /// A cache that never reuses a model.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Mark every cached model stale. Returns the new epoch.
    pub fn invalidate(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(epoch, "Model cache invalidated");
        epoch
    }

    pub fn tfidf_or_build<F>(&self, build: F) -> RecResult<Arc<TfIdfModel>>
    where
        F: FnOnce() -> RecResult<TfIdfModel>,
    {
        self.get_or_build(&self.tfidf, "tfidf", build)
    }

    pub fn ratings_or_build<F>(&self, build: F) -> RecResult<Arc<RatingMatrix>>
    where
        F: FnOnce() -> RecResult<RatingMatrix>,
    {
        self.get_or_build(&self.ratings, "ratings", build)
    }

    fn get_or_build<T, F>(
        &self,
        slot: &RwLock<Option<Stamped<T>>>,
        name: &'static str,
        build: F,
    ) -> RecResult<Arc<T>>
    where
        F: FnOnce() -> RecResult<T>,
    {
        let epoch = self.epoch();
        if let Some(entry) = slot.read().as_ref() {
            if entry.epoch == epoch && entry.built_at.elapsed() < self.ttl {
                metrics::counter!("model_cache.hit", "model" => name).increment(1);
                return Ok(entry.value.clone());
            }
        }
        metrics::counter!("model_cache.miss", "model" => name).increment(1);

        // Built outside the lock; a concurrent rebuild simply wins the race.
        let value = Arc::new(build()?);
        *slot.write() = Some(Stamped {
            value: value.clone(),
            epoch,
            built_at: Instant::now(),
        });
        debug!(model = name, epoch, "Model rebuilt");
        Ok(value)
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
