//! TF-IDF text vectorization and sparse cosine similarity.

use bookrec_core::types::Book;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Sparse vector: vocabulary index -> weight.
pub type SparseVector = HashMap<usize, f64>;

/// Tokens shorter than this are dropped.
const MIN_TOKEN_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "about", "after", "all", "also", "and", "any", "are", "because", "been", "before", "being",
    "between", "both", "but", "can", "could", "did", "does", "doing", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "into", "its", "itself", "just", "more", "most",
    "myself", "nor", "not", "now", "off", "once", "only", "other", "our", "ours", "ourselves",
    "out", "over", "own", "same", "she", "should", "some", "such", "than", "that", "the",
    "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "too", "under", "until", "very", "was", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
    "yourself", "yourselves",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercase, split into maximal alphanumeric runs, drop stopwords and
/// short tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN && !is_stopword(t))
        .map(str::to_string)
        .collect()
}

/// Text document for a book. Title and genre are repeated so they weigh
/// twice as much as description and author.
pub fn item_document(book: &Book) -> String {
    let genre = book.genre.as_deref().unwrap_or_default();
    let description = book.description.as_deref().unwrap_or_default();
    format!(
        "{title} {title} {genre} {genre} {description} {author}",
        title = book.title,
        author = book.author,
    )
}

/// Vocabulary with inverse document frequencies.
#[derive(Debug, Clone, Default)]
pub struct TextVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    num_documents: usize,
}

impl TextVectorizer {
    /// Fit `idf(t) = ln(N / df(t))` over the corpus. Indices follow sorted
    /// token order.
    pub fn build_vocabulary<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let unique: HashSet<String> = tokenize(doc.as_ref()).into_iter().collect();
            for token in unique {
                *document_frequency.entry(token).or_insert(0) += 1;
            }
        }

        let n = documents.len() as f64;
        let mut vocabulary = HashMap::with_capacity(document_frequency.len());
        let mut idf = Vec::with_capacity(document_frequency.len());
        for (index, (token, df)) in document_frequency.into_iter().enumerate() {
            vocabulary.insert(token, index);
            idf.push((n / df as f64).ln());
        }

        Self {
            vocabulary,
            idf,
            num_documents: documents.len(),
        }
    }

    /// Length-normalized term frequency times idf. Out-of-vocabulary tokens
    /// and zero weights are dropped.
    pub fn vectorize(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return SparseVector::new();
        }
        let total = tokens.len() as f64;

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for token in &tokens {
            if let Some(&index) = self.vocabulary.get(token) {
                *counts.entry(index).or_insert(0) += 1;
            }
        }

        counts
            .into_iter()
            .map(|(index, count)| (index, (count as f64 / total) * self.idf[index]))
            .filter(|(_, weight)| *weight != 0.0)
            .collect()
    }

    pub fn idf(&self, token: &str) -> Option<f64> {
        self.vocabulary.get(token).map(|&index| self.idf[index])
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn num_documents(&self) -> usize {
        self.num_documents
    }
}

fn magnitude(v: &SparseVector) -> f64 {
    v.values().map(|x| x * x).sum::<f64>().sqrt()
}

/// Cosine similarity of two sparse vectors; 0 when either side is empty or
/// has zero magnitude.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(index, x)| large.get(index).map(|y| x * y))
        .sum();
    let denom = magnitude(a) * magnitude(b);
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
