//! Query engine: load a persisted index and serve ranked top-k searches.
//!
//! A loaded engine is a read-only session; queries never mutate the index,
//! so one engine may serve multiple callers. The caller is responsible for
//! supplying the same embedding model the index was built with — the model
//! identity check on load enforces that for persisted indices.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::normalize::Document;
use crate::semantic::embeddings::{EmbeddingError, TextEmbedder};
use crate::semantic::index::{IndexError, ScoreKind, VectorIndex};
use crate::semantic::storage::{IndexStorage, IndexStorageError};

/// Maximum excerpt length in characters.
const EXCERPT_LENGTH: usize = 160;

/// Ellipsis suffix when an excerpt is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Errors that can occur while opening or querying an index.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] IndexStorageError),
}

/// One ranked search hit.
///
/// Scores follow the index's recorded convention; in both conventions a
/// smaller score means a closer match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Distance score, smaller = more similar.
    pub score: f32,
    /// `"product"` or `"category"`.
    pub source: String,
    /// Display name from the document metadata.
    pub name: String,
    /// Leading slice of the document content.
    pub excerpt: String,
    /// The full normalized document (content + metadata).
    pub document: Document,
}

/// Read-only query session over a loaded index.
pub struct QueryEngine {
    embedder: Arc<dyn TextEmbedder>,
    index: VectorIndex,
}

impl QueryEngine {
    /// Load a persisted index and bind it to the embedder that will embed
    /// queries. Stored entries are not re-embedded.
    pub fn open(index_path: PathBuf, embedder: Arc<dyn TextEmbedder>) -> Result<Self, QueryError> {
        let storage = IndexStorage::new(index_path);
        let index = storage.load(embedder.as_ref())?;
        log::info!(
            "loaded index: {} entries, dimension {}, scoring {}",
            index.len(),
            index.dimensions(),
            index.score_kind().label()
        );
        Ok(Self { embedder, index })
    }

    /// Wrap an in-memory index directly (used right after a build).
    pub fn from_index(index: VectorIndex, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self { embedder, index }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn score_kind(&self) -> ScoreKind {
        self.index.score_kind()
    }

    /// Top-k search: embeds the query text and returns up to `k` hits,
    /// best (smallest score) first. `k = 0` yields an empty result; `k`
    /// beyond the index size is clamped.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, QueryError> {
        if k == 0 || self.index.is_empty() {
            return Ok(vec![]);
        }

        let query_vector = self.embedder.embed_one(query)?;
        let results = self.index.search(&query_vector, k)?;

        let hits = results
            .into_iter()
            .filter_map(|result| {
                self.index.entry(result.ordinal).map(|entry| SearchHit {
                    score: result.score,
                    source: entry.document.source().to_string(),
                    name: entry.document.display_name().to_string(),
                    excerpt: excerpt(&entry.document.content),
                    document: entry.document.clone(),
                })
            })
            .collect();

        Ok(hits)
    }
}

/// Leading slice of content for display, truncated at a char boundary with
/// an ellipsis.
fn excerpt(content: &str) -> String {
    if content.chars().count() <= EXCERPT_LENGTH {
        return content.to_string();
    }

    let max_chars = EXCERPT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}
