//! Batch index builder: chunk, embed, fold-merge.
//!
//! Documents are embedded in consecutive chunks of at most `batch_size`
//! entries, each chunk becoming a short-lived segment that is merged into
//! the running index before the next chunk is embedded. Merge is
//! order-preserving, so the final index is identical for every batch size;
//! batching only bounds peak embedding memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::normalize::Document;
use crate::semantic::embeddings::{EmbeddingError, TextEmbedder};
use crate::semantic::index::{IndexError, ScoreKind, VectorIndex};

/// Default number of documents embedded per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Errors raised while assembling an index. Each variant names the stage
/// that failed; embedding failures carry the zero-based batch ordinal.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Batch size must be positive, got {0}")]
    InvalidBatchSize(usize),

    #[error("Embedding failed for batch {batch}: {source}")]
    Embedding {
        batch: usize,
        source: EmbeddingError,
    },

    #[error("Embedder returned {got} vectors for batch {batch} of {expected} documents")]
    BatchShape {
        batch: usize,
        expected: usize,
        got: usize,
    },

    #[error("Index merge failed: {0}")]
    Index(#[from] IndexError),

    #[error("Build cancelled after {completed_batches} batches")]
    Cancelled { completed_batches: usize },
}

/// Assembles a [`VectorIndex`] from an ordered document sequence.
///
/// Owns the index exclusively until `build` returns; a failed build
/// publishes nothing.
pub struct IndexBuilder {
    embedder: Arc<dyn TextEmbedder>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn TextEmbedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size,
        }
    }

    /// Build an index over all documents, or fail with the offending stage.
    ///
    /// Zero documents yield a valid empty index.
    pub fn build(&self, documents: Vec<Document>) -> Result<VectorIndex, BuildError> {
        static NEVER: AtomicBool = AtomicBool::new(false);
        self.build_with_cancel(documents, &NEVER)
    }

    /// Like [`Self::build`], but aborts before starting the next batch once
    /// `cancel` is set. Cancellation never interrupts a merge in progress.
    pub fn build_with_cancel(
        &self,
        documents: Vec<Document>,
        cancel: &AtomicBool,
    ) -> Result<VectorIndex, BuildError> {
        if self.batch_size == 0 {
            return Err(BuildError::InvalidBatchSize(0));
        }

        let score_kind = ScoreKind::for_normalized(self.embedder.normalized());
        let total = documents.len();
        let mut index = VectorIndex::new(score_kind);
        let mut remaining = documents.into_iter();
        let mut batch_ordinal = 0usize;

        loop {
            let batch: Vec<Document> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            if cancel.load(Ordering::SeqCst) {
                return Err(BuildError::Cancelled {
                    completed_batches: batch_ordinal,
                });
            }

            let segment = self.embed_batch(batch_ordinal, batch, score_kind)?;
            index.merge(segment)?;

            batch_ordinal += 1;
            log::debug!(
                "embedded batch {batch_ordinal}: {}/{} documents indexed",
                index.len(),
                total
            );
        }

        Ok(index)
    }

    /// Embed one chunk into an ephemeral segment.
    fn embed_batch(
        &self,
        batch: usize,
        documents: Vec<Document>,
        score_kind: ScoreKind,
    ) -> Result<VectorIndex, BuildError> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();

        let vectors = self
            .embedder
            .embed_many(&texts)
            .map_err(|source| BuildError::Embedding { batch, source })?;

        if vectors.len() != documents.len() {
            return Err(BuildError::BatchShape {
                batch,
                expected: documents.len(),
                got: vectors.len(),
            });
        }

        VectorIndex::from_batch(vectors, documents, score_kind).map_err(BuildError::Index)
    }
}
