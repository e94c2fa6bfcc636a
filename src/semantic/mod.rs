//! Semantic index infrastructure for catalog documents.
//!
//! This module converts normalized documents into a persistent
//! nearest-neighbor index and serves top-k similarity queries over it.
//!
//! # Architecture
//!
//! - `embeddings`: the opaque text-to-vector boundary (fastembed-backed
//!   models plus a deterministic offline hashing embedder)
//! - `index`: ordered in-memory vector index with merge and top-k search
//! - `builder`: batch embedding and fold-merge index assembly
//! - `storage`: checksummed binary file I/O with atomic replace
//! - `query`: read-only query sessions over a loaded index

pub mod builder;
pub mod embeddings;
mod index;
mod query;
mod storage;

pub use builder::{BuildError, IndexBuilder, DEFAULT_BATCH_SIZE};
pub use embeddings::{create_embedder, HashingEmbedder, TextEmbedder, HASHING_MODEL_NAME};
pub use index::{IndexEntry, IndexError, ScoreKind, SearchResult, VectorIndex};
pub use query::{QueryEngine, QueryError, SearchHit};
pub use storage::{IndexStorage, IndexStorageError, IndexSummary};

/// Default embedding model name.
pub const DEFAULT_MODEL: &str = "bge-small-en-v1.5";
