//! Orchestration of the build and query flows.
//!
//! Stage order for a build: load inputs, normalize, embed in batches,
//! persist atomically. Each stage failure surfaces with its own context so
//! operators can tell a malformed input from an embedding or persistence
//! problem.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;

use crate::config::Config;
use crate::normalize::normalize_all;
use crate::records::{load_records, RecordKind};
use crate::semantic::{
    create_embedder, IndexBuilder, IndexStorage, IndexSummary, QueryEngine, SearchHit,
};

/// Outcome of a completed build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub products: usize,
    pub categories: usize,
    pub indexed: usize,
    pub dimensions: usize,
}

/// Build the index from the configured exports and persist it.
///
/// A missing or malformed input degrades to an empty collection; embedding
/// or persistence failures abort without touching a previously saved index.
pub fn build_index(config: &Config) -> anyhow::Result<BuildReport> {
    let products = load_records(&PathBuf::from(&config.products_path), RecordKind::Product);
    let categories = load_records(
        &PathBuf::from(&config.categories_path),
        RecordKind::Category,
    );
    log::info!(
        "loaded {} products and {} categories",
        products.len(),
        categories.len()
    );

    let mut documents = normalize_all(&products, RecordKind::Product);
    documents.extend(normalize_all(&categories, RecordKind::Category));

    let embedder = create_embedder(&config.model, PathBuf::from(&config.data_dir))
        .context("failed to initialize embedding model")?;

    let cancel = install_interrupt_flag();

    let builder = IndexBuilder::new(embedder.clone(), config.batch_size);
    let index = builder
        .build_with_cancel(documents, &cancel)
        .context("index build failed")?;

    let storage = IndexStorage::new(PathBuf::from(&config.index_path));
    storage
        .save(&index, &embedder.model_id_hash())
        .context("failed to persist index")?;

    log::info!(
        "persisted {} entries (dimension {}) to {}",
        index.len(),
        index.dimensions(),
        config.index_path
    );

    Ok(BuildReport {
        products: products.len(),
        categories: categories.len(),
        indexed: index.len(),
        dimensions: index.dimensions(),
    })
}

/// Load the persisted index and run one top-k query.
pub fn search(config: &Config, query: &str, k: usize) -> anyhow::Result<Vec<SearchHit>> {
    let embedder = create_embedder(&config.model, PathBuf::from(&config.data_dir))
        .context("failed to initialize embedding model")?;

    let engine = QueryEngine::open(PathBuf::from(&config.index_path), embedder)
        .context("failed to load index")?;

    let hits = engine.search(query, k).context("search failed")?;
    Ok(hits)
}

/// Header-only inspection of the persisted index.
pub fn status(config: &Config) -> anyhow::Result<IndexSummary> {
    IndexStorage::new(PathBuf::from(&config.index_path))
        .summary()
        .context("failed to read index header")
}

/// Flag set by Ctrl-C; the builder checks it between batches, so an
/// interrupt aborts before the next batch rather than mid-merge.
fn install_interrupt_flag() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("received interrupt, stopping before the next batch");
        flag.store(true, Ordering::SeqCst);
    }) {
        // Already installed (e.g. repeated builds in one process).
        log::debug!("Ctrl-C handler not installed: {e}");
    }
    cancel
}
