//! Embedding backends.
//!
//! The index builder and query engine only see the [`TextEmbedder`] trait:
//! an opaque mapping from text to a fixed-dimension vector. Two
//! implementations ship here:
//! - [`FastembedEmbedder`]: real ONNX models via fastembed, lazy download
//!   into a cache directory
//! - [`HashingEmbedder`]: deterministic character-trigram hashing, no model
//!   download; used by tests and offline smoke runs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use fastembed::{InitOptions, TextEmbedding};

/// Model name that selects the offline [`HashingEmbedder`].
pub const HASHING_MODEL_NAME: &str = "hashing";

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// An opaque text-to-vector function.
///
/// All vectors produced by one embedder share `dimensions()`. `embed_many`
/// is order-preserving and returns exactly one vector per input text.
pub trait TextEmbedder: Send + Sync {
    /// Model name, used for identity checks on persisted indices.
    fn name(&self) -> &str;

    /// Fixed output dimension.
    fn dimensions(&self) -> usize;

    /// Whether output vectors are L2-normalized. Decides the score
    /// convention recorded in the index.
    fn normalized(&self) -> bool;

    /// Embed a single text (used for queries).
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts, one vector per text, input order preserved.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// SHA256 hash of the model name for storage identification.
    fn model_id_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.name().as_bytes());
        hasher.finalize().into()
    }
}

/// Create an embedder from a configured model name.
///
/// `"hashing"` selects the offline [`HashingEmbedder`]; anything else is
/// treated as a fastembed model name and may download on first use.
pub fn create_embedder(
    model: &str,
    cache_dir: PathBuf,
) -> Result<Arc<dyn TextEmbedder>, EmbeddingError> {
    if model.eq_ignore_ascii_case(HASHING_MODEL_NAME) {
        return Ok(Arc::new(HashingEmbedder::default()));
    }
    Ok(Arc::new(FastembedEmbedder::new(model, cache_dir)?))
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct FastembedEmbedder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl FastembedEmbedder {
    /// Create a new embedding model with the given name.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
            "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "bge-large-en-v1.5-q" | "bgelargeenv15q" => Ok(fastembed::EmbeddingModel::BGELargeENV15Q),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized), or \"hashing\" for the offline embedder",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl TextEmbedder for FastembedEmbedder {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn normalized(&self) -> bool {
        // fastembed's sentence-transformer models emit unit vectors.
        true
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

/// Default dimension for the hashing embedder.
const HASHING_DIMENSIONS: usize = 64;

/// Deterministic offline embedder: a bag of character trigrams hashed into
/// a fixed number of buckets, L2-normalized by default.
///
/// Lexically similar texts share trigrams and land close together, which is
/// enough for tests and smoke runs without a model download.
pub struct HashingEmbedder {
    dimensions: usize,
    normalize: bool,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            normalize: true,
        }
    }

    /// Keep raw trigram counts instead of unit vectors. Indices built this
    /// way use the squared-Euclidean score convention.
    pub fn without_normalization(mut self) -> Self {
        self.normalize = false;
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            window.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        if self.normalize {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > f32::EPSILON {
                for value in &mut vector {
                    *value /= norm;
                }
            }
        }

        vector
    }
}

impl TextEmbedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing-trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn normalized(&self) -> bool {
        self.normalize
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_text(text))
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = std::env::temp_dir().join("shopidx-embed-invalid");
        let result = FastembedEmbedder::new("nonexistent-model", temp_dir);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_create_embedder_hashing() {
        let embedder = create_embedder("hashing", std::env::temp_dir()).unwrap();
        assert_eq!(embedder.name(), "hashing-trigram-v1");
        assert_eq!(embedder.dimensions(), HASHING_DIMENSIONS);
    }

    #[test]
    fn test_hashing_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_one("cast iron kettle").unwrap();
        let b = embedder.embed_one("cast iron kettle").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), HASHING_DIMENSIONS);
    }

    #[test]
    fn test_hashing_normalized() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed_one("some catalog text").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_hashing_similar_texts_closer() {
        let embedder = HashingEmbedder::default();
        let kettle = embedder.embed_one("cast iron kettle for stovetops").unwrap();
        let near = embedder.embed_one("cast iron kettle").unwrap();
        let far = embedder.embed_one("usb charging cable").unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
        };
        assert!(dot(&kettle, &near) > dot(&kettle, &far));
    }

    #[test]
    fn test_embed_many_order_and_count() {
        let embedder = HashingEmbedder::default();
        let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let vectors = embedder.embed_many(&texts).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], embedder.embed_one("alpha").unwrap());
        assert_eq!(vectors[2], embedder.embed_one("gamma").unwrap());
    }

    #[test]
    fn test_model_id_hash_stable_across_instances() {
        let hashing = HashingEmbedder::default();
        let other = HashingEmbedder::new(32);
        // Same name, same hash, regardless of dimensions.
        assert_eq!(hashing.model_id_hash(), other.model_id_hash());
    }

    #[test]
    fn test_empty_text_is_safe() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed_one("").unwrap();
        assert_eq!(v.len(), HASHING_DIMENSIONS);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
