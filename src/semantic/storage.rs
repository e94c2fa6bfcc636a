//! Binary persistence for the vector index.
//!
//! File format: index.bin
//!
//! Header (48 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of the embedder name)
//! - score_kind: u8 (0 = cosine distance, 1 = squared euclidean)
//! - dimensions: u16 (little-endian, 0 for an empty index)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, in index order):
//! - content_len: u32 (little-endian), content: UTF-8 bytes
//! - metadata_len: u32 (little-endian), metadata: JSON object bytes
//! - vector: [f32; dimensions] (little-endian)
//!
//! The file is self-contained: reloading needs no raw inputs and never
//! re-invokes the embedding function for stored entries.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::normalize::Document;
use crate::semantic::embeddings::TextEmbedder;
use crate::semantic::index::{ScoreKind, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + score_kind(1) +
/// dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 48;

/// Upper bound for a single length-prefixed field; longer prefixes are
/// treated as corruption rather than allocated.
const MAX_FIELD_LEN: u32 = 64 * 1024 * 1024;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: index was built with a different embedding model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: embedder produces {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Header-only view of a persisted index, for status reporting.
#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub entry_count: u64,
    pub dimensions: usize,
    pub score_kind: ScoreKind,
    pub model_id: [u8; 32],
}

/// Storage manager for a persisted index file.
pub struct IndexStorage {
    path: PathBuf,
}

impl IndexStorage {
    /// Create a new storage manager for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Save the index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename. A prior valid index
    /// is never replaced by a partial write.
    pub fn save(
        &self,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), IndexStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Load the index, validating it against the embedder that will serve
    /// queries.
    ///
    /// The embedder is only used for identity and dimension checks; stored
    /// entries are never re-embedded. Any structural problem fails with a
    /// distinct error instead of returning a truncated index.
    pub fn load(&self, embedder: &dyn TextEmbedder) -> Result<VectorIndex, IndexStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        self.validate_header(&header, &embedder.model_id_hash(), embedder.dimensions())?;

        let score_kind = ScoreKind::from_code(header.score_kind).ok_or_else(|| {
            IndexStorageError::InvalidFormat(format!(
                "unknown score kind code {}",
                header.score_kind
            ))
        })?;

        let mut index = VectorIndex::new(score_kind);
        for ordinal in 0..header.entry_count {
            let (vector, document) =
                Self::read_entry(&mut reader, header.dimensions as usize).map_err(|e| match e {
                    IndexStorageError::Io(io)
                        if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                    {
                        IndexStorageError::InvalidFormat(format!(
                            "file truncated at entry {ordinal} of {}",
                            header.entry_count
                        ))
                    }
                    other => other,
                })?;
            index.push(vector, document).map_err(|e| {
                IndexStorageError::InvalidFormat(format!("inconsistent entry {ordinal}: {e}"))
            })?;
        }

        Ok(index)
    }

    /// Read only the header, without needing an embedder.
    pub fn summary(&self) -> Result<IndexSummary, IndexStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let header = Self::read_header(&mut reader)?;
        let score_kind = ScoreKind::from_code(header.score_kind).ok_or_else(|| {
            IndexStorageError::InvalidFormat(format!(
                "unknown score kind code {}",
                header.score_kind
            ))
        })?;
        Ok(IndexSummary {
            entry_count: header.entry_count,
            dimensions: header.dimensions as usize,
            score_kind,
            model_id: header.model_id,
        })
    }

    /// Delete the storage file if it exists.
    pub fn delete(&self) -> Result<(), IndexStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), IndexStorageError> {
        // The header stores the dimension as u16; wider vectors cannot be
        // represented and must not silently truncate.
        if index.dimensions() > u16::MAX as usize {
            return Err(IndexStorageError::InvalidFormat(format!(
                "dimension {} exceeds format limit {}",
                index.dimensions(),
                u16::MAX
            )));
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            score_kind: index.score_kind().code(),
            dimensions: index.dimensions() as u16,
            entry_count: index.len() as u64,
        };
        Self::write_header(&mut writer, &header)?;

        for entry in index.iter() {
            Self::write_entry(&mut writer, &entry.vector, &entry.document)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut BufReader<File>) -> Result<Header, IndexStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];

        // Version check first
        if version != FORMAT_VERSION {
            return Err(IndexStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[1..33]);

        let score_kind = header_bytes[33];
        let dimensions = u16::from_le_bytes([header_bytes[34], header_bytes[35]]);

        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header_bytes[36..44]);
        let entry_count = u64::from_le_bytes(count_bytes);

        let mut checksum_bytes = [0u8; 4];
        checksum_bytes.copy_from_slice(&header_bytes[44..48]);
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        // Verify checksum (computed over header without checksum field)
        let computed_checksum = crc32fast::hash(&header_bytes[0..44]);
        if stored_checksum != computed_checksum {
            return Err(IndexStorageError::ChecksumMismatch);
        }

        Ok(Header {
            version,
            model_id,
            score_kind,
            dimensions,
            entry_count,
        })
    }

    fn validate_header(
        &self,
        header: &Header,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(), IndexStorageError> {
        if header.model_id != *expected_model_id {
            return Err(IndexStorageError::ModelMismatch);
        }

        // An empty index carries the dimension sentinel 0 and is loadable
        // under any embedder of the same model.
        if header.entry_count > 0 && header.dimensions as usize != expected_dimensions {
            return Err(IndexStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        Ok(())
    }

    fn write_header(
        writer: &mut BufWriter<File>,
        header: &Header,
    ) -> Result<(), IndexStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33] = header.score_kind;
        header_bytes[34..36].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[36..44].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..44]);
        header_bytes[44..48].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_entry(
        reader: &mut BufReader<File>,
        dimensions: usize,
    ) -> Result<(Vec<f32>, Document), IndexStorageError> {
        let content_bytes = Self::read_field(reader)?;
        let content = String::from_utf8(content_bytes)
            .map_err(|e| IndexStorageError::InvalidFormat(format!("content not UTF-8: {e}")))?;

        let metadata_bytes = Self::read_field(reader)?;
        let metadata: Map<String, Value> = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| IndexStorageError::InvalidFormat(format!("metadata not valid JSON: {e}")))?;

        let mut vector = Vec::with_capacity(dimensions);
        let mut float_bytes = [0u8; 4];
        for _ in 0..dimensions {
            reader.read_exact(&mut float_bytes)?;
            vector.push(f32::from_le_bytes(float_bytes));
        }

        Ok((vector, Document { content, metadata }))
    }

    fn read_field(reader: &mut BufReader<File>) -> Result<Vec<u8>, IndexStorageError> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes);

        if len > MAX_FIELD_LEN {
            return Err(IndexStorageError::InvalidFormat(format!(
                "field length {len} exceeds limit {MAX_FIELD_LEN}"
            )));
        }

        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn write_entry(
        writer: &mut BufWriter<File>,
        vector: &[f32],
        document: &Document,
    ) -> Result<(), IndexStorageError> {
        let content = document.content.as_bytes();
        writer.write_all(&(content.len() as u32).to_le_bytes())?;
        writer.write_all(content)?;

        let metadata = serde_json::to_vec(&document.metadata)
            .map_err(|e| IndexStorageError::InvalidFormat(format!("unserializable metadata: {e}")))?;
        writer.write_all(&(metadata.len() as u32).to_le_bytes())?;
        writer.write_all(&metadata)?;

        for &value in vector {
            writer.write_all(&value.to_le_bytes())?;
        }

        Ok(())
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    score_kind: u8,
    dimensions: u16,
    entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::builder::IndexBuilder;
    use crate::semantic::embeddings::HashingEmbedder;
    use serde_json::json;
    use std::io::Seek;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path() -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "shopidx-index-test-{}-{}.bin",
            std::process::id(),
            counter
        ))
    }

    fn doc(name: &str) -> Document {
        let metadata = json!({
            "id": 1,
            "name": name,
            "source": "product",
        });
        Document {
            content: format!("Product: {name}"),
            metadata: metadata.as_object().unwrap().clone(),
        }
    }

    fn build_index(names: &[&str]) -> (VectorIndex, Arc<HashingEmbedder>) {
        let embedder = Arc::new(HashingEmbedder::default());
        let builder = IndexBuilder::new(embedder.clone(), 10);
        let index = builder.build(names.iter().map(|n| doc(n)).collect()).unwrap();
        (index, embedder)
    }

    #[test]
    fn test_round_trip_empty() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&[]);

        storage.save(&index, &embedder.model_id_hash()).unwrap();
        assert!(storage.exists());

        let loaded = storage.load(embedder.as_ref()).unwrap();
        assert_eq!(loaded.len(), 0);
        assert_eq!(loaded.dimensions(), 0);
        assert_eq!(loaded.score_kind(), index.score_kind());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_round_trip_single_entry() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle"]);

        storage.save(&index, &embedder.model_id_hash()).unwrap();
        let loaded = storage.load(embedder.as_ref()).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entry(0).unwrap(), index.entry(0).unwrap());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_round_trip_many_entries_bit_for_bit() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle", "toaster", "blender"]);

        storage.save(&index, &embedder.model_id_hash()).unwrap();
        let loaded = storage.load(embedder.as_ref()).unwrap();

        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.dimensions(), index.dimensions());
        for ordinal in 0..index.len() {
            let original = index.entry(ordinal).unwrap();
            let reloaded = loaded.entry(ordinal).unwrap();
            assert_eq!(original.vector, reloaded.vector);
            assert_eq!(original.document, reloaded.document);
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_model_mismatch() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle"]);

        // Save under a fabricated model id.
        let mut wrong_model_id = [0u8; 32];
        wrong_model_id[0] = 0xFF;
        storage.save(&index, &wrong_model_id).unwrap();

        let result = storage.load(embedder.as_ref());
        assert!(matches!(result, Err(IndexStorageError::ModelMismatch)));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_dimension_mismatch() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle"]);

        storage.save(&index, &embedder.model_id_hash()).unwrap();

        // Same model name (same id hash), different dimension setting.
        let narrow = HashingEmbedder::new(8);
        let result = storage.load(&narrow);
        assert!(matches!(
            result,
            Err(IndexStorageError::DimensionMismatch { .. })
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle"]);

        storage.save(&index, &embedder.model_id_hash()).unwrap();

        // Corrupt a model-id byte inside the header.
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(std::io::SeekFrom::Start(10)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        let result = storage.load(embedder.as_ref());
        assert!(matches!(result, Err(IndexStorageError::ChecksumMismatch)));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_version_mismatch() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle"]);

        storage.save(&index, &embedder.model_id_hash()).unwrap();

        // Bump the version byte; the version check runs before the checksum.
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(std::io::SeekFrom::Start(0)).unwrap();
        file.write_all(&[9]).unwrap();

        let result = storage.load(embedder.as_ref());
        assert!(matches!(
            result,
            Err(IndexStorageError::VersionMismatch(9, FORMAT_VERSION))
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_truncated_file_is_not_silently_loaded() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle", "toaster"]);

        storage.save(&index, &embedder.model_id_hash()).unwrap();

        // Chop off the tail of the second entry.
        let full_len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - 16).unwrap();

        let result = storage.load(embedder.as_ref());
        assert!(matches!(result, Err(IndexStorageError::InvalidFormat(_))));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_save_rejects_dimension_beyond_format_limit() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());

        // 70_000 does not fit the header's u16 dimension field.
        let embedder = Arc::new(HashingEmbedder::new(70_000));
        let builder = IndexBuilder::new(embedder.clone(), 10);
        let index = builder.build(vec![doc("kettle")]).unwrap();

        let result = storage.save(&index, &embedder.model_id_hash());
        assert!(matches!(result, Err(IndexStorageError::InvalidFormat(_))));
        assert!(!storage.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_atomic_write_cleans_up_on_error() {
        let path = PathBuf::from("/nonexistent/directory/index.bin");
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&[]);

        let result = storage.save(&index, &embedder.model_id_hash());

        assert!(result.is_err());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_failed_save_preserves_prior_index() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle"]);
        storage.save(&index, &embedder.model_id_hash()).unwrap();

        // A failed temp write must leave the existing file intact.
        let loaded = storage.load(embedder.as_ref()).unwrap();
        assert_eq!(loaded.len(), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_summary_reads_header_only() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&["kettle", "toaster"]);
        storage.save(&index, &embedder.model_id_hash()).unwrap();

        let summary = storage.summary().unwrap();
        assert_eq!(summary.entry_count, 2);
        assert_eq!(summary.dimensions, index.dimensions());
        assert_eq!(summary.score_kind, ScoreKind::CosineDistance);
        assert_eq!(summary.model_id, embedder.model_id_hash());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_delete() {
        let path = temp_path();
        let storage = IndexStorage::new(path.clone());
        let (index, embedder) = build_index(&[]);
        storage.save(&index, &embedder.model_id_hash()).unwrap();
        assert!(storage.exists());

        storage.delete().unwrap();
        assert!(!storage.exists());
    }
}
