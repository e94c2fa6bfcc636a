//! In-memory vector index over normalized catalog documents.
//!
//! Entries are stored in insertion order: merging a later segment places
//! all of its entries after the existing ones, so the final index content
//! does not depend on how the document stream was batched.

use crate::normalize::Document;

/// An entry in the vector index: one embedded document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// The embedding vector
    pub vector: Vec<f32>,
    /// The document it was built from (content + metadata)
    pub document: Document,
}

/// How raw similarity scores are computed and interpreted.
///
/// Both conventions agree on direction: **smaller score = more similar**.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// `1 - cosine similarity`; used when the embedder emits unit vectors.
    CosineDistance,
    /// Plain squared Euclidean distance; used for unnormalized embedders.
    SquaredEuclidean,
}

impl ScoreKind {
    /// Pick the convention matching an embedder's normalization setting.
    pub fn for_normalized(normalized: bool) -> Self {
        if normalized {
            ScoreKind::CosineDistance
        } else {
            ScoreKind::SquaredEuclidean
        }
    }

    /// Stable on-disk code.
    pub fn code(&self) -> u8 {
        match self {
            ScoreKind::CosineDistance => 0,
            ScoreKind::SquaredEuclidean => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ScoreKind::CosineDistance),
            1 => Some(ScoreKind::SquaredEuclidean),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreKind::CosineDistance => "cosine-distance",
            ScoreKind::SquaredEuclidean => "squared-euclidean",
        }
    }
}

/// A ranked search result: ordinal position of the entry plus its score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Position of the matched entry in the index.
    pub ordinal: usize,
    /// Distance score, smaller = more similar.
    pub score: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Score convention mismatch: {ours} vs {theirs}")]
    ScoreKindMismatch {
        ours: &'static str,
        theirs: &'static str,
    },

    #[error("Batch shape mismatch: {vectors} vectors for {documents} documents")]
    BatchShape { vectors: usize, documents: usize },
}

/// The assembled, order-preserving vector index.
///
/// All member vectors share one dimension; an empty index carries the
/// dimension sentinel `0` until its first merge. During construction the
/// builder is the only writer; a loaded index is read-only.
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    /// 0 until the first entry arrives.
    dimensions: usize,
    score_kind: ScoreKind,
}

impl VectorIndex {
    /// Create a new empty index with the given score convention.
    pub fn new(score_kind: ScoreKind) -> Self {
        Self {
            entries: Vec::new(),
            dimensions: 0,
            score_kind,
        }
    }

    /// Build an index segment from one embedded batch.
    ///
    /// Vectors and documents are paired positionally; all vectors must
    /// share one dimension.
    pub fn from_batch(
        vectors: Vec<Vec<f32>>,
        documents: Vec<Document>,
        score_kind: ScoreKind,
    ) -> Result<Self, IndexError> {
        if vectors.len() != documents.len() {
            return Err(IndexError::BatchShape {
                vectors: vectors.len(),
                documents: documents.len(),
            });
        }

        let mut segment = Self::new(score_kind);
        for (vector, document) in vectors.into_iter().zip(documents) {
            segment.push(vector, document)?;
        }
        Ok(segment)
    }

    /// Append a single entry, establishing the dimension on first insert.
    pub fn push(&mut self, vector: Vec<f32>, document: Document) -> Result<(), IndexError> {
        if self.entries.is_empty() {
            self.dimensions = vector.len();
        } else if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        self.entries.push(IndexEntry { vector, document });
        Ok(())
    }

    /// Merge a segment into this index.
    ///
    /// Appends the segment's entries after the existing ones, preserving
    /// segment-internal order. Fails without modifying the index when the
    /// dimensions or score conventions differ; an empty running index
    /// adopts the segment's dimension.
    pub fn merge(&mut self, segment: VectorIndex) -> Result<(), IndexError> {
        if segment.score_kind != self.score_kind {
            return Err(IndexError::ScoreKindMismatch {
                ours: self.score_kind.label(),
                theirs: segment.score_kind.label(),
            });
        }
        if segment.is_empty() {
            return Ok(());
        }
        if !self.is_empty() && segment.dimensions != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: segment.dimensions,
            });
        }

        if self.is_empty() {
            self.dimensions = segment.dimensions;
        }
        self.entries.extend(segment.entries);
        Ok(())
    }

    /// Vector dimension shared by all entries; 0 while the index is empty.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn score_kind(&self) -> ScoreKind {
        self.score_kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at an ordinal position (as returned by [`Self::search`]).
    pub fn entry(&self, ordinal: usize) -> Option<&IndexEntry> {
        self.entries.get(ordinal)
    }

    /// Iterate entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// Top-k similarity search.
    ///
    /// Returns up to `k` results ranked by ascending score (most similar
    /// first); ties keep index order. `k = 0` yields an empty result and
    /// `k` larger than the index is clamped.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, IndexError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(vec![]);
        }
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .enumerate()
            .map(|(ordinal, entry)| SearchResult {
                ordinal,
                score: self.score(query, &entry.vector),
            })
            .collect();

        // Ascending: smaller distance = more similar. Stable sort keeps
        // index order on ties.
        results.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);

        Ok(results)
    }

    fn score(&self, query: &[f32], target: &[f32]) -> f32 {
        match self.score_kind {
            ScoreKind::CosineDistance => 1.0 - Self::cosine_similarity(query, target),
            ScoreKind::SquaredEuclidean => query
                .iter()
                .zip(target.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
        }
    }

    fn cosine_similarity(query: &[f32], target: &[f32]) -> f32 {
        let query_norm = Self::l2_norm(query);
        let target_norm = Self::l2_norm(target);
        if query_norm < f32::EPSILON || target_norm < f32::EPSILON {
            return 0.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        dot_product / (query_norm * target_norm)
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn doc(name: &str) -> Document {
        let mut metadata = Map::new();
        metadata.insert("source".into(), "product".into());
        metadata.insert("name".into(), name.into());
        Document {
            content: format!("Product: {name}"),
            metadata,
        }
    }

    fn segment(vectors: Vec<Vec<f32>>) -> VectorIndex {
        let docs = (0..vectors.len()).map(|i| doc(&format!("p{i}"))).collect();
        VectorIndex::from_batch(vectors, docs, ScoreKind::CosineDistance).unwrap()
    }

    #[test]
    fn test_new_index_is_empty_with_sentinel_dimension() {
        let index = VectorIndex::new(ScoreKind::CosineDistance);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.dimensions(), 0);
    }

    #[test]
    fn test_from_batch_rejects_uneven_dimensions() {
        let result = VectorIndex::from_batch(
            vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
            vec![doc("a"), doc("b")],
            ScoreKind::CosineDistance,
        );
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_from_batch_rejects_shape_mismatch() {
        let result = VectorIndex::from_batch(
            vec![vec![1.0, 0.0]],
            vec![doc("a"), doc("b")],
            ScoreKind::CosineDistance,
        );
        assert!(matches!(result, Err(IndexError::BatchShape { .. })));
    }

    #[test]
    fn test_merge_appends_in_order() {
        let mut index = segment(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let later = segment(vec![vec![0.5, 0.5]]);

        index.merge(later).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.entry(2).unwrap().vector, vec![0.5, 0.5]);
        assert_eq!(index.entry(0).unwrap().vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_merge_dimension_guard_leaves_index_unmodified() {
        let mut index = segment(vec![vec![1.0, 0.0]]);
        let bad = segment(vec![vec![1.0, 0.0, 0.0]]);

        let result = index.merge(bad);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
        assert_eq!(index.len(), 1);
        assert_eq!(index.dimensions(), 2);
    }

    #[test]
    fn test_merge_into_empty_adopts_dimension() {
        let mut index = VectorIndex::new(ScoreKind::CosineDistance);
        index.merge(segment(vec![vec![1.0, 0.0, 0.0]])).unwrap();
        assert_eq!(index.dimensions(), 3);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_merge_score_kind_guard() {
        let mut index = VectorIndex::new(ScoreKind::CosineDistance);
        let other = VectorIndex::new(ScoreKind::SquaredEuclidean);
        let result = index.merge(other);
        assert!(matches!(result, Err(IndexError::ScoreKindMismatch { .. })));
    }

    #[test]
    fn test_search_ranks_by_ascending_distance() {
        let index = segment(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]]);

        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].ordinal, 0);
        assert_eq!(results[1].ordinal, 2);
        assert_eq!(results[2].ordinal, 1);
        assert!(results[0].score <= results[1].score);
        assert!(results[1].score <= results[2].score);
    }

    #[test]
    fn test_search_k_zero_yields_empty() {
        let index = segment(vec![vec![1.0, 0.0]]);
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_k_clamped_to_len() {
        let index = segment(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
        let results = index.search(&[1.0, 0.0], 100).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_empty_index_yields_empty() {
        let index = VectorIndex::new(ScoreKind::CosineDistance);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_query_dimension_guard() {
        let index = segment(vec![vec![1.0, 0.0]]);
        let result = index.search(&[1.0, 0.0, 0.0], 1);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_squared_euclidean_ranking() {
        let docs = vec![doc("near"), doc("far")];
        let index = VectorIndex::from_batch(
            vec![vec![1.0, 1.0], vec![5.0, 5.0]],
            docs,
            ScoreKind::SquaredEuclidean,
        )
        .unwrap();

        let results = index.search(&[1.1, 1.0], 2).unwrap();
        assert_eq!(results[0].ordinal, 0);
        assert!(results[0].score < results[1].score);
    }
}
