//! Exact cosine-similarity vector index with paired on-disk artifacts
//!
//! Embeddings are L2-normalized into a row-major matrix whose row `i` belongs to
//! chunk `i`. Search is a full matrix-vector product, so ranking is exact.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, IndexStats, SearchResult};

/// File name of the serialized vector matrix
pub const VECTORS_FILE: &str = "vectors.bin";
/// File name of the serialized chunk list
pub const CHUNKS_FILE: &str = "chunks.json";

/// On-disk form of the normalized vector matrix
#[derive(Serialize, Deserialize)]
struct VectorArtifact {
    build_id: String,
    dimension: usize,
    rows: usize,
    data: Vec<f32>,
}

/// On-disk form of the chunk list, in row order
#[derive(Serialize, Deserialize)]
struct ChunkArtifact {
    build_id: String,
    chunks: Vec<Chunk>,
}

/// Built index state; rows of `vectors` correspond to `chunks` by position
#[derive(Debug)]
struct IndexData {
    build_id: String,
    vectors: Array2<f32>,
    chunks: Vec<Chunk>,
}

/// In-memory exact inner-product index over unit vectors.
///
/// Read-only after `build`/`load`: share it behind an `Arc` and call `search`
/// from any number of threads.
#[derive(Debug)]
pub struct VectorIndex {
    /// Required dimension of every vector
    dimension: usize,
    /// Directory holding the paired artifacts
    index_dir: PathBuf,
    data: Option<IndexData>,
}

impl VectorIndex {
    /// Create an empty, unbuilt index
    pub fn new(dimension: usize, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            index_dir: index_dir.into(),
            data: None,
        }
    }

    /// Create an empty index from configuration
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.embeddings.dimensions, config.paths.index_dir.clone())
    }

    /// Build the index from embeddings and their chunks, replacing any previous build.
    ///
    /// The input embeddings are copied before normalization.
    pub fn build(&mut self, embeddings: &[Vec<f32>], chunks: Vec<Chunk>) -> Result<()> {
        if embeddings.len() != chunks.len() {
            return Err(Error::LengthMismatch {
                vectors: embeddings.len(),
                chunks: chunks.len(),
            });
        }

        let mut flat = Vec::with_capacity(embeddings.len() * self.dimension);
        for embedding in embeddings {
            if embedding.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
            flat.extend_from_slice(embedding);
        }

        let mut vectors = Array2::from_shape_vec((embeddings.len(), self.dimension), flat)
            .map_err(|e| Error::internal(format!("Failed to shape vector matrix: {}", e)))?;
        for mut row in vectors.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|x| x / norm);
            }
        }

        tracing::info!(
            vectors = vectors.nrows(),
            dimension = self.dimension,
            "Built vector index"
        );

        self.data = Some(IndexData {
            build_id: Uuid::new_v4().to_string(),
            vectors,
            chunks,
        });
        Ok(())
    }

    /// Whether `build` or `load` has populated the index
    pub fn is_built(&self) -> bool {
        self.data.is_some()
    }

    /// Write both artifacts to the index directory.
    ///
    /// Each artifact is written to a temporary file first and renamed into place
    /// only after both writes succeed. A crash between the two renames leaves a
    /// pair whose build ids differ, which `load` reports as corrupt.
    pub fn persist(&self) -> Result<()> {
        let data = self.data.as_ref().ok_or(Error::IndexNotBuilt)?;
        std::fs::create_dir_all(&self.index_dir)?;

        let vectors = VectorArtifact {
            build_id: data.build_id.clone(),
            dimension: self.dimension,
            rows: data.vectors.nrows(),
            data: data.vectors.iter().copied().collect(),
        };
        let chunks = ChunkArtifact {
            build_id: data.build_id.clone(),
            chunks: data.chunks.clone(),
        };

        let vector_bytes = bincode::serde::encode_to_vec(&vectors, bincode::config::standard())?;
        let chunk_bytes = serde_json::to_vec_pretty(&chunks)?;

        let vectors_path = self.vectors_path();
        let chunks_path = self.chunks_path();
        let vectors_tmp = vectors_path.with_extension("bin.tmp");
        let chunks_tmp = chunks_path.with_extension("json.tmp");

        let written = std::fs::write(&vectors_tmp, &vector_bytes)
            .and_then(|_| std::fs::write(&chunks_tmp, &chunk_bytes));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&vectors_tmp);
            let _ = std::fs::remove_file(&chunks_tmp);
            return Err(e.into());
        }

        std::fs::rename(&vectors_tmp, &vectors_path)?;
        std::fs::rename(&chunks_tmp, &chunks_path)?;

        tracing::info!("Index saved to {}", self.index_dir.display());
        Ok(())
    }

    /// Load both artifacts from the index directory.
    ///
    /// Returns `Ok(false)` when either artifact is missing. Artifacts that are
    /// present but disagree with each other are an `IndexCorrupt` error; a stored
    /// dimension different from the configured one is a `DimensionMismatch`.
    pub fn load(&mut self) -> Result<bool> {
        let vectors_path = self.vectors_path();
        let chunks_path = self.chunks_path();

        if !vectors_path.exists() || !chunks_path.exists() {
            tracing::warn!("Index files not found in {}", self.index_dir.display());
            return Ok(false);
        }

        let bytes = std::fs::read(&vectors_path)?;
        let (vectors, _): (VectorArtifact, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        let chunks: ChunkArtifact = serde_json::from_slice(&std::fs::read(&chunks_path)?)?;

        if vectors.dimension != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vectors.dimension,
            });
        }
        if vectors.build_id != chunks.build_id {
            return Err(Error::IndexCorrupt(format!(
                "vector build {} does not match chunk build {}",
                vectors.build_id, chunks.build_id
            )));
        }
        if vectors.rows != chunks.chunks.len() {
            return Err(Error::IndexCorrupt(format!(
                "{} vectors stored for {} chunks",
                vectors.rows,
                chunks.chunks.len()
            )));
        }

        let matrix = Array2::from_shape_vec((vectors.rows, vectors.dimension), vectors.data)
            .map_err(|e| Error::IndexCorrupt(format!("vector data has the wrong length: {}", e)))?;

        tracing::info!("Index loaded with {} vectors", matrix.nrows());
        self.data = Some(IndexData {
            build_id: vectors.build_id,
            vectors: matrix,
            chunks: chunks.chunks,
        });
        Ok(true)
    }

    /// Top-`k` chunks by inner product with the normalized query, best first.
    ///
    /// Equal scores keep index order. An unbuilt index yields no results.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let Some(data) = &self.data else {
            tracing::warn!("Search on an unbuilt index");
            return Ok(Vec::new());
        };

        if query_embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }
        if k == 0 || data.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = Array1::from(query_embedding.to_vec());
        let norm = query.dot(&query).sqrt();
        if norm > 0.0 {
            query.mapv_inplace(|x| x / norm);
        }

        let scores = data.vectors.dot(&query);
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(i, score)| SearchResult {
                chunk: data.chunks[i].clone(),
                score,
            })
            .collect())
    }

    /// Diagnostic counters
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_vectors: self.data.as_ref().map_or(0, |d| d.vectors.nrows()),
            dimension: self.dimension,
            total_chunks: self.data.as_ref().map_or(0, |d| d.chunks.len()),
        }
    }

    /// Stored chunks in row order
    pub fn chunks(&self) -> &[Chunk] {
        self.data.as_ref().map(|d| d.chunks.as_slice()).unwrap_or_default()
    }

    /// Normalized vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        let data = self.data.as_ref()?;
        (position < data.vectors.nrows()).then(|| data.vectors.row(position))
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    fn vectors_path(&self) -> PathBuf {
        self.index_dir.join(VECTORS_FILE)
    }

    fn chunks_path(&self) -> PathBuf {
        self.index_dir.join(CHUNKS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const DIM: usize = 768;

    fn chunk(id: u32) -> Chunk {
        Chunk::new(id, format!("chunk text {}", id), "Section 1: Test".into(), id, 0, 0)
    }

    /// Deterministic, pairwise distinct vectors
    fn embedding(seed: usize) -> Vec<f32> {
        (0..DIM)
            .map(|i| (((i * 31 + seed * 17) % 97) as f32 - 48.0) * (seed as f32 + 1.0))
            .collect()
    }

    fn built_index(dir: &Path, n: usize) -> VectorIndex {
        let mut index = VectorIndex::new(DIM, dir);
        let embeddings: Vec<Vec<f32>> = (0..n).map(embedding).collect();
        let chunks: Vec<Chunk> = (0..n as u32).map(chunk).collect();
        index.build(&embeddings, chunks).unwrap();
        index
    }

    #[test]
    fn test_build_rejects_length_mismatch() {
        let mut index = VectorIndex::new(DIM, "unused");
        let result = index.build(&[embedding(0)], vec![chunk(0), chunk(1)]);
        assert!(matches!(result, Err(Error::LengthMismatch { vectors: 1, chunks: 2 })));
        assert!(!index.is_built());
    }

    #[test]
    fn test_build_rejects_wrong_dimension() {
        let mut index = VectorIndex::new(DIM, "unused");
        let result = index.build(&[vec![1.0; 3]], vec![chunk(0)]);
        assert!(matches!(result, Err(Error::DimensionMismatch { expected: 768, actual: 3 })));
    }

    #[test]
    fn test_build_does_not_mutate_input() {
        let mut index = VectorIndex::new(DIM, "unused");
        let embeddings = vec![embedding(3)];
        let before = embeddings.clone();
        index.build(&embeddings, vec![chunk(0)]).unwrap();
        assert_eq!(embeddings, before);
    }

    #[test]
    fn test_rows_are_unit_length() {
        let dir = tempfile::tempdir().unwrap();
        let index = built_index(dir.path(), 4);
        for i in 0..4 {
            let row = index.vector(i).unwrap();
            assert!((row.dot(&row) - 1.0).abs() < 1e-5);
        }
        assert!(index.vector(4).is_none());
    }

    #[test]
    fn test_zero_vector_is_kept() {
        let mut index = VectorIndex::new(DIM, "unused");
        index.build(&[vec![0.0; DIM]], vec![chunk(0)]).unwrap();
        let results = index.search(&embedding(1), 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 0.0);
    }

    #[test]
    fn test_top1_self_retrieval() {
        let dir = tempfile::tempdir().unwrap();
        let index = built_index(dir.path(), 6);

        for i in 0..6 {
            let results = index.search(&embedding(i), 3).unwrap();
            assert_eq!(results[0].chunk.chunk_id, i as u32);
            assert!((results[0].score - 1.0).abs() < 1e-4);
            for pair in results.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
        }
    }

    #[test]
    fn test_k_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let index = built_index(dir.path(), 3);
        assert_eq!(index.search(&embedding(0), 2).unwrap().len(), 2);
        assert_eq!(index.search(&embedding(0), 10).unwrap().len(), 3);
        assert!(index.search(&embedding(0), 0).unwrap().is_empty());
    }

    #[test]
    fn test_unbuilt_search_is_empty() {
        let index = VectorIndex::new(DIM, "unused");
        assert!(index.search(&embedding(0), 3).unwrap().is_empty());
        assert_eq!(
            index.stats(),
            IndexStats { total_vectors: 0, dimension: DIM, total_chunks: 0 }
        );
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let index = built_index(dir.path(), 2);
        assert!(matches!(
            index.search(&[1.0, 2.0], 1),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_ties_keep_index_order() {
        let mut index = VectorIndex::new(DIM, "unused");
        let same = embedding(2);
        index
            .build(&[same.clone(), embedding(5), same.clone()], vec![chunk(0), chunk(1), chunk(2)])
            .unwrap();

        let results = index.search(&same, 2).unwrap();
        assert_eq!(results[0].chunk.chunk_id, 0);
        assert_eq!(results[1].chunk.chunk_id, 2);
    }

    #[test]
    fn test_search_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let index = built_index(dir.path(), 8);
        let query = embedding(11);
        let first = index.search(&query, 5).unwrap();
        for _ in 0..5 {
            assert_eq!(index.search(&query, 5).unwrap(), first);
        }
    }

    #[test]
    fn test_persist_without_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::new(DIM, dir.path());
        assert!(matches!(index.persist(), Err(Error::IndexNotBuilt)));
        assert!(!dir.path().join(VECTORS_FILE).exists());
    }

    #[test]
    fn test_load_absent_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::new(DIM, dir.path().join("missing"));
        assert!(!index.load().unwrap());
        assert!(!index.is_built());
    }

    #[test]
    fn test_persist_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let index = built_index(dir.path(), 5);
        index.persist().unwrap();
        assert!(!dir.path().join("vectors.bin.tmp").exists());

        let mut loaded = VectorIndex::new(DIM, dir.path());
        assert!(loaded.load().unwrap());
        assert_eq!(
            loaded.stats(),
            IndexStats { total_vectors: 5, dimension: 768, total_chunks: 5 }
        );
        assert_eq!(loaded.chunks(), index.chunks());
        for i in 0..5 {
            assert_eq!(loaded.vector(i), index.vector(i));
            let results = loaded.search(&embedding(i), 1).unwrap();
            assert_eq!(results[0].chunk, index.chunks()[i]);
        }
    }

    #[test]
    fn test_load_only_one_artifact_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        built_index(dir.path(), 2).persist().unwrap();
        std::fs::remove_file(dir.path().join(CHUNKS_FILE)).unwrap();

        let mut index = VectorIndex::new(DIM, dir.path());
        assert!(!index.load().unwrap());
    }

    #[test]
    fn test_mixed_builds_are_corrupt() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        built_index(first.path(), 3).persist().unwrap();
        built_index(second.path(), 3).persist().unwrap();
        std::fs::copy(second.path().join(CHUNKS_FILE), first.path().join(CHUNKS_FILE)).unwrap();

        let mut index = VectorIndex::new(DIM, first.path());
        assert!(matches!(index.load(), Err(Error::IndexCorrupt(_))));
    }

    #[test]
    fn test_load_with_other_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        built_index(dir.path(), 2).persist().unwrap();

        let mut index = VectorIndex::new(384, dir.path());
        assert!(matches!(index.load(), Err(Error::DimensionMismatch { expected: 384, actual: 768 })));
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = built_index(dir.path(), 4);
        index.build(&[embedding(9)], vec![chunk(0)]).unwrap();
        assert_eq!(index.stats().total_vectors, 1);
    }

    #[test]
    fn test_concurrent_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(built_index(dir.path(), 16));
        let expected = index.search(&embedding(7), 4).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let index = Arc::clone(&index);
                let expected = &expected;
                scope.spawn(move || {
                    for _ in 0..20 {
                        assert_eq!(&index.search(&embedding(7), 4).unwrap(), expected);
                    }
                });
            }
        });
    }
}
