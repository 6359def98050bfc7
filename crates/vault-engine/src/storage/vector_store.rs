//! Three-artifact on-disk persistence for the dense vector index: a raw f32
//! payload, a per-row metadata sidecar, and an index-metadata summary. Grounded
//! on `store.py`'s `EmbeddingStore` (`save_embeddings`/`load_embeddings`/`backup`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::EngineError;

const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.json";
const INDEX_FILE: &str = "index.json";

/// One row of per-document metadata, index-aligned with the corresponding
/// vector in `vectors.bin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRow {
    pub relative_path: String,
    pub title: String,
    pub tags: Vec<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub content: String,
    pub created_date: String,
    pub modified_time: String,
    pub frontmatter: HashMap<String, serde_json::Value>,
}

/// Summary written alongside the vectors. `vault_path` is the safety-invariant
/// anchor checked by `IndexManager` before any write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub vault_path: PathBuf,
    pub encoder_name: String,
    pub embedding_dim: usize,
    pub num_embeddings: usize,
    pub created_at: String,
    pub updated_at: String,
    pub schema_version: u32,
    pub file_tracking: HashMap<String, String>,
}

impl IndexMetadata {
    pub fn is_legacy_missing_vault_path(&self) -> bool {
        self.vault_path.as_os_str().is_empty()
    }
}

/// Row-major flat buffer: `vectors[row * dim .. (row + 1) * dim]`. A `Vec<Vec<f32>>`
/// would round-trip equally well but loses the ability to treat the whole buffer as
/// one contiguous byte slice for the raw `.bin` write.
pub struct VectorStore {
    storage_dir: PathBuf,
}

impl VectorStore {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
        }
    }

    pub fn exists(&self) -> bool {
        self.storage_dir.join(INDEX_FILE).is_file()
    }

    /// Load all three artifacts. Returns `Ok(None)` when no index has been
    /// written yet (first run), never a partial result.
    pub fn load(&self) -> Result<Option<(Vec<f32>, Vec<MetadataRow>, IndexMetadata)>, EngineError> {
        if !self.exists() {
            return Ok(None);
        }
        let index_metadata = self.read_index_metadata()?;
        let metadata_rows = self.read_metadata_rows()?;
        let vectors = self.read_vectors(index_metadata.embedding_dim, metadata_rows.len())?;
        Ok(Some((vectors, metadata_rows, index_metadata)))
    }

    fn read_index_metadata(&self) -> Result<IndexMetadata, EngineError> {
        let path = self.storage_dir.join(INDEX_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| EngineError::VaultRead {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| EngineError::Index {
            detail: format!("corrupt {}: {e}", path.display()),
        })
    }

    fn read_metadata_rows(&self) -> Result<Vec<MetadataRow>, EngineError> {
        let path = self.storage_dir.join(METADATA_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| EngineError::VaultRead {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| EngineError::Index {
            detail: format!("corrupt {}: {e}", path.display()),
        })
    }

    fn read_vectors(&self, dim: usize, expected_rows: usize) -> Result<Vec<f32>, EngineError> {
        let path = self.storage_dir.join(VECTORS_FILE);
        let raw = fs::read(&path).map_err(|e| EngineError::VaultRead {
            path: path.clone(),
            source: e,
        })?;
        if raw.len() != expected_rows * dim * std::mem::size_of::<f32>() {
            return Err(EngineError::Index {
                detail: format!(
                    "vector payload length {} does not match {expected_rows} rows x {dim} dims",
                    raw.len()
                ),
            });
        }
        let mut vectors = vec![0f32; expected_rows * dim];
        for (chunk, out) in raw.chunks_exact(4).zip(vectors.iter_mut()) {
            *out = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(vectors)
    }

    /// Write all three artifacts. Each file is written to a sibling `.tmp` path
    /// and renamed into place, so a crash mid-write never leaves a partial file
    /// at the canonical path.
    pub fn save(
        &self,
        vectors: &[f32],
        metadata_rows: &[MetadataRow],
        index_metadata: &IndexMetadata,
    ) -> Result<(), EngineError> {
        fs::create_dir_all(&self.storage_dir).map_err(|e| EngineError::VaultRead {
            path: self.storage_dir.clone(),
            source: e,
        })?;

        let mut bytes = Vec::with_capacity(vectors.len() * 4);
        for v in vectors {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.atomic_write(VECTORS_FILE, &bytes)?;

        let metadata_json = serde_json::to_vec_pretty(metadata_rows).map_err(|e| EngineError::Index {
            detail: format!("failed to serialize metadata rows: {e}"),
        })?;
        self.atomic_write(METADATA_FILE, &metadata_json)?;

        let index_json = serde_json::to_vec_pretty(index_metadata).map_err(|e| EngineError::Index {
            detail: format!("failed to serialize index metadata: {e}"),
        })?;
        self.atomic_write(INDEX_FILE, &index_json)?;

        Ok(())
    }

    fn atomic_write(&self, name: &str, content: &[u8]) -> Result<(), EngineError> {
        let final_path = self.storage_dir.join(name);
        let tmp_path = self.storage_dir.join(format!("{name}.tmp"));
        fs::write(&tmp_path, content).map_err(|e| EngineError::VaultRead {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|e| EngineError::VaultRead {
            path: final_path.clone(),
            source: e,
        })?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), EngineError> {
        if self.storage_dir.is_dir() {
            fs::remove_dir_all(&self.storage_dir).map_err(|e| EngineError::VaultRead {
                path: self.storage_dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Copy the three current artifacts into `backups/embeddings_{name}/`,
    /// timestamped when `name` is not given.
    pub fn backup(&self, name: Option<&str>, timestamp: &str) -> Result<PathBuf, EngineError> {
        let label = name.map(str::to_string).unwrap_or_else(|| timestamp.to_string());
        let backup_dir = self.storage_dir.join("backups").join(format!("embeddings_{label}"));
        fs::create_dir_all(&backup_dir).map_err(|e| EngineError::VaultRead {
            path: backup_dir.clone(),
            source: e,
        })?;
        for name in [VECTORS_FILE, METADATA_FILE, INDEX_FILE] {
            let src = self.storage_dir.join(name);
            if src.is_file() {
                fs::copy(&src, backup_dir.join(name)).map_err(|e| EngineError::VaultRead {
                    path: src.clone(),
                    source: e,
                })?;
            }
        }
        Ok(backup_dir)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_metadata(dim: usize, rows: usize) -> IndexMetadata {
        IndexMetadata {
            vault_path: PathBuf::from("/vaults/demo"),
            encoder_name: "test-hashing-encoder".to_string(),
            embedding_dim: dim,
            num_embeddings: rows,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            schema_version: 1,
            file_tracking: HashMap::new(),
        }
    }

    fn sample_row(i: usize) -> MetadataRow {
        MetadataRow {
            relative_path: format!("note-{i}.md"),
            title: format!("Note {i}"),
            tags: vec![],
            chunk_index: 0,
            total_chunks: 1,
            start_offset: 0,
            end_offset: 10,
            content: "hello world".to_string(),
            created_date: "2026-01-01".to_string(),
            modified_time: "2026-01-01T00:00:00Z".to_string(),
            frontmatter: HashMap::new(),
        }
    }

    #[test]
    fn round_trips_bitwise_equal_vectors() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        let dim = 4;
        let vectors: Vec<f32> = vec![0.1, -0.2, 0.3, 0.4, 1.5, -2.25, 0.0, 3.125];
        let rows = vec![sample_row(0), sample_row(1)];
        let meta = sample_metadata(dim, rows.len());

        store.save(&vectors, &rows, &meta).unwrap();
        let (loaded_vectors, loaded_rows, loaded_meta) = store.load().unwrap().unwrap();

        assert_eq!(loaded_vectors, vectors);
        assert_eq!(loaded_rows.len(), 2);
        assert_eq!(loaded_meta.embedding_dim, dim);
    }

    #[test]
    fn load_returns_none_when_absent() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn clear_removes_the_storage_directory() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        store.save(&[0.0; 4], &[sample_row(0)], &sample_metadata(4, 1)).unwrap();
        store.clear().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn backup_copies_all_three_artifacts() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        store.save(&[0.0; 4], &[sample_row(0)], &sample_metadata(4, 1)).unwrap();
        let backup_dir = store.backup(Some("pre-reindex"), "2026-01-01T00-00-00").unwrap();
        assert!(backup_dir.join(VECTORS_FILE).is_file());
        assert!(backup_dir.join(METADATA_FILE).is_file());
        assert!(backup_dir.join(INDEX_FILE).is_file());
    }

    #[test]
    fn mismatched_vector_payload_length_is_rejected() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join(INDEX_FILE), serde_json::to_vec(&sample_metadata(4, 2)).unwrap()).unwrap();
        fs::write(
            dir.path().join(METADATA_FILE),
            serde_json::to_vec(&vec![sample_row(0), sample_row(1)]).unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join(VECTORS_FILE), vec![0u8; 4]).unwrap();

        let store = VectorStore::new(dir.path());
        assert!(store.load().is_err());
    }
}
