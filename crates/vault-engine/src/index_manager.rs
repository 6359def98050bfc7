//! Builds and incrementally maintains the combined vector + lexical index.
//! Grounded on `examples/original_source/src/temoa/storage.py` (vault-safety
//! invariant) and `synthesis.py`'s `_find_changed_files`/`_merge_embeddings`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::chunker::{chunk_document, ChunkingConfig};
use crate::encoder::Encoder;
use crate::errors::EngineError;
use crate::search::LexicalIndex;
use crate::storage::vector_store::{IndexMetadata, MetadataRow, VectorStore};
use crate::vault::{Document, VaultReader};

/// Read-only in-memory view handed to the search pipeline. Rows are index
/// aligned between `vectors` (row-major, `dim` wide), `rows`, and the
/// `LexicalIndex`'s own row id (`row_index.to_string()`).
pub struct IndexSnapshot {
    pub vectors: Vec<f32>,
    pub dim: usize,
    pub rows: Vec<MetadataRow>,
    pub lexical: Arc<LexicalIndex>,
}

impl IndexSnapshot {
    pub fn row_vector(&self, row_index: usize) -> &[f32] {
        let start = row_index * self.dim;
        &self.vectors[start..start + self.dim]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ChangeSet {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

pub struct IndexManager {
    vault_path: PathBuf,
    storage_dir: PathBuf,
    vector_store: VectorStore,
    lexical: Arc<LexicalIndex>,
    chunking: ChunkingConfig,
}

impl IndexManager {
    pub fn new(
        vault_path: impl Into<PathBuf>,
        storage_dir: impl Into<PathBuf>,
        chunking: ChunkingConfig,
    ) -> Result<Self, EngineError> {
        let storage_dir = storage_dir.into();
        let lexical_path = storage_dir.join("lexical");
        let lexical = LexicalIndex::new(lexical_path.to_str().unwrap_or(".")).map_err(|e| {
            EngineError::Index {
                detail: format!("failed to open lexical index: {e}"),
            }
        })?;
        Ok(Self {
            vault_path: vault_path.into(),
            vector_store: VectorStore::new(storage_dir.clone()),
            storage_dir,
            lexical: Arc::new(lexical),
            chunking,
        })
    }

    /// Enforces the vault-safety invariant: a stored index's `vault_path` must
    /// match the vault currently configured, unless `force` is set. Legacy
    /// indexes with no recorded `vault_path` are migrated in place rather
    /// than rejected.
    fn check_vault_safety(&self, stored: &IndexMetadata, force: bool) -> Result<(), EngineError> {
        if stored.is_legacy_missing_vault_path() {
            return Ok(());
        }
        if stored.vault_path != self.vault_path && !force {
            return Err(EngineError::StorageMismatch {
                expected_vault: self.vault_path.clone(),
                found_vault: stored.vault_path.clone(),
                storage_dir: self.storage_dir.clone(),
            });
        }
        Ok(())
    }

    /// Full rebuild: reads every file in the vault, chunks, embeds, and writes
    /// a fresh snapshot. Used when no index exists yet, or `force=true`.
    pub fn build_full(
        &self,
        encoder: &dyn Encoder,
        now_rfc3339: &str,
    ) -> Result<IndexSnapshot, EngineError> {
        let reader = VaultReader::new(&self.vault_path, Default::default());
        let documents = reader.walk();

        self.lexical.clear().map_err(|e| EngineError::Index {
            detail: format!("failed to clear lexical index: {e}"),
        })?;

        let mut rows: Vec<MetadataRow> = Vec::new();
        let mut flat_vectors: Vec<f32> = Vec::new();
        let mut file_tracking: HashMap<String, String> = HashMap::new();
        let dim = encoder.dimension();

        for doc in &documents {
            self.append_document_rows(doc, encoder, &mut rows, &mut flat_vectors)?;
            file_tracking.insert(doc.relative_path.clone(), doc.modified_time.to_rfc3339());
        }

        self.lexical.commit().map_err(|e| EngineError::Index {
            detail: format!("failed to commit lexical index: {e}"),
        })?;

        let index_metadata = IndexMetadata {
            vault_path: self.vault_path.clone(),
            encoder_name: encoder.name().to_string(),
            embedding_dim: dim,
            num_embeddings: rows.len(),
            created_at: now_rfc3339.to_string(),
            updated_at: now_rfc3339.to_string(),
            schema_version: 1,
            file_tracking,
        };

        self.vector_store
            .save(&flat_vectors, &rows, &index_metadata)?;

        Ok(IndexSnapshot {
            vectors: flat_vectors,
            dim,
            rows,
            lexical: Arc::clone(&self.lexical),
        })
    }

    /// Load the persisted snapshot as-is, with no vault walk and no safety
    /// check bypass. Returns `Ok(None)` if nothing has been indexed yet.
    pub fn load(&self, force: bool) -> Result<Option<IndexSnapshot>, EngineError> {
        let Some((vectors, rows, mut index_metadata)) = self.vector_store.load()? else {
            return Ok(None);
        };
        self.check_vault_safety(&index_metadata, force)?;
        if index_metadata.is_legacy_missing_vault_path() {
            index_metadata.vault_path = self.vault_path.clone();
        }
        Ok(Some(IndexSnapshot {
            dim: index_metadata.embedding_dim,
            vectors,
            rows,
            lexical: Arc::clone(&self.lexical),
        }))
    }

    /// Compare vault file mtimes against `file_tracking` in the stored index.
    /// Returns `None` when there is no prior tracking data (caller should
    /// fall back to a full rebuild).
    pub fn find_changed_files(&self, file_tracking: &HashMap<String, String>) -> Option<ChangeSet> {
        if file_tracking.is_empty() {
            return None;
        }
        let reader = VaultReader::new(&self.vault_path, Default::default());
        let documents = reader.walk();
        let mut seen = std::collections::HashSet::new();
        let mut changes = ChangeSet::default();

        for doc in &documents {
            seen.insert(doc.relative_path.clone());
            match file_tracking.get(&doc.relative_path) {
                None => changes.new.push(doc.relative_path.clone()),
                Some(tracked_mtime) => {
                    if tracked_mtime != &doc.modified_time.to_rfc3339() {
                        changes.modified.push(doc.relative_path.clone());
                    }
                }
            }
        }

        for tracked_path in file_tracking.keys() {
            if !seen.contains(tracked_path) {
                changes.deleted.push(tracked_path.clone());
            }
        }

        Some(changes)
    }

    /// Apply an incremental update. CRITICAL ordering, do not change it:
    /// delete rows in descending index order (keeps earlier indices stable
    /// while removing later ones), then update modified rows by position
    /// using an index map recomputed *after* the deletion pass, then append
    /// new rows at the end.
    pub fn merge_incremental(
        &self,
        mut snapshot: IndexSnapshot,
        changes: &ChangeSet,
        encoder: &dyn Encoder,
        now_rfc3339: &str,
    ) -> Result<IndexSnapshot, EngineError> {
        let reader = VaultReader::new(&self.vault_path, Default::default());

        let mut to_delete: Vec<String> = changes.deleted.clone();
        to_delete.extend(changes.modified.iter().cloned());

        let mut delete_indices: Vec<usize> = snapshot
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| to_delete.contains(&row.relative_path))
            .map(|(i, _)| i)
            .collect();
        delete_indices.sort_unstable_by(|a, b| b.cmp(a));

        for &row_index in &delete_indices {
            let id = row_index.to_string();
            self.lexical.delete_by_id(&id).map_err(|e| EngineError::Index {
                detail: format!("failed to delete lexical row {row_index}: {e}"),
            })?;
            snapshot.rows.remove(row_index);
            let start = row_index * snapshot.dim;
            snapshot.vectors.drain(start..start + snapshot.dim);
        }

        // Rows shifted down after deletion — every surviving row's lexical id
        // (row_index.to_string()) is now stale. Re-index the whole lexical
        // side against the compacted row list so ids line up again.
        self.lexical.clear().map_err(|e| EngineError::Index {
            detail: format!("failed to clear lexical index during merge: {e}"),
        })?;
        for (row_index, row) in snapshot.rows.iter().enumerate() {
            let description = row
                .frontmatter
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            self.lexical
                .index_row(
                    &row_index.to_string(),
                    &row.content,
                    &row.title,
                    &row.relative_path,
                    &row.tags,
                    description,
                    row_index,
                )
                .map_err(|e| EngineError::Index {
                    detail: format!("failed to re-index lexical row {row_index}: {e}"),
                })?;
        }

        let mut file_tracking: HashMap<String, String> = snapshot
            .rows
            .iter()
            .map(|r| (r.relative_path.clone(), r.modified_time.clone()))
            .collect();

        let mut append_paths: Vec<String> = changes.new.clone();
        append_paths.extend(changes.modified.iter().cloned());

        for path in &append_paths {
            let full_path = self.vault_path.join(path);
            let Ok(doc) = reader.read_file(&full_path) else {
                continue;
            };
            self.append_document_rows(&doc, encoder, &mut snapshot.rows, &mut snapshot.vectors)?;
            file_tracking.insert(doc.relative_path.clone(), doc.modified_time.to_rfc3339());
        }

        self.lexical.commit().map_err(|e| EngineError::Index {
            detail: format!("failed to commit lexical index: {e}"),
        })?;

        let index_metadata = IndexMetadata {
            vault_path: self.vault_path.clone(),
            encoder_name: encoder.name().to_string(),
            embedding_dim: snapshot.dim,
            num_embeddings: snapshot.rows.len(),
            created_at: now_rfc3339.to_string(),
            updated_at: now_rfc3339.to_string(),
            schema_version: 1,
            file_tracking,
        };
        self.vector_store
            .save(&snapshot.vectors, &snapshot.rows, &index_metadata)?;

        Ok(snapshot)
    }

    fn append_document_rows(
        &self,
        doc: &Document,
        encoder: &dyn Encoder,
        rows: &mut Vec<MetadataRow>,
        flat_vectors: &mut Vec<f32>,
    ) -> Result<(), EngineError> {
        let chunks = chunk_document(&doc.embedding_text(), &self.chunking);
        let chunks = if chunks.is_empty() {
            return Ok(());
        } else {
            chunks
        };

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = encoder.embed(&texts).map_err(|e| EngineError::Encoder {
            detail: e.to_string(),
        })?;

        let description = doc.description().unwrap_or("");
        let frontmatter_json: HashMap<String, serde_json::Value> = doc
            .frontmatter
            .iter()
            .filter_map(|(k, v)| serde_yaml_value_to_json(v).map(|jv| (k.clone(), jv)))
            .collect();

        for (chunk, vector) in chunks.iter().zip(vectors.into_iter()) {
            let row_index = rows.len();
            flat_vectors.extend(vector);
            rows.push(MetadataRow {
                relative_path: doc.relative_path.clone(),
                title: doc.title.clone(),
                tags: doc.tags.iter().cloned().collect(),
                chunk_index: chunk.chunk_index,
                total_chunks: chunks.len(),
                start_offset: chunk.start_offset,
                end_offset: chunk.end_offset,
                content: chunk.text.clone(),
                created_date: doc.created_date.to_string(),
                modified_time: doc.modified_time.to_rfc3339(),
                frontmatter: frontmatter_json.clone(),
            });
            self.lexical
                .index_row(
                    &row_index.to_string(),
                    &chunk.text,
                    &doc.title,
                    &doc.relative_path,
                    &rows.last().unwrap().tags,
                    description,
                    row_index,
                )
                .map_err(|e| EngineError::Index {
                    detail: format!("failed to index lexical row: {e}"),
                })?;
        }

        Ok(())
    }

    pub fn backup(&self, name: Option<&str>, timestamp: &str) -> Result<PathBuf, EngineError> {
        self.vector_store.backup(name, timestamp)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

fn serde_yaml_value_to_json(value: &serde_yaml::Value) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

/// Brute-force dot-product scan over all rows. Not an ANN index — exact,
/// parallelized with rayon over row ranges.
pub fn semantic_scan(snapshot: &IndexSnapshot, query_vector: &[f32], top_k: usize) -> Vec<(usize, f32)> {
    let dim = snapshot.dim;
    let mut scored: Vec<(usize, f32)> = (0..snapshot.len())
        .into_par_iter()
        .map(|row_index| {
            let row = &snapshot.vectors[row_index * dim..(row_index + 1) * dim];
            let score: f32 = row.iter().zip(query_vector.iter()).map(|(a, b)| a * b).sum();
            (row_index, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::test_support::HashingEncoder;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_note(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn full_build_indexes_every_file() {
        let vault = tempdir().unwrap();
        let storage = tempdir().unwrap();
        write_note(vault.path(), "a.md", "alpha content about rust");
        write_note(vault.path(), "b.md", "beta content about async");

        let manager = IndexManager::new(vault.path(), storage.path(), ChunkingConfig::default()).unwrap();
        let encoder = HashingEncoder::new(16);
        let snapshot = manager.build_full(&encoder, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn vault_safety_invariant_rejects_mismatched_vault_without_force() {
        let vault_a = tempdir().unwrap();
        let vault_b = tempdir().unwrap();
        let storage = tempdir().unwrap();
        write_note(vault_a.path(), "a.md", "hello");

        let manager_a = IndexManager::new(vault_a.path(), storage.path(), ChunkingConfig::default()).unwrap();
        let encoder = HashingEncoder::new(16);
        manager_a.build_full(&encoder, "2026-01-01T00:00:00Z").unwrap();

        let manager_b = IndexManager::new(vault_b.path(), storage.path(), ChunkingConfig::default()).unwrap();
        let result = manager_b.load(false);
        assert!(matches!(result, Err(EngineError::StorageMismatch { .. })));
    }

    #[test]
    fn legacy_index_missing_vault_path_is_migrated_not_rejected() {
        let vault = tempdir().unwrap();
        let storage = tempdir().unwrap();
        write_note(vault.path(), "a.md", "hello world");

        let manager = IndexManager::new(vault.path(), storage.path(), ChunkingConfig::default()).unwrap();
        let encoder = HashingEncoder::new(16);
        manager.build_full(&encoder, "2026-01-01T00:00:00Z").unwrap();

        // Simulate a legacy index: blank out vault_path directly on disk.
        let index_json_path = storage.path().join("index.json");
        let raw = std::fs::read_to_string(&index_json_path).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["vault_path"] = serde_json::Value::String(String::new());
        std::fs::write(&index_json_path, serde_json::to_string(&value).unwrap()).unwrap();

        let loaded = manager.load(false).unwrap();
        assert!(loaded.is_some());
    }

    #[test]
    fn semantic_scan_ranks_by_dot_product_descending() {
        let snapshot = IndexSnapshot {
            vectors: vec![1.0, 0.0, 0.0, 1.0],
            dim: 2,
            rows: vec![],
            lexical: Arc::new(LexicalIndex::new(tempdir().unwrap().path().to_str().unwrap()).unwrap()),
        };
        let results = semantic_scan(&snapshot, &[1.0, 0.0], 2);
        assert_eq!(results[0].0, 0);
    }
}
