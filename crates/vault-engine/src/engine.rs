//! Top-level orchestrator wiring `IndexManager`, `SearchPipeline`, and
//! `Archaeologist` together behind the four public query operations. Loading
//! style and reader/writer split grounded on `rag_engine.rs`'s
//! `RAGEngine::new` constructor.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::archaeology::{Archaeologist, InterestTimeline};
use crate::config::EngineConfig;
use crate::encoder::Encoder;
use crate::errors::{EngineError, EngineResult};
use crate::index_manager::{IndexManager, IndexSnapshot};
use crate::pipeline::{Candidate, DedupMode, SearchPipeline, SearchRequest};
use crate::profiles::ProfileRegistry;
use crate::reranking::Reranker;

pub struct SearchQuery<'a> {
    pub text: &'a str,
    pub limit: usize,
    pub profile: Option<&'a str>,
    pub dedup_mode: DedupMode,
}

pub struct SearchOutcome {
    pub candidates: Vec<Candidate>,
    pub timed_out: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub num_rows: usize,
    pub num_files: usize,
    pub embedding_dim: usize,
}

/// Readers take a snapshot `Arc` without locking; a single writer (`reindex`)
/// holds `write_gate` for the duration of the rebuild, then atomically swaps
/// in the new snapshot.
pub struct VaultEngine {
    config: EngineConfig,
    index_manager: IndexManager,
    encoder: Arc<dyn Encoder>,
    reranker: Option<Arc<dyn Reranker>>,
    profiles: ProfileRegistry,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    write_gate: Mutex<()>,
}

impl VaultEngine {
    pub async fn new(
        config: EngineConfig,
        encoder: Arc<dyn Encoder>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> EngineResult<Self> {
        config.validate().map_err(|detail| EngineError::Config { detail })?;
        std::fs::create_dir_all(&config.storage_dir).map_err(|e| EngineError::VaultRead {
            path: config.storage_dir.clone(),
            source: e,
        })?;

        let index_manager =
            IndexManager::new(&config.vault_path, &config.storage_dir, config.chunking)?;

        let snapshot = match index_manager.load(false)? {
            Some(s) => s,
            None => {
                tracing::info!(vault = %config.vault_path.display(), "no existing index found, building from scratch");
                index_manager.build_full(encoder.as_ref(), &Utc::now().to_rfc3339())?
            }
        };

        Ok(Self {
            config,
            index_manager,
            encoder,
            reranker,
            profiles: ProfileRegistry::default(),
            snapshot: RwLock::new(Arc::new(snapshot)),
            write_gate: Mutex::new(()),
        })
    }

    fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub async fn search(&self, query: SearchQuery<'_>) -> EngineResult<SearchOutcome> {
        let profile_name = query.profile.unwrap_or(&self.config.default_profile);
        let profile = self
            .profiles
            .get(profile_name)
            .ok_or_else(|| EngineError::Config {
                detail: format!("unknown search profile '{profile_name}'"),
            })?;

        let snapshot = self.snapshot();
        let reranker_ref = self.reranker.as_deref();
        let pipeline = SearchPipeline {
            snapshot: snapshot.as_ref(),
            encoder: self.encoder.as_ref(),
            reranker: reranker_ref,
            today: Utc::now().date_naive(),
        };

        let deadline = Instant::now() + std::time::Duration::from_millis(self.config.query_timeout_ms);
        let request = SearchRequest {
            query: query.text,
            limit: query.limit,
            profile,
            dedup_mode: query.dedup_mode,
            max_chunks_per_file: self.config.max_chunks_per_file,
            deadline: Some(deadline),
        };

        let result = pipeline.search(&request).await?;
        Ok(SearchOutcome {
            candidates: result.candidates,
            timed_out: result.timed_out,
        })
    }

    pub fn archaeology(
        &self,
        query: &str,
        exclude_daily: bool,
        similarity_threshold: f32,
    ) -> EngineResult<InterestTimeline> {
        let snapshot = self.snapshot();
        let archaeologist = Archaeologist {
            snapshot: snapshot.as_ref(),
            encoder: self.encoder.as_ref(),
        };
        archaeologist.trace_interest(query, exclude_daily, similarity_threshold)
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.snapshot();
        let num_files = snapshot
            .rows
            .iter()
            .map(|r| r.relative_path.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        EngineStats {
            num_rows: snapshot.len(),
            num_files,
            embedding_dim: snapshot.dim,
        }
    }

    /// Rebuilds (or incrementally updates) the index. Only one reindex runs
    /// at a time; readers never block on it — they keep using the prior
    /// snapshot until the new one is ready, then the swap is atomic.
    pub async fn reindex(&self, force: bool) -> EngineResult<EngineStats> {
        let _gate = self.write_gate.lock().await;
        let now = Utc::now().to_rfc3339();

        let new_snapshot = if force {
            self.index_manager.build_full(self.encoder.as_ref(), &now)?
        } else {
            match self.index_manager.load(force)? {
                None => self.index_manager.build_full(self.encoder.as_ref(), &now)?,
                Some(current) => {
                    let file_tracking = current
                        .rows
                        .iter()
                        .map(|r| (r.relative_path.clone(), r.modified_time.clone()))
                        .collect();
                    match self.index_manager.find_changed_files(&file_tracking) {
                        None => self.index_manager.build_full(self.encoder.as_ref(), &now)?,
                        Some(changes) if changes.is_empty() => current,
                        Some(changes) => self.index_manager.merge_incremental(
                            current,
                            &changes,
                            self.encoder.as_ref(),
                            &now,
                        )?,
                    }
                }
            }
        };

        let stats = EngineStats {
            num_rows: new_snapshot.len(),
            num_files: new_snapshot
                .rows
                .iter()
                .map(|r| r.relative_path.as_str())
                .collect::<std::collections::HashSet<_>>()
                .len(),
            embedding_dim: new_snapshot.dim,
        };

        *self.snapshot.write() = Arc::new(new_snapshot);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::test_support::HashingEncoder;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_note(dir: &std::path::Path, name: &str, content: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    async fn build_engine(vault: &std::path::Path, storage: &std::path::Path) -> VaultEngine {
        let config = EngineConfig {
            vault_path: vault.to_path_buf(),
            storage_dir: storage.to_path_buf(),
            default_profile: "default".to_string(),
            chunking: crate::chunker::ChunkingConfig::default(),
            max_chunks_per_file: 3,
            query_timeout_ms: 5000,
        };
        let encoder: Arc<dyn Encoder> = Arc::new(HashingEncoder::new(16));
        VaultEngine::new(config, encoder, None).await.unwrap()
    }

    #[tokio::test]
    async fn search_returns_results_from_indexed_vault() {
        let vault = tempdir().unwrap();
        let storage = tempdir().unwrap();
        write_note(vault.path(), "rust.md", "notes about rust async runtimes and tokio");
        write_note(vault.path(), "cooking.md", "notes about baking sourdough bread");

        let engine = build_engine(vault.path(), storage.path()).await;
        let outcome = engine
            .search(SearchQuery {
                text: "rust tokio",
                limit: 5,
                profile: None,
                dedup_mode: DedupMode::Best,
            })
            .await
            .unwrap();
        assert!(!outcome.candidates.is_empty());
    }

    #[tokio::test]
    async fn reindex_picks_up_newly_added_files() {
        let vault = tempdir().unwrap();
        let storage = tempdir().unwrap();
        write_note(vault.path(), "a.md", "first note");

        let engine = build_engine(vault.path(), storage.path()).await;
        assert_eq!(engine.stats().num_files, 1);

        write_note(vault.path(), "b.md", "second note");
        engine.reindex(false).await.unwrap();
        assert_eq!(engine.stats().num_files, 2);
    }

    #[tokio::test]
    async fn unknown_profile_is_a_config_error() {
        let vault = tempdir().unwrap();
        let storage = tempdir().unwrap();
        write_note(vault.path(), "a.md", "first note");
        let engine = build_engine(vault.path(), storage.path()).await;

        let result = engine
            .search(SearchQuery {
                text: "first",
                limit: 5,
                profile: Some("not-a-real-profile"),
                dedup_mode: DedupMode::Best,
            })
            .await;
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }
}
