//! The knowledge index handle shared by every consumer.
//!
//! [`KnowledgeIndex`] owns the active [`IndexState`] behind an
//! [`ArcSwap`], an [`Ingestor`], and the snapshot location. It is built once
//! at startup and passed by reference (or `Arc`) to whoever needs it.
//!
//! # Concurrency
//!
//! - Queries load the active state without locking and never block on a
//!   mutation.
//! - Mutations are serialized by a single writer lock. Each builds the next
//!   state on a blocking worker, then swaps it in and hands the snapshot
//!   write, together with the lock, to another blocking worker.
//! - Dropping an `add_pack`/`remove_pack` future before the swap leaves the
//!   index exactly as it was. Once swapped, the write runs to completion and
//!   the next mutation waits for it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use lore_index_core::chunk::{chunk_text, make_chunks};
use lore_index_core::index::{IndexState, IndexStats, QueryOptions};
use lore_index_core::models::{Pack, PackRecord, RetrievedChunk};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::config::{ChunkingConfig, Config};
use crate::error::{IndexError, IngestionError};
use crate::ingest::Ingestor;
use crate::persist;

/// Outcome of a successful [`KnowledgeIndex::add_pack`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub pack_id: String,
    pub sources_indexed: usize,
    pub chunks_indexed: usize,
    /// Sources that failed; the rest of the pack was indexed regardless.
    pub failures: Vec<IngestionError>,
}

pub struct KnowledgeIndex {
    active: ArcSwap<IndexState>,
    writer: Arc<Mutex<()>>,
    ingestor: Ingestor,
    snapshot_path: PathBuf,
    chunking: ChunkingConfig,
}

impl KnowledgeIndex {
    /// Open the index described by `config` with the default HTTP transport.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let ingestor = Ingestor::from_config(&config.ingest)?;
        Ok(Self::with_ingestor(config, ingestor))
    }

    /// Open the index with a caller-supplied ingestor.
    ///
    /// The snapshot at `index.snapshot_path` is loaded once; problems with it
    /// are logged and the index starts empty.
    pub fn with_ingestor(config: &Config, ingestor: Ingestor) -> Self {
        let state = persist::load_state(&config.index.snapshot_path);
        Self {
            active: ArcSwap::from_pointee(state),
            writer: Arc::new(Mutex::new(())),
            ingestor,
            snapshot_path: config.index.snapshot_path.clone(),
            chunking: config.chunking.clone(),
        }
    }

    /// Ingest, chunk, and index every source of `pack`, then persist.
    ///
    /// Individual source failures are reported in the returned
    /// [`IngestReport`]. If the pack has sources and *all* of them fail,
    /// nothing is committed and [`IndexError::NothingIngested`] is returned.
    /// Re-adding an indexed pack id replaces its chunks.
    pub async fn add_pack(&self, pack: &Pack) -> Result<IngestReport, IndexError> {
        pack.validate()?;

        let mut chunks = Vec::new();
        let mut failures: Vec<IngestionError> = Vec::new();
        let mut sources_indexed = 0;
        for source in &pack.sources {
            match self.ingestor.ingest(source).await {
                Ok(text) => {
                    let texts = chunk_text(&text, self.chunking.chunk_size, self.chunking.overlap);
                    chunks.extend(make_chunks(
                        &pack.id,
                        &pack.game_profile_id,
                        &source.id,
                        texts,
                    ));
                    sources_indexed += 1;
                }
                Err(e) => {
                    warn!(
                        pack_id = %pack.id,
                        source_id = %e.source_id,
                        reason = %e.reason,
                        detail = %e.detail,
                        "source ingestion failed"
                    );
                    failures.push(e);
                }
            }
        }

        if !pack.sources.is_empty() && sources_indexed == 0 {
            return Err(IndexError::NothingIngested {
                pack_id: pack.id.clone(),
                failures,
            });
        }

        let chunks_indexed = chunks.len();
        let record = PackRecord {
            id: pack.id.clone(),
            name: pack.name.clone(),
            game_profile_id: pack.game_profile_id.clone(),
            enabled: pack.enabled,
            chunk_count: chunks_indexed,
            failed_sources: failures.iter().map(|f| f.source_id.clone()).collect(),
            indexed_at: Utc::now(),
        };

        let guard = self.lock().await;
        let current = self.active.load_full();
        let next = tokio::task::spawn_blocking(move || current.with_pack(record, chunks))
            .await
            .map_err(|e| IndexError::Rebuild(e.to_string()))?;
        let vocabulary = next.embedder().dims();
        self.commit(next, guard).await?;

        info!(
            pack_id = %pack.id,
            profile = %pack.game_profile_id,
            chunks = chunks_indexed,
            failed = failures.len(),
            vocabulary,
            "pack indexed"
        );
        Ok(IngestReport {
            pack_id: pack.id.clone(),
            sources_indexed,
            chunks_indexed,
            failures,
        })
    }

    /// Remove every chunk of `pack_id`, refit, and persist.
    ///
    /// Returns `Ok(false)` if the pack was not indexed.
    pub async fn remove_pack(&self, pack_id: &str) -> Result<bool, IndexError> {
        let guard = self.lock().await;
        let current = self.active.load_full();
        if current.pack(pack_id).is_none() {
            return Ok(false);
        }

        let id = pack_id.to_string();
        let next = tokio::task::spawn_blocking(move || current.without_pack(&id))
            .await
            .map_err(|e| IndexError::Rebuild(e.to_string()))?;
        let Some(next) = next else {
            return Ok(false);
        };
        self.commit(next, guard).await?;
        info!(pack_id, "pack removed");
        Ok(true)
    }

    /// Show or hide a pack's chunks in query results without refitting.
    ///
    /// Returns `Ok(false)` if the pack was not indexed.
    pub async fn set_pack_enabled(&self, pack_id: &str, enabled: bool) -> Result<bool, IndexError> {
        let guard = self.lock().await;
        let Some(next) = self.active.load().with_pack_enabled(pack_id, enabled) else {
            return Ok(false);
        };
        self.commit(next, guard).await?;
        info!(pack_id, enabled, "pack visibility changed");
        Ok(true)
    }

    /// Top-`top_k` chunks of `game_profile_id` for `question`.
    pub fn query(&self, game_profile_id: &str, question: &str, top_k: usize) -> Vec<RetrievedChunk> {
        self.query_with(game_profile_id, question, &QueryOptions::top_k(top_k))
    }

    pub fn query_with(
        &self,
        game_profile_id: &str,
        question: &str,
        options: &QueryOptions,
    ) -> Vec<RetrievedChunk> {
        self.active.load().query(game_profile_id, question, options)
    }

    /// The currently published state.
    pub fn state(&self) -> Arc<IndexState> {
        self.active.load_full()
    }

    pub fn packs(&self) -> Vec<PackRecord> {
        self.active.load().packs().to_vec()
    }

    pub fn stats(&self) -> IndexStats {
        self.active.load().stats()
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Write the current state to the snapshot path.
    ///
    /// Retries persistence after a failed [`IndexError::Persist`]; the
    /// in-memory state is authoritative until this succeeds.
    pub async fn save(&self) -> Result<(), IndexError> {
        let guard = self.lock().await;
        self.write_snapshot(self.active.load_full(), guard).await
    }

    async fn lock(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.writer).lock_owned().await
    }

    /// Publish `next`, then persist it. A failed write leaves `next` live.
    async fn commit(&self, next: IndexState, guard: OwnedMutexGuard<()>) -> Result<(), IndexError> {
        let next = Arc::new(next);
        self.active.store(Arc::clone(&next));
        self.write_snapshot(next, guard).await
    }

    /// Encode and write `state` on a blocking worker that owns the writer
    /// lock until the file is in place.
    async fn write_snapshot(
        &self,
        state: Arc<IndexState>,
        guard: OwnedMutexGuard<()>,
    ) -> Result<(), IndexError> {
        let path = self.snapshot_path.clone();
        let written = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            persist::save_state(&path, &state)
        })
        .await
        .map_err(|e| IndexError::Rebuild(e.to_string()))?;

        written.map_err(|source| {
            warn!(path = %self.snapshot_path.display(), error = %source, "snapshot write failed");
            IndexError::Persist {
                path: self.snapshot_path.clone(),
                source,
            }
        })
    }
}
