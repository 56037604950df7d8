//! Immutable index state: the chunk corpus, its fitted embedder, and the
//! pack registry.
//!
//! Every mutation produces a *new* [`IndexState`] instead of editing the
//! current one. Callers can therefore build the next state off to the side
//! and publish it in one step; a reader holding the old state always sees a
//! corpus, vocabulary, and set of vectors that belong together.
//!
//! # Partitioning
//!
//! One vocabulary is fitted over the chunks of *all* game profiles. Ranking
//! is scoped: [`IndexState::query`] only scores chunks whose
//! `game_profile_id` matches the request.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::embedding::{cosine_similarity, SparseVector, TfIdfEmbedder};
use crate::models::{Chunk, PackRecord, RetrievedChunk};

/// A chunk together with its vector under the owning state's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: SparseVector,
}

/// Ranking parameters for a single query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    /// Maximum number of results.
    pub top_k: usize,
    /// Results scoring strictly below this are dropped.
    pub min_score: f32,
}

impl QueryOptions {
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            min_score: 0.0,
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::top_k(5)
    }
}

/// Corpus-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub packs: usize,
    pub chunks: usize,
    pub vocabulary: usize,
    /// Chunk count per game profile.
    pub profiles: BTreeMap<String, usize>,
}

/// A fully consistent snapshot of the knowledge index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexState {
    packs: Vec<PackRecord>,
    chunks: Vec<IndexedChunk>,
    embedder: TfIdfEmbedder,
}

impl IndexState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Refit the embedder over `chunks` (in order) and vectorize every chunk.
    ///
    /// An empty corpus yields an empty vocabulary and idf table.
    pub fn build(packs: Vec<PackRecord>, chunks: Vec<Chunk>) -> Self {
        let embedder = TfIdfEmbedder::fit(chunks.iter().map(|c| c.text.as_str()));
        let chunks = chunks
            .into_iter()
            .map(|chunk| {
                let vector = embedder.vectorize(&chunk.text);
                IndexedChunk { chunk, vector }
            })
            .collect();
        Self {
            packs,
            chunks,
            embedder,
        }
    }

    /// Assemble a state from restored parts without refitting.
    ///
    /// The caller is responsible for the vectors having been produced by
    /// `embedder`; see [`crate::snapshot`] for the checks applied on load.
    pub fn from_parts(
        packs: Vec<PackRecord>,
        chunks: Vec<IndexedChunk>,
        embedder: TfIdfEmbedder,
    ) -> Self {
        Self {
            packs,
            chunks,
            embedder,
        }
    }

    /// Return a new state with `new_chunks` added under `record`.
    ///
    /// If a pack with the same id is already indexed its chunks are replaced.
    /// The whole corpus is refitted.
    pub fn with_pack(&self, mut record: PackRecord, new_chunks: Vec<Chunk>) -> Self {
        record.chunk_count = new_chunks.len();

        let mut packs: Vec<PackRecord> = self
            .packs
            .iter()
            .filter(|p| p.id != record.id)
            .cloned()
            .collect();
        let mut chunks: Vec<Chunk> = self
            .chunks
            .iter()
            .filter(|c| c.chunk.pack_id != record.id)
            .map(|c| c.chunk.clone())
            .collect();

        packs.push(record);
        chunks.extend(new_chunks);
        Self::build(packs, chunks)
    }

    /// Return a new state without `pack_id`, or `None` if it is not indexed.
    pub fn without_pack(&self, pack_id: &str) -> Option<Self> {
        if !self.packs.iter().any(|p| p.id == pack_id) {
            return None;
        }
        let packs = self
            .packs
            .iter()
            .filter(|p| p.id != pack_id)
            .cloned()
            .collect();
        let chunks = self
            .chunks
            .iter()
            .filter(|c| c.chunk.pack_id != pack_id)
            .map(|c| c.chunk.clone())
            .collect();
        Some(Self::build(packs, chunks))
    }

    /// Return a new state with the pack's `enabled` flag set.
    ///
    /// Vocabulary and vectors are carried over untouched; disabling only
    /// hides the pack's chunks from ranking.
    pub fn with_pack_enabled(&self, pack_id: &str, enabled: bool) -> Option<Self> {
        let position = self.packs.iter().position(|p| p.id == pack_id)?;
        let mut next = self.clone();
        next.packs[position].enabled = enabled;
        Some(next)
    }

    /// Rank this profile's chunks against `question`.
    ///
    /// The question is vectorized under the current vocabulary without
    /// refitting. Results are ordered by descending score; ties keep corpus
    /// insertion order. Unknown profiles and empty corpora yield no results.
    pub fn query(
        &self,
        game_profile_id: &str,
        question: &str,
        options: &QueryOptions,
    ) -> Vec<RetrievedChunk> {
        if options.top_k == 0 {
            return Vec::new();
        }

        let hidden: HashSet<&str> = self
            .packs
            .iter()
            .filter(|p| !p.enabled)
            .map(|p| p.id.as_str())
            .collect();
        let query_vec = self.embedder.vectorize(question);

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .filter(|c| c.chunk.game_profile_id == game_profile_id)
            .filter(|c| !hidden.contains(c.chunk.pack_id.as_str()))
            .map(|c| (cosine_similarity(&query_vec, &c.vector), c))
            .filter(|(score, _)| *score >= options.min_score)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(options.top_k)
            .map(|(score, c)| RetrievedChunk {
                text: c.chunk.text.clone(),
                score,
                source_id: c.chunk.source_id.clone(),
                pack_id: c.chunk.pack_id.clone(),
            })
            .collect()
    }

    pub fn packs(&self) -> &[PackRecord] {
        &self.packs
    }

    pub fn pack(&self, pack_id: &str) -> Option<&PackRecord> {
        self.packs.iter().find(|p| p.id == pack_id)
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    pub fn embedder(&self) -> &TfIdfEmbedder {
        &self.embedder
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        let mut profiles: BTreeMap<String, usize> = BTreeMap::new();
        for c in &self.chunks {
            *profiles.entry(c.chunk.game_profile_id.clone()).or_insert(0) += 1;
        }
        IndexStats {
            packs: self.packs.len(),
            chunks: self.chunks.len(),
            vocabulary: self.embedder.dims(),
            profiles,
        }
    }
}
