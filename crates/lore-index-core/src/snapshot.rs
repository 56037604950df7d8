//! Persisted snapshot format.
//!
//! A snapshot is the only unit of persistence. It carries the chunk corpus,
//! the vocabulary, and the idf table together, so a restored index scores
//! exactly like the one that was saved.
//!
//! ```text
//! { "version": 1,
//!   "packs":  [ {"id","name","game_profile_id","enabled","chunk_count",...} ],
//!   "chunks": [ {"id","text","source_id","pack_id","game_profile_id","vector"} ],
//!   "vocabulary": { term: index },
//!   "idf": { term: weight } }
//! ```
//!
//! `packs` and per-chunk `vector` are optional on read. A missing vector is
//! recomputed from the restored vocabulary and idf, never by refitting.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::{SparseVector, TfIdfEmbedder};
use crate::index::{IndexState, IndexedChunk};
use crate::models::{Chunk, PackRecord};

/// The snapshot version written by this build. No other version is read.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u64, expected: u32 },
    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkRecord {
    #[serde(flatten)]
    chunk: Chunk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vector: Option<SparseVector>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    packs: Vec<PackRecord>,
    chunks: Vec<ChunkRecord>,
    vocabulary: BTreeMap<String, u32>,
    idf: BTreeMap<String, f32>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u64,
}

/// Serialize `state` as a versioned JSON snapshot.
pub fn encode(state: &IndexState) -> Result<Vec<u8>, SnapshotError> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        packs: state.packs().to_vec(),
        chunks: state
            .chunks()
            .iter()
            .map(|c| ChunkRecord {
                chunk: c.chunk.clone(),
                vector: Some(c.vector.clone()),
            })
            .collect(),
        vocabulary: state.embedder().vocabulary().clone(),
        idf: state.embedder().idf().clone(),
    };
    Ok(serde_json::to_vec(&snapshot)?)
}

/// Restore an [`IndexState`] from snapshot bytes.
///
/// The version is checked before the body is parsed, so a future format
/// with a different shape is reported as [`SnapshotError::UnsupportedVersion`].
pub fn decode(bytes: &[u8]) -> Result<IndexState, SnapshotError> {
    let probe: VersionProbe = serde_json::from_slice(bytes)?;
    if probe.version != SNAPSHOT_VERSION as u64 {
        return Err(SnapshotError::UnsupportedVersion {
            found: probe.version,
            expected: SNAPSHOT_VERSION,
        });
    }

    let snapshot: Snapshot = serde_json::from_slice(bytes)?;
    check_embedder(&snapshot.vocabulary, &snapshot.idf)?;
    let embedder = TfIdfEmbedder::from_parts(snapshot.vocabulary, snapshot.idf);

    let dims = embedder.dims();
    let mut chunks = Vec::with_capacity(snapshot.chunks.len());
    for record in snapshot.chunks {
        let vector = match record.vector {
            Some(vector) => {
                vector.check(dims).map_err(|reason| {
                    SnapshotError::Inconsistent(format!("chunk {}: {}", record.chunk.id, reason))
                })?;
                vector
            }
            None => embedder.vectorize(&record.chunk.text),
        };
        chunks.push(IndexedChunk {
            chunk: record.chunk,
            vector,
        });
    }

    let packs = reconcile_packs(snapshot.packs, &chunks);
    Ok(IndexState::from_parts(packs, chunks, embedder))
}

/// Vocabulary indices must be dense and unique, and every term needs an idf.
fn check_embedder(
    vocabulary: &BTreeMap<String, u32>,
    idf: &BTreeMap<String, f32>,
) -> Result<(), SnapshotError> {
    if vocabulary.len() != idf.len() || vocabulary.keys().any(|t| !idf.contains_key(t)) {
        return Err(SnapshotError::Inconsistent(
            "vocabulary and idf cover different terms".to_string(),
        ));
    }
    let indices: BTreeSet<u32> = vocabulary.values().copied().collect();
    let dense = indices.len() == vocabulary.len()
        && indices.iter().enumerate().all(|(i, &v)| i as u64 == v as u64);
    if !dense {
        return Err(SnapshotError::Inconsistent(
            "vocabulary indices are not a dense 0..n range".to_string(),
        ));
    }
    if idf.values().any(|w| !w.is_finite()) {
        return Err(SnapshotError::Inconsistent(
            "idf table contains a non-finite weight".to_string(),
        ));
    }
    Ok(())
}

/// Keep recorded packs and synthesize records for packs that only appear
/// in the chunk list (snapshots written without a pack registry).
fn reconcile_packs(mut packs: Vec<PackRecord>, chunks: &[IndexedChunk]) -> Vec<PackRecord> {
    let mut counts: BTreeMap<&str, (usize, &str)> = BTreeMap::new();
    let mut order: Vec<&str> = Vec::new();
    for c in chunks {
        let entry = counts
            .entry(c.chunk.pack_id.as_str())
            .or_insert_with(|| {
                order.push(c.chunk.pack_id.as_str());
                (0, c.chunk.game_profile_id.as_str())
            });
        entry.0 += 1;
    }

    for pack in &mut packs {
        pack.chunk_count = counts.get(pack.id.as_str()).map(|e| e.0).unwrap_or(0);
    }
    for pack_id in order {
        if packs.iter().any(|p| p.id == pack_id) {
            continue;
        }
        let (chunk_count, profile) = counts[pack_id];
        packs.push(PackRecord {
            id: pack_id.to_string(),
            name: pack_id.to_string(),
            game_profile_id: profile.to_string(),
            enabled: true,
            chunk_count,
            failed_sources: Vec::new(),
            indexed_at: DateTime::<Utc>::default(),
        });
    }
    packs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::make_chunks;
    use crate::index::QueryOptions;

    fn sample_state() -> IndexState {
        let record = PackRecord {
            id: "builds".to_string(),
            name: "Builds".to_string(),
            game_profile_id: "elden_ring".to_string(),
            enabled: true,
            chunk_count: 0,
            failed_sources: vec!["broken".to_string()],
            indexed_at: Utc::now(),
        };
        let chunks = make_chunks(
            "builds",
            "elden_ring",
            "s1",
            vec![
                "Focus on Intelligence for sorcery".to_string(),
                "Strength builds use colossal weapons".to_string(),
            ],
        );
        IndexState::empty().with_pack(record, chunks)
    }

    #[test]
    fn test_encode_decode_preserves_state() {
        let state = sample_state();
        let restored = decode(&encode(&state).unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_decoded_state_scores_identically() {
        let state = sample_state();
        let restored = decode(&encode(&state).unwrap()).unwrap();
        let q = "intelligence sorcery build";
        assert_eq!(
            state.query("elden_ring", q, &QueryOptions::default()),
            restored.query("elden_ring", q, &QueryOptions::default())
        );
    }

    #[test]
    fn test_missing_vectors_recomputed_from_restored_vocabulary() {
        let state = sample_state();
        let mut json: serde_json::Value = serde_json::from_slice(&encode(&state).unwrap()).unwrap();
        for chunk in json["chunks"].as_array_mut().unwrap() {
            chunk.as_object_mut().unwrap().remove("vector");
        }
        let restored = decode(&serde_json::to_vec(&json).unwrap()).unwrap();
        assert_eq!(restored.chunks(), state.chunks());
    }

    #[test]
    fn test_minimal_schema_without_packs() {
        let json = r#"{
            "version": 1,
            "chunks": [{"id":"c1","text":"frost magic","source_id":"s","pack_id":"p","game_profile_id":"g"}],
            "vocabulary": {"frost": 0, "magic": 1},
            "idf": {"frost": 1.0, "magic": 1.0}
        }"#;
        let state = decode(json.as_bytes()).unwrap();
        assert_eq!(state.packs().len(), 1);
        assert_eq!(state.packs()[0].chunk_count, 1);
        assert_eq!(state.query("g", "magic", &QueryOptions::default()).len(), 1);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let json = br#"{"version": 99, "whatever": true}"#;
        assert!(matches!(
            decode(json),
            Err(SnapshotError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(decode(b"{not json"), Err(SnapshotError::Parse(_))));
        assert!(matches!(decode(b""), Err(SnapshotError::Parse(_))));
    }

    #[test]
    fn test_vector_outside_vocabulary_rejected() {
        let json = r#"{
            "version": 1,
            "chunks": [{"id":"c1","text":"frost","source_id":"s","pack_id":"p","game_profile_id":"g","vector":[[7,1.0]]}],
            "vocabulary": {"frost": 0},
            "idf": {"frost": 1.0}
        }"#;
        assert!(matches!(
            decode(json.as_bytes()),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_unsorted_vector_hiding_bad_index_rejected() {
        let json = r#"{
            "version": 1,
            "chunks": [{"id":"c1","text":"frost magic","source_id":"s","pack_id":"p","game_profile_id":"g","vector":[[9,5.0],[1,1.0],[0,1.0]]}],
            "vocabulary": {"frost": 0, "magic": 1},
            "idf": {"frost": 1.0, "magic": 1.0}
        }"#;
        assert!(matches!(
            decode(json.as_bytes()),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_unsorted_in_range_vector_rejected() {
        let json = r#"{
            "version": 1,
            "chunks": [{"id":"c1","text":"frost magic","source_id":"s","pack_id":"p","game_profile_id":"g","vector":[[1,1.0],[0,1.0]]}],
            "vocabulary": {"frost": 0, "magic": 1},
            "idf": {"frost": 1.0, "magic": 1.0}
        }"#;
        assert!(matches!(
            decode(json.as_bytes()),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_vocabulary_idf_mismatch_rejected() {
        let json = r#"{"version":1,"chunks":[],"vocabulary":{"a":0,"b":1},"idf":{"a":1.0}}"#;
        assert!(matches!(
            decode(json.as_bytes()),
            Err(SnapshotError::Inconsistent(_))
        ));
    }
}
