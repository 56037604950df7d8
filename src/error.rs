//! Error types for ingestion and index mutation.
//!
//! Source-level failures ([`IngestionError`]) are recorded per source and
//! never abort a pack on their own. [`IndexError`] is what a mutation
//! returns to its caller.

use std::fmt;
use std::path::PathBuf;

use lore_index_core::models::SourceError;
use lore_index_core::snapshot::SnapshotError;
use serde::Serialize;
use thiserror::Error;

/// Why a single source could not be normalized to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionReason {
    UnreadableFile,
    DisallowedPath,
    Network,
    UnsupportedKind,
}

impl fmt::Display for IngestionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestionReason::UnreadableFile => "unreadable_file",
            IngestionReason::DisallowedPath => "disallowed_path",
            IngestionReason::Network => "network",
            IngestionReason::UnsupportedKind => "unsupported_kind",
        };
        f.write_str(s)
    }
}

/// A failure attributed to one source of a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("source '{source_id}' failed ({reason}): {detail}")]
pub struct IngestionError {
    pub source_id: String,
    pub reason: IngestionReason,
    pub detail: String,
}

impl IngestionError {
    pub fn new(source_id: &str, reason: IngestionReason, detail: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            reason,
            detail: detail.into(),
        }
    }
}

/// A snapshot that could not be restored and was discarded at startup.
#[derive(Debug, Error)]
pub enum IndexCorruptionError {
    #[error("cannot read index snapshot {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("discarding index snapshot at {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },
}

/// Failure of an index mutation.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid pack: {0}")]
    InvalidPack(#[from] SourceError),

    /// Every source of a non-empty pack failed; the index is unchanged.
    #[error("no source in pack '{pack_id}' could be ingested ({} failures)", .failures.len())]
    NothingIngested {
        pack_id: String,
        failures: Vec<IngestionError>,
    },

    /// The new state is live in memory but the snapshot write failed.
    #[error("failed to persist index snapshot to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index worker task failed: {0}")]
    Rebuild(String),
}
