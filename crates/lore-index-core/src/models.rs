//! Core data models for the knowledge retrieval engine.
//!
//! A [`Pack`] is a named collection of [`Source`]s attached to one game
//! profile. Sources are normalized to text, split into [`Chunk`]s, and
//! answered from as [`RetrievedChunk`]s.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a source's text comes from.
///
/// Each variant carries exactly the field its kind requires, so a `file`
/// source without a path cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    /// A file under the configured ingestion root.
    File { path: PathBuf },
    /// A page fetched over HTTP(S).
    Url { url: String },
    /// Inline text supplied by the user.
    Note { content: String },
}

impl SourceKind {
    /// Returns the wire name of the kind (`"file"`, `"url"`, or `"note"`).
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::File { .. } => "file",
            SourceKind::Url { .. } => "url",
            SourceKind::Note { .. } => "note",
        }
    }
}

/// One unit of raw knowledge input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub kind: SourceKind,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Source {
    pub fn note(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: SourceKind::Note {
                content: content.into(),
            },
            tags: Vec::new(),
        }
    }

    pub fn file(id: impl Into<String>, title: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: SourceKind::File { path: path.into() },
            tags: Vec::new(),
        }
    }

    pub fn url(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: SourceKind::Url { url: url.into() },
            tags: Vec::new(),
        }
    }

    /// Check the per-kind required fields.
    ///
    /// Deserialized sources can still carry empty strings, so this is run
    /// before a source is ingested.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.id.trim().is_empty() {
            return Err(SourceError::EmptySourceId);
        }
        let missing = match &self.kind {
            SourceKind::File { path } if path.as_os_str().is_empty() => Some("path"),
            SourceKind::Url { url } if url.trim().is_empty() => Some("url"),
            _ => None,
        };
        match missing {
            Some(field) => Err(SourceError::MissingField {
                source_id: self.id.clone(),
                kind: self.kind.name(),
                field,
            }),
            None => Ok(()),
        }
    }
}

/// A named, enable/disable-able collection of sources for one game profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub game_profile_id: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Pack {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        game_profile_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            game_profile_id: game_profile_id.into(),
            sources: Vec::new(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    /// Validate the pack and every source it owns.
    ///
    /// Source ids must be unique within the pack because chunks are
    /// attributed back to their source by id.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.id.trim().is_empty() {
            return Err(SourceError::EmptyPackId);
        }
        if self.game_profile_id.trim().is_empty() {
            return Err(SourceError::EmptyProfile {
                pack_id: self.id.clone(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.id.as_str()) {
                return Err(SourceError::DuplicateSource {
                    pack_id: self.id.clone(),
                    source_id: source.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Construction-time validation failures for packs and sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("pack id must not be empty")]
    EmptyPackId,
    #[error("source id must not be empty")]
    EmptySourceId,
    #[error("pack '{pack_id}' has no game profile")]
    EmptyProfile { pack_id: String },
    #[error("{kind} source '{source_id}' requires a non-empty `{field}`")]
    MissingField {
        source_id: String,
        kind: &'static str,
        field: &'static str,
    },
    #[error("pack '{pack_id}' contains source '{source_id}' more than once")]
    DuplicateSource { pack_id: String, source_id: String },
}

/// A word-aligned window of a source's text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_id: String,
    pub pack_id: String,
    pub game_profile_id: String,
}

/// Index-side record of an ingested pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackRecord {
    pub id: String,
    pub name: String,
    pub game_profile_id: String,
    pub enabled: bool,
    pub chunk_count: usize,
    /// Ids of sources that failed ingestion when the pack was last indexed.
    #[serde(default)]
    pub failed_sources: Vec<String>,
    pub indexed_at: DateTime<Utc>,
}

/// A query result handed to the prompt assembler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Cosine similarity in `[0.0, 1.0]`.
    pub score: f32,
    pub source_id: String,
    pub pack_id: String,
}
