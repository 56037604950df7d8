//! # Lore Index
//!
//! **A local-first knowledge retrieval engine for grounding AI answers.**
//!
//! Knowledge packs (notes, files, fetched pages) attached to a game profile
//! are normalized to text, split into overlapping word windows, weighted
//! with TF-IDF, and ranked by cosine similarity against a question.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────────┐   ┌────────────┐
//! │   Pack   │──▶│  Ingestor  │──▶│ Chunk + Refit │──▶│ IndexState │
//! │ sources  │   │ note/file/ │   │ (blocking     │   │  (ArcSwap) │
//! └──────────┘   │    url     │   │   worker)     │   └─────┬──────┘
//!                └────────────┘   └───────────────┘         │
//!                                        ┌──────────────────┤
//!                                        ▼                  ▼
//!                                  ┌──────────┐       ┌──────────┐
//!                                  │ snapshot │       │  query   │
//!                                  │  (JSON)  │       │ top-k    │
//!                                  └──────────┘       └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. A [`Pack`](lore_index_core::models::Pack) is submitted to
//!    [`KnowledgeIndex::add_pack`](index::KnowledgeIndex::add_pack).
//! 2. The [`ingest`] adapter turns each source into plain text, recording
//!    per-source failures.
//! 3. Text is chunked ([`lore_index_core::chunk`]), the TF-IDF embedder is
//!    refitted over the whole corpus, and every chunk is revectorized.
//! 4. The new state is swapped in and written atomically ([`persist`]).
//! 5. [`KnowledgeIndex::query`](index::KnowledgeIndex::query) ranks the
//!    requested profile's chunks against the current vocabulary.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`commands`] | `lore` subcommand implementations |
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Ingestion and index error types |
//! | [`extract`] | Plain-text extraction (HTML, PDF, DOCX) |
//! | [`ingest`] | Source normalization with path safety and bounded fetches |
//! | [`index`] | Shared `KnowledgeIndex` handle: add/remove/query |
//! | [`persist`] | Atomic snapshot writes and fault-tolerant loads |

pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod persist;

pub use error::{IndexError, IngestionError, IngestionReason};
pub use index::{IngestReport, KnowledgeIndex};
pub use lore_index_core::index::QueryOptions;
pub use lore_index_core::models::{Pack, RetrievedChunk, Source, SourceKind};
