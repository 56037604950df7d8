//! # Lore Index Core
//!
//! Pure, I/O-free logic for the knowledge retrieval engine: data models,
//! word-window chunking, the TF-IDF embedder, the immutable index state,
//! and the persisted snapshot format.
//!
//! This crate performs no filesystem or network access. Ingestion,
//! persistence, and concurrency live in the `lore-index` app crate.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod snapshot;
