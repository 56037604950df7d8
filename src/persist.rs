//! Snapshot persistence.
//!
//! Writes go to a temporary file in the snapshot's directory and are then
//! renamed over the target, so the live snapshot is either the previous
//! complete file or the new complete file. Loads never fail: a missing,
//! unreadable, corrupt, or unsupported snapshot yields an empty index.

use std::io::Write;
use std::path::Path;

use lore_index_core::index::IndexState;
use lore_index_core::snapshot;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::IndexCorruptionError;

/// Atomically replace `path` with `bytes`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Encode `state` and write it to `path`.
pub fn save_state(path: &Path, state: &IndexState) -> std::io::Result<()> {
    let bytes = snapshot::encode(state).map_err(std::io::Error::other)?;
    write_atomic(path, &bytes)
}

/// Restore the index from `path`, falling back to an empty index.
pub fn load_state(path: &Path) -> IndexState {
    match try_load(path) {
        Ok(Some(state)) => {
            let stats = state.stats();
            info!(
                path = %path.display(),
                packs = stats.packs,
                chunks = stats.chunks,
                vocabulary = stats.vocabulary,
                "loaded index snapshot"
            );
            state
        }
        Ok(None) => {
            info!(path = %path.display(), "no index snapshot; starting empty");
            IndexState::empty()
        }
        Err(e) => {
            warn!(error = %e, "starting with an empty index");
            IndexState::empty()
        }
    }
}

fn try_load(path: &Path) -> Result<Option<IndexState>, IndexCorruptionError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(IndexCorruptionError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    snapshot::decode(&bytes)
        .map(Some)
        .map_err(|source| IndexCorruptionError::Invalid {
            path: path.to_path_buf(),
            source,
        })
}
