//! TOML configuration parsing and validation.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [index]
//! snapshot_path = "/home/me/.config/lore/index.json"
//!
//! [chunking]
//! chunk_size = 800   # characters
//! overlap = 20       # words
//!
//! [retrieval]
//! top_k = 5
//! min_score = 0.0
//!
//! [ingest]
//! file_root = "/home/me/game-notes"
//! fetch_timeout_secs = 15
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words shared between consecutive chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_overlap() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Allow-listed root for `file` sources. Without it every file source
    /// is rejected.
    #[serde(default)]
    pub file_root: Option<PathBuf>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: u64,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            file_root: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_fetch_bytes: default_max_fetch_bytes(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl IngestConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_max_fetch_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_max_file_bytes() -> u64 {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `"info"` or `"lore_index=debug"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-user directory holding the config file and the snapshot.
pub fn default_lore_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lore")
}

/// Default config location: `<user config dir>/lore/config.toml`.
pub fn default_config_path() -> PathBuf {
    default_lore_dir().join("config.toml")
}

fn default_snapshot_path() -> PathBuf {
    default_lore_dir().join("index.json")
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::default`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        bail!("retrieval.min_score must be in [0.0, 1.0]");
    }

    if config.ingest.fetch_timeout_secs == 0 {
        bail!("ingest.fetch_timeout_secs must be > 0");
    }
    if config.ingest.max_fetch_bytes == 0 || config.ingest.max_file_bytes == 0 {
        bail!("ingest.max_fetch_bytes and ingest.max_file_bytes must be > 0");
    }
    if config.index.snapshot_path.as_os_str().is_empty() {
        bail!("index.snapshot_path must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("lore.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&write_config(&dir, "")).unwrap();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.overlap, 20);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.ingest.fetch_timeout(), Duration::from_secs(15));
        assert!(config.ingest.file_root.is_none());
        assert!(config.index.snapshot_path.ends_with("index.json"));
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        let body = r#"
[index]
snapshot_path = "/tmp/lore/index.json"

[chunking]
chunk_size = 300
overlap = 5

[retrieval]
top_k = 3
min_score = 0.2

[ingest]
file_root = "/srv/notes"
fetch_timeout_secs = 4

[logging]
level = "debug"
"#;
        let config = load_config(&write_config(&dir, body)).unwrap();
        assert_eq!(config.index.snapshot_path, PathBuf::from("/tmp/lore/index.json"));
        assert_eq!(config.chunking.chunk_size, 300);
        assert_eq!(config.retrieval.min_score, 0.2);
        assert_eq!(config.ingest.file_root, Some(PathBuf::from("/srv/notes")));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[chunking]\nchunk_size = 0\noverlap = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[chunking]\nchunk_size = 10\noverlap = 10\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_min_score_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[retrieval]\nmin_score = 1.5\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let config = load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert!(load_config(&dir.path().join("absent.toml")).is_err());
    }
}
