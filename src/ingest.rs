//! Ingestion adapter: normalize a [`Source`] into plain text.
//!
//! - `note` sources pass their content through unchanged.
//! - `file` sources must resolve (after `..` and symlinks) inside the
//!   configured root; anything else is `disallowed_path`.
//! - `url` sources are fetched through a [`UrlFetcher`] with a bounded
//!   timeout; timeouts and transport errors are `network`.
//!
//! Failures are returned per source and never abort the surrounding pack.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lore_index_core::models::{Source, SourceKind};
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::error::{IngestionError, IngestionReason};
use crate::extract::{extract_text, ContentKind, ExtractError};

/// Raw response from a URL fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Value of the `Content-Type` header, or empty if absent.
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Why a fetch failed, before it is attributed to a source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("response larger than {0} bytes")]
    TooLarge(u64),
}

/// Network transport for `url` sources.
///
/// The default is [`HttpFetcher`]; the host application (or a test) may
/// supply its own.
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// `reqwest`-backed fetcher with a client-level timeout and a body cap.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lore-index/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl UrlFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge(self.max_bytes));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let mut body = Vec::new();
        while let Some(piece) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
        {
            body.extend_from_slice(&piece);
            if body.len() as u64 > self.max_bytes {
                return Err(FetchError::TooLarge(self.max_bytes));
            }
        }
        Ok(FetchedPage { content_type, body })
    }
}

/// Normalizes sources to text under one ingestion policy.
pub struct Ingestor {
    /// Canonicalized allow-listed root; `None` rejects every file source.
    file_root: Option<PathBuf>,
    fetcher: Arc<dyn UrlFetcher>,
    fetch_timeout: Duration,
    max_file_bytes: u64,
}

impl Ingestor {
    /// Build an ingestor with the default HTTP transport.
    pub fn from_config(config: &IngestConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch_timeout(), config.max_fetch_bytes)?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    /// Build an ingestor with a caller-supplied transport.
    ///
    /// A configured root that cannot be canonicalized (missing directory)
    /// is treated as absent, so every file source is rejected.
    pub fn new(config: &IngestConfig, fetcher: Arc<dyn UrlFetcher>) -> Self {
        let file_root = config.file_root.as_ref().and_then(|root| {
            match std::fs::canonicalize(root) {
                Ok(canonical) => Some(canonical),
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "file root unavailable; file sources will be rejected");
                    None
                }
            }
        });
        Self {
            file_root,
            fetcher,
            fetch_timeout: config.fetch_timeout(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    pub fn file_root(&self) -> Option<&Path> {
        self.file_root.as_deref()
    }

    /// Normalize one source to plain text.
    pub async fn ingest(&self, source: &Source) -> Result<String, IngestionError> {
        match &source.kind {
            SourceKind::Note { content } => Ok(content.clone()),
            SourceKind::File { path } => self.ingest_file(&source.id, path).await,
            SourceKind::Url { url } => self.ingest_url(&source.id, url).await,
        }
    }

    async fn ingest_file(&self, source_id: &str, path: &Path) -> Result<String, IngestionError> {
        let resolved = self.resolve_file(source_id, path)?;

        let metadata = tokio::fs::metadata(&resolved).await.map_err(|e| {
            IngestionError::new(source_id, IngestionReason::UnreadableFile, e.to_string())
        })?;
        if !metadata.is_file() {
            return Err(IngestionError::new(
                source_id,
                IngestionReason::UnreadableFile,
                format!("{} is not a regular file", resolved.display()),
            ));
        }
        if metadata.len() > self.max_file_bytes {
            return Err(IngestionError::new(
                source_id,
                IngestionReason::UnreadableFile,
                format!("file exceeds {} bytes", self.max_file_bytes),
            ));
        }

        let bytes = tokio::fs::read(&resolved).await.map_err(|e| {
            IngestionError::new(source_id, IngestionReason::UnreadableFile, e.to_string())
        })?;
        let kind = ContentKind::from_path(&resolved);
        debug!(source_id, path = %resolved.display(), ?kind, "extracting file");
        extract_blocking(source_id, bytes, kind).await
    }

    /// Resolve `path` against the root and verify containment.
    ///
    /// The lexical check catches `..` escapes even when the target does not
    /// exist; the canonical check catches symlinks pointing outside.
    fn resolve_file(&self, source_id: &str, path: &Path) -> Result<PathBuf, IngestionError> {
        let disallowed = |detail: String| {
            IngestionError::new(source_id, IngestionReason::DisallowedPath, detail)
        };
        let root = self
            .file_root
            .as_ref()
            .ok_or_else(|| disallowed("no file root is configured".to_string()))?;

        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let lexical = normalize_lexically(&joined)
            .ok_or_else(|| disallowed(format!("{} escapes the filesystem root", path.display())))?;
        if !lexical.starts_with(root) {
            return Err(disallowed(format!(
                "{} is outside {}",
                path.display(),
                root.display()
            )));
        }

        // Containment is decided before existence so a missing file outside
        // the root cannot be told apart from an existing one.
        let resolved = resolve_symlinks(&lexical, MAX_SYMLINK_HOPS)
            .ok_or_else(|| disallowed(format!("{} has too many symlink hops", path.display())))?;
        if !resolved.starts_with(root) {
            return Err(disallowed(format!(
                "{} resolves to {} outside {}",
                path.display(),
                resolved.display(),
                root.display()
            )));
        }

        std::fs::canonicalize(&resolved).map_err(|e| {
            IngestionError::new(source_id, IngestionReason::UnreadableFile, e.to_string())
        })
    }

    async fn ingest_url(&self, source_id: &str, url: &str) -> Result<String, IngestionError> {
        let lower = url.trim().to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(IngestionError::new(
                source_id,
                IngestionReason::UnsupportedKind,
                format!("only http(s) URLs can be fetched: {}", url),
            ));
        }

        let page = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url)).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                return Err(IngestionError::new(
                    source_id,
                    IngestionReason::Network,
                    e.to_string(),
                ))
            }
            Err(_) => {
                return Err(IngestionError::new(
                    source_id,
                    IngestionReason::Network,
                    format!("timed out after {:?}", self.fetch_timeout),
                ))
            }
        };

        let kind = ContentKind::from_content_type(&page.content_type).ok_or_else(|| {
            IngestionError::new(
                source_id,
                IngestionReason::UnsupportedKind,
                format!("unsupported content type: {}", page.content_type),
            )
        })?;
        extract_blocking(source_id, page.body, kind).await
    }
}

/// Run extraction off the async workers; PDF parsing can take a while.
async fn extract_blocking(
    source_id: &str,
    bytes: Vec<u8>,
    kind: ContentKind,
) -> Result<String, IngestionError> {
    let result = tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
        .await
        .map_err(|e| {
            IngestionError::new(source_id, IngestionReason::UnreadableFile, e.to_string())
        })?;
    result.map_err(|e| {
        let reason = match e {
            ExtractError::NotText => IngestionReason::UnsupportedKind,
            ExtractError::Pdf(_) | ExtractError::Docx(_) => IngestionReason::UnreadableFile,
        };
        IngestionError::new(source_id, reason, e.to_string())
    })
}

const MAX_SYMLINK_HOPS: u32 = 40;

/// Resolve every symlink in an absolute, lexically normalized `path`,
/// including a dangling final link and links under missing components.
///
/// The existing prefix is canonicalized; missing trailing components are
/// appended as-is. Returns `None` when more than `hops` links would have
/// to be followed.
fn resolve_symlinks(path: &Path, hops: u32) -> Option<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Some(canonical);
    }

    let (parent, name) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => (parent, name),
        _ => return Some(path.to_path_buf()),
    };
    let parent = resolve_symlinks(parent, hops)?;

    let candidate = parent.join(name);
    match std::fs::symlink_metadata(&candidate) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if hops == 0 {
                return None;
            }
            let target = std::fs::read_link(&candidate).ok()?;
            let target = normalize_lexically(&parent.join(target))?;
            resolve_symlinks(&target, hops - 1)
        }
        _ => Some(candidate),
    }
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// Returns `None` when `..` would climb above the filesystem root.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct StaticFetcher {
        page: Option<FetchedPage>,
        delay: Duration,
    }

    #[async_trait]
    impl UrlFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPage, FetchError> {
            tokio::time::sleep(self.delay).await;
            self.page
                .clone()
                .ok_or_else(|| FetchError::Transport("connection refused".to_string()))
        }
    }

    fn fetcher(content_type: &str, body: &str) -> Arc<dyn UrlFetcher> {
        Arc::new(StaticFetcher {
            page: Some(FetchedPage {
                content_type: content_type.to_string(),
                body: body.as_bytes().to_vec(),
            }),
            delay: Duration::ZERO,
        })
    }

    /// Layout: <tmp>/root/notes/build.md, <tmp>/secret.txt
    fn setup(fetcher: Arc<dyn UrlFetcher>) -> (TempDir, Ingestor) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("notes/build.md"), "Level Intelligence first.").unwrap();
        fs::write(tmp.path().join("secret.txt"), "do not read").unwrap();
        let config = IngestConfig {
            file_root: Some(root),
            fetch_timeout_secs: 1,
            ..IngestConfig::default()
        };
        let ingestor = Ingestor::new(&config, fetcher);
        (tmp, ingestor)
    }

    fn reason(result: Result<String, IngestionError>) -> IngestionReason {
        result.unwrap_err().reason
    }

    #[tokio::test]
    async fn test_note_passthrough() {
        let (_tmp, ingestor) = setup(fetcher("text/plain", ""));
        let text = ingestor
            .ingest(&Source::note("n1", "Tip", "  Parry the knight. "))
            .await
            .unwrap();
        assert_eq!(text, "  Parry the knight. ");
    }

    #[tokio::test]
    async fn test_file_inside_root() {
        let (_tmp, ingestor) = setup(fetcher("text/plain", ""));
        let text = ingestor
            .ingest(&Source::file("f1", "Build", "notes/build.md"))
            .await
            .unwrap();
        assert_eq!(text, "Level Intelligence first.");

        let text = ingestor
            .ingest(&Source::file("f2", "Build", "notes/../notes/./build.md"))
            .await
            .unwrap();
        assert_eq!(text, "Level Intelligence first.");
    }

    #[tokio::test]
    async fn test_absolute_path_inside_root() {
        let (_tmp, ingestor) = setup(fetcher("text/plain", ""));
        let abs = ingestor.file_root().unwrap().join("notes/build.md");
        assert!(ingestor.ingest(&Source::file("f1", "Build", abs)).await.is_ok());
    }

    #[tokio::test]
    async fn test_traversal_rejected_at_any_depth() {
        let (_tmp, ingestor) = setup(fetcher("text/plain", ""));
        for depth in 1..12 {
            let path = format!("{}secret.txt", "../".repeat(depth));
            let result = ingestor.ingest(&Source::file("f", "x", path.as_str())).await;
            assert_eq!(reason(result), IngestionReason::DisallowedPath, "{}", path);

            let nested = format!("notes/{}etc/passwd", "../".repeat(depth + 1));
            let result = ingestor.ingest(&Source::file("f", "x", nested.as_str())).await;
            assert_eq!(reason(result), IngestionReason::DisallowedPath, "{}", nested);
        }
    }

    #[tokio::test]
    async fn test_absolute_path_outside_root_rejected() {
        let (tmp, ingestor) = setup(fetcher("text/plain", ""));
        let outside = tmp.path().join("secret.txt");
        let result = ingestor.ingest(&Source::file("f", "x", outside)).await;
        assert_eq!(reason(result), IngestionReason::DisallowedPath);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let (tmp, ingestor) = setup(fetcher("text/plain", ""));
        let link = ingestor.file_root().unwrap().join("notes/escape.txt");
        std::os::unix::fs::symlink(tmp.path().join("secret.txt"), &link).unwrap();
        let result = ingestor.ingest(&Source::file("f", "x", "notes/escape.txt")).await;
        assert_eq!(reason(result), IngestionReason::DisallowedPath);
    }

    #[tokio::test]
    async fn test_symlinked_dir_outside_root_does_not_reveal_existence() {
        let (tmp, ingestor) = setup(fetcher("text/plain", ""));
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("exists.txt"), "hidden").unwrap();
        let root = ingestor.file_root().unwrap().to_path_buf();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();
        std::os::unix::fs::symlink(outside.join("gone.txt"), root.join("dangling")).unwrap();

        for path in [
            "link/exists.txt",
            "link/missing.txt",
            "link/missing/deeper.txt",
            "dangling",
        ] {
            let result = ingestor.ingest(&Source::file("f", "x", path)).await;
            assert_eq!(reason(result), IngestionReason::DisallowedPath, "{path}");
        }
    }

    #[tokio::test]
    async fn test_dangling_symlink_inside_root_unreadable() {
        let (_tmp, ingestor) = setup(fetcher("text/plain", ""));
        let root = ingestor.file_root().unwrap().to_path_buf();
        std::os::unix::fs::symlink(root.join("notes/gone.md"), root.join("notes/stale.md"))
            .unwrap();
        let result = ingestor.ingest(&Source::file("f", "x", "notes/stale.md")).await;
        assert_eq!(reason(result), IngestionReason::UnreadableFile);
    }

    #[test]
    fn test_resolve_symlinks_keeps_missing_tail() {
        let tmp = TempDir::new().unwrap();
        let base = std::fs::canonicalize(tmp.path()).unwrap();
        fs::create_dir_all(base.join("real")).unwrap();
        std::os::unix::fs::symlink(base.join("real"), base.join("alias")).unwrap();
        assert_eq!(
            resolve_symlinks(&base.join("alias/a/b.txt"), MAX_SYMLINK_HOPS).unwrap(),
            base.join("real/a/b.txt")
        );

        std::os::unix::fs::symlink(base.join("loop"), base.join("loop")).unwrap();
        assert!(resolve_symlinks(&base.join("loop"), MAX_SYMLINK_HOPS).is_none());
    }

    #[tokio::test]
    async fn test_missing_file_unreadable() {
        let (_tmp, ingestor) = setup(fetcher("text/plain", ""));
        let result = ingestor.ingest(&Source::file("f", "x", "notes/missing.md")).await;
        assert_eq!(reason(result), IngestionReason::UnreadableFile);
    }

    #[tokio::test]
    async fn test_no_root_rejects_files() {
        let ingestor = Ingestor::new(&IngestConfig::default(), fetcher("text/plain", ""));
        let result = ingestor.ingest(&Source::file("f", "x", "/etc/hostname")).await;
        assert_eq!(reason(result), IngestionReason::DisallowedPath);
    }

    #[tokio::test]
    async fn test_binary_file_unsupported() {
        let (_tmp, ingestor) = setup(fetcher("text/plain", ""));
        let bin = ingestor.file_root().unwrap().join("notes/save.bin");
        fs::write(&bin, [0u8, 159, 146, 150]).unwrap();
        let result = ingestor.ingest(&Source::file("f", "x", "notes/save.bin")).await;
        assert_eq!(reason(result), IngestionReason::UnsupportedKind);
    }

    #[tokio::test]
    async fn test_url_html_is_stripped() {
        let (_tmp, ingestor) = setup(fetcher(
            "text/html; charset=utf-8",
            "<html><body><p>Malenia&#39;s <b>waterfowl</b> dance</p></body></html>",
        ));
        let text = ingestor
            .ingest(&Source::url("u1", "Wiki", "https://example.com/malenia"))
            .await
            .unwrap();
        assert_eq!(text, "Malenia's waterfowl dance");
    }

    #[tokio::test]
    async fn test_url_timeout_is_network_error() {
        let slow: Arc<dyn UrlFetcher> = Arc::new(StaticFetcher {
            page: None,
            delay: Duration::from_secs(30),
        });
        let config = IngestConfig {
            fetch_timeout_secs: 1,
            ..IngestConfig::default()
        };
        let ingestor = Ingestor::new(&config, slow);
        let started = std::time::Instant::now();
        let result = ingestor
            .ingest(&Source::url("u1", "Wiki", "https://example.com/slow"))
            .await;
        assert_eq!(reason(result), IngestionReason::Network);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_url_transport_failure_is_network_error() {
        let failing: Arc<dyn UrlFetcher> = Arc::new(StaticFetcher {
            page: None,
            delay: Duration::ZERO,
        });
        let ingestor = Ingestor::new(&IngestConfig::default(), failing);
        let result = ingestor
            .ingest(&Source::url("u1", "Wiki", "https://example.com"))
            .await;
        assert_eq!(reason(result), IngestionReason::Network);
    }

    #[tokio::test]
    async fn test_url_scheme_and_content_type_checks() {
        let (_tmp, ingestor) = setup(fetcher("image/png", "\u{89}PNG"));
        let result = ingestor
            .ingest(&Source::url("u1", "x", "file:///etc/passwd"))
            .await;
        assert_eq!(reason(result), IngestionReason::UnsupportedKind);

        let result = ingestor
            .ingest(&Source::url("u2", "x", "https://example.com/map.png"))
            .await;
        assert_eq!(reason(result), IngestionReason::UnsupportedKind);
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            Some(PathBuf::from("/a/c/d"))
        );
        assert_eq!(normalize_lexically(Path::new("/a/../..")), None);
    }
}
