//! 图片暂存 - Binary Staging Store
//!
//! Accepts `data:image/<subtype>;base64,<body>` URLs, writes the decoded bytes
//! to disk and hands back an opaque id plus a URL the model can fetch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use canopy_config::StagingConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Route prefix under which staged images are served
pub const IMAGE_ROUTE_PREFIX: &str = "/api/images";

/// Staging errors
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Invalid image data: {0}")]
    InvalidInput(String),
    #[error("Image not found")]
    NotFound,
    #[error("Storage failure: {0}")]
    Storage(#[from] std::io::Error),
}

/// One staged object
#[derive(Debug, Clone)]
pub struct StagedImage {
    pub path: PathBuf,
    pub subtype: String,
    pub staged_at: DateTime<Utc>,
}

impl StagedImage {
    pub fn media_type(&self) -> String {
        format!("image/{}", self.subtype)
    }
}

/// Result of a successful stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedRef {
    pub id: Uuid,
    pub url: String,
}

/// Decoded payload of a data URL
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub subtype: String,
    pub bytes: Vec<u8>,
}

/// Parse and decode `data:image/<subtype>[;param...];base64,<body>`
pub fn decode_data_url(encoded: &str) -> Result<DecodedImage, StagingError> {
    let (header, body) = encoded
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' separator"))?;

    let media = header
        .trim()
        .strip_prefix("data:image/")
        .ok_or_else(|| invalid("expected a data:image/ URL"))?;

    let mut params = media.split(';');
    let subtype = params.next().unwrap_or_default();
    if subtype.is_empty() || !subtype.chars().all(is_subtype_char) {
        return Err(invalid(format!("unsupported image subtype '{}'", subtype)));
    }
    if !params.any(|p| p.trim() == "base64") {
        return Err(invalid("only base64 data URLs are accepted"));
    }

    // MIME-style bodies wrap at 76 columns
    let body: Vec<u8> = body
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if body.is_empty() {
        return Err(invalid("empty image body"));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&body)
        .map_err(|e| invalid(format!("base64 decode failed: {}", e)))?;

    Ok(DecodedImage {
        subtype: subtype.to_ascii_lowercase(),
        bytes,
    })
}

fn is_subtype_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

fn invalid(reason: impl Into<String>) -> StagingError {
    StagingError::InvalidInput(reason.into())
}

/// Staging store backed by a directory and a concurrent index
#[derive(Debug)]
pub struct ImageStore {
    root: PathBuf,
    // 进程级临时目录, drop 时删除
    _scratch: Option<TempDir>,
    index: DashMap<Uuid, StagedImage>,
    public_base_url: Option<String>,
    ttl: Option<Duration>,
}

impl ImageStore {
    /// Store rooted at `dir`, created if missing
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let root = dir.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self::with_root(root, None))
    }

    /// Store rooted at a fresh temporary directory, removed when the store drops
    pub fn temporary() -> Result<Self, StagingError> {
        let scratch = tempfile::Builder::new().prefix("canopy-images-").tempdir()?;
        let root = scratch.path().to_path_buf();
        Ok(Self::with_root(root, Some(scratch)))
    }

    /// Build from the `staging` config section
    pub fn from_config(config: &StagingConfig) -> Result<Self, StagingError> {
        let store = match &config.directory {
            Some(dir) => {
                let dir = canopy_config::expand_tilde(dir).unwrap_or_else(|| PathBuf::from(dir));
                Self::new(dir)?
            }
            None => Self::temporary()?,
        };

        Ok(store
            .with_public_base_url(config.public_base_url.clone())
            .with_ttl(config.ttl_secs.map(Duration::from_secs)))
    }

    fn with_root(root: PathBuf, scratch: Option<TempDir>) -> Self {
        Self {
            root,
            _scratch: scratch,
            index: DashMap::new(),
            public_base_url: None,
            ttl: None,
        }
    }

    /// Prefix returned URLs with an absolute base
    pub fn with_public_base_url(mut self, base: Option<String>) -> Self {
        self.public_base_url = base
            .map(|b| b.trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty());
        self
    }

    /// Expire entries older than `ttl`; `None` keeps them forever
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// URL under which `id` is served
    pub fn url_for(&self, id: &Uuid) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}{}/{}", base, IMAGE_ROUTE_PREFIX, id),
            None => format!("{}/{}", IMAGE_ROUTE_PREFIX, id),
        }
    }

    /// Decode and persist an inline image
    ///
    /// The file is fully written before the id enters the index, so an id
    /// handed out is always retrievable until it expires.
    pub async fn stage(&self, encoded: &str) -> Result<StagedRef, StagingError> {
        let DecodedImage { subtype, bytes } = decode_data_url(encoded)?;

        let id = Uuid::new_v4();
        let path = self.root.join(format!("{}.{}", id, subtype));

        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            warn!(image_id = %id, error = %e, "failed to write staged image");
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StagingError::Storage(e));
        }

        self.index.insert(
            id,
            StagedImage {
                path,
                subtype,
                staged_at: Utc::now(),
            },
        );
        debug!(image_id = %id, size = bytes.len(), "image staged");

        Ok(StagedRef {
            url: self.url_for(&id),
            id,
        })
    }

    /// Fetch the bytes and media type for `id`
    pub async fn retrieve(&self, id: &str) -> Result<(Vec<u8>, String), StagingError> {
        let id = Uuid::parse_str(id).map_err(|_| StagingError::NotFound)?;

        // 不跨 await 持有 DashMap 引用
        let entry = self
            .index
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StagingError::NotFound)?;

        match tokio::fs::read(&entry.path).await {
            Ok(bytes) => Ok((bytes, entry.media_type())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(image_id = %id, "staged image file vanished");
                Err(StagingError::NotFound)
            }
            Err(e) => Err(StagingError::Storage(e)),
        }
    }

    /// Remove entries older than the TTL, returning how many were dropped
    pub async fn sweep_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let now = Utc::now();

        let expired: Vec<Uuid> = self
            .index
            .iter()
            .filter(|e| {
                (now - e.staged_at)
                    .to_std()
                    .map(|age| age >= ttl)
                    .unwrap_or(false)
            })
            .map(|e| *e.key())
            .collect();

        let mut removed = 0;
        for id in expired {
            if let Some((_, image)) = self.index.remove(&id) {
                removed += 1;
                if let Err(e) = tokio::fs::remove_file(&image.path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(image_id = %id, error = %e, "failed to delete expired image");
                    }
                }
            }
        }
        removed
    }

    /// Run `sweep_expired` every `every` until `shutdown` fires
    ///
    /// Returns `None` when no TTL is configured.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let ttl = self.ttl?;
        let store = Arc::clone(self);

        info!(ttl_secs = ttl.as_secs(), interval_secs = every.as_secs(), "image sweeper started");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired().await;
                        if removed > 0 {
                            info!(removed, remaining = store.len(), "expired staged images removed");
                        }
                    }
                }
            }
        }))
    }
}
