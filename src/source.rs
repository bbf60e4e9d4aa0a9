//! Resolution of image references to raw bytes
//!
//! References are either HTTP(S) URLs or filesystem paths. Site-relative
//! upload paths (`/uploads/...`, `/images/...`) resolve against the
//! configured public asset root when one is set.

use crate::error::{Result, StagingError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use futures_util::stream::TryStreamExt;
use std::fmt;
use std::path::{Path, PathBuf};

/// Path prefixes that refer to files under the public asset root
pub const SITE_RELATIVE_PREFIXES: [&str; 2] = ["/uploads/", "/images/"];

/// Largest remote image accepted, checked while the body streams in
pub const MAX_SOURCE_BYTES: usize = 40 * 1024 * 1024;

/// A parsed image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    LocalPath(PathBuf),
    Remote(String),
}

impl ImageRef {
    /// Parse a caller-supplied reference
    ///
    /// # Errors
    /// - [`StagingError::MissingImage`] for empty references and browser-local
    ///   `blob:` URLs, which the server can never read
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StagingError::missing_image("no image reference provided"));
        }
        if trimmed.starts_with("blob:") {
            return Err(StagingError::missing_image(
                "blob: URLs are local to the browser; upload the image first",
            ));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(Self::Remote(trimmed.to_string()));
        }
        if trimmed.contains("://") {
            return Err(StagingError::missing_image(format!(
                "unsupported image URL scheme: {}",
                trimmed
            )));
        }
        Ok(Self::LocalPath(PathBuf::from(trimmed)))
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalPath(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Loads raw image bytes for a reference
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// # Errors
    /// - [`StagingError::ImageLoad`] when the bytes cannot be read or fetched
    async fn load(&self, image: &ImageRef, request_id: &str) -> Result<Vec<u8>>;
}

/// Filesystem and HTTP image source
#[derive(Debug, Clone)]
pub struct DefaultImageSource {
    client: reqwest::Client,
    public_root: Option<PathBuf>,
    retry: RetryPolicy,
}

impl DefaultImageSource {
    #[must_use]
    pub fn new(client: reqwest::Client, public_root: Option<PathBuf>) -> Self {
        Self {
            client,
            public_root,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Filesystem location for a local reference
    #[must_use]
    pub fn resolve_local(&self, path: &Path) -> PathBuf {
        let Some(root) = &self.public_root else {
            return path.to_path_buf();
        };
        let text = path.to_string_lossy();
        if SITE_RELATIVE_PREFIXES.iter().any(|p| text.starts_with(p)) {
            root.join(text.trim_start_matches('/'))
        } else {
            path.to_path_buf()
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StagingError::network_error("image source", "fetch", &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StagingError::provider_status(
                "image source",
                "fetch",
                status.as_u16(),
                url,
            ));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_SOURCE_BYTES as u64)
        {
            return Err(StagingError::image_load(format!(
                "{} exceeds the {} byte source limit",
                url, MAX_SOURCE_BYTES
            )));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| StagingError::network_error("image source", "reading body", &e))?
        {
            if body.len() + chunk.len() > MAX_SOURCE_BYTES {
                return Err(StagingError::image_load(format!(
                    "{} exceeds the {} byte source limit",
                    url, MAX_SOURCE_BYTES
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl ImageSource for DefaultImageSource {
    async fn load(&self, image: &ImageRef, request_id: &str) -> Result<Vec<u8>> {
        let bytes = match image {
            ImageRef::LocalPath(path) => {
                let resolved = self.resolve_local(path);
                tokio::fs::read(&resolved).await.map_err(|e| {
                    StagingError::image_load(format!(
                        "failed to read {}: {}",
                        resolved.display(),
                        e
                    ))
                })?
            },
            ImageRef::Remote(url) => {
                retry_with_backoff(&self.retry, "fetch source image", || self.fetch_remote(url))
                    .await
                    .map_err(|e| StagingError::image_load(format!("failed to fetch image: {}", e)))?
            },
        };

        if bytes.is_empty() {
            return Err(StagingError::image_load(format!("{} is empty", image)));
        }

        tracing::info!(
            request_id = %request_id,
            remote = image.is_remote(),
            size = bytes.len(),
            input_hash = %&crate::validation::sha256_hex(&bytes)[..16],
            "Image loaded"
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_parse_references() {
        assert_eq!(
            ImageRef::parse(" https://cdn.example.com/room.jpg ").unwrap(),
            ImageRef::Remote("https://cdn.example.com/room.jpg".to_string())
        );
        assert_eq!(
            ImageRef::parse("/uploads/room.jpg").unwrap(),
            ImageRef::LocalPath(PathBuf::from("/uploads/room.jpg"))
        );

        for bad in ["", "   ", "blob:http://localhost/abc", "ftp://host/room.jpg"] {
            let err = ImageRef::parse(bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::MissingImage, "{bad:?}");
        }
    }

    #[test]
    fn test_resolve_local_against_public_root() {
        let source = DefaultImageSource::new(reqwest::Client::new(), Some(PathBuf::from("/srv/public")));
        assert_eq!(
            source.resolve_local(Path::new("/uploads/a.png")),
            PathBuf::from("/srv/public/uploads/a.png")
        );
        assert_eq!(
            source.resolve_local(Path::new("/tmp/a.png")),
            PathBuf::from("/tmp/a.png")
        );

        let unrooted = DefaultImageSource::new(reqwest::Client::new(), None);
        assert_eq!(
            unrooted.resolve_local(Path::new("/uploads/a.png")),
            PathBuf::from("/uploads/a.png")
        );
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
        std::fs::write(dir.path().join("uploads/room.png"), b"bytes").unwrap();

        let source = DefaultImageSource::new(reqwest::Client::new(), Some(dir.path().to_path_buf()));
        let bytes = source
            .load(&ImageRef::parse("/uploads/room.png").unwrap(), "req")
            .await
            .unwrap();
        assert_eq!(bytes, b"bytes");
    }

    #[tokio::test]
    async fn test_missing_and_empty_files_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.png"), b"").unwrap();
        let source = DefaultImageSource::new(reqwest::Client::new(), None);

        let missing = ImageRef::LocalPath(dir.path().join("nope.png"));
        let err = source.load(&missing, "req").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ImageLoadFailed);

        let empty = ImageRef::LocalPath(dir.path().join("empty.png"));
        let err = source.load(&empty, "req").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ImageLoadFailed);
    }
}
