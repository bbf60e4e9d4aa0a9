//! Persistence of generated designs
//!
//! A [`BlobStore`] turns bytes into a public URL. The [`Persister`] sits in
//! front of it and re-checks every output at the storage boundary.

use crate::error::{Result, StagingError};
use crate::style::Style;
use crate::types::{DesignRecord, GenerationResult};
use crate::validation::{check_signature_and_size, OutputSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Directory that generated designs are stored under
pub const GENERATED_PREFIX: &str = "generated";

/// Stores bytes and returns the URL they are served from
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// # Errors
    /// Any storage failure; the persister maps it to `UPLOAD_IMAGE_FAILED`.
    async fn store(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<String>;
}

/// Reject absolute paths and parent traversal
fn checked_relative(path: &str) -> Result<&Path> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(candidate)
    } else {
        Err(StagingError::upload(format!("refusing to store at '{}'", path)))
    }
}

/// Join a base URL and a relative path; an empty base yields a site-relative URL
fn public_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Filesystem store rooted at a directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(root: P, public_base_url: S) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<String> {
        let target = self.root.join(checked_relative(path)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StagingError::file_io_error("create directory", parent, &e))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| StagingError::file_io_error("write", &target, &e))?;

        log::debug!(
            "Stored {} bytes ({}) at {}",
            bytes.len(),
            content_type,
            target.display()
        );
        Ok(public_url(&self.public_base_url, path))
    }
}

/// In-memory store, mostly for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    base_url: String,
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl MemoryBlobStore {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Arc::default(),
        }
    }

    /// Stored bytes at `path`
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(path).map(|(bytes, _)| bytes.clone()))
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<String> {
        checked_relative(path)?;
        self.objects
            .lock()
            .map_err(|_| StagingError::upload("memory store lock poisoned"))?
            .insert(path.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(public_url(&self.base_url, path))
    }
}

/// File name for a persisted design
#[must_use]
pub fn design_filename(style: &Style, millis: i64) -> String {
    format!("design-{}-{}.png", millis, style.file_safe_name())
}

/// Validates outputs at the storage boundary and hands them to a [`BlobStore`]
#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister").finish_non_exhaustive()
    }
}

impl Persister {
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Store `bytes` under `generated/<filename>` and return its URL
    ///
    /// # Errors
    /// - [`StagingError::OutputInvalidFormat`] / [`StagingError::OutputTooSmall`]
    ///   when the bytes fail the boundary check
    /// - [`StagingError::Upload`] when the store fails
    pub async fn persist(
        &self,
        bytes: &[u8],
        filename: &str,
        source: OutputSource,
        request_id: &str,
    ) -> Result<String> {
        let format = check_signature_and_size(bytes, source.min_bytes())?;
        let path = format!("{}/{}", GENERATED_PREFIX, filename);

        let url = self
            .store
            .store(bytes, &path, format.content_type())
            .await
            .map_err(|e| match e {
                StagingError::Upload(_) => e,
                other => StagingError::upload(other.to_string()),
            })?;

        tracing::info!(
            request_id = %request_id,
            url = %url,
            size = bytes.len(),
            "Design persisted"
        );
        Ok(url)
    }

    /// Persist a generation result and build its history record
    ///
    /// # Errors
    /// See [`Persister::persist`].
    pub async fn persist_design(
        &self,
        result: &GenerationResult,
        style: &Style,
        request_id: &str,
    ) -> Result<DesignRecord> {
        let filename = design_filename(style, chrono::Utc::now().timestamp_millis());
        let url = self
            .persist(&result.bytes, &filename, result.provider.into(), request_id)
            .await?;
        Ok(DesignRecord::new(
            url,
            style.clone(),
            result.provider,
            result.fallback_used,
        ))
    }
}
