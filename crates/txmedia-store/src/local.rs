//! Local filesystem store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Store backed by a rooted directory on the local filesystem.
pub struct FileSystemStore {
    root: PathBuf,
    base_url: String,
    cdn_url: Option<String>,
}

impl FileSystemStore {
    /// Create a store rooted at `root`, serving URLs under `base_url`.
    pub fn new(root: impl AsRef<Path>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cdn_url: None,
        }
    }

    /// Serve `locate` URLs from a CDN instead of the base URL.
    pub fn with_cdn_url(mut self, cdn_url: impl Into<String>) -> Self {
        self.cdn_url = Some(cdn_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Resolve a store-relative filename to a full path.
    fn resolve_path(&self, filename: &str) -> StoreResult<PathBuf> {
        // Prevent directory traversal
        if filename.contains("..") || filename.starts_with('/') || filename.starts_with('\\') {
            return Err(StoreError::InvalidPath(filename.to_string()));
        }

        Ok(self.root.join(filename))
    }

    async fn ensure_parent(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FileSystemStore {
    #[instrument(skip(self, data), fields(store = "filesystem"))]
    async fn put(&self, filename: &str, data: Bytes) -> StoreResult<u64> {
        let path = self.resolve_path(filename)?;
        self.ensure_parent(&path)
            .await
            .map_err(|e| StoreError::write(filename, e))?;

        let size = data.len() as u64;
        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| StoreError::write(filename, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| StoreError::write(filename, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::write(filename, e))?;

        debug!(path = ?path, size = size, "content stored");
        Ok(size)
    }

    #[instrument(skip(self), fields(store = "filesystem"))]
    async fn open(&self, filename: &str) -> StoreResult<Bytes> {
        let path = self.resolve_path(filename)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(filename.to_string()))
            }
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    #[instrument(skip(self), fields(store = "filesystem"))]
    async fn delete(&self, filename: &str) -> StoreResult<()> {
        let path = self.resolve_path(filename)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "content deleted");
                Ok(())
            }
            // Idempotent: a missing file is already deleted
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::delete(filename, e)),
        }
    }

    fn locate(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        let base = self.cdn_url.as_deref().unwrap_or(&self.base_url);
        format!("{}/{}", base, path)
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}
