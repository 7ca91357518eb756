//! In-memory store for tests and embedding

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Store keeping all content in process memory.
pub struct MemoryStore {
    files: RwLock<HashMap<String, Bytes>>,
    base_url: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            base_url: "memory:/".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    /// Whether a filename currently holds content.
    pub async fn contains(&self, filename: &str) -> bool {
        self.files.read().await.contains_key(filename)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, filename: &str, data: Bytes) -> StoreResult<u64> {
        let size = data.len() as u64;
        self.files.write().await.insert(filename.to_string(), data);
        Ok(size)
    }

    async fn open(&self, filename: &str) -> StoreResult<Bytes> {
        self.files
            .read()
            .await
            .get(filename)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(filename.to_string()))
    }

    async fn delete(&self, filename: &str) -> StoreResult<()> {
        self.files.write().await.remove(filename);
        Ok(())
    }

    fn locate(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        format!("{}/{}", self.base_url, path)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
