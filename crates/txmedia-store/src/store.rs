//! Store capability contract

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreResult;

/// Content-addressable storage backend.
///
/// Implementations must be safe for concurrent use by independent lifecycle
/// scopes; no locking is imposed above this boundary.
#[async_trait]
pub trait Store: Send + Sync {
    /// Write content at `filename`, eagerly and durably.
    ///
    /// Returns the number of bytes written. Overwriting an existing filename
    /// is allowed; distinct attach operations generate distinct filenames, so
    /// a collision never races a reader of previously committed content.
    async fn put(&self, filename: &str, data: Bytes) -> StoreResult<u64>;

    /// Read the content stored at `filename`.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) if
    /// the filename does not exist.
    async fn open(&self, filename: &str) -> StoreResult<Bytes>;

    /// Delete the content at `filename`.
    ///
    /// Idempotent: deleting a missing filename succeeds, so commit and
    /// rollback sweeps can be retried.
    async fn delete(&self, filename: &str) -> StoreResult<()>;

    /// Derive a public URL for a store-relative path. Pure, no I/O.
    ///
    /// Returns an empty string for an empty path.
    fn locate(&self, path: &str) -> String;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

impl std::fmt::Debug for dyn Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("name", &self.name()).finish()
    }
}
