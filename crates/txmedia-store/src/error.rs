//! Store errors
//!
//! Write failures propagate synchronously out of `attach` (nothing gets
//! queued); delete failures during commit-time cleanup are logged and
//! swallowed by the lifecycle manager. Keeping them as distinct variants is
//! what lets the caller tell the two policies apart.

use thiserror::Error;

/// Errors from store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("write failed for `{filename}`: {source}")]
    Write {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("delete failed for `{filename}`: {source}")]
    Delete {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn write(filename: impl Into<String>, source: std::io::Error) -> Self {
        Self::Write {
            filename: filename.into(),
            source,
        }
    }

    pub fn delete(filename: impl Into<String>, source: std::io::Error) -> Self {
        Self::Delete {
            filename: filename.into(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
