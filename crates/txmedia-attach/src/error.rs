//! Attachment errors
//!
//! Validation and configuration failures surface synchronously from
//! `attach()` before anything is written. Deferred cleanup failures during
//! commit/rollback resolution are logged and never surfaced; by then the
//! transaction outcome is already decided.

use thiserror::Error;
use txmedia_core::{ConfigurationError, TransactionId};
use txmedia_store::StoreError;

/// Constraint violations raised by pipeline validators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content length {length} is below the minimum of {min} bytes")]
    MinimumLengthNotReached { length: u64, min: u64 },

    #[error("content length {length} exceeds the maximum of {max} bytes")]
    MaximumLengthExceeded { length: u64, max: u64 },

    #[error("content type `{0}` is not allowed")]
    ContentTypeNotAllowed(String),

    #[error("image dimensions {width}x{height} are outside the allowed range")]
    ImageDimensionsOutOfRange { width: u32, height: u32 },
}

/// Lifecycle-manager misuse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("a scope is already active for transaction {0}")]
    AlreadyActive(TransactionId),

    #[error("no open scope: it has already been resolved")]
    ScopeNotOpen,
}

/// Errors from the attach/detach/decode surface.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("expected attachment of type `{expected}`, got `{actual}`")]
    TypeMismatch { expected: String, actual: String },

    #[error("required analyzer `{name}` failed: {reason}")]
    Analysis { name: &'static str, reason: String },

    #[error("processor `{name}` failed: {reason}")]
    Process { name: &'static str, reason: String },

    #[error("invalid attachment metadata: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type AttachResult<T> = Result<T, AttachError>;
