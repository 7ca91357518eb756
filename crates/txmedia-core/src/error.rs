//! Configuration errors
//!
//! Raised when a store name cannot be resolved or a backend is declared
//! without the credentials it needs. These always surface to the immediate
//! caller; they are never deferred to transaction resolution.

use thiserror::Error;

/// Errors from store registration and backend configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no store registered under name `{0}`")]
    UnknownStore(String),

    #[error("no default store registered")]
    NoDefaultStore,

    #[error("missing credential `{0}` for storage backend")]
    MissingCredential(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
