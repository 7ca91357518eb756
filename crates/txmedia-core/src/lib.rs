//! # txmedia-core
//!
//! Core types and errors shared across the txmedia crates:
//! - Transaction identifiers (one lifecycle scope per transaction)
//! - Configuration error taxonomy (store resolution, backend credentials)
//! - Content-type category helpers

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
