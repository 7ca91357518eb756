//! # txmedia-store
//!
//! Pluggable content stores for txmedia.
//!
//! A [`Store`] is a content-addressable backend exposing `put`, `open`,
//! `delete`, and `locate`. Writes are eager: when `put` returns, the content
//! is durable, and the attachment lifecycle only ever has to delete it again
//! (on rollback, or when an overwrite commits). Deletes are idempotent so
//! commit-time cleanup sweeps can be replayed safely.
//!
//! The [`StoreRegistry`] maps symbolic names to configured store instances
//! and designates a process default, so persisted attachment metadata only
//! needs to carry a store name, never a backend address.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use txmedia_store::{FileSystemStore, MemoryStore, StoreRegistry};
//!
//! let registry = Arc::new(StoreRegistry::new());
//! registry.register("fs", Arc::new(FileSystemStore::new("/var/media", "/media")), true);
//! registry.register("cache", Arc::new(MemoryStore::new()), false);
//!
//! let store = registry.get(None)?; // resolves the default ("fs")
//! ```

pub mod error;
pub mod local;
pub mod memory;
pub mod registry;
pub mod s3;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use local::FileSystemStore;
pub use memory::MemoryStore;
pub use registry::StoreRegistry;
pub use s3::{CannedAcl, S3Config, S3Store};
pub use store::Store;
