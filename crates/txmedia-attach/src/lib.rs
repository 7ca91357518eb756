//! # txmedia-attach
//!
//! Transactional attachment management: metadata lives in a mapped column,
//! content lives in a [store](txmedia_store::Store), and the two stay in
//! sync across commit and rollback.
//!
//! ## Model
//!
//! - An [`AttachmentType`] declares a named kind of attachment: its store,
//!   directory, constraints, and content [`Pipeline`].
//! - An [`AttachmentSlot`] holds the current value(s) of one mapped column,
//!   covering single, list, and keyed shapes through [`SlotTarget`].
//! - An [`AttachmentScope`], opened per transaction from the
//!   [`AttachmentManager`], performs every attach/detach and queues the
//!   store cleanup that runs at commit or rollback.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use txmedia_attach::{AttachmentManager, AttachmentSlot, AttachmentType, AttachOptions, SlotTarget};
//! use txmedia_store::{MemoryStore, StoreRegistry};
//!
//! let registry = Arc::new(StoreRegistry::new());
//! registry.register("main", Arc::new(MemoryStore::new()), true);
//! let manager = Arc::new(AttachmentManager::new(registry));
//!
//! let avatar = Arc::new(AttachmentType::new("avatar").directory("avatars"));
//! let mut slot = AttachmentSlot::new(avatar);
//!
//! let mut scope = manager.enter(tx_id)?;
//! scope.attach(&mut slot, SlotTarget::Single, content, AttachOptions::new()).await?;
//! // ... the mapping layer persists codec::encode_slot(&slot) ...
//! scope.resolve_commit().await?;
//! ```

pub mod codec;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod pipeline;

pub use error::{AttachError, AttachResult, LifecycleError, ValidationError};
pub use lifecycle::{AttachmentManager, AttachmentScope, LifecycleEvents, ScopeState};
pub use model::{
    AttachmentSlot, AttachmentType, AttachmentValue, Constraints, SlotEntry, SlotTarget,
};
pub use pipeline::{
    Analyzer, AttachOptions, ChecksumAnalyzer, ContentInfo, ContentTypeAnalyzer,
    ContentTypeValidator, DerivedContent, ImageAnalyzer, ImageValidator, LengthValidator,
    Pipeline, PipelineOutcome, ProcessOutput, Processor, StageError, Validator,
};
