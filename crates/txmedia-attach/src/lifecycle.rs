//! Attachment lifecycle manager
//!
//! Content writes are eager: `attach` runs the pipeline and puts the new
//! bytes before it returns. What is deferred is destruction. Replacing or
//! detaching previously committed content only queues a `DeleteOld` that
//! runs when the owning transaction commits, so the old content stays
//! readable until the commit is real; rolling back deletes the content this
//! scope wrote and leaves everything else alone.
//!
//! Content written and then superseded inside the same scope was never
//! visible outside it, so it is deleted immediately and its pending record
//! dropped. At most one `StoreNew` per slot entry is ever outstanding.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use txmedia_core::TransactionId;
use txmedia_store::{Store, StoreRegistry};

use crate::error::{AttachResult, LifecycleError};
use crate::model::{AttachmentSlot, AttachmentValue, SlotTarget};
use crate::pipeline::{AttachOptions, ContentInfo, DerivedContent};

/// Scope state machine: `Open → Resolving → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Open,
    Resolving,
    Closed,
}

/// Content written by this scope, pending until resolution.
struct StoreNew {
    /// Key of the primary value this write belongs to; variants share the
    /// primary's group so supersede handling cleans them together.
    group: Uuid,
    store: Arc<dyn Store>,
    path: String,
}

/// Committed content scheduled for deletion at commit time.
struct DeleteOld {
    store: Arc<dyn Store>,
    path: String,
}

/// Process-wide entry point: holds the store registry and enforces one open
/// scope per transaction context.
pub struct AttachmentManager {
    registry: Arc<StoreRegistry>,
    active: Mutex<HashSet<TransactionId>>,
}

impl AttachmentManager {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self {
            registry,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// Open a scope bound to `tx`.
    ///
    /// Fails with [`LifecycleError::AlreadyActive`] if a scope is already
    /// bound to this transaction; nesting is disallowed.
    pub fn enter(self: &Arc<Self>, tx: TransactionId) -> Result<AttachmentScope, LifecycleError> {
        if !self.active.lock().insert(tx) {
            return Err(LifecycleError::AlreadyActive(tx));
        }
        debug!(%tx, "attachment scope opened");
        Ok(AttachmentScope {
            manager: self.clone(),
            tx,
            state: ScopeState::Open,
            store_news: Vec::new(),
            delete_olds: Vec::new(),
        })
    }

    /// Public URL for an attachment's content. Pure, no I/O.
    pub fn locate(&self, value: &AttachmentValue) -> AttachResult<String> {
        let store = self.registry.get(value.store_name.as_deref())?;
        Ok(store.locate(&value.path()))
    }

    fn release(&self, tx: &TransactionId) {
        self.active.lock().remove(tx);
    }
}

/// Per-transaction scope accumulating pending store operations.
pub struct AttachmentScope {
    manager: Arc<AttachmentManager>,
    tx: TransactionId,
    state: ScopeState,
    store_news: Vec<StoreNew>,
    delete_olds: Vec<DeleteOld>,
}

impl std::fmt::Debug for AttachmentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentScope")
            .field("tx", &self.tx)
            .field("state", &self.state)
            .field("store_news", &self.store_news.len())
            .field("delete_olds", &self.delete_olds.len())
            .finish()
    }
}

impl AttachmentScope {
    pub fn transaction_id(&self) -> TransactionId {
        self.tx
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// Number of commit-time deletes currently queued.
    pub fn pending_deletes(&self) -> usize {
        self.delete_olds.len()
    }

    /// Number of writes this scope would undo on rollback.
    pub fn pending_writes(&self) -> usize {
        self.store_news.len()
    }

    fn ensure_open(&self) -> Result<(), LifecycleError> {
        if self.state != ScopeState::Open {
            return Err(LifecycleError::ScopeNotOpen);
        }
        Ok(())
    }

    /// Run the pipeline, write the new content, and place its value at
    /// `target`, superseding whatever was there.
    ///
    /// Pipeline or validation failure leaves the slot, the queue, and the
    /// store untouched. A write failure likewise queues nothing; partially
    /// written variants of this call are removed again best-effort.
    #[instrument(skip_all, fields(tx = %self.tx, kind = %slot.declared().name))]
    pub async fn attach(
        &mut self,
        slot: &mut AttachmentSlot,
        target: SlotTarget,
        content: Bytes,
        opts: AttachOptions,
    ) -> AttachResult<AttachmentValue> {
        self.ensure_open()?;

        let declared = slot.declared_arc();
        let store = self.manager.registry.get(declared.store_name.as_deref())?;

        // Resolve the previous value's store up front so a configuration
        // error cannot strike after the new content is already written.
        let previous_store = match slot.peek(&target) {
            Some(prev) => Some(self.manager.registry.get(prev.store_name.as_deref())?),
            None => None,
        };

        let outcome = declared.pipeline.run(
            content,
            declared.pinned_content_type.as_deref(),
            &declared.constraints,
            &opts,
        )?;

        let mut value = build_value(&declared, &outcome.info);
        for derived in &outcome.derived {
            value
                .variants
                .insert(derived.label.clone(), build_variant(&declared, derived));
        }

        // Eager writes: primary first, then variants. Undo on partial failure.
        let mut written: Vec<String> = Vec::new();
        let primary_path = value.path();
        self.put_tracked(&store, &primary_path, outcome.content, &mut written)
            .await?;
        for derived in &outcome.derived {
            let path = value.variants[&derived.label].path();
            self.put_tracked(&store, &path, derived.data.clone(), &mut written)
                .await?;
        }

        let previous = slot.assign(&target, value.clone())?;
        if let (Some(previous), Some(previous_store)) = (previous, previous_store) {
            self.schedule_delete(&previous, previous_store).await;
        }

        let group = value.key;
        self.store_news.push(StoreNew {
            group,
            store: store.clone(),
            path: primary_path,
        });
        for variant in value.variants.values() {
            self.store_news.push(StoreNew {
                group,
                store: store.clone(),
                path: variant.path(),
            });
        }

        info!(
            key = %value.key,
            path = %value.path(),
            length = value.length,
            variants = value.variants.len(),
            "content attached"
        );
        Ok(value)
    }

    /// Write one path and record it, undoing earlier writes of this attach
    /// if it fails.
    async fn put_tracked(
        &self,
        store: &Arc<dyn Store>,
        path: &str,
        data: Bytes,
        written: &mut Vec<String>,
    ) -> AttachResult<()> {
        match store.put(path, data).await {
            Ok(_) => {
                written.push(path.to_string());
                Ok(())
            }
            Err(e) => {
                for path in written.drain(..) {
                    if let Err(cleanup) = store.delete(&path).await {
                        warn!(%path, error = %cleanup, "failed to undo partial write");
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Remove the value at `target` and schedule its content for deletion.
    ///
    /// Returns the removed value, or `None` if the target was empty.
    #[instrument(skip_all, fields(tx = %self.tx))]
    pub async fn detach(
        &mut self,
        slot: &mut AttachmentSlot,
        target: SlotTarget,
    ) -> AttachResult<Option<AttachmentValue>> {
        self.ensure_open()?;

        let Some(value) = slot.peek(&target).cloned() else {
            return Ok(None);
        };
        let store = self.manager.registry.get(value.store_name.as_deref())?;

        slot.remove(&target);
        self.schedule_delete(&value, store).await;
        debug!(key = %value.key, "content detached");
        Ok(Some(value))
    }

    /// Cascade: schedule deletion for every attachment reachable from a
    /// deleted record. Call once per attachment value (collections fan out
    /// to their items).
    pub async fn on_record_delete(&mut self, values: Vec<AttachmentValue>) -> AttachResult<()> {
        self.ensure_open()?;
        for value in values {
            let store = self.manager.registry.get(value.store_name.as_deref())?;
            self.schedule_delete(&value, store).await;
        }
        Ok(())
    }

    /// The mapping layer assigned over (or nulled) a slot whose previous
    /// value this scope never saw; schedule the previous content's deletion.
    pub async fn on_set(&mut self, previous: Option<AttachmentValue>) -> AttachResult<()> {
        self.ensure_open()?;
        if let Some(previous) = previous {
            let store = self.manager.registry.get(previous.store_name.as_deref())?;
            self.schedule_delete(&previous, store).await;
        }
        Ok(())
    }

    /// Schedule deletion of a value and its variants. Content written by
    /// this scope is deleted immediately and its pending write dropped;
    /// committed content gets a commit-time `DeleteOld`.
    async fn schedule_delete(&mut self, value: &AttachmentValue, store: Arc<dyn Store>) {
        let in_scope = self.store_news.iter().any(|n| n.group == value.key);
        if in_scope {
            let (mine, rest): (Vec<_>, Vec<_>) = self
                .store_news
                .drain(..)
                .partition(|n| n.group == value.key);
            self.store_news = rest;
            for op in mine {
                if let Err(e) = op.store.delete(&op.path).await {
                    warn!(path = %op.path, error = %e, "failed to delete superseded content");
                }
            }
            debug!(key = %value.key, "superseded in-scope content deleted");
        } else {
            for path in value.all_paths() {
                self.delete_olds.push(DeleteOld {
                    store: store.clone(),
                    path,
                });
            }
            debug!(key = %value.key, "delete queued for commit");
        }
    }

    /// The owning transaction committed: run the queued deletes.
    ///
    /// Each delete is best-effort; a failure is logged and never surfaced,
    /// because the transaction outcome is already decided.
    #[instrument(skip(self), fields(tx = %self.tx))]
    pub async fn resolve_commit(&mut self) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        self.state = ScopeState::Resolving;

        let deletes = std::mem::take(&mut self.delete_olds);
        let count = deletes.len();
        self.store_news.clear();
        for op in deletes {
            if let Err(e) = op.store.delete(&op.path).await {
                warn!(path = %op.path, error = %e, "deferred delete failed; continuing");
            }
        }

        self.close();
        info!(deletes = count, "scope committed");
        Ok(())
    }

    /// The owning transaction rolled back: delete everything this scope
    /// wrote and forget the queued deletes (the old content remains the
    /// record of truth).
    #[instrument(skip(self), fields(tx = %self.tx))]
    pub async fn resolve_rollback(&mut self) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        self.state = ScopeState::Resolving;

        self.delete_olds.clear();
        let writes = std::mem::take(&mut self.store_news);
        let count = writes.len();
        for op in writes {
            if let Err(e) = op.store.delete(&op.path).await {
                warn!(path = %op.path, error = %e, "rollback delete failed; continuing");
            }
        }

        self.close();
        info!(undone = count, "scope rolled back");
        Ok(())
    }

    /// The transaction context ended. A scope still open at this point was
    /// abandoned without an explicit outcome and resolves via rollback.
    pub async fn on_transaction_end(&mut self) {
        if self.state == ScopeState::Open {
            warn!(tx = %self.tx, "scope abandoned at transaction end; rolling back");
            let _ = self.resolve_rollback().await;
        }
    }

    fn close(&mut self) {
        self.state = ScopeState::Closed;
        self.manager.release(&self.tx);
    }
}

/// Hook surface for a mapping layer driving scopes from its own
/// transaction events (flush, commit, rollback, session close).
#[async_trait::async_trait]
pub trait LifecycleEvents: Send {
    /// A slot was overwritten or nulled outside of `attach`/`detach`;
    /// `previous` is the value that was displaced.
    async fn on_set(&mut self, previous: Option<AttachmentValue>) -> AttachResult<()>;

    /// A record owning attachments was deleted.
    async fn on_record_delete(&mut self, values: Vec<AttachmentValue>) -> AttachResult<()>;

    async fn on_commit(&mut self) -> Result<(), LifecycleError>;

    async fn on_rollback(&mut self) -> Result<(), LifecycleError>;

    /// The transaction context ended, outcome already applied or abandoned.
    async fn on_end(&mut self);
}

#[async_trait::async_trait]
impl LifecycleEvents for AttachmentScope {
    async fn on_set(&mut self, previous: Option<AttachmentValue>) -> AttachResult<()> {
        AttachmentScope::on_set(self, previous).await
    }

    async fn on_record_delete(&mut self, values: Vec<AttachmentValue>) -> AttachResult<()> {
        AttachmentScope::on_record_delete(self, values).await
    }

    async fn on_commit(&mut self) -> Result<(), LifecycleError> {
        self.resolve_commit().await
    }

    async fn on_rollback(&mut self) -> Result<(), LifecycleError> {
        self.resolve_rollback().await
    }

    async fn on_end(&mut self) {
        self.on_transaction_end().await;
    }
}

impl Drop for AttachmentScope {
    fn drop(&mut self) {
        if self.state == ScopeState::Open {
            // Store I/O is async and unavailable here; the binding is
            // released so the transaction id can be reused, and the leak is
            // loud. Callers must resolve or call on_transaction_end.
            warn!(
                tx = %self.tx,
                pending_writes = self.store_news.len(),
                "scope dropped while open; content written by it was not cleaned up"
            );
            self.manager.release(&self.tx);
        }
    }
}

fn build_value(declared: &crate::model::AttachmentType, info: &ContentInfo) -> AttachmentValue {
    let mut extra = info.extra.clone();
    if let Some(checksum) = &info.checksum {
        extra.insert("checksum".to_string(), checksum.clone());
    }
    if let Some(width) = info.width {
        extra.insert("width".to_string(), width.to_string());
    }
    if let Some(height) = info.height {
        extra.insert("height".to_string(), height.to_string());
    }

    AttachmentValue {
        key: Uuid::new_v4(),
        kind: declared.name.clone(),
        content_type: info
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        extension: info.extension.clone(),
        length: info.length,
        store_name: declared.store_name.clone(),
        directory: declared.directory.clone(),
        extra,
        variants: Default::default(),
    }
}

fn build_variant(
    declared: &crate::model::AttachmentType,
    derived: &DerivedContent,
) -> AttachmentValue {
    AttachmentValue {
        key: Uuid::new_v4(),
        kind: declared.name.clone(),
        content_type: derived.content_type.clone(),
        extension: derived.extension.clone(),
        length: derived.data.len() as u64,
        store_name: declared.store_name.clone(),
        directory: declared.directory.clone(),
        extra: derived.extra.clone(),
        variants: Default::default(),
    }
}
