//! Attachment metadata model
//!
//! An [`AttachmentValue`] is the self-describing handle that gets persisted
//! in the mapping column; the bytes themselves live in a store. Its path is
//! derived deterministically from key + extension + directory, so nothing
//! beyond these fields needs storing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AttachError;
use crate::pipeline::Pipeline;

/// Size and content-type constraints declared on an attachment type.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Minimum content length in bytes.
    pub min_length: Option<u64>,
    /// Maximum content length in bytes.
    pub max_length: Option<u64>,
    /// Allowed content types; empty allows all. A trailing `/*` matches a
    /// whole top-level type, e.g. `image/*`.
    pub allowed_content_types: Vec<String>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_length(mut self, min: u64) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: u64) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn allow_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.allowed_content_types.push(content_type.into());
        self
    }

    /// Check a resolved content type against the allowed list.
    pub fn is_content_type_allowed(&self, content_type: &str) -> bool {
        if self.allowed_content_types.is_empty() {
            return true;
        }
        self.allowed_content_types.iter().any(|allowed| {
            if let Some(prefix) = allowed.strip_suffix("/*") {
                content_type
                    .split('/')
                    .next()
                    .is_some_and(|top| top == prefix)
            } else {
                allowed == content_type
            }
        })
    }
}

/// Declaration surface of an attachment type: which store its content lives
/// in, how paths are prefixed, and the pipeline that every attach runs.
#[derive(Clone)]
pub struct AttachmentType {
    /// Type name; slot assignment rejects values of a different kind.
    pub name: String,
    /// Symbolic store name; `None` resolves the registry default.
    pub store_name: Option<String>,
    /// Path prefix inside the store.
    pub directory: Option<String>,
    /// When set, overrides sniffed and declared content types.
    pub pinned_content_type: Option<String>,
    pub constraints: Constraints,
    pub pipeline: Pipeline,
}

impl AttachmentType {
    /// New type with the standard analyzer/validator pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_name: None,
            directory: None,
            pinned_content_type: None,
            constraints: Constraints::default(),
            pipeline: Pipeline::standard(),
        }
    }

    pub fn store(mut self, name: impl Into<String>) -> Self {
        self.store_name = Some(name.into());
        self
    }

    pub fn directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into().trim_matches('/').to_string());
        self
    }

    pub fn pin_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.pinned_content_type = Some(content_type.into());
        self
    }

    pub fn constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }
}

/// Persisted attachment metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentValue {
    /// Opaque unique identifier, generated at attach time.
    pub key: Uuid,
    /// Name of the declared [`AttachmentType`] this value belongs to.
    pub kind: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extension: Option<String>,
    /// Content length in bytes.
    pub length: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub store_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub directory: Option<String>,
    /// Pipeline-contributed metadata (checksum, width, height, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub extra: BTreeMap<String, String>,
    /// Processor-derived variants (e.g. thumbnails), stored and rolled back
    /// atomically with this value.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub variants: BTreeMap<String, AttachmentValue>,
}

impl AttachmentValue {
    /// Store-relative path, derived from directory + key + extension.
    pub fn path(&self) -> String {
        let file = match &self.extension {
            Some(ext) => format!("{}.{}", self.key, ext),
            None => self.key.to_string(),
        };
        match &self.directory {
            Some(dir) if !dir.is_empty() => format!("{}/{}", dir, file),
            _ => file,
        }
    }

    /// Paths of this value and all of its variants.
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths = vec![self.path()];
        for variant in self.variants.values() {
            paths.extend(variant.all_paths());
        }
        paths
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn human_size(&self) -> String {
        txmedia_core::human_size(self.length)
    }
}

/// Addressing inside a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotTarget {
    /// The single entry of a size-one slot (replace-or-create).
    Single,
    /// Append a new entry (list shape).
    Append,
    /// The entry with this label (dict shape, replace-or-create).
    Label(String),
    /// The entry at this index.
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotEntry {
    pub label: Option<String>,
    pub value: AttachmentValue,
}

/// Generic attachment container.
///
/// One abstraction covers all shapes: a single-valued column is a slot of
/// size one, a gallery is a slot with many entries, a keyed mapping is a
/// slot with labeled entries. Removing an entry is equivalent to detaching
/// that attachment.
#[derive(Clone)]
pub struct AttachmentSlot {
    declared: Arc<AttachmentType>,
    entries: Vec<SlotEntry>,
}

impl AttachmentSlot {
    pub fn new(declared: Arc<AttachmentType>) -> Self {
        Self {
            declared,
            entries: Vec::new(),
        }
    }

    pub fn declared(&self) -> &AttachmentType {
        &self.declared
    }

    pub(crate) fn declared_arc(&self) -> Arc<AttachmentType> {
        self.declared.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The single value of a size-one slot.
    pub fn value(&self) -> Option<&AttachmentValue> {
        self.entries.first().map(|e| &e.value)
    }

    pub fn get_label(&self, label: &str) -> Option<&AttachmentValue> {
        self.entries
            .iter()
            .find(|e| e.label.as_deref() == Some(label))
            .map(|e| &e.value)
    }

    pub fn get_index(&self, index: usize) -> Option<&AttachmentValue> {
        self.entries.get(index).map(|e| &e.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotEntry> {
        self.entries.iter()
    }

    fn position(&self, target: &SlotTarget) -> Option<usize> {
        match target {
            SlotTarget::Single => (!self.entries.is_empty()).then_some(0),
            SlotTarget::Append => None,
            SlotTarget::Label(label) => self
                .entries
                .iter()
                .position(|e| e.label.as_deref() == Some(label.as_str())),
            SlotTarget::Index(i) => (*i < self.entries.len()).then_some(*i),
        }
    }

    /// The value currently addressed by `target`, if any.
    pub fn peek(&self, target: &SlotTarget) -> Option<&AttachmentValue> {
        self.position(target).map(|i| &self.entries[i].value)
    }

    /// Place `value` at `target`, returning the value it replaced.
    ///
    /// Fails with [`AttachError::TypeMismatch`] before touching the slot if
    /// the value's kind differs from the declared type.
    pub fn assign(
        &mut self,
        target: &SlotTarget,
        value: AttachmentValue,
    ) -> Result<Option<AttachmentValue>, AttachError> {
        if value.kind != self.declared.name {
            return Err(AttachError::TypeMismatch {
                expected: self.declared.name.clone(),
                actual: value.kind,
            });
        }

        let label = match target {
            SlotTarget::Label(label) => Some(label.clone()),
            _ => None,
        };

        match self.position(target) {
            Some(i) => {
                let old = std::mem::replace(&mut self.entries[i].value, value);
                Ok(Some(old))
            }
            None => {
                self.entries.push(SlotEntry { label, value });
                Ok(None)
            }
        }
    }

    /// Remove and return the value at `target`.
    pub fn remove(&mut self, target: &SlotTarget) -> Option<AttachmentValue> {
        self.position(target)
            .map(|i| self.entries.remove(i).value)
    }

    /// Drain every entry, e.g. when the owning record is deleted.
    pub fn take_all(&mut self) -> Vec<AttachmentValue> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|e| e.value)
            .collect()
    }

    pub(crate) fn push_entry(&mut self, entry: SlotEntry) {
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(kind: &str) -> AttachmentValue {
        AttachmentValue {
            key: Uuid::new_v4(),
            kind: kind.to_string(),
            content_type: "text/plain".to_string(),
            extension: Some("txt".to_string()),
            length: 11,
            store_name: None,
            directory: None,
            extra: BTreeMap::new(),
            variants: BTreeMap::new(),
        }
    }

    #[test]
    fn test_path_derivation() {
        let mut v = value("file");
        let key = v.key;
        assert_eq!(v.path(), format!("{}.txt", key));

        v.directory = Some("avatars".to_string());
        assert_eq!(v.path(), format!("avatars/{}.txt", key));

        v.extension = None;
        assert_eq!(v.path(), format!("avatars/{}", key));
    }

    #[test]
    fn test_all_paths_includes_variants() {
        let mut v = value("file");
        v.variants.insert("thumb".to_string(), value("file"));

        let paths = v.all_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], v.path());
    }

    #[test]
    fn test_single_slot_replace() {
        let declared = Arc::new(AttachmentType::new("file"));
        let mut slot = AttachmentSlot::new(declared);

        let first = value("file");
        let replaced = slot.assign(&SlotTarget::Single, first.clone()).unwrap();
        assert!(replaced.is_none());
        assert_eq!(slot.len(), 1);

        let second = value("file");
        let replaced = slot.assign(&SlotTarget::Single, second.clone()).unwrap();
        assert_eq!(replaced.unwrap().key, first.key);
        assert_eq!(slot.value().unwrap().key, second.key);
        assert_eq!(slot.len(), 1);
    }

    #[test]
    fn test_labeled_and_appended_entries() {
        let declared = Arc::new(AttachmentType::new("file"));
        let mut slot = AttachmentSlot::new(declared);

        slot.assign(&SlotTarget::Append, value("file")).unwrap();
        slot.assign(&SlotTarget::Append, value("file")).unwrap();
        slot.assign(&SlotTarget::Label("cover".to_string()), value("file"))
            .unwrap();
        assert_eq!(slot.len(), 3);
        assert!(slot.get_label("cover").is_some());

        let removed = slot.remove(&SlotTarget::Index(0)).unwrap();
        assert_eq!(slot.len(), 2);
        assert_ne!(slot.get_index(0).unwrap().key, removed.key);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let declared = Arc::new(AttachmentType::new("avatar"));
        let mut slot = AttachmentSlot::new(declared);

        let err = slot
            .assign(&SlotTarget::Single, value("document"))
            .unwrap_err();
        assert!(matches!(err, AttachError::TypeMismatch { .. }));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_take_all() {
        let declared = Arc::new(AttachmentType::new("file"));
        let mut slot = AttachmentSlot::new(declared);
        slot.assign(&SlotTarget::Append, value("file")).unwrap();
        slot.assign(&SlotTarget::Append, value("file")).unwrap();

        let drained = slot.take_all();
        assert_eq!(drained.len(), 2);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_content_type_allowed() {
        let c = Constraints::new()
            .allow_content_type("text/plain")
            .allow_content_type("image/*");

        assert!(c.is_content_type_allowed("text/plain"));
        assert!(c.is_content_type_allowed("image/png"));
        assert!(!c.is_content_type_allowed("application/pdf"));

        let open = Constraints::new();
        assert!(open.is_content_type_allowed("anything/goes"));
    }
}
