//! Metadata codec
//!
//! Attachment metadata is persisted by the mapping layer as an opaque string
//! (compact JSON). Decoding re-applies the declared type's store and
//! directory defaults so older rows pick up configuration moves, and checks
//! the value's kind against the declared type.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AttachError, AttachResult};
use crate::model::{AttachmentSlot, AttachmentType, AttachmentValue, SlotEntry};

/// Serialize a single attachment value for column storage.
pub fn encode(value: &AttachmentValue) -> AttachResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a single attachment value from column storage.
///
/// `None` or an empty string decodes to `None`: an attachment with no
/// content is absence, not a zero-length record.
pub fn decode(
    encoded: Option<&str>,
    declared: &AttachmentType,
) -> AttachResult<Option<AttachmentValue>> {
    let Some(encoded) = encoded.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let mut value: AttachmentValue = serde_json::from_str(encoded)?;
    check_kind(&value, declared)?;
    apply_defaults(&mut value, declared);
    Ok(Some(value))
}

#[derive(Serialize, Deserialize)]
struct EncodedEntry {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    label: Option<String>,
    value: AttachmentValue,
}

/// Serialize a whole slot (list/dict shapes) for column storage.
///
/// An empty slot encodes to `None`.
pub fn encode_slot(slot: &AttachmentSlot) -> AttachResult<Option<String>> {
    if slot.is_empty() {
        return Ok(None);
    }
    let entries: Vec<EncodedEntry> = slot
        .iter()
        .map(|e| EncodedEntry {
            label: e.label.clone(),
            value: e.value.clone(),
        })
        .collect();
    Ok(Some(serde_json::to_string(&entries)?))
}

/// Deserialize a whole slot from column storage.
pub fn decode_slot(
    encoded: Option<&str>,
    declared: &Arc<AttachmentType>,
) -> AttachResult<AttachmentSlot> {
    let mut slot = AttachmentSlot::new(declared.clone());
    let Some(encoded) = encoded.filter(|s| !s.is_empty()) else {
        return Ok(slot);
    };

    let entries: Vec<EncodedEntry> = serde_json::from_str(encoded)?;
    for mut entry in entries {
        check_kind(&entry.value, declared)?;
        apply_defaults(&mut entry.value, declared);
        slot.push_entry(SlotEntry {
            label: entry.label,
            value: entry.value,
        });
    }
    Ok(slot)
}

fn check_kind(value: &AttachmentValue, declared: &AttachmentType) -> AttachResult<()> {
    if value.kind != declared.name {
        return Err(AttachError::TypeMismatch {
            expected: declared.name.clone(),
            actual: value.kind.clone(),
        });
    }
    Ok(())
}

fn apply_defaults(value: &mut AttachmentValue, declared: &AttachmentType) {
    if value.store_name.is_none() {
        value.store_name = declared.store_name.clone();
    }
    if value.directory.is_none() {
        value.directory = declared.directory.clone();
    }
    for variant in value.variants.values_mut() {
        apply_defaults(variant, declared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn sample(kind: &str) -> AttachmentValue {
        AttachmentValue {
            key: Uuid::new_v4(),
            kind: kind.to_string(),
            content_type: "text/plain".to_string(),
            extension: Some("txt".to_string()),
            length: 12,
            store_name: None,
            directory: None,
            extra: BTreeMap::new(),
            variants: BTreeMap::new(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let declared = AttachmentType::new("file");
        let mut value = sample("file");
        value.extra.insert("checksum".to_string(), "ab12".to_string());

        let encoded = encode(&value).unwrap();
        let decoded = decode(Some(&encoded), &declared).unwrap().unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_empty_decodes_to_none() {
        let declared = AttachmentType::new("file");
        assert!(decode(None, &declared).unwrap().is_none());
        assert!(decode(Some(""), &declared).unwrap().is_none());
    }

    #[test]
    fn test_decode_applies_declared_defaults() {
        let declared = AttachmentType::new("file")
            .store("archive")
            .directory("cv");
        let value = sample("file");

        let encoded = encode(&value).unwrap();
        let decoded = decode(Some(&encoded), &declared).unwrap().unwrap();
        assert_eq!(decoded.store_name.as_deref(), Some("archive"));
        assert_eq!(decoded.directory.as_deref(), Some("cv"));
        assert!(decoded.path().starts_with("cv/"));
    }

    #[test]
    fn test_decode_keeps_explicit_store() {
        let declared = AttachmentType::new("file").store("archive");
        let mut value = sample("file");
        value.store_name = Some("legacy".to_string());

        let encoded = encode(&value).unwrap();
        let decoded = decode(Some(&encoded), &declared).unwrap().unwrap();
        assert_eq!(decoded.store_name.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_decode_rejects_wrong_kind() {
        let declared = AttachmentType::new("avatar");
        let encoded = encode(&sample("document")).unwrap();

        let err = decode(Some(&encoded), &declared).unwrap_err();
        assert!(matches!(
            err,
            AttachError::TypeMismatch { expected, actual }
                if expected == "avatar" && actual == "document"
        ));
    }

    #[test]
    fn test_decode_garbage() {
        let declared = AttachmentType::new("file");
        let err = decode(Some("not json"), &declared).unwrap_err();
        assert!(matches!(err, AttachError::Codec(_)));
    }

    #[test]
    fn test_slot_roundtrip() {
        let declared = Arc::new(AttachmentType::new("photo").directory("gallery"));
        let mut slot = AttachmentSlot::new(declared.clone());
        slot.push_entry(SlotEntry {
            label: None,
            value: sample("photo"),
        });
        slot.push_entry(SlotEntry {
            label: Some("cover".to_string()),
            value: sample("photo"),
        });

        let encoded = encode_slot(&slot).unwrap().unwrap();
        let decoded = decode_slot(Some(&encoded), &declared).unwrap();

        assert_eq!(decoded.len(), 2);
        assert!(decoded.get_label("cover").is_some());
        // Defaults applied on the way in
        assert_eq!(
            decoded.get_index(0).unwrap().directory.as_deref(),
            Some("gallery")
        );
    }

    #[test]
    fn test_empty_slot_encodes_to_none() {
        let declared = Arc::new(AttachmentType::new("photo"));
        let slot = AttachmentSlot::new(declared.clone());
        assert!(encode_slot(&slot).unwrap().is_none());

        let decoded = decode_slot(None, &declared).unwrap();
        assert!(decoded.is_empty());
    }
}
