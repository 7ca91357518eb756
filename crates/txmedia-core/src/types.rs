//! Common types used throughout txmedia

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the owning transaction context.
///
/// Supplied by the surrounding mapping layer; the lifecycle manager binds at
/// most one scope to a given transaction id at a time.
pub type TransactionId = Uuid;

/// Coarse content category derived from a MIME type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Other,
}

impl ContentCategory {
    pub fn from_mime_type(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else if mime.contains("pdf") || mime.contains("msword") || mime.starts_with("text/") {
            Self::Document
        } else if mime.contains("zip") || mime.contains("tar") || mime.contains("gzip") {
            Self::Archive
        } else {
            Self::Other
        }
    }
}

/// Human-readable byte count, e.g. "1.5 KB".
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let size = bytes as f64;
    let base = 1024.0_f64;
    let i = (size.ln() / base.ln()).floor() as usize;
    let i = i.min(UNITS.len() - 1);

    let value = size / base.powi(i as i32);
    format!("{:.1} {}", value, UNITS[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_category() {
        assert_eq!(
            ContentCategory::from_mime_type("image/png"),
            ContentCategory::Image
        );
        assert_eq!(
            ContentCategory::from_mime_type("text/plain"),
            ContentCategory::Document
        );
        assert_eq!(
            ContentCategory::from_mime_type("application/zip"),
            ContentCategory::Archive
        );
        assert_eq!(
            ContentCategory::from_mime_type("application/octet-stream"),
            ContentCategory::Other
        );
    }

    #[test]
    fn test_human_size() {
        let cases = [
            (0, "0 B"),
            (512, "512.0 B"),
            (1024, "1.0 KB"),
            (1536, "1.5 KB"),
            (1024 * 1024, "1.0 MB"),
        ];
        for (size, expected) in cases {
            assert_eq!(human_size(size), expected, "size: {}", size);
        }
    }
}
