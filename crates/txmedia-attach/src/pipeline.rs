//! Content pipeline
//!
//! An ordered analyzer → validator → processor chain, run synchronously
//! inside every attach before any store operation is queued:
//!
//! 1. Analyzers extract metadata into an accumulating [`ContentInfo`]; an
//!    analyzer that cannot interpret the content contributes nothing unless
//!    it was registered as required.
//! 2. Validators check the accumulated metadata against the declared
//!    [`Constraints`]; the first failure aborts the attach with no side
//!    effects.
//! 3. Processors may transform the content and emit derived variants
//!    (e.g. thumbnails) that are stored atomically with the primary value.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{AttachError, ValidationError};
use crate::model::Constraints;

/// Metadata accumulated by analyzers; later stages read earlier output.
#[derive(Debug, Clone, Default)]
pub struct ContentInfo {
    /// Sniffed (or, after resolution, effective) content type.
    pub content_type: Option<String>,
    pub extension: Option<String>,
    pub length: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Hex-encoded SHA-256 of the content.
    pub checksum: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// Caller-supplied hints for a single attach.
#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    /// Declared content type; the sniffed type wins over it unless the
    /// attachment type pins one.
    pub content_type: Option<String>,
    /// File extension without the leading dot.
    pub extension: Option<String>,
}

impl AttachOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into().trim_start_matches('.').to_string());
        self
    }
}

/// Why an analyzer or processor could not do its work.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StageError(String);

impl StageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Extracts metadata from content.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Contribute metadata to `info`. Returning an error means the analyzer
    /// could not interpret the content; the pipeline ignores it unless the
    /// analyzer is required.
    fn analyze(&self, data: &[u8], info: &mut ContentInfo) -> Result<(), StageError>;
}

/// Accepts or rejects content based on analyzed metadata and constraints.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, info: &ContentInfo, constraints: &Constraints)
        -> Result<(), ValidationError>;
}

/// Content derived by a processor, stored as a variant of the primary value.
#[derive(Debug, Clone)]
pub struct DerivedContent {
    /// Variant label, e.g. "thumbnail".
    pub label: String,
    pub data: Bytes,
    pub content_type: String,
    pub extension: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// What a processor produced.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Replacement for the primary content, if the processor transformed it.
    pub content: Option<Bytes>,
    pub derived: Vec<DerivedContent>,
}

/// Transforms content and/or derives additional variants.
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, data: &Bytes, info: &ContentInfo) -> Result<ProcessOutput, StageError>;
}

/// Result of a full pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub info: ContentInfo,
    pub content: Bytes,
    pub derived: Vec<DerivedContent>,
}

struct AnalyzerStage {
    analyzer: Arc<dyn Analyzer>,
    required: bool,
}

/// Ordered analyzer/validator/processor chain.
#[derive(Clone)]
pub struct Pipeline {
    analyzers: Vec<Arc<AnalyzerStage>>,
    validators: Vec<Arc<dyn Validator>>,
    processors: Vec<Arc<dyn Processor>>,
}

impl Pipeline {
    /// Pipeline with no stages at all.
    pub fn empty() -> Self {
        Self {
            analyzers: Vec::new(),
            validators: Vec::new(),
            processors: Vec::new(),
        }
    }

    /// The default chain: content-type sniffing, checksum, image dimensions,
    /// length and content-type validation.
    pub fn standard() -> Self {
        Self::empty()
            .analyzer(ContentTypeAnalyzer)
            .analyzer(ChecksumAnalyzer)
            .analyzer(ImageAnalyzer)
            .validator(LengthValidator)
            .validator(ContentTypeValidator)
    }

    pub fn analyzer(mut self, analyzer: impl Analyzer + 'static) -> Self {
        self.analyzers.push(Arc::new(AnalyzerStage {
            analyzer: Arc::new(analyzer),
            required: false,
        }));
        self
    }

    /// Like [`Pipeline::analyzer`], but a failure fails the whole attach.
    pub fn required_analyzer(mut self, analyzer: impl Analyzer + 'static) -> Self {
        self.analyzers.push(Arc::new(AnalyzerStage {
            analyzer: Arc::new(analyzer),
            required: true,
        }));
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    fn run_analyzers(&self, data: &[u8], info: &mut ContentInfo) -> Result<(), AttachError> {
        for stage in &self.analyzers {
            match stage.analyzer.analyze(data, info) {
                Ok(()) => {}
                Err(e) if stage.required => {
                    return Err(AttachError::Analysis {
                        name: stage.analyzer.name(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    debug!(analyzer = stage.analyzer.name(), reason = %e, "analyzer skipped");
                }
            }
        }
        Ok(())
    }

    /// Run the full chain. Side-effect-free: a failure at any stage leaves
    /// nothing behind for the caller to undo.
    pub fn run(
        &self,
        content: Bytes,
        pinned_content_type: Option<&str>,
        constraints: &Constraints,
        opts: &AttachOptions,
    ) -> Result<PipelineOutcome, AttachError> {
        let mut info = ContentInfo {
            length: content.len() as u64,
            extension: opts.extension.clone(),
            ..ContentInfo::default()
        };

        self.run_analyzers(&content, &mut info)?;
        info.content_type = Some(resolve_content_type(
            pinned_content_type,
            info.content_type.as_deref(),
            opts.content_type.as_deref(),
            info.extension.as_deref(),
        ));

        for validator in &self.validators {
            validator.validate(&info, constraints)?;
        }

        let mut content = content;
        let mut derived = Vec::new();
        let mut replaced = false;
        for processor in &self.processors {
            let mut output =
                processor
                    .process(&content, &info)
                    .map_err(|e| AttachError::Process {
                        name: processor.name(),
                        reason: e.to_string(),
                    })?;
            derived.append(&mut output.derived);
            if let Some(new_content) = output.content {
                content = new_content;
                replaced = true;
            }
        }

        // A transformed payload invalidates length, checksum, and dimensions;
        // re-analyze so the recorded metadata describes the stored bytes.
        if replaced {
            info.length = content.len() as u64;
            let sniffed_before = info.content_type.clone();
            info.checksum = None;
            info.width = None;
            info.height = None;
            info.content_type = None;
            self.run_analyzers(&content, &mut info)?;
            info.content_type = Some(resolve_content_type(
                pinned_content_type,
                info.content_type.as_deref(),
                sniffed_before.as_deref(),
                info.extension.as_deref(),
            ));
        }

        Ok(PipelineOutcome {
            info,
            content,
            derived,
        })
    }
}

/// Sniffed type wins over the declared one unless a pinned type overrides
/// both; extension-based guessing is the last resort.
fn resolve_content_type(
    pinned: Option<&str>,
    sniffed: Option<&str>,
    declared: Option<&str>,
    extension: Option<&str>,
) -> String {
    if let Some(pinned) = pinned {
        return pinned.to_string();
    }
    if let Some(sniffed) = sniffed {
        return sniffed.to_string();
    }
    if let Some(declared) = declared {
        return declared.to_string();
    }
    extension
        .and_then(|ext| mime_guess::from_ext(ext).first())
        .map(|m| m.to_string())
        .unwrap_or_else(|| mime_guess::mime::APPLICATION_OCTET_STREAM.to_string())
}

/// Magic-byte content-type sniffing.
pub struct ContentTypeAnalyzer;

impl Analyzer for ContentTypeAnalyzer {
    fn name(&self) -> &'static str {
        "content-type"
    }

    fn analyze(&self, data: &[u8], info: &mut ContentInfo) -> Result<(), StageError> {
        let kind = infer::get(data).ok_or_else(|| StageError::new("unrecognized content"))?;
        info.content_type = Some(kind.mime_type().to_string());
        if info.extension.is_none() {
            info.extension = Some(kind.extension().to_string());
        }
        Ok(())
    }
}

/// SHA-256 checksum of the content.
pub struct ChecksumAnalyzer;

impl Analyzer for ChecksumAnalyzer {
    fn name(&self) -> &'static str {
        "checksum"
    }

    fn analyze(&self, data: &[u8], info: &mut ContentInfo) -> Result<(), StageError> {
        let mut hasher = Sha256::new();
        hasher.update(data);
        info.checksum = Some(hex::encode(hasher.finalize()));
        Ok(())
    }
}

/// Pixel dimensions for PNG, GIF, and JPEG content.
pub struct ImageAnalyzer;

impl Analyzer for ImageAnalyzer {
    fn name(&self) -> &'static str {
        "image"
    }

    fn analyze(&self, data: &[u8], info: &mut ContentInfo) -> Result<(), StageError> {
        let (width, height) = png_dimensions(data)
            .or_else(|| gif_dimensions(data))
            .or_else(|| jpeg_dimensions(data))
            .ok_or_else(|| StageError::new("not a supported image format"))?;
        info.width = Some(width);
        info.height = Some(height);
        Ok(())
    }
}

fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if data.len() < 24 || &data[..8] != SIGNATURE || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some((width, height))
}

fn gif_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 10 || (&data[..6] != b"GIF87a" && &data[..6] != b"GIF89a") {
        return None;
    }
    let width = u16::from_le_bytes(data[6..8].try_into().ok()?) as u32;
    let height = u16::from_le_bytes(data[8..10].try_into().ok()?) as u32;
    Some((width, height))
}

fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        // Standalone markers carry no length field
        if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
            i += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if matches!(marker, 0xC0 | 0xC1 | 0xC2 | 0xC3) {
            if i + 9 > data.len() {
                return None;
            }
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
            return Some((width, height));
        }
        i += 2 + len;
    }
    None
}

/// Enforces `min_length`/`max_length`.
pub struct LengthValidator;

impl Validator for LengthValidator {
    fn name(&self) -> &'static str {
        "length"
    }

    fn validate(
        &self,
        info: &ContentInfo,
        constraints: &Constraints,
    ) -> Result<(), ValidationError> {
        if let Some(min) = constraints.min_length {
            if info.length < min {
                return Err(ValidationError::MinimumLengthNotReached {
                    length: info.length,
                    min,
                });
            }
        }
        if let Some(max) = constraints.max_length {
            if info.length > max {
                return Err(ValidationError::MaximumLengthExceeded {
                    length: info.length,
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Enforces the allowed content-type list.
pub struct ContentTypeValidator;

impl Validator for ContentTypeValidator {
    fn name(&self) -> &'static str {
        "content-type"
    }

    fn validate(
        &self,
        info: &ContentInfo,
        constraints: &Constraints,
    ) -> Result<(), ValidationError> {
        let content_type = info.content_type.as_deref().unwrap_or("");
        if !constraints.is_content_type_allowed(content_type) {
            return Err(ValidationError::ContentTypeNotAllowed(
                content_type.to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional pixel-dimension bounds for image content.
///
/// Content without analyzable dimensions passes; pair with a content-type
/// constraint when only images should be accepted at all.
#[derive(Default)]
pub struct ImageValidator {
    min: Option<(u32, u32)>,
    max: Option<(u32, u32)>,
}

impl ImageValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_size(mut self, width: u32, height: u32) -> Self {
        self.min = Some((width, height));
        self
    }

    pub fn max_size(mut self, width: u32, height: u32) -> Self {
        self.max = Some((width, height));
        self
    }
}

impl Validator for ImageValidator {
    fn name(&self) -> &'static str {
        "image"
    }

    fn validate(
        &self,
        info: &ContentInfo,
        _constraints: &Constraints,
    ) -> Result<(), ValidationError> {
        let (Some(width), Some(height)) = (info.width, info.height) else {
            return Ok(());
        };
        let out_of_range = self
            .min
            .is_some_and(|(w, h)| width < w || height < h)
            || self.max.is_some_and(|(w, h)| width > w || height > h);
        if out_of_range {
            return Err(ValidationError::ImageDimensionsOutOfRange { width, height });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89,
    ];

    fn run_standard(content: &'static [u8], opts: AttachOptions) -> PipelineOutcome {
        Pipeline::standard()
            .run(Bytes::from_static(content), None, &Constraints::new(), &opts)
            .unwrap()
    }

    #[test]
    fn test_png_sniffing_and_dimensions() {
        let outcome = run_standard(PNG_1X1, AttachOptions::new());
        assert_eq!(outcome.info.content_type.as_deref(), Some("image/png"));
        assert_eq!(outcome.info.extension.as_deref(), Some("png"));
        assert_eq!(outcome.info.width, Some(1));
        assert_eq!(outcome.info.height, Some(1));
        assert!(outcome.info.checksum.is_some());
    }

    #[test]
    fn test_sniffed_type_wins_over_declared() {
        let opts = AttachOptions::new().content_type("text/plain");
        let outcome = run_standard(PNG_1X1, opts);
        assert_eq!(outcome.info.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_pinned_type_wins_over_sniffed() {
        let outcome = Pipeline::standard()
            .run(
                Bytes::from_static(PNG_1X1),
                Some("application/x-custom"),
                &Constraints::new(),
                &AttachOptions::new(),
            )
            .unwrap();
        assert_eq!(
            outcome.info.content_type.as_deref(),
            Some("application/x-custom")
        );
    }

    #[test]
    fn test_declared_type_used_when_sniffing_fails() {
        let opts = AttachOptions::new()
            .content_type("text/plain")
            .extension(".txt");
        let outcome = run_standard(b"Simple text.", opts);
        assert_eq!(outcome.info.content_type.as_deref(), Some("text/plain"));
        assert_eq!(outcome.info.extension.as_deref(), Some("txt"));
    }

    #[test]
    fn test_extension_guess_as_last_resort() {
        let opts = AttachOptions::new().extension("json");
        let outcome = run_standard(b"{}", opts);
        assert_eq!(
            outcome.info.content_type.as_deref(),
            Some("application/json")
        );
    }

    #[test]
    fn test_octet_stream_fallback() {
        let outcome = run_standard(b"????", AttachOptions::new());
        assert_eq!(
            outcome.info.content_type.as_deref(),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn test_min_length_violation() {
        let constraints = Constraints::new().min_length(20);
        let err = Pipeline::standard()
            .run(
                Bytes::from_static(b"only 12 byte"),
                None,
                &constraints,
                &AttachOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AttachError::Validation(ValidationError::MinimumLengthNotReached { length: 12, min: 20 })
        ));
    }

    #[test]
    fn test_max_length_violation() {
        let constraints = Constraints::new().max_length(30);
        let err = Pipeline::standard()
            .run(
                Bytes::from_static(b"thirty three bytes of content !!!"),
                None,
                &constraints,
                &AttachOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AttachError::Validation(ValidationError::MaximumLengthExceeded { length: 33, max: 30 })
        ));
    }

    #[test]
    fn test_zero_length_permitted_without_constraints() {
        let outcome = run_standard(b"", AttachOptions::new());
        assert_eq!(outcome.info.length, 0);
    }

    #[test]
    fn test_content_type_not_allowed() {
        let constraints = Constraints::new().allow_content_type("image/*");
        let err = Pipeline::standard()
            .run(
                Bytes::from_static(b"plain text"),
                None,
                &constraints,
                &AttachOptions::new().content_type("text/plain"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AttachError::Validation(ValidationError::ContentTypeNotAllowed(_))
        ));
    }

    #[test]
    fn test_required_analyzer_failure_is_fatal() {
        let pipeline = Pipeline::empty().required_analyzer(ImageAnalyzer);
        let err = pipeline
            .run(
                Bytes::from_static(b"not an image"),
                None,
                &Constraints::new(),
                &AttachOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(err, AttachError::Analysis { name: "image", .. }));
    }

    #[test]
    fn test_image_validator_bounds() {
        let validator = ImageValidator::new().min_size(2, 2);
        let mut info = ContentInfo::default();
        info.width = Some(1);
        info.height = Some(1);
        let err = validator.validate(&info, &Constraints::new()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ImageDimensionsOutOfRange { width: 1, height: 1 }
        ));

        // No dimensions means nothing to check
        let no_dims = ContentInfo::default();
        assert!(validator.validate(&no_dims, &Constraints::new()).is_ok());
    }

    #[test]
    fn test_gif_and_jpeg_dimensions() {
        let gif = b"GIF89a\x0A\x00\x10\x00rest";
        assert_eq!(gif_dimensions(gif), Some((10, 16)));

        // Minimal JPEG: SOI, APP0 (empty), SOF0 with 8x4 dimensions
        let jpeg: Vec<u8> = [
            &[0xFF, 0xD8][..],
            &[0xFF, 0xE0, 0x00, 0x02][..],
            &[0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x04, 0x00, 0x08, 0x01, 0x00, 0x11, 0x00][..],
        ]
        .concat();
        assert_eq!(jpeg_dimensions(&jpeg), Some((8, 4)));

        assert_eq!(jpeg_dimensions(b"GIF89a"), None);
    }

    #[test]
    fn test_processor_transform_and_derive() {
        struct Truncate;
        impl Processor for Truncate {
            fn name(&self) -> &'static str {
                "truncate"
            }
            fn process(
                &self,
                data: &Bytes,
                _info: &ContentInfo,
            ) -> Result<ProcessOutput, StageError> {
                Ok(ProcessOutput {
                    content: Some(data.slice(..4)),
                    derived: vec![DerivedContent {
                        label: "preview".to_string(),
                        data: data.slice(..2),
                        content_type: "text/plain".to_string(),
                        extension: Some("txt".to_string()),
                        extra: BTreeMap::new(),
                    }],
                })
            }
        }

        let outcome = Pipeline::standard()
            .processor(Truncate)
            .run(
                Bytes::from_static(b"abcdefgh"),
                None,
                &Constraints::new(),
                &AttachOptions::new().content_type("text/plain"),
            )
            .unwrap();

        assert_eq!(outcome.content, Bytes::from_static(b"abcd"));
        // Metadata re-analyzed after the transform
        assert_eq!(outcome.info.length, 4);
        assert_eq!(outcome.derived.len(), 1);
        assert_eq!(outcome.derived[0].label, "preview");
        assert_eq!(outcome.derived[0].data, Bytes::from_static(b"ab"));
    }
}
