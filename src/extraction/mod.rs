//! Text extraction from uploaded images and PDFs.
//!
//! Extraction is sequential: the primary engine runs first and the vision model is only
//! consulted when the primary result looks unreliable. Which transcript wins is decided by the
//! pure functions in this module so the policy can be tested without any engine.

mod image;
mod pdf;

pub use image::ImageTextExtractor;
pub use pdf::{DocumentTextExtractor, read_text_layer};

use crate::config::VISION_LENGTH_GAIN;
use crate::ocr::OcrError;
use serde::Serialize;
use thiserror::Error;

/// Engine that produced an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionSource {
    /// Local OCR engine.
    PrimaryOcr,
    /// Multimodal model transcription.
    VisionFallback,
    /// Embedded PDF text layer.
    PdfTextLayer,
}

impl ExtractionSource {
    /// Stable tag used in logs and responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryOcr => "primary-ocr",
            Self::VisionFallback => "vision-fallback",
            Self::PdfTextLayer => "pdf-text-layer",
        }
    }
}

/// Text extracted from an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// Extracted text, always trimmed.
    pub text: String,
    /// Engine that produced `text`.
    pub source: ExtractionSource,
    /// OCR confidence on a 0-100 scale, present only for primary OCR output.
    pub confidence: Option<f32>,
}

impl ExtractionResult {
    /// Build a result, trimming the text.
    pub fn new(text: impl AsRef<str>, source: ExtractionSource, confidence: Option<f32>) -> Self {
        Self {
            text: text.as_ref().trim().to_string(),
            source,
            confidence,
        }
    }

    /// Length of the text in Unicode scalar values.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Errors that abort extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The primary OCR engine failed on an image.
    #[error("Failed to extract text from image: {0}")]
    Ocr(#[from] OcrError),
    /// The PDF could not be parsed.
    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),
}

impl ExtractionError {
    /// Name of the engine that failed.
    pub fn engine(&self) -> &'static str {
        match self {
            Self::Ocr(_) => "ocr",
            Self::Pdf(_) => "pdf-text-layer",
        }
    }
}

/// Whether an OCR result is weak enough to consult the vision fallback.
pub fn needs_escalation(confidence: f32, threshold: f32) -> bool {
    confidence < threshold
}

/// Pick between a primary OCR result and an optional vision transcript.
///
/// The transcript replaces the primary text only when it is more than 20% longer, so a failed
/// or truncated fallback can never win.
pub fn choose_extraction(primary: ExtractionResult, fallback: Option<String>) -> ExtractionResult {
    prefer_fallback(primary, fallback, VISION_LENGTH_GAIN)
}

/// Pick between a PDF text layer and an optional vision transcript; any strictly longer
/// transcript wins.
pub fn choose_pdf_extraction(
    text_layer: ExtractionResult,
    fallback: Option<String>,
) -> ExtractionResult {
    prefer_fallback(text_layer, fallback, 1.0)
}

fn prefer_fallback(
    primary: ExtractionResult,
    fallback: Option<String>,
    gain: f64,
) -> ExtractionResult {
    let Some(candidate) = fallback else {
        return primary;
    };
    let candidate = ExtractionResult::new(candidate, ExtractionSource::VisionFallback, None);
    if candidate.char_len() as f64 > primary.char_len() as f64 * gain {
        candidate
    } else {
        primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ocr(text: &str, confidence: f32) -> ExtractionResult {
        ExtractionResult::new(text, ExtractionSource::PrimaryOcr, Some(confidence))
    }

    #[test]
    fn result_text_is_trimmed() {
        let result = ocr("  padded text \n", 80.0);
        assert_eq!(result.text, "padded text");
        assert_eq!(result.char_len(), 11);
    }

    #[test]
    fn escalation_only_below_threshold() {
        assert!(needs_escalation(69.9, 70.0));
        assert!(!needs_escalation(70.0, 70.0));
        assert!(!needs_escalation(85.0, 70.0));
    }

    #[test]
    fn fallback_must_exceed_primary_by_twenty_percent() {
        let primary = ocr(&"a".repeat(100), 40.0);

        let exactly_twenty = choose_extraction(primary.clone(), Some("b".repeat(120)));
        assert_eq!(exactly_twenty.source, ExtractionSource::PrimaryOcr);

        let above = choose_extraction(primary, Some("b".repeat(121)));
        assert_eq!(above.source, ExtractionSource::VisionFallback);
        assert_eq!(above.confidence, None);
    }

    #[test]
    fn missing_fallback_keeps_primary() {
        let primary = ocr("text", 10.0);
        assert_eq!(choose_extraction(primary.clone(), None), primary);
    }

    #[test]
    fn chosen_result_never_shorter_than_primary() {
        let primary = ocr(&"x".repeat(50), 30.0);
        for len in [0, 10, 50, 59, 60, 61, 500] {
            let chosen = choose_extraction(primary.clone(), Some("y".repeat(len)));
            assert!(chosen.char_len() >= primary.char_len(), "fallback len {len}");
        }
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let primary = ocr(&"e".repeat(10), 30.0);
        // 13 two-byte characters: 26 bytes but only 13 chars, which beats 12.
        let chosen = choose_extraction(primary.clone(), Some("é".repeat(13)));
        assert_eq!(chosen.source, ExtractionSource::VisionFallback);
        let chosen = choose_extraction(primary, Some("é".repeat(12)));
        assert_eq!(chosen.source, ExtractionSource::PrimaryOcr);
    }

    #[test]
    fn pdf_fallback_wins_when_strictly_longer() {
        let layer = ExtractionResult::new("short", ExtractionSource::PdfTextLayer, None);
        let same = choose_pdf_extraction(layer.clone(), Some("equal".into()));
        assert_eq!(same.source, ExtractionSource::PdfTextLayer);
        let longer = choose_pdf_extraction(layer, Some("longer".into()));
        assert_eq!(longer.source, ExtractionSource::VisionFallback);
    }

    #[test]
    fn source_tags_are_kebab_case() {
        assert_eq!(ExtractionSource::VisionFallback.as_str(), "vision-fallback");
        assert_eq!(
            serde_json::to_value(ExtractionSource::PdfTextLayer).unwrap(),
            "pdf-text-layer"
        );
    }
}
