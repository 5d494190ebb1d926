use std::sync::Arc;

use super::{
    ExtractionError, ExtractionResult, ExtractionSource, choose_extraction, needs_escalation,
};
use crate::config::OCR_CONFIDENCE_THRESHOLD;
use crate::llm::VisionExtractor;
use crate::ocr::OcrEngine;

/// Extracts text from images with local OCR, escalating weak results to a vision model.
#[derive(Clone)]
pub struct ImageTextExtractor {
    ocr: Arc<dyn OcrEngine>,
    vision: Option<Arc<dyn VisionExtractor>>,
    confidence_threshold: f32,
}

impl ImageTextExtractor {
    /// Create an extractor. Without a vision model, OCR output is always returned as-is.
    pub fn new(ocr: Arc<dyn OcrEngine>, vision: Option<Arc<dyn VisionExtractor>>) -> Self {
        Self {
            ocr,
            vision,
            confidence_threshold: OCR_CONFIDENCE_THRESHOLD,
        }
    }

    /// Override the escalation threshold.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Extract text from an encoded image.
    ///
    /// Fails only when the OCR engine fails. A failing vision call is logged and the OCR
    /// result is kept.
    pub async fn extract(
        &self,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        let output = self.ocr.recognize(bytes).await?;
        let primary = ExtractionResult::new(
            &output.text,
            ExtractionSource::PrimaryOcr,
            Some(output.confidence),
        );
        tracing::info!(
            chars = primary.char_len(),
            confidence = output.confidence,
            "Primary OCR completed"
        );

        let vision = match &self.vision {
            Some(vision) if needs_escalation(output.confidence, self.confidence_threshold) => {
                vision
            }
            _ => return Ok(primary),
        };

        tracing::info!(
            confidence = output.confidence,
            threshold = self.confidence_threshold,
            "Low OCR confidence; consulting vision fallback"
        );
        let fallback = match vision.extract_verbatim(bytes, media_type).await {
            Ok(text) => Some(text),
            Err(error) => {
                tracing::warn!(error = %error, "Vision fallback failed; keeping OCR result");
                None
            }
        };

        let chosen = choose_extraction(primary, fallback);
        tracing::info!(
            source = chosen.source.as_str(),
            chars = chosen.char_len(),
            "Image extraction resolved"
        );
        Ok(chosen)
    }
}
