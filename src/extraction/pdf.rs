use std::sync::Arc;

use lopdf::Document;

use super::{ExtractionError, ExtractionResult, ExtractionSource, choose_pdf_extraction};
use crate::config::SCANNED_PDF_THRESHOLD;
use crate::llm::VisionExtractor;

const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Extracts the embedded text layer of a PDF, escalating scanned documents to a vision model.
#[derive(Clone)]
pub struct DocumentTextExtractor {
    vision: Option<Arc<dyn VisionExtractor>>,
    scanned_threshold: usize,
}

impl DocumentTextExtractor {
    /// Create an extractor. Without a vision model the text layer is always returned.
    pub fn new(vision: Option<Arc<dyn VisionExtractor>>) -> Self {
        Self {
            vision,
            scanned_threshold: SCANNED_PDF_THRESHOLD,
        }
    }

    /// Override the length under which a PDF is treated as scanned.
    pub fn with_scanned_threshold(mut self, threshold: usize) -> Self {
        self.scanned_threshold = threshold;
        self
    }

    /// Extract text from PDF bytes.
    pub async fn extract(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let owned = bytes.to_vec();
        let text = tokio::task::spawn_blocking(move || read_text_layer(&owned))
            .await
            .map_err(|error| ExtractionError::Pdf(format!("text layer task failed: {error}")))??;
        let text_layer = ExtractionResult::new(text, ExtractionSource::PdfTextLayer, None);
        tracing::info!(chars = text_layer.char_len(), "PDF text layer extracted");

        let vision = match &self.vision {
            Some(vision) if text_layer.char_len() < self.scanned_threshold => vision,
            _ => return Ok(text_layer),
        };

        tracing::info!(
            chars = text_layer.char_len(),
            "PDF looks scanned; consulting vision fallback"
        );
        let fallback = match vision.extract_verbatim(bytes, PDF_MEDIA_TYPE).await {
            Ok(text) => Some(text),
            Err(error) => {
                tracing::warn!(error = %error, "Vision extraction of PDF failed; keeping text layer");
                None
            }
        };
        Ok(choose_pdf_extraction(text_layer, fallback))
    }
}

/// Read the text layer page by page.
///
/// Text runs on a page are joined with single spaces and pages are separated by newlines. Any
/// page failing to decode aborts the whole document.
pub fn read_text_layer(bytes: &[u8]) -> Result<String, ExtractionError> {
    let document = Document::load_mem(bytes)
        .map_err(|error| ExtractionError::Pdf(format!("failed to load PDF: {error}")))?;

    let pages = document.get_pages();
    tracing::debug!(pages = pages.len(), "Parsing PDF text layer");

    let mut page_texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        let raw = document.extract_text(&[*page_number]).map_err(|error| {
            ExtractionError::Pdf(format!("failed to read page {page_number}: {error}"))
        })?;
        page_texts.push(join_runs(&raw));
    }

    Ok(page_texts.join("\n").trim().to_string())
}

fn join_runs(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|run| !run.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
