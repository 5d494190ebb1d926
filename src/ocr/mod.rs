//! Primary OCR engine abstraction.
//!
//! The pipeline only needs text plus a self-reported confidence, so the trait stays small and
//! the Tesseract adapter is one implementation among possible others.

mod tesseract;

pub use tesseract::TesseractEngine;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by OCR engines.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Engine binary or runtime is missing on this host.
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),
    /// Engine ran but reported a failure.
    #[error("OCR engine failed: {0}")]
    Failed(String),
    /// Engine exceeded its time budget and was killed.
    #[error("OCR engine timed out after {0:?}")]
    TimedOut(Duration),
    /// Temporary file handling failed.
    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text recognized by an OCR engine.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    /// Recognized text, trimmed.
    pub text: String,
    /// Mean word confidence on a 0-100 scale.
    pub confidence: f32,
}

/// Interface implemented by local OCR engines.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an encoded image.
    async fn recognize(&self, bytes: &[u8]) -> Result<OcrOutput, OcrError>;
}
