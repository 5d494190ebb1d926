//! Language-model collaborators used for vision extraction and document analysis.
//!
//! Both roles are traits so the pipeline can run against scripted doubles in tests and the
//! Gemini adapter in production.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by language-model providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Request never produced an HTTP response.
    #[error("Model request failed: {0}")]
    Transport(String),
    /// Provider answered with a non-success status.
    #[error("Model API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Provider-supplied error message.
        message: String,
    },
    /// Provider answered successfully but without any text.
    #[error("Model returned an empty response")]
    EmptyResponse,
    /// Provider response body could not be decoded.
    #[error("Malformed model response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// HTTP status attached to the failure, when the provider produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Transport(format!("timeout: {error}"))
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Multimodal model able to transcribe the text of an image or PDF.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    /// Return the verbatim text visible in `bytes`, without commentary.
    async fn extract_verbatim(&self, bytes: &[u8], media_type: &str) -> Result<String, LlmError>;
}

/// Text model answering a single prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}
