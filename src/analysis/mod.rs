//! Structured document analysis with a bounded wall-clock budget.
//!
//! Analysis is advisory: every failure is classified into an [`AnalysisFailure`] so the upload
//! pipeline can persist the note without an analysis and tell the caller why.

mod parse;
mod prompt;
mod types;

pub use parse::{ModelOutput, first_balanced_object, parse_model_output};
pub use prompt::build_analysis_prompt;
pub use types::{AnalysisResult, Category, Entities, Sentiment};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::ANALYSIS_TIMEOUT;
use crate::llm::{LlmError, TextGenerator};

/// Errors produced while analysing a document.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No text generator is configured.
    #[error("AI analysis not configured")]
    Unconfigured,
    /// The model did not answer inside the budget.
    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),
    /// The provider rejected or failed the request.
    #[error(transparent)]
    Provider(#[from] LlmError),
    /// The model answered but no analysis could be decoded.
    #[error("Failed to parse LLM response")]
    ParseFailed {
        /// Raw model response.
        raw: String,
    },
}

impl AnalysisError {
    /// Map the error onto the failure vocabulary reported to callers.
    pub fn classify(&self) -> AnalysisFailure {
        match self {
            Self::Unconfigured => AnalysisFailure::Unconfigured,
            Self::Timeout(_) => AnalysisFailure::Timeout,
            Self::ParseFailed { .. } => AnalysisFailure::Unknown,
            Self::Provider(error) => classify_provider_error(error),
        }
    }
}

fn classify_provider_error(error: &LlmError) -> AnalysisFailure {
    let message = error.to_string().to_lowercase();
    let status = error.status();

    if message.contains("quota") {
        AnalysisFailure::QuotaExceeded
    } else if status == Some(429)
        || message.contains("rate limit")
        || message.contains("rate_limit")
        || message.contains("resource_exhausted")
    {
        AnalysisFailure::RateLimited
    } else if matches!(status, Some(408 | 504))
        || message.contains("timeout")
        || message.contains("timed out")
        || message.contains("deadline")
    {
        AnalysisFailure::Timeout
    } else if matches!(status, Some(401 | 403))
        || message.contains("api key")
        || message.contains("api_key")
        || message.contains("unauthenticated")
        || message.contains("permission_denied")
    {
        AnalysisFailure::CredentialInvalid
    } else {
        AnalysisFailure::Unknown
    }
}

/// Why a note was stored without an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisFailure {
    /// Provider quota is exhausted.
    QuotaExceeded,
    /// Provider is throttling requests.
    RateLimited,
    /// The budget elapsed before an answer arrived.
    Timeout,
    /// The credential was rejected.
    CredentialInvalid,
    /// No credential is configured.
    Unconfigured,
    /// Anything else, including unparseable output.
    Unknown,
}

impl AnalysisFailure {
    /// Stable machine-readable tag.
    pub fn code(self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota-exceeded",
            Self::RateLimited => "rate-limited",
            Self::Timeout => "timeout",
            Self::CredentialInvalid => "credential-invalid",
            Self::Unconfigured => "unconfigured",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable reason shown to the uploader.
    pub fn reason(self) -> &'static str {
        match self {
            Self::QuotaExceeded => "API quota exceeded. Please try again later.",
            Self::RateLimited => "Rate limit exceeded. Please wait a moment and try again.",
            Self::Timeout => "Analysis timed out. Please try again.",
            Self::CredentialInvalid => "AI analysis credential is invalid. Please check configuration.",
            Self::Unconfigured => "AI analysis not configured.",
            Self::Unknown => "AI analysis temporarily unavailable.",
        }
    }
}

/// Runs the analysis prompt against a text generator under a timeout.
#[derive(Clone)]
pub struct AnalysisEngine {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl AnalysisEngine {
    /// Create an engine with the default 30 second budget.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            timeout: ANALYSIS_TIMEOUT,
        }
    }

    /// Override the wall-clock budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Analyse `text`.
    ///
    /// When the budget elapses the in-flight request future is dropped, which cancels it.
    pub async fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError> {
        let prompt = build_analysis_prompt(text);
        let raw = match tokio::time::timeout(self.timeout, self.generator.generate(&prompt)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(AnalysisError::Timeout(self.timeout)),
        };

        match parse_model_output(&raw) {
            ModelOutput::Parsed(result) => Ok(result),
            ModelOutput::Unparseable(raw) => {
                tracing::warn!(chars = raw.chars().count(), "Model output was not valid analysis JSON");
                Err(AnalysisError::ParseFailed { raw })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    enum Script {
        Reply(&'static str),
        Fail(u16, &'static str),
        Hang,
    }

    struct ScriptedGenerator(Script);

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            match &self.0 {
                Script::Reply(text) => Ok((*text).to_string()),
                Script::Fail(status, message) => Err(LlmError::Api {
                    status: *status,
                    message: (*message).to_string(),
                }),
                Script::Hang => std::future::pending().await,
            }
        }
    }

    fn engine(script: Script) -> AnalysisEngine {
        AnalysisEngine::new(Arc::new(ScriptedGenerator(script)))
    }

    #[tokio::test]
    async fn parses_fenced_model_reply() {
        let result = engine(Script::Reply(
            "```json\n{\"summary\":\"Lecture notes\",\"category\":\"study\",\"keyPoints\":[\"a\",\"b\"]}\n```",
        ))
        .analyze("text")
        .await
        .expect("analysis");

        assert_eq!(result.summary, "Lecture notes");
        assert_eq!(result.category, Category::Study);
        assert_eq!(result.key_points.len(), 2);
    }

    #[tokio::test]
    async fn hanging_model_times_out() {
        let error = engine(Script::Hang)
            .with_timeout(Duration::from_millis(20))
            .analyze("text")
            .await
            .expect_err("timeout");

        assert!(matches!(error, AnalysisError::Timeout(_)));
        assert_eq!(error.classify(), AnalysisFailure::Timeout);
    }

    #[tokio::test]
    async fn prose_reply_is_a_parse_failure() {
        let error = engine(Script::Reply("I cannot help with that."))
            .analyze("text")
            .await
            .expect_err("parse failure");

        match &error {
            AnalysisError::ParseFailed { raw } => assert_eq!(raw, "I cannot help with that."),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(error.classify(), AnalysisFailure::Unknown);
    }

    #[tokio::test]
    async fn quota_errors_are_classified() {
        let error = engine(Script::Fail(
            429,
            "RESOURCE_EXHAUSTED: You exceeded your current quota",
        ))
        .analyze("text")
        .await
        .expect_err("quota");
        assert_eq!(error.classify(), AnalysisFailure::QuotaExceeded);
    }

    #[test]
    fn provider_errors_map_to_failure_kinds() {
        let api = |status, message: &str| {
            AnalysisError::Provider(LlmError::Api {
                status,
                message: message.to_string(),
            })
        };

        assert_eq!(
            api(429, "Too many requests").classify(),
            AnalysisFailure::RateLimited
        );
        assert_eq!(
            api(400, "INVALID_ARGUMENT: API key not valid").classify(),
            AnalysisFailure::CredentialInvalid
        );
        assert_eq!(
            api(403, "PERMISSION_DENIED").classify(),
            AnalysisFailure::CredentialInvalid
        );
        assert_eq!(
            api(504, "DEADLINE_EXCEEDED").classify(),
            AnalysisFailure::Timeout
        );
        assert_eq!(
            AnalysisError::Provider(LlmError::Transport("timeout: operation timed out".into()))
                .classify(),
            AnalysisFailure::Timeout
        );
        assert_eq!(
            api(500, "INTERNAL").classify(),
            AnalysisFailure::Unknown
        );
        assert_eq!(
            AnalysisError::Unconfigured.classify(),
            AnalysisFailure::Unconfigured
        );
    }

    #[test]
    fn failure_codes_are_kebab_case() {
        assert_eq!(AnalysisFailure::QuotaExceeded.code(), "quota-exceeded");
        assert_eq!(
            serde_json::to_value(AnalysisFailure::CredentialInvalid).expect("json"),
            "credential-invalid"
        );
    }
}
