//! Google Gemini adapter for both vision extraction and analysis prompts.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{LlmError, TextGenerator, VisionExtractor};
use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const VERBATIM_PROMPT: &str = "Extract all text from this document (handwritten or printed). \
Return only the exact text you see, preserving line breaks and formatting. \
Do not add any commentary or explanations.";

/// HTTP client for the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    vision_model: String,
    analysis_model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiClient {
    /// Build a client for the given credential and models.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        vision_model: impl Into<String>,
        analysis_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .user_agent("smartlens/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            vision_model: vision_model.into(),
            analysis_model: analysis_model.into(),
        })
    }

    /// Build a client from configuration; `None` when no credential is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, LlmError> {
        let Some(api_key) = config.gemini_api_key.as_deref() else {
            return Ok(None);
        };
        Self::new(
            config.gemini_base_url.clone(),
            api_key,
            config.gemini_vision_model.clone(),
            config.gemini_analysis_model.clone(),
        )
        .map(Some)
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<String, LlmError> {
        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => match envelope.error.status {
                    Some(code) => format!("{code}: {}", envelope.error.message),
                    None => envelope.error.message,
                },
                Err(_) => body,
            };
            let error = LlmError::Api {
                status: status.as_u16(),
                message,
            };
            tracing::warn!(model, error = %error, "Gemini request failed");
            return Err(error);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;

        let text = body
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl VisionExtractor for GeminiClient {
    async fn extract_verbatim(&self, bytes: &[u8], media_type: &str) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: VERBATIM_PROMPT,
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: media_type,
                            data: base64::engine::general_purpose::STANDARD.encode(bytes),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 8192,
            },
        };
        self.generate_content(&self.vision_model, &request).await
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::Text { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 2048,
            },
        };
        self.generate_content(&self.analysis_model, &request).await
    }
}
