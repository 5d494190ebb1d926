use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// OCR confidence (0-100) below which the vision fallback is consulted.
pub const OCR_CONFIDENCE_THRESHOLD: f32 = 70.0;
/// Factor by which a vision transcript must out-length the OCR text to replace it.
pub const VISION_LENGTH_GAIN: f64 = 1.2;
/// Text-layer length under which a PDF is treated as scanned.
pub const SCANNED_PDF_THRESHOLD: usize = 50;
/// Minimum trimmed character count required before a note is created.
pub const MIN_EXTRACTED_CHARS: usize = 200;
/// Wall-clock budget for a single analysis call.
pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest accepted upload in bytes (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Number of leading characters used when deriving a title.
pub const AUTO_TITLE_CHARS: usize = 50;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_STORAGE_BUCKET: &str = "SmartLens Store";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the SmartLens server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Supabase project hosting notes, users, and assets. Required by `serve`.
    pub supabase_url: Option<String>,
    /// Service credential used for both PostgREST and storage calls. Required by `serve`.
    pub supabase_service_key: Option<String>,
    /// Storage bucket receiving uploaded originals.
    pub storage_bucket: String,
    /// Credential for the Gemini API. Absent means no vision fallback and no analysis.
    pub gemini_api_key: Option<String>,
    /// Base URL of the Gemini API.
    pub gemini_base_url: String,
    /// Model used for verbatim text extraction from images and PDFs.
    pub gemini_vision_model: String,
    /// Model used for structured document analysis.
    pub gemini_analysis_model: String,
    /// Path or name of the Tesseract binary.
    pub tesseract_bin: String,
    /// Tesseract language pack.
    pub ocr_language: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            supabase_url: load_env_optional("SUPABASE_URL"),
            supabase_service_key: load_env_optional("SUPABASE_SERVICE_KEY"),
            storage_bucket: load_env_optional("STORAGE_BUCKET")
                .unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
            gemini_api_key: load_env_optional("GEMINI_API_KEY"),
            gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            gemini_vision_model: load_env_optional("GEMINI_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            gemini_analysis_model: load_env_optional("GEMINI_ANALYSIS_MODEL")
                .unwrap_or_else(|| DEFAULT_ANALYSIS_MODEL.to_string()),
            tesseract_bin: load_env_optional("TESSERACT_BIN")
                .unwrap_or_else(|| "tesseract".to_string()),
            ocr_language: load_env_optional("OCR_LANGUAGE").unwrap_or_else(|| "eng".to_string()),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }

    /// Supabase URL and service key, required for serving notes.
    pub fn supabase_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let url = self
            .supabase_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("SUPABASE_URL".into()))?;
        let key = self
            .supabase_service_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("SUPABASE_SERVICE_KEY".into()))?;
        Ok((url, key))
    }

    /// Whether a Gemini credential is present.
    pub fn gemini_configured(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}

/// Thresholds and budgets applied by the ingestion pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineLimits {
    /// OCR confidence below which the vision fallback is consulted.
    pub confidence_threshold: f32,
    /// Minimum trimmed text length for a note.
    pub min_text_chars: usize,
    /// Text-layer length under which a PDF counts as scanned.
    pub scanned_pdf_threshold: usize,
    /// Analysis wall-clock budget.
    pub analysis_timeout: Duration,
    /// Maximum upload size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            confidence_threshold: OCR_CONFIDENCE_THRESHOLD,
            min_text_chars: MIN_EXTRACTED_CHARS,
            scanned_pdf_threshold: SCANNED_PDF_THRESHOLD,
            analysis_timeout: ANALYSIS_TIMEOUT,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// A `.env` file is expected to have been read already. A second call keeps the first value.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    let config = Config::from_env()?;
    tracing::debug!(
        supabase_url = config.supabase_url.as_deref().unwrap_or("<unset>"),
        bucket = %config.storage_bucket,
        gemini_configured = config.gemini_configured(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_backend() -> Config {
        Config {
            supabase_url: None,
            supabase_service_key: None,
            storage_bucket: DEFAULT_STORAGE_BUCKET.into(),
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.into(),
            gemini_vision_model: DEFAULT_VISION_MODEL.into(),
            gemini_analysis_model: DEFAULT_ANALYSIS_MODEL.into(),
            tesseract_bin: "tesseract".into(),
            ocr_language: "eng".into(),
            server_port: None,
        }
    }

    #[test]
    fn supabase_credentials_are_checked_on_demand() {
        let mut config = config_without_backend();
        assert!(matches!(
            config.supabase_credentials(),
            Err(ConfigError::MissingVariable(name)) if name == "SUPABASE_URL"
        ));

        config.supabase_url = Some("https://project.supabase.co".into());
        assert!(matches!(
            config.supabase_credentials(),
            Err(ConfigError::MissingVariable(name)) if name == "SUPABASE_SERVICE_KEY"
        ));

        config.supabase_service_key = Some("service-key".into());
        assert_eq!(
            config.supabase_credentials().expect("credentials"),
            ("https://project.supabase.co", "service-key")
        );
    }

    #[test]
    fn default_limits_match_pipeline_constants() {
        let limits = PipelineLimits::default();
        assert_eq!(limits.confidence_threshold, 70.0);
        assert_eq!(limits.min_text_chars, 200);
        assert_eq!(limits.scanned_pdf_threshold, 50);
        assert_eq!(limits.analysis_timeout, Duration::from_secs(30));
        assert_eq!(limits.max_upload_bytes, 10_485_760);
    }
}
