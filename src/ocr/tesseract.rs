//! Tesseract OCR through the command-line binary.
//!
//! One invocation writes both the `txt` and `tsv` renderers; the text comes from the former and
//! the confidence is the mean of the word rows of the latter.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use super::{OcrEngine, OcrError, OcrOutput};
use crate::config::Config;

const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(120);
/// TSV `level` value for word rows.
const WORD_LEVEL: &str = "5";

/// Tesseract-backed [`OcrEngine`].
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    language: String,
    timeout: Duration,
}

impl TesseractEngine {
    /// Create an engine invoking `binary` with the given language pack.
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
            timeout: DEFAULT_OCR_TIMEOUT,
        }
    }

    /// Build an engine from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tesseract_bin.clone(), config.ocr_language.clone())
    }

    /// Override the per-image time budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, input: &Path, output_base: &Path) -> Result<(), OcrError> {
        let mut command = Command::new(&self.binary);
        command
            .arg(input)
            .arg(output_base)
            .args(["-l", &self.language])
            .args(["txt", "tsv"])
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(OcrError::TimedOut(self.timeout)),
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(OcrError::EngineUnavailable(format!(
                    "{} not found (install tesseract-ocr)",
                    self.binary
                )));
            }
            Ok(Err(err)) => return Err(OcrError::Io(err)),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(OcrError::Failed(format!("tesseract failed: {}", stderr.trim())))
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, bytes: &[u8]) -> Result<OcrOutput, OcrError> {
        let workdir = create_workdir().await?;
        let input = workdir.path().join("input");
        let output_base = workdir.path().join("ocr");
        tokio::fs::write(&input, bytes).await?;

        self.run(&input, &output_base).await?;

        let text = tokio::fs::read_to_string(output_base.with_extension("txt")).await?;
        let tsv = tokio::fs::read_to_string(output_base.with_extension("tsv")).await?;
        let confidence = mean_word_confidence(&tsv);
        let text = text.trim().to_string();

        tracing::debug!(chars = text.chars().count(), confidence, "Tesseract recognized image");
        Ok(OcrOutput { text, confidence })
    }
}

/// Scratch directory for one invocation, created on the blocking pool.
async fn create_workdir() -> Result<TempDir, OcrError> {
    tokio::task::spawn_blocking(TempDir::new)
        .await
        .map_err(|error| OcrError::Failed(format!("workdir task failed: {error}")))?
        .map_err(OcrError::from)
}

/// Average the confidences of recognized words; rows with `-1` carry no word.
fn mean_word_confidence(tsv: &str) -> f32 {
    let (sum, count) = tsv
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() < 12 || columns[0] != WORD_LEVEL {
                return None;
            }
            let confidence: f32 = columns[10].trim().parse().ok()?;
            (confidence >= 0.0 && !columns[11].trim().is_empty()).then_some(confidence)
        })
        .fold((0.0_f32, 0_u32), |(sum, count), value| (sum + value, count + 1));

    if count == 0 { 0.0 } else { sum / count as f32 }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn mean_confidence_uses_word_rows_only() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t\n\
             4\t1\t1\t1\t1\t0\t10\t10\t200\t20\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t90.5\tHello\n\
             5\t1\t1\t1\t1\t2\t70\t10\t50\t20\t69.5\tworld\n"
        );
        assert!((mean_word_confidence(&tsv) - 80.0).abs() < f32::EPSILON);
    }

    #[test]
    fn mean_confidence_ignores_blank_words_and_negative_scores() {
        let tsv = format!(
            "{HEADER}\n\
             5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t-1\t\n\
             5\t1\t1\t1\t1\t2\t10\t10\t50\t20\t95\t \n\
             5\t1\t1\t1\t1\t3\t10\t10\t50\t20\t40\tword\n"
        );
        assert!((mean_word_confidence(&tsv) - 40.0).abs() < f32::EPSILON);
    }

    #[test]
    fn mean_confidence_is_zero_without_words() {
        assert_eq!(mean_word_confidence(HEADER), 0.0);
        assert_eq!(mean_word_confidence(""), 0.0);
    }

    #[tokio::test]
    async fn workdir_is_created_and_removed_on_drop() {
        let workdir = create_workdir().await.expect("workdir");
        let path = workdir.path().to_path_buf();
        assert!(path.is_dir());
        drop(workdir);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_binary_reports_engine_unavailable() {
        let engine = TesseractEngine::new("smartlens-no-such-tesseract", "eng");
        let error = engine.recognize(b"not an image").await.expect_err("missing binary");
        assert!(matches!(error, OcrError::EngineUnavailable(_)), "{error:?}");
    }
}
