//! Upload orchestration: validate, extract, gate, dedupe, store, analyse, persist.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;
use uuid::Uuid;

use super::duplicates::DuplicateDetector;
use super::types::{IngestError, NoteAccessError, UploadOutcome, UploadRequest};
use super::validate::{DocumentKind, derive_title, storage_path, validate_asset};
use crate::analysis::{AnalysisEngine, AnalysisError, AnalysisFailure, AnalysisResult};
use crate::config::PipelineLimits;
use crate::extraction::{
    DocumentTextExtractor, ExtractionResult, ExtractionSource, ImageTextExtractor,
};
use crate::llm::{TextGenerator, VisionExtractor};
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::ocr::OcrEngine;
use crate::store::{AssetStorage, NewNote, Note, NoteRepository};

/// External collaborators the pipeline depends on.
///
/// `vision` and `generator` are `None` when no model credential is configured, which disables
/// escalation and analysis respectively.
pub struct Collaborators {
    /// Primary OCR engine.
    pub ocr: Arc<dyn OcrEngine>,
    /// Vision fallback for images and scanned PDFs.
    pub vision: Option<Arc<dyn VisionExtractor>>,
    /// Text model used for analysis.
    pub generator: Option<Arc<dyn TextGenerator>>,
    /// Note persistence.
    pub notes: Arc<dyn NoteRepository>,
    /// Asset storage.
    pub assets: Arc<dyn AssetStorage>,
}

/// Coordinates one upload from raw bytes to a persisted, possibly degraded, note.
///
/// Every step runs sequentially inside the request; nothing is retried.
pub struct IngestionService {
    images: ImageTextExtractor,
    documents: DocumentTextExtractor,
    analysis: Option<AnalysisEngine>,
    duplicates: DuplicateDetector,
    notes: Arc<dyn NoteRepository>,
    assets: Arc<dyn AssetStorage>,
    limits: PipelineLimits,
    metrics: Arc<IngestMetrics>,
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Run the upload pipeline.
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, IngestError>;

    /// Fetch a note owned by `user_id`.
    async fn get_note(&self, user_id: i64, note_id: i64) -> Result<Note, NoteAccessError>;

    /// Delete a note owned by `user_id`.
    async fn delete_note(&self, user_id: i64, note_id: i64) -> Result<(), NoteAccessError>;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl IngestionService {
    /// Wire the pipeline from its collaborators.
    pub fn new(collaborators: Collaborators, limits: PipelineLimits) -> Self {
        let Collaborators {
            ocr,
            vision,
            generator,
            notes,
            assets,
        } = collaborators;

        let images = ImageTextExtractor::new(ocr, vision.clone())
            .with_confidence_threshold(limits.confidence_threshold);
        let documents =
            DocumentTextExtractor::new(vision).with_scanned_threshold(limits.scanned_pdf_threshold);
        let analysis = generator
            .map(|generator| AnalysisEngine::new(generator).with_timeout(limits.analysis_timeout));

        Self {
            images,
            documents,
            analysis,
            duplicates: DuplicateDetector::new(notes.clone()),
            notes,
            assets,
            limits,
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Shared metrics handle.
    pub fn metrics(&self) -> Arc<IngestMetrics> {
        self.metrics.clone()
    }

    /// Run the upload pipeline for one request.
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, IngestError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("upload", %request_id, user_id = request.user_id);
        let result = self.run(request).instrument(span.clone()).await;

        span.in_scope(|| match &result {
            Ok(outcome) => tracing::info!(
                note_id = outcome.note.id,
                duplicate = outcome.is_duplicate,
                analysis_completed = outcome.analysis_completed,
                source = outcome.extraction_source.as_str(),
                "Upload complete"
            ),
            Err(error) => {
                self.metrics.record_rejection();
                tracing::warn!(status = %error.status_code(), error = %error, "Upload rejected");
            }
        });
        result
    }

    async fn run(&self, request: UploadRequest) -> Result<UploadOutcome, IngestError> {
        let UploadRequest {
            user_id,
            file,
            title,
        } = request;

        let kind = validate_asset(file.as_ref(), self.limits.max_upload_bytes)?;
        let asset = file.ok_or(IngestError::NoFile)?;
        self.metrics.record_upload();

        match self.notes.user_exists(user_id).await {
            Ok(true) => {}
            Ok(false) => return Err(IngestError::UserNotFound(user_id)),
            Err(error) => return Err(IngestError::UserLookup(error)),
        }

        let extraction = self.extract(kind, &asset.bytes, &asset.media_type).await?;
        let length = extraction.char_len();
        tracing::debug!(
            source = extraction.source.as_str(),
            confidence = ?extraction.confidence,
            length,
            "Text extracted"
        );
        if extraction.source == ExtractionSource::VisionFallback {
            self.metrics.record_vision_escalation();
        }

        if length < self.limits.min_text_chars {
            return Err(IngestError::TooShort {
                text: extraction.text,
                length,
                minimum: self.limits.min_text_chars,
            });
        }

        if let Some(existing) = self
            .duplicates
            .find_existing(user_id, &extraction.text)
            .await
        {
            self.metrics.record_duplicate();
            return Ok(UploadOutcome {
                analysis_completed: existing.analysis_result.is_some(),
                note: existing,
                extracted_text_length: length,
                analysis_failure: None,
                extraction_source: extraction.source,
                is_duplicate: true,
            });
        }

        let path = storage_path(user_id, unix_millis(), &asset.file_name);
        let asset_url = self
            .assets
            .store(asset.bytes, &path, &asset.media_type)
            .await
            .map_err(IngestError::Storage)?;
        tracing::debug!(path = %path, "Original stored");

        let (analysis_result, analysis_failure) = self.analyze(&extraction.text).await;

        let note = NewNote {
            user_id,
            title: derive_title(title.as_deref(), &extraction.text),
            original_image_url: asset_url.clone(),
            extracted_text: extraction.text,
            analysis_result,
        };
        let note = self.notes.insert(note).await.map_err(|error| {
            tracing::warn!(asset_url = %asset_url, "Note insert failed; stored asset left in place");
            IngestError::Persistence(error)
        })?;

        let analysis_completed = note.analysis_result.is_some();
        self.metrics.record_note(analysis_completed);
        Ok(UploadOutcome {
            note,
            extracted_text_length: length,
            analysis_completed,
            analysis_failure,
            extraction_source: extraction.source,
            is_duplicate: false,
        })
    }

    async fn extract(
        &self,
        kind: DocumentKind,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<ExtractionResult, IngestError> {
        let result = match kind {
            DocumentKind::Image => self.images.extract(bytes, media_type).await,
            DocumentKind::Pdf => self.documents.extract(bytes).await,
        };
        result.map_err(|error| {
            tracing::error!(engine = error.engine(), error = %error, "Extraction failed");
            IngestError::Extraction(error)
        })
    }

    /// Analysis never fails the upload; errors become a classified reason.
    async fn analyze(&self, text: &str) -> (Option<AnalysisResult>, Option<AnalysisFailure>) {
        let outcome = match &self.analysis {
            Some(engine) => engine.analyze(text).await,
            None => Err(AnalysisError::Unconfigured),
        };
        match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => {
                let failure = error.classify();
                tracing::warn!(reason = failure.code(), error = %error, "Analysis degraded");
                (None, Some(failure))
            }
        }
    }

    async fn owned_note(&self, user_id: i64, note_id: i64) -> Result<Note, NoteAccessError> {
        let note = self
            .notes
            .get(note_id)
            .await?
            .ok_or(NoteAccessError::NotFound(note_id))?;
        if note.user_id != user_id {
            return Err(NoteAccessError::Forbidden { note_id, user_id });
        }
        Ok(note)
    }
}

#[async_trait]
impl IngestionApi for IngestionService {
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, IngestError> {
        IngestionService::upload(self, request).await
    }

    async fn get_note(&self, user_id: i64, note_id: i64) -> Result<Note, NoteAccessError> {
        self.owned_note(user_id, note_id).await
    }

    async fn delete_note(&self, user_id: i64, note_id: i64) -> Result<(), NoteAccessError> {
        self.owned_note(user_id, note_id).await?;
        self.notes.delete(note_id).await?;
        tracing::info!(note_id, user_id, "Note deleted");
        Ok(())
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn unix_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}
