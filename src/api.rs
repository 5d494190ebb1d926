//! HTTP surface for SmartLens.
//!
//! - `POST /notes/upload` – Multipart upload (`file`, optional `title`). Extracts text, dedupes,
//!   stores the original, analyses the text, and returns the note.
//! - `GET /notes/:id` – Fetch one of the caller's notes.
//! - `DELETE /notes/:id` – Delete one of the caller's notes.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for discovery.
//!
//! The caller is identified by the `x-user-id` header, set by the authentication layer in
//! front of this service.

use crate::analysis::AnalysisFailure;
use crate::config::MAX_UPLOAD_BYTES;
use crate::extraction::ExtractionSource;
use crate::ingestion::{
    IngestError, IngestionApi, NoteAccessError, UploadRequest, UploadedAsset,
};
use crate::metrics::MetricsSnapshot;
use crate::store::Note;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Allowance for multipart framing and the title field on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 2 * 1024 * 1024;
/// Request body cap; anything larger is reported as an oversized file.
const BODY_LIMIT_BYTES: usize = MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD_BYTES;

/// Build the HTTP router exposing the note API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: IngestionApi + 'static,
{
    Router::new()
        .route("/notes/upload", post(upload_note::<S>))
        .route("/notes/:id", get(get_note::<S>).delete(delete_note::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(service)
}

/// Authenticated caller resolved from [`USER_ID_HEADER`].
struct AuthenticatedUser(i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .map(AuthenticatedUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Success response for `POST /notes/upload`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    message: String,
    note: Note,
    extracted_text_length: usize,
    analysis_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_failure: Option<AnalysisFailure>,
    extraction_source: ExtractionSource,
    is_duplicate: bool,
}

/// Upload a document and turn it into a note.
async fn upload_note<S>(
    State(service): State<Arc<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: IngestionApi,
{
    let request = read_upload(user_id, multipart).await?;
    let outcome = service.upload(request).await?;

    Ok(Json(UploadResponse {
        success: true,
        message: outcome.message(),
        analysis_error: outcome.analysis_error(),
        analysis_failure: outcome.analysis_failure,
        extracted_text_length: outcome.extracted_text_length,
        analysis_completed: outcome.analysis_completed,
        extraction_source: outcome.extraction_source,
        is_duplicate: outcome.is_duplicate,
        note: outcome.note,
    }))
}

/// Collect the `file` and `title` fields; other fields are ignored.
async fn read_upload(user_id: i64, mut multipart: Multipart) -> Result<UploadRequest, AppError> {
    let mut file = None;
    let mut title = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                file = Some(UploadedAsset {
                    bytes: bytes.to_vec(),
                    media_type,
                    file_name,
                });
            }
            Some("title") => title = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(UploadRequest {
        user_id,
        file,
        title,
    })
}

/// Fetch a single note owned by the caller.
async fn get_note<S>(
    State(service): State<Arc<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(note_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: IngestionApi,
{
    let note = service
        .get_note(user_id, note_id)
        .await
        .map_err(|error| AppError::Note(error, NoteAction::Read))?;
    Ok(Json(json!({ "success": true, "note": note })))
}

/// Delete a single note owned by the caller.
async fn delete_note<S>(
    State(service): State<Arc<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(note_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: IngestionApi,
{
    service
        .delete_note(user_id, note_id)
        .await
        .map_err(|error| AppError::Note(error, NoteAction::Delete))?;
    Ok(Json(json!({
        "success": true,
        "message": "Note deleted successfully."
    })))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: IngestionApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload_note",
                method: "POST",
                path: "/notes/upload",
                description: "Multipart upload of a JPG/PNG image or PDF (max 10MB) as `file`, with an optional `title`. Extracts the text, analyses it, and returns the note; identical text returns the existing note with isDuplicate=true.",
                request_example: Some(json!({
                    "file": "<binary, image/png>",
                    "title": "Optional title"
                })),
            },
            CommandDescriptor {
                name: "get_note",
                method: "GET",
                path: "/notes/:id",
                description: "Return one of the caller's notes.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_note",
                method: "DELETE",
                path: "/notes/:id",
                description: "Delete one of the caller's notes.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return upload pipeline counters.",
                request_example: None,
            },
        ],
    })
}

#[derive(Debug, Clone, Copy)]
enum NoteAction {
    Read,
    Delete,
}

enum AppError {
    Unauthorized,
    Multipart(MultipartError),
    Ingest(IngestError),
    Note(NoteAccessError, NoteAction),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "message": "Authentication required." }),
            ),
            Self::Multipart(error) => (
                error.status(),
                json!({
                    "success": false,
                    "message": "Upload failed!",
                    "error": error.body_text(),
                }),
            ),
            Self::Ingest(error) => {
                let mut body = json!({ "success": false, "message": error.user_message() });
                if let Some(detail) = error.detail() {
                    body["error"] = json!(detail);
                }
                if let IngestError::TooShort { text, length, .. } = &error {
                    body["extractedText"] = json!(text);
                    body["extractedTextLength"] = json!(length);
                }
                (error.status_code(), body)
            }
            Self::Note(error, action) => note_error_response(error, action),
        };
        (status, Json(body)).into_response()
    }
}

fn note_error_response(error: NoteAccessError, action: NoteAction) -> (StatusCode, serde_json::Value) {
    match (error, action) {
        (NoteAccessError::NotFound(_), _) => (
            StatusCode::NOT_FOUND,
            json!({ "success": false, "message": "Note not found." }),
        ),
        (NoteAccessError::Forbidden { .. }, NoteAction::Read) => (
            StatusCode::FORBIDDEN,
            json!({
                "success": false,
                "message": "Access denied. This note belongs to another user."
            }),
        ),
        (NoteAccessError::Forbidden { .. }, NoteAction::Delete) => (
            StatusCode::FORBIDDEN,
            json!({
                "success": false,
                "message": "Access denied. You can only delete your own notes."
            }),
        ),
        (NoteAccessError::Store(error), action) => {
            tracing::error!(?action, error = %error, "Note request failed");
            let message = match action {
                NoteAction::Read => "Failed to fetch note.",
                NoteAction::Delete => "Failed to delete note.",
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "message": message, "error": error.to_string() }),
            )
        }
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self::Ingest(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        if inner.status() == StatusCode::PAYLOAD_TOO_LARGE {
            tracing::warn!(limit = BODY_LIMIT_BYTES, "Upload body exceeded the request limit");
            return Self::Ingest(IngestError::TooLarge {
                size: BODY_LIMIT_BYTES,
                limit: MAX_UPLOAD_BYTES,
            });
        }
        Self::Multipart(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{USER_ID_HEADER, create_router, get_commands};
    use crate::analysis::AnalysisFailure;
    use crate::extraction::ExtractionSource;
    use crate::ingestion::{
        IngestError, IngestionApi, NoteAccessError, UploadOutcome, UploadRequest,
    };
    use crate::metrics::MetricsSnapshot;
    use crate::store::Note;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "smartlens-test-boundary";

    #[tokio::test]
    async fn commands_catalog_exposes_upload_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let upload = commands
            .iter()
            .find(|cmd| cmd.name == "upload_note")
            .expect("upload command present");

        assert_eq!(upload.method, "POST");
        assert_eq!(upload.path, "/notes/upload");
        assert!(commands.len() >= 3);
    }

    #[tokio::test]
    async fn upload_requires_user_header() {
        let service = Arc::new(StubIngestion::new(StubMode::Degraded));
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request(None, Some("Title")))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(service.recorded_uploads().await.is_empty());
    }

    #[tokio::test]
    async fn upload_route_forwards_file_and_reports_degraded_analysis() {
        let service = Arc::new(StubIngestion::new(StubMode::Degraded));
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request(Some("42"), Some("Receipt")))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["isDuplicate"], false);
        assert_eq!(json["analysisCompleted"], false);
        assert_eq!(json["analysisFailure"], "timeout");
        assert_eq!(json["analysisError"], "Analysis timed out. Please try again.");
        assert_eq!(json["extractionSource"], "primary-ocr");
        assert_eq!(json["extractedTextLength"], 250);
        assert_eq!(json["note"]["id"], 9);
        assert_eq!(
            json["message"],
            "File uploaded and text extracted. Analysis timed out. Please try again."
        );

        let uploads = service.recorded_uploads().await;
        assert_eq!(uploads.len(), 1);
        let upload = &uploads[0];
        assert_eq!(upload.user_id, 42);
        assert_eq!(upload.title.as_deref(), Some("Receipt"));
        let file = upload.file.as_ref().expect("file forwarded");
        assert_eq!(file.file_name, "scan.png");
        assert_eq!(file.media_type, "image/png");
        assert_eq!(file.bytes, b"fake-png-bytes".to_vec());
    }

    #[tokio::test]
    async fn oversized_body_is_reported_as_file_too_large() {
        let service = Arc::new(StubIngestion::new(StubMode::Degraded));
        let app = create_router(service.clone());

        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"big.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend(std::iter::repeat_n(0u8, 13 * 1024 * 1024));
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/notes/upload")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .header(USER_ID_HEADER, "42")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "File too large. Maximum size is 10MB.");
        assert!(service.recorded_uploads().await.is_empty());
    }

    #[tokio::test]
    async fn too_short_upload_returns_partial_text() {
        let service = Arc::new(StubIngestion::new(StubMode::TooShort));
        let app = create_router(service);

        let response = app
            .oneshot(multipart_request(Some("42"), None))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["extractedText"], "tiny");
        assert_eq!(json["extractedTextLength"], 4);
        assert_eq!(
            json["message"],
            "Extracted text is too short. Minimum 200 characters required. Found: 4 characters."
        );
    }

    #[tokio::test]
    async fn foreign_note_is_forbidden() {
        let app = create_router(Arc::new(StubIngestion::new(StubMode::Degraded)));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/notes/9")
                    .header(USER_ID_HEADER, "43")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(
            json["message"],
            "Access denied. This note belongs to another user."
        );
    }

    #[tokio::test]
    async fn delete_own_note_succeeds_and_missing_note_is_404() {
        let service = Arc::new(StubIngestion::new(StubMode::Degraded));

        let response = create_router(service.clone())
            .oneshot(delete_request("/notes/9", "42"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Note deleted successfully.");

        let response = create_router(service)
            .oneshot(delete_request("/notes/10", "42"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let app = create_router(Arc::new(StubIngestion::new(StubMode::Degraded)));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["notes_created"], 3);
        assert_eq!(json["analyses_degraded"], 1);
    }

    fn delete_request(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .header(USER_ID_HEADER, user)
            .body(Body::empty())
            .expect("request")
    }

    fn multipart_request(user: Option<&str>, title: Option<&str>) -> Request<Body> {
        let mut body = String::new();
        if let Some(title) = title {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\nContent-Type: image/png\r\n\r\nfake-png-bytes\r\n--{BOUNDARY}--\r\n"
        ));

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/notes/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::from(body)).expect("request")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    fn stub_note() -> Note {
        Note {
            id: 9,
            user_id: 42,
            title: "Receipt".into(),
            original_image_url: "memory://assets/user_42/1_scan.png".into(),
            extracted_text: "x".repeat(250),
            analysis_result: None,
            created_at: "2024-05-01T12:00:00Z".into(),
        }
    }

    #[derive(Clone, Copy)]
    enum StubMode {
        Degraded,
        TooShort,
    }

    struct StubIngestion {
        mode: StubMode,
        uploads: Mutex<Vec<UploadRequest>>,
    }

    impl StubIngestion {
        fn new(mode: StubMode) -> Self {
            Self {
                mode,
                uploads: Mutex::new(Vec::new()),
            }
        }

        async fn recorded_uploads(&self) -> Vec<UploadRequest> {
            self.uploads.lock().await.clone()
        }
    }

    #[async_trait]
    impl IngestionApi for StubIngestion {
        async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, IngestError> {
            self.uploads.lock().await.push(request);
            match self.mode {
                StubMode::Degraded => Ok(UploadOutcome {
                    note: stub_note(),
                    extracted_text_length: 250,
                    analysis_completed: false,
                    analysis_failure: Some(AnalysisFailure::Timeout),
                    extraction_source: ExtractionSource::PrimaryOcr,
                    is_duplicate: false,
                }),
                StubMode::TooShort => Err(IngestError::TooShort {
                    text: "tiny".into(),
                    length: 4,
                    minimum: 200,
                }),
            }
        }

        async fn get_note(&self, user_id: i64, note_id: i64) -> Result<Note, NoteAccessError> {
            let note = stub_note();
            if note_id != note.id {
                return Err(NoteAccessError::NotFound(note_id));
            }
            if user_id != note.user_id {
                return Err(NoteAccessError::Forbidden { note_id, user_id });
            }
            Ok(note)
        }

        async fn delete_note(&self, user_id: i64, note_id: i64) -> Result<(), NoteAccessError> {
            self.get_note(user_id, note_id).await.map(|_| ())
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                notes_created: 3,
                analyses_completed: 2,
                analyses_degraded: 1,
                ..MetricsSnapshot::default()
            }
        }
    }
}
