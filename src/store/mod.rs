//! Persistence and asset-storage collaborators.
//!
//! The pipeline only depends on the two traits here. [`SupabaseClient`] talks to PostgREST and
//! the storage API; [`memory::MemoryStore`] keeps everything in process.

pub mod memory;
mod supabase;

pub use supabase::SupabaseClient;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::AnalysisResult;

/// Errors returned by note persistence or asset storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("Unexpected backend response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Backend answered with a body that did not decode.
    #[error("Malformed backend response: {0}")]
    Decode(String),
    /// Backend refused the operation for a reason of its own.
    #[error("{0}")]
    Rejected(String),
}

/// A persisted note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Note identifier.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// User-supplied or derived title.
    pub title: String,
    /// Public URL of the stored original.
    pub original_image_url: String,
    /// Trimmed extracted text.
    pub extracted_text: String,
    /// Analysis, absent for degraded notes.
    #[serde(default)]
    pub analysis_result: Option<AnalysisResult>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

/// Fields supplied when inserting a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNote {
    /// Owning user.
    pub user_id: i64,
    /// Final title.
    pub title: String,
    /// Public URL of the stored original.
    pub original_image_url: String,
    /// Trimmed extracted text.
    pub extracted_text: String,
    /// Analysis, if it completed.
    pub analysis_result: Option<AnalysisResult>,
}

/// Note and user lookups used by the pipeline and the note routes.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Whether the user still exists.
    async fn user_exists(&self, user_id: i64) -> Result<bool, StoreError>;

    /// Newest note of `user_id` whose extracted text equals `text` byte for byte.
    async fn find_by_text(&self, user_id: i64, text: &str) -> Result<Option<Note>, StoreError>;

    /// Insert a note and return the stored row.
    async fn insert(&self, note: NewNote) -> Result<Note, StoreError>;

    /// Fetch a note by id.
    async fn get(&self, note_id: i64) -> Result<Option<Note>, StoreError>;

    /// Delete a note by id.
    async fn delete(&self, note_id: i64) -> Result<(), StoreError>;
}

/// Opaque "store bytes, get URL" object storage.
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Store `bytes` at `path` and return its public URL.
    async fn store(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError>;
}

/// Current timestamp formatted for note rows.
pub(crate) fn current_timestamp_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
