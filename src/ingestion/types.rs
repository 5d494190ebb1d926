//! Request, outcome, and error types for the upload pipeline.

use axum::http::StatusCode;
use thiserror::Error;

use crate::analysis::AnalysisFailure;
use crate::extraction::{ExtractionError, ExtractionSource};
use crate::store::{Note, StoreError};

const BUCKET_NOT_FOUND: &str = "Bucket not found";

/// A file received from the caller.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    /// Raw file contents.
    pub bytes: Vec<u8>,
    /// Declared media type.
    pub media_type: String,
    /// Client-supplied file name.
    pub file_name: String,
}

impl UploadedAsset {
    /// Size of the upload in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// One upload call.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Authenticated user.
    pub user_id: i64,
    /// Attached file, if any.
    pub file: Option<UploadedAsset>,
    /// Optional title; blank titles are derived from the text.
    pub title: Option<String>,
}

/// Successful upload, either a fresh note or an existing duplicate.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Created or existing note.
    pub note: Note,
    /// Character count of the extracted text.
    pub extracted_text_length: usize,
    /// Whether the returned note carries an analysis.
    pub analysis_completed: bool,
    /// Why analysis is missing from a fresh note.
    pub analysis_failure: Option<AnalysisFailure>,
    /// Engine whose text was kept.
    pub extraction_source: ExtractionSource,
    /// Whether the note already existed.
    pub is_duplicate: bool,
}

impl UploadOutcome {
    /// Human-readable summary of what succeeded and what degraded.
    pub fn message(&self) -> String {
        if self.is_duplicate {
            "Duplicate content detected. Returning existing note with analysis.".to_string()
        } else if self.analysis_completed {
            "File uploaded, text extracted, and analyzed successfully!".to_string()
        } else {
            match self.analysis_error() {
                Some(reason) => format!("File uploaded and text extracted. {reason}"),
                None => "File uploaded and text extracted.".to_string(),
            }
        }
    }

    /// Reason string for a degraded note.
    pub fn analysis_error(&self) -> Option<&'static str> {
        self.analysis_failure.map(AnalysisFailure::reason)
    }
}

/// Terminal upload failures.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Request carried no file.
    #[error("No file uploaded")]
    NoFile,
    /// Declared media type is not accepted.
    #[error("Unsupported media type: {0}")]
    UnsupportedType(String),
    /// File exceeds the upload limit.
    #[error("File of {size} bytes exceeds the {limit} byte limit")]
    TooLarge {
        /// Upload size in bytes, or the request body cap when the body was cut off there.
        size: usize,
        /// Limit in bytes.
        limit: usize,
    },
    /// Authenticated user no longer exists.
    #[error("User {0} not found")]
    UserNotFound(i64),
    /// User lookup failed.
    #[error("User lookup failed: {0}")]
    UserLookup(#[source] StoreError),
    /// An extraction engine failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Extracted text is below the minimum length.
    #[error("Extracted text has {length} characters, {minimum} required")]
    TooShort {
        /// Partial text for diagnostics.
        text: String,
        /// Character count achieved.
        length: usize,
        /// Required character count.
        minimum: usize,
    },
    /// Asset upload failed.
    #[error("Storage upload failed: {0}")]
    Storage(#[source] StoreError),
    /// Note insert failed.
    #[error("Note insert failed: {0}")]
    Persistence(#[source] StoreError),
}

impl IngestError {
    /// HTTP status for the failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoFile | Self::UnsupportedType(_) | Self::TooLarge { .. } | Self::TooShort { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::UserLookup(_) | Self::Extraction(_) | Self::Storage(_) | Self::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the uploader.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoFile => "No file uploaded".to_string(),
            Self::UnsupportedType(_) => {
                "Invalid file type. Only images (JPG/JPEG, PNG) and PDF are allowed.".to_string()
            }
            Self::TooLarge { .. } => "File too large. Maximum size is 10MB.".to_string(),
            Self::UserNotFound(_) => "User not found. Please login again.".to_string(),
            Self::Extraction(_) => {
                "Text extraction failed. Please try with a clearer file.".to_string()
            }
            Self::TooShort { length, minimum, .. } => format!(
                "Extracted text is too short. Minimum {minimum} characters required. Found: {length} characters."
            ),
            Self::Storage(error) if error.to_string().contains(BUCKET_NOT_FOUND) => {
                "Storage bucket not configured properly.".to_string()
            }
            Self::UserLookup(_) | Self::Storage(_) => "Upload failed!".to_string(),
            Self::Persistence(_) => "Failed to save note to database.".to_string(),
        }
    }

    /// Underlying error text for server-side failures.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::UserLookup(error) | Self::Storage(error) | Self::Persistence(error) => {
                Some(error.to_string())
            }
            Self::Extraction(error) => Some(error.to_string()),
            _ => None,
        }
    }
}

/// Failures while reading or deleting a single note.
#[derive(Debug, Error)]
pub enum NoteAccessError {
    /// No note with that id.
    #[error("Note {0} not found")]
    NotFound(i64),
    /// The note belongs to another user.
    #[error("Note {note_id} is not owned by user {user_id}")]
    Forbidden {
        /// Requested note.
        note_id: i64,
        /// Requesting user.
        user_id: i64,
    },
    /// Backend failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
