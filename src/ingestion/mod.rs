//! Document ingestion pipeline.

mod duplicates;
mod service;
mod types;
pub mod validate;

pub use duplicates::DuplicateDetector;
pub use service::{Collaborators, IngestionApi, IngestionService};
pub use types::{IngestError, NoteAccessError, UploadOutcome, UploadRequest, UploadedAsset};
