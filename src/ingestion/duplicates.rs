//! Content-addressed duplicate detection.

use std::sync::Arc;

use crate::store::{Note, NoteRepository};

/// Looks up an existing note with byte-identical extracted text for the same user.
#[derive(Clone)]
pub struct DuplicateDetector {
    notes: Arc<dyn NoteRepository>,
}

impl DuplicateDetector {
    /// Build a detector over a note repository.
    pub fn new(notes: Arc<dyn NoteRepository>) -> Self {
        Self { notes }
    }

    /// Newest matching note, or `None`.
    ///
    /// A failed lookup is logged and treated as no match; the upload then proceeds and may
    /// create a second note for the same text.
    pub async fn find_existing(&self, user_id: i64, text: &str) -> Option<Note> {
        match self.notes.find_by_text(user_id, text).await {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!(user_id, error = %error, "Duplicate lookup failed; continuing");
                None
            }
        }
    }
}
