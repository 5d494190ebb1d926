//! Upload validation and derived values (titles, storage paths).

use super::types::{IngestError, UploadedAsset};
use crate::config::AUTO_TITLE_CHARS;

/// Media types accepted for upload.
pub const ACCEPTED_MEDIA_TYPES: [&str; 4] =
    ["image/jpeg", "image/jpg", "image/png", "application/pdf"];

/// Extraction path for an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Raster image routed through OCR.
    Image,
    /// PDF routed through the text layer.
    Pdf,
}

/// Classify a declared media type, ignoring case and parameters.
pub fn classify_media_type(media_type: &str) -> Option<DocumentKind> {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !ACCEPTED_MEDIA_TYPES.contains(&essence.as_str()) {
        return None;
    }
    if essence == "application/pdf" {
        Some(DocumentKind::Pdf)
    } else {
        Some(DocumentKind::Image)
    }
}

/// Check presence, type, and size of an upload.
pub fn validate_asset(
    file: Option<&UploadedAsset>,
    max_bytes: usize,
) -> Result<DocumentKind, IngestError> {
    let asset = file.ok_or(IngestError::NoFile)?;
    let kind = classify_media_type(&asset.media_type)
        .ok_or_else(|| IngestError::UnsupportedType(asset.media_type.clone()))?;
    if asset.size() > max_bytes {
        return Err(IngestError::TooLarge {
            size: asset.size(),
            limit: max_bytes,
        });
    }
    Ok(kind)
}

/// Supplied title, or the first characters of the text with `...` when truncated.
pub fn derive_title(supplied: Option<&str>, text: &str) -> String {
    if let Some(title) = supplied.map(str::trim).filter(|title| !title.is_empty()) {
        return title.to_string();
    }
    let prefix: String = text.chars().take(AUTO_TITLE_CHARS).collect();
    let mut title = prefix.trim().to_string();
    if text.chars().count() > AUTO_TITLE_CHARS {
        title.push_str("...");
    }
    title
}

/// Reduce a client file name to a safe final path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Storage key for an upload: `user_{id}/{millis}_{file}`.
pub fn storage_path(user_id: i64, unix_millis: i64, file_name: &str) -> String {
    format!(
        "user_{user_id}/{unix_millis}_{}",
        sanitize_file_name(file_name)
    )
}
