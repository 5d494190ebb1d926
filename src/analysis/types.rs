//! Structured analysis attached to a note.

use serde::{Deserialize, Deserializer, Serialize};

/// Model-produced analysis of a document.
///
/// Deserialization is lenient: missing fields and `null` values fall back to empty defaults,
/// and unknown sentiment or category labels collapse to `neutral` and `other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Free-form summary scaled to the document length.
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    /// Ordered key points.
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_points: Vec<String>,
    /// Relevant terms; may contain repeats.
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
    /// Overall tone.
    #[serde(default)]
    pub sentiment: Sentiment,
    /// Document category.
    #[serde(default)]
    pub category: Category,
    /// Follow-up actions mentioned in the document.
    #[serde(default, deserialize_with = "null_as_default")]
    pub action_items: Vec<String>,
    /// Named entities.
    #[serde(default, deserialize_with = "null_as_default")]
    pub entities: Entities,
}

/// People, dates, and places mentioned in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    /// People mentioned.
    #[serde(default, deserialize_with = "null_as_default")]
    pub people: Vec<String>,
    /// Dates mentioned, as written.
    #[serde(default, deserialize_with = "null_as_default")]
    pub dates: Vec<String>,
    /// Places mentioned.
    #[serde(default, deserialize_with = "null_as_default")]
    pub places: Vec<String>,
}

/// Overall tone of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Sentiment {
    /// Favorable tone.
    Positive,
    /// Unfavorable tone.
    Negative,
    /// No clear tone.
    #[default]
    Neutral,
    /// Both favorable and unfavorable passages.
    Mixed,
}

impl From<Option<String>> for Sentiment {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(|label| label.trim().to_lowercase()).as_deref() {
            Some("positive") => Self::Positive,
            Some("negative") => Self::Negative,
            Some("mixed") => Self::Mixed,
            _ => Self::Neutral,
        }
    }
}

/// Fixed vocabulary of document categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Category {
    /// Work material.
    Work,
    /// Personal material.
    Personal,
    /// Study material.
    Study,
    /// Meeting notes.
    Meeting,
    /// To-do lists.
    Todo,
    /// General notes.
    Notes,
    /// Anything else.
    #[default]
    Other,
}

impl From<Option<String>> for Category {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(|label| label.trim().to_lowercase()).as_deref() {
            Some("work") => Self::Work,
            Some("personal") => Self::Personal,
            Some("study") => Self::Study,
            Some("meeting") => Self::Meeting,
            Some("todo") => Self::Todo,
            Some("notes") => Self::Notes,
            _ => Self::Other,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
