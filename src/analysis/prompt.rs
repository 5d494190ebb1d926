//! Analysis prompt construction.

/// Approximate number of words covered by one key point.
const WORDS_PER_KEY_POINT: usize = 250;

/// Build the analysis prompt for `text`.
///
/// Summary depth and the key-point count scale with document length; there is no upper bound
/// on key points.
pub fn build_analysis_prompt(text: &str) -> String {
    let words = text.split_whitespace().count();
    let key_points = (words / WORDS_PER_KEY_POINT).max(1);

    format!(
        r#"You are analyzing a document that was extracted from a photo or scan.
The document has about {words} words.

Depth rules:
- Short documents (under 300 words): a 2-3 sentence summary.
- Medium documents (300-1000 words): a one-paragraph summary.
- Long documents (over 1000 words): a multi-paragraph summary covering every section.
- Provide roughly one key point per 200-300 words of content, so at least {key_points} here. Do not cap the number of key points; long documents need many.
- Keywords may repeat if a term matters in several places.

Respond with a single JSON object and nothing else, using exactly this shape:
{{
  "summary": "string",
  "keyPoints": ["string"],
  "keywords": ["string"],
  "sentiment": "positive | negative | neutral | mixed",
  "category": "work | personal | study | meeting | todo | notes | other",
  "actionItems": ["string"],
  "entities": {{ "people": ["string"], "dates": ["string"], "places": ["string"] }}
}}

Document:
"""
{text}
""""#
    )
}
