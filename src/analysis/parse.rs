//! Boundary between untrusted model output and [`AnalysisResult`].

use super::types::AnalysisResult;

/// Outcome of interpreting a raw model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// The first balanced JSON object decoded into an analysis.
    Parsed(AnalysisResult),
    /// No balanced object, or one that did not decode; carries the raw response.
    Unparseable(String),
}

/// Locate the first balanced `{...}` span, ignoring braces inside JSON strings.
pub fn first_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Interpret a raw model response.
pub fn parse_model_output(raw: &str) -> ModelOutput {
    let Some(span) = first_balanced_object(raw) else {
        return ModelOutput::Unparseable(raw.to_string());
    };
    match serde_json::from_str::<AnalysisResult>(span) {
        Ok(result) => ModelOutput::Parsed(result),
        Err(error) => {
            tracing::debug!(error = %error, "Model JSON did not match analysis shape");
            ModelOutput::Unparseable(raw.to_string())
        }
    }
}
