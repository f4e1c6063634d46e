//! Tolerant parsing of model output into suggestion candidates

use serde_json::Value;

use super::types::ModelCandidate;

/// Candidates recovered from one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCandidates {
    pub candidates: Vec<ModelCandidate>,
    /// True when the response was not a usable JSON array and the raw text was kept.
    pub malformed: bool,
}

/// Parses a JSON array of `{text, confidence, reasoning, product_recommendations}`.
///
/// Accepts markdown fences and a `{"suggestions": [...]}` wrapper. Anything
/// else becomes a single candidate holding the raw text at `fallback_confidence`.
pub fn parse_candidates(raw: &str, fallback_confidence: f64) -> ParsedCandidates {
    let cleaned = strip_markdown_fences(raw);
    if cleaned.is_empty() {
        return ParsedCandidates { candidates: Vec::new(), malformed: false };
    }

    if let Some(candidates) = parse_json_candidates(cleaned) {
        return ParsedCandidates { candidates, malformed: false };
    }

    ParsedCandidates {
        candidates: vec![ModelCandidate {
            text: cleaned.to_string(),
            confidence: Some(fallback_confidence),
            reasoning: String::new(),
            product_recommendations: Vec::new(),
        }],
        malformed: true,
    }
}

/// Best-effort JSON recovery from model text: fences stripped, then the whole
/// text, then the outermost array, then the outermost object.
pub fn parse_json_payload(raw: &str) -> Option<Value> {
    json_value(strip_markdown_fences(raw))
}

fn json_value(text: &str) -> Option<Value> {
    serde_json::from_str(text)
        .ok()
        .or_else(|| extract_json_fragment(text, '[', ']').and_then(|f| serde_json::from_str(f).ok()))
        .or_else(|| extract_json_fragment(text, '{', '}').and_then(|f| serde_json::from_str(f).ok()))
}

fn parse_json_candidates(text: &str) -> Option<Vec<ModelCandidate>> {
    let value = json_value(text)?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("suggestions") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let candidates: Vec<ModelCandidate> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<ModelCandidate>(item).ok())
        .filter(|candidate| !candidate.text.trim().is_empty())
        .collect();

    Some(candidates)
}

fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start <= end).then(|| &text[start..=end])
}
