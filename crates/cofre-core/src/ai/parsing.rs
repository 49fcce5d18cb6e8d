//! JSON parsing for AI classification responses
//!
//! Models are instructed to answer with a bare JSON object, but they often
//! wrap it in markdown fences or prose. The parser extracts the outermost
//! brace pair and deserializes strictly from there.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Structured answer extracted from a model response
#[derive(Debug, Clone, Deserialize)]
pub struct AIClassification {
    /// Category id the model picked, or null when nothing fits
    pub category_id: Option<String>,
    /// 0.0..=1.0 (clamped on parse)
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Parse a classification from a model's free-text answer
pub fn parse_classification(response: &str) -> Result<AIClassification> {
    let response = response.trim();

    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            let mut parsed: AIClassification = serde_json::from_str(json_str).map_err(|e| {
                // Truncate long responses for the error message
                let truncated = if json_str.len() > 200 {
                    format!("{}...", &json_str[..200])
                } else {
                    json_str.to_string()
                };
                Error::Classification(format!(
                    "invalid JSON from model: {} | Raw: {}",
                    e, truncated
                ))
            })?;
            parsed.confidence = parsed.confidence.clamp(0.0, 1.0);
            Ok(parsed)
        }
        _ => Err(Error::Classification(format!(
            "no JSON found in model response | Raw: {}",
            if response.len() > 200 {
                format!("{}...", &response[..200])
            } else {
                response.to_string()
            }
        ))),
    }
}
