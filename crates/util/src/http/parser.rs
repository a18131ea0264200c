//! # Response parsing
//!
//! Helpers for turning raw HTTP response bodies into JSON values and for
//! pulling readable messages out of error payloads.

use serde_json::Value;
use thiserror::Error;

use crate::json_path::select_path;

/// Parse HTTP response text into JSON, providing detailed errors on failure.
///
/// This helper performs strict JSON deserialization and decorates any parsing
/// error with context about the originating HTTP status code plus a truncated
/// preview of the response body. Use this when a JSON response is required and
/// the caller should surface failures instead of silently degrading to `null`.
///
/// # Arguments
/// * `text` - The raw HTTP response body text
/// * `status` - Optional HTTP status code for error context
///
/// # Errors
/// Returns a [`JsonParseError`] describing the parse failure. The message
/// includes the original serde error and up to 200 characters of the response
/// body (with whitespace collapsed).
pub fn parse_response_json_strict(text: &str, status: Option<u16>) -> Result<Value, JsonParseError> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        let preview = truncate_response_preview(text, 200);

        JsonParseError::new(status_note, error, preview)
    })
}

/// Extract a readable message from an error body.
///
/// The body is parsed as JSON and `message_path` is selected from it. Strings
/// are returned as-is, other JSON values as their JSON text. Returns `None`
/// when the body is not JSON or the path does not resolve.
pub fn extract_error_message(body: &str, message_path: &str) -> Option<String> {
    let parsed = serde_json::from_str::<Value>(body).ok()?;
    match select_path(&parsed, message_path)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Collapse whitespace and cap a response body for log and error output.
pub fn truncate_response_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}

/// Error returned when strict JSON parsing of an HTTP response fails.
#[derive(Debug, Error)]
#[error("failed to parse JSON response ({status_note}): {source}. body preview: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    /// Access the truncated response preview captured during parsing.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}
