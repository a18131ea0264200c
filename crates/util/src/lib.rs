//! Shared helpers for DS Toolkit.
//!
//! Path selection, OpenAPI lookups, URL templating, response parsing, and
//! document fetching used by the engine and the CLI.

pub mod fetch;
pub mod http;
pub mod json_path;
pub mod openapi;
pub mod openapi_validation;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

pub use fetch::{DocumentLocation, fetch_document, fetch_text};
pub use http::{
    JsonParseError, build_path, extract_error_message, join_url, parse_response_json_strict, truncate_response_preview,
    value_to_text,
};
pub use json_path::select_path;
pub use openapi::{
    OpenApiLookupError, OpenApiOperation, OpenApiParameter, ParameterLocation, RequestContent, SecurityScheme, default_server_url,
    find_operation, security_schemes,
};
pub use openapi_validation::{openapi_violations, unresolved_capabilities};

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: (?:bearer |basic )?)([\w\-\.=:/+]+)",
        r"(?i)(bearer )([\w\-\.=:/+]+)",
        r"(?i)((?:api[_-]?key|token|secret|password)=)([^\s&]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redact values that look like credentials before they reach a log line.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in SECRET_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}<redacted>")
            })
            .to_string();
    }
    redacted
}

/// Parse a raw query string (with or without the leading `?`).
///
/// Later duplicates win.
pub fn parse_query_string(raw: &str) -> IndexMap<String, String> {
    let trimmed = raw.strip_prefix('?').unwrap_or(raw);
    url::form_urlencoded::parse(trimmed.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_headers_and_query_secrets() {
        let line = "Authorization: abc.def token=xyz&page=2";
        let redacted = redact_sensitive(line);
        assert_eq!(redacted, "Authorization: <redacted> token=<redacted>&page=2");
        assert_eq!(redact_sensitive("Bearer s3cr3t"), "Bearer <redacted>");
    }

    #[test]
    fn query_string_is_decoded() {
        let query = parse_query_string("?user=ada%20l&flag=&user=grace");
        assert_eq!(query.get("user").map(String::as_str), Some("grace"));
        assert_eq!(query.get("flag").map(String::as_str), Some(""));
        assert_eq!(query.len(), 2);
    }
}
