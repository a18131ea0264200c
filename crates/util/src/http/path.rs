use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};

/// Bytes left as-is in path placeholder values: RFC3986 unreserved characters.
const PATH_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Fill `{name}` placeholders of an OpenAPI path template.
///
/// Values are percent-encoded so that a value containing `/` cannot change the
/// shape of the path. Placeholders without a value are left untouched.
///
/// # Arguments
/// - `template`: Path template such as `/users/{id}`
/// - `variables`: Placeholder values; non-string values use their JSON text
///
/// # Returns
/// The expanded path.
pub fn build_path(template: &str, variables: &Map<String, Value>) -> String {
    let mut path = template.to_string();
    for (name, value) in variables {
        let text = value_to_text(value);
        let encoded = utf8_percent_encode(&text, PATH_VALUE).to_string();
        path = path.replace(&format!("{{{name}}}"), &encoded);
    }
    path
}

/// Join a server URL and an operation path without doubling or dropping slashes.
pub fn join_url(server: &str, path: &str) -> String {
    match (server.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", server.trim_end_matches('/'), path),
        (false, false) if !path.is_empty() => format!("{server}/{path}"),
        _ => format!("{server}{path}"),
    }
}

/// Render a JSON value for use in a URL or header: strings unquoted, everything else as JSON text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
