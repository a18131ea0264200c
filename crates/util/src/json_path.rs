//! Dotted-path selection over JSON values.
//!
//! Paths use `.` between segments. A numeric segment indexes into arrays, and
//! `name[3]` is accepted as shorthand for `name.3`.

use serde_json::Value;

/// Select the value at `path` inside `value`.
///
/// An empty path (or `"."`) selects the value itself. Returns `None` when any
/// segment is missing.
///
/// # Examples
/// ```rust
/// use dstk_util::select_path;
/// use serde_json::json;
///
/// let doc = json!({"user": {"emails": ["a@example.com", "b@example.com"]}});
/// assert_eq!(select_path(&doc, "user.emails.1"), Some(&json!("b@example.com")));
/// assert_eq!(select_path(&doc, "user.emails[0]"), Some(&json!("a@example.com")));
/// assert_eq!(select_path(&doc, "user.name"), None);
/// ```
pub fn select_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in split_segments(path) {
        current = match current {
            Value::Object(map) => map.get(segment.as_str())?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn split_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for raw in path.split('.') {
        if raw.is_empty() {
            continue;
        }
        let mut rest = raw;
        while let Some(open) = rest.find('[') {
            let head = &rest[..open];
            if !head.is_empty() {
                segments.push(head.to_string());
            }
            let Some(close) = rest[open..].find(']') else {
                break;
            };
            segments.push(rest[open + 1..open + close].to_string());
            rest = &rest[open + close + 1..];
        }
        if !rest.is_empty() {
            segments.push(rest.to_string());
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_path_selects_root() {
        let doc = json!({"a": 1});
        assert_eq!(select_path(&doc, ""), Some(&doc));
        assert_eq!(select_path(&doc, "."), Some(&doc));
    }

    #[test]
    fn scalars_have_no_children() {
        let doc = json!({"a": "text"});
        assert_eq!(select_path(&doc, "a.length"), None);
    }

    #[test]
    fn nested_brackets_are_supported() {
        let doc = json!({"grid": [[1, 2], [3, 4]]});
        assert_eq!(select_path(&doc, "grid[1][0]"), Some(&json!(3)));
    }
}
