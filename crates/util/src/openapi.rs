//! OpenAPI operation lookup.
//!
//! Resolves a capability's operation selector against an OpenAPI document and
//! flattens what the engine needs to build a request: the merged parameter
//! list, declared headers, request body content type, and security schemes.

use dstk_types::OperationSelector;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

/// HTTP methods recognized under a path item.
pub const HTTP_METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// Where an operation parameter is placed in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenApiParameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
}

/// Content type declared by an operation's `requestBody`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContent {
    Json,
    Multipart,
    Other(String),
}

/// Operation flattened for request building.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenApiOperation {
    pub path: String,
    /// Lower-case method name.
    pub method: String,
    pub operation_id: Option<String>,
    /// Path-level and operation-level parameters; operation entries override on `name` + `in`.
    pub parameters: Vec<OpenApiParameter>,
    /// Fixed headers declared on the operation.
    pub headers: IndexMap<String, String>,
    pub request_content: Option<RequestContent>,
}

impl OpenApiOperation {
    /// Parameter names in declaration order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|parameter| parameter.name.clone()).collect()
    }
}

/// How a security scheme carries its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    ApiKey { name: String, location: ParameterLocation },
    Bearer,
    Basic,
    Other(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OpenApiLookupError {
    #[error("OpenAPI path '{0}' not found")]
    PathNotFound(String),
    #[error("OpenAPI method '{method}' not found for path '{path}'")]
    MethodNotFound { path: String, method: String },
    #[error("OpenAPI operationId '{0}' not found")]
    OperationIdNotFound(String),
    #[error("operation must name an operationId or a path and method")]
    IncompleteSelector,
}

/// Resolve an operation selector.
///
/// `path` + `method` take precedence; otherwise every path item is scanned for
/// a matching `operationId`.
///
/// # Errors
/// Returns an [`OpenApiLookupError`] naming what could not be found.
pub fn find_operation(document: &Value, selector: &OperationSelector) -> Result<OpenApiOperation, OpenApiLookupError> {
    if let (Some(path), Some(method)) = (&selector.path, &selector.method) {
        let path_item = document
            .get("paths")
            .and_then(|paths| paths.get(path.as_str()))
            .ok_or_else(|| OpenApiLookupError::PathNotFound(path.clone()))?;
        let method = method.to_ascii_lowercase();
        let operation = path_item
            .get(method.as_str())
            .ok_or_else(|| OpenApiLookupError::MethodNotFound {
                path: path.clone(),
                method: method.clone(),
            })?;
        return Ok(flatten_operation(document, path, &method, path_item, operation));
    }

    let Some(operation_id) = &selector.operation_id else {
        return Err(OpenApiLookupError::IncompleteSelector);
    };
    let paths = document.get("paths").and_then(Value::as_object);
    for (path, path_item) in paths.into_iter().flatten() {
        for method in HTTP_METHODS {
            let Some(operation) = path_item.get(*method) else {
                continue;
            };
            if operation.get("operationId").and_then(Value::as_str) == Some(operation_id.as_str()) {
                return Ok(flatten_operation(document, path, method, path_item, operation));
            }
        }
    }
    Err(OpenApiLookupError::OperationIdNotFound(operation_id.clone()))
}

fn flatten_operation(root: &Value, path: &str, method: &str, path_item: &Value, operation: &Value) -> OpenApiOperation {
    let parameters = collect_parameters(root, path_item, operation)
        .into_iter()
        .filter_map(|parameter| {
            let name = parameter.get("name").and_then(Value::as_str)?.to_string();
            let location = ParameterLocation::parse(parameter.get("in").and_then(Value::as_str)?)?;
            let required = parameter.get("required").and_then(Value::as_bool).unwrap_or(location == ParameterLocation::Path);
            Some(OpenApiParameter { name, location, required })
        })
        .collect();

    let headers = operation
        .get("headers")
        .and_then(Value::as_object)
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(name, value)| Some((name.clone(), value.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let request_body = operation.get("requestBody").map(|body| match body.get("$ref").and_then(Value::as_str) {
        Some(reference) => resolve_local_ref(root, reference).unwrap_or_else(|| body.clone()),
        None => body.clone(),
    });
    let request_content = request_body
        .as_ref()
        .and_then(|body| body.get("content"))
        .and_then(Value::as_object)
        .and_then(|content| {
            if content.contains_key("application/json") {
                Some(RequestContent::Json)
            } else if content.contains_key("multipart/form-data") {
                Some(RequestContent::Multipart)
            } else {
                content.keys().next().map(|other| RequestContent::Other(other.clone()))
            }
        });

    OpenApiOperation {
        path: path.to_string(),
        method: method.to_string(),
        operation_id: operation.get("operationId").and_then(Value::as_str).map(str::to_string),
        parameters,
        headers,
        request_content,
    }
}

/// Resolve a local `#/...` reference against the document root.
pub fn resolve_local_ref(root: &Value, reference: &str) -> Option<Value> {
    let pointer = reference.strip_prefix('#').unwrap_or(reference);
    root.pointer(pointer).cloned()
}

/// Collect path-level and operation-level parameters.
///
/// Entries are de-duplicated on `name` + `in`; an operation-level entry
/// replaces a path-level one in place. `$ref` entries are resolved locally and
/// kept unresolved when the target is missing.
pub fn collect_parameters(root: &Value, path_item: &Value, operation: &Value) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::new();
    let mut seen: Vec<(String, String)> = Vec::new();

    for level in [path_item, operation] {
        let Some(entries) = level.get("parameters").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            let resolved = match entry.get("$ref").and_then(Value::as_str) {
                Some(reference) => resolve_local_ref(root, reference).unwrap_or_else(|| entry.clone()),
                None => entry.clone(),
            };
            let name = resolved.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let location = resolved.get("in").and_then(Value::as_str).unwrap_or_default().to_string();
            if name.is_empty() || location.is_empty() {
                continue;
            }
            match seen.iter().position(|(n, l)| n == &name && l == &location) {
                Some(index) => merged[index] = resolved,
                None => {
                    merged.push(resolved);
                    seen.push((name, location));
                }
            }
        }
    }
    merged
}

/// First `servers[].url` of the document.
pub fn default_server_url(document: &Value) -> Option<String> {
    document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .and_then(|server| server.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Security schemes under `components.securitySchemes`.
pub fn security_schemes(document: &Value) -> IndexMap<String, SecurityScheme> {
    let Some(schemes) = document.pointer("/components/securitySchemes").and_then(Value::as_object) else {
        return IndexMap::new();
    };
    schemes
        .iter()
        .map(|(name, scheme)| {
            let kind = scheme.get("type").and_then(Value::as_str).unwrap_or_default();
            let parsed = match kind {
                "apiKey" => {
                    let location = scheme
                        .get("in")
                        .and_then(Value::as_str)
                        .and_then(ParameterLocation::parse)
                        .unwrap_or(ParameterLocation::Header);
                    let key_name = scheme.get("name").and_then(Value::as_str).unwrap_or(name).to_string();
                    SecurityScheme::ApiKey { name: key_name, location }
                }
                "http" => match scheme.get("scheme").and_then(Value::as_str).map(str::to_ascii_lowercase).as_deref() {
                    Some("basic") => SecurityScheme::Basic,
                    Some("bearer") => SecurityScheme::Bearer,
                    _ => SecurityScheme::Other(kind.to_string()),
                },
                other => SecurityScheme::Other(other.to_string()),
            };
            (name.clone(), parsed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "openapi": "3.0.0",
            "servers": [{"url": "https://api.example.com"}],
            "components": {
                "parameters": {"Trace": {"name": "trace", "in": "header"}},
                "securitySchemes": {
                    "apiKey": {"type": "apiKey", "in": "header", "name": "X-Api-Key"},
                    "token": {"type": "http", "scheme": "bearer"}
                }
            },
            "paths": {
                "/users/{id}": {
                    "parameters": [
                        {"name": "id", "in": "path", "description": "path level"},
                        {"$ref": "#/components/parameters/Trace"}
                    ],
                    "get": {
                        "operationId": "getUser",
                        "headers": {"Accept-Language": "en"},
                        "parameters": [
                            {"name": "id", "in": "path", "description": "operation level"},
                            {"name": "expand", "in": "query"}
                        ]
                    },
                    "post": {
                        "operationId": "updateUser",
                        "requestBody": {"content": {"multipart/form-data": {}}}
                    }
                }
            }
        })
    }

    #[test]
    fn path_and_method_lookup_merges_parameters() {
        let selector = OperationSelector {
            path: Some("/users/{id}".into()),
            method: Some("GET".into()),
            operation_id: None,
        };
        let operation = find_operation(&document(), &selector).unwrap();
        assert_eq!(operation.parameter_names(), vec!["id", "trace", "expand"]);
        assert_eq!(operation.method, "get");
        assert_eq!(operation.headers.get("Accept-Language").map(String::as_str), Some("en"));
        assert!(operation.parameters[0].required);
    }

    #[test]
    fn operation_id_lookup_scans_paths() {
        let selector = OperationSelector {
            operation_id: Some("updateUser".into()),
            ..OperationSelector::default()
        };
        let operation = find_operation(&document(), &selector).unwrap();
        assert_eq!(operation.method, "post");
        assert_eq!(operation.request_content, Some(RequestContent::Multipart));
        assert_eq!(operation.parameter_names(), vec!["id", "trace"]);
    }

    #[test]
    fn lookup_failures_are_specific() {
        let missing_path = OperationSelector {
            path: Some("/teams".into()),
            method: Some("get".into()),
            operation_id: None,
        };
        assert_eq!(
            find_operation(&document(), &missing_path).unwrap_err(),
            OpenApiLookupError::PathNotFound("/teams".into())
        );

        let missing_method = OperationSelector {
            path: Some("/users/{id}".into()),
            method: Some("delete".into()),
            operation_id: None,
        };
        assert!(matches!(
            find_operation(&document(), &missing_method),
            Err(OpenApiLookupError::MethodNotFound { .. })
        ));

        let missing_id = OperationSelector {
            operation_id: Some("nope".into()),
            ..OperationSelector::default()
        };
        assert_eq!(
            find_operation(&document(), &missing_id).unwrap_err(),
            OpenApiLookupError::OperationIdNotFound("nope".into())
        );
    }

    #[test]
    fn servers_and_security_schemes_are_read() {
        let doc = document();
        assert_eq!(default_server_url(&doc).as_deref(), Some("https://api.example.com"));
        let schemes = security_schemes(&doc);
        assert_eq!(
            schemes["apiKey"],
            SecurityScheme::ApiKey {
                name: "X-Api-Key".into(),
                location: ParameterLocation::Header
            }
        );
        assert_eq!(schemes["token"], SecurityScheme::Bearer);
    }
}
