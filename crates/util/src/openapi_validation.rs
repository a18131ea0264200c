//! OpenAPI schema preflight for bridge documents.
//!
//! Runs before capabilities are bound so that a schema which cannot serve any
//! request is reported once, with every problem, instead of surfacing as a
//! string of per-capability lookup failures.

use dstk_types::{CapabilityDefinition, DocumentViolation};
use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::openapi::{HTTP_METHODS, find_operation};

/// Collect structural problems of an OpenAPI document.
///
/// Checks that:
/// - `openapi` is a `3.x` version string (Swagger 2 documents are named as such)
/// - `paths` exists and is an object
/// - at least one HTTP operation is declared
pub fn openapi_violations(document: &Value) -> Vec<DocumentViolation> {
    let mut violations = Vec::new();

    match document.get("openapi") {
        Some(Value::String(version)) if version.starts_with("3.") => {}
        Some(Value::String(version)) => violations.push(DocumentViolation::new(
            "/openapi",
            format!("unsupported OpenAPI version '{version}'; expected 3.x"),
            json!({"version": version}),
        )),
        Some(_) => violations.push(DocumentViolation::new("/openapi", "must be a string", json!({"type": "string"}))),
        None => match document.get("swagger").and_then(Value::as_str) {
            Some(version) => violations.push(DocumentViolation::new(
                "/swagger",
                format!("Swagger {version} document detected; OpenAPI 3.x is required"),
                json!({"version": version}),
            )),
            None => violations.push(DocumentViolation::new(
                "",
                "must have required property 'openapi'",
                json!({"missingProperty": "openapi"}),
            )),
        },
    }

    match document.get("paths") {
        Some(Value::Object(paths)) => {
            let operations = paths
                .values()
                .filter_map(Value::as_object)
                .map(|item| item.keys().filter(|key| HTTP_METHODS.contains(&key.as_str())).count())
                .sum::<usize>();
            if operations == 0 {
                violations.push(DocumentViolation::new("/paths", "declares no HTTP operations", Value::Null));
            }
        }
        Some(_) => violations.push(DocumentViolation::new("/paths", "must be object", json!({"type": "object"}))),
        None => violations.push(DocumentViolation::new(
            "",
            "must have required property 'paths'",
            json!({"missingProperty": "paths"}),
        )),
    }

    violations
}

/// Capabilities whose operation selector does not resolve against `document`.
///
/// Capabilities without an operation are skipped; they are served by the
/// support module.
pub fn unresolved_capabilities(document: &Value, capabilities: &IndexMap<String, CapabilityDefinition>) -> Vec<DocumentViolation> {
    capabilities
        .iter()
        .filter_map(|(name, capability)| {
            let selector = capability.operation.as_ref()?;
            let error = find_operation(document, selector).err()?;
            Some(DocumentViolation::new(
                format!("/capabilities/{name}/operation"),
                error.to_string(),
                json!({"capability": name}),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstk_types::OperationSelector;

    #[test]
    fn reports_missing_version_and_paths() {
        let violations = openapi_violations(&json!({}));
        let messages: Vec<String> = violations.iter().map(ToString::to_string).collect();
        assert_eq!(violations.len(), 2, "unexpected violations: {messages:?}");
        assert!(messages[0].contains("'openapi'"));
        assert!(messages[1].contains("'paths'"));
    }

    #[test]
    fn names_swagger_documents() {
        let violations = openapi_violations(&json!({"swagger": "2.0", "paths": {"/apps": {"get": {}}}}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/swagger");
    }

    #[test]
    fn requires_an_operation() {
        let violations = openapi_violations(&json!({"openapi": "3.0.3", "paths": {"/apps": {"summary": "x"}}}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/paths");
        assert!(openapi_violations(&json!({"openapi": "3.1.0", "paths": {"/apps": {"get": {}}}})).is_empty());
    }

    #[test]
    fn flags_capabilities_without_operations() {
        let document = json!({"openapi": "3.0.3", "paths": {"/apps": {"get": {"operationId": "listApps"}}}});
        let mut capabilities = IndexMap::new();
        capabilities.insert(
            "listApps".to_string(),
            CapabilityDefinition {
                operation: Some(OperationSelector {
                    operation_id: Some("listApps".into()),
                    ..OperationSelector::default()
                }),
                ..CapabilityDefinition::default()
            },
        );
        capabilities.insert(
            "deleteApp".to_string(),
            CapabilityDefinition {
                operation: Some(OperationSelector {
                    operation_id: Some("deleteApp".into()),
                    ..OperationSelector::default()
                }),
                ..CapabilityDefinition::default()
            },
        );
        capabilities.insert(
            "summarize".to_string(),
            CapabilityDefinition {
                function_name: Some("summarize".into()),
                ..CapabilityDefinition::default()
            },
        );

        let violations = unresolved_capabilities(&document, &capabilities);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/capabilities/deleteApp/operation");
    }
}
