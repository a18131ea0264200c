//! Bridge documents and the value sources used for server and credential refresh.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::DocumentSource;

/// Links one service to an execution backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeDocument {
    #[serde(default)]
    pub execute: BridgeExecute,
    #[serde(default)]
    pub capabilities: IndexMap<String, CapabilityDefinition>,
    /// Module providing post-process hooks and fallback capabilities.
    #[serde(default)]
    pub support_module_uri: Option<String>,
    /// Dotted path into an error response body holding a readable message.
    #[serde(default)]
    pub error_message_path: Option<String>,
}

/// Backend selection. The OpenAPI document wins over the client module when both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeExecute {
    #[serde(default)]
    pub openapi_schema_uri: Option<String>,
    /// Inline OpenAPI document, used instead of fetching `openapiSchemaUri`.
    #[serde(default)]
    pub openapi_schema: Option<Value>,
    #[serde(default)]
    pub api_client_module_uri: Option<String>,
}

impl BridgeExecute {
    pub fn is_openapi(&self) -> bool {
        self.openapi_schema.is_some() || self.openapi_schema_uri.is_some()
    }
}

/// One named capability of a bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDefinition {
    /// Operation selector for OpenAPI-backed bridges.
    #[serde(default)]
    pub operation: Option<OperationSelector>,
    /// Function name for module-backed bridges or support-module fallbacks.
    #[serde(default)]
    pub function_name: Option<String>,
    /// Support-module function applied to successful results.
    #[serde(default)]
    pub post_process: Option<String>,
}

/// Identifies an operation either by `path` + `method` or by `operationId`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationSelector {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub operation_id: Option<String>,
}

/// Bridge binding declared on a service description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceBridge {
    #[serde(default)]
    pub server: Option<ValueSource>,
    /// Security scheme name to credential source.
    #[serde(default)]
    pub authorization: IndexMap<String, ValueSource>,
    #[serde(default)]
    pub source: DocumentSource<BridgeDocument>,
}

/// `"literal" | {constant} | {queryParam} | {field}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ValueSource {
    Literal(String),
    Constant {
        constant: String,
    },
    QueryParam {
        #[serde(rename = "queryParam")]
        query_param: String,
    },
    Field {
        field: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_source_variants_parse() {
        let sources: Vec<ValueSource> = serde_json::from_value(json!([
            "https://api.example.com",
            {"constant": "abc"},
            {"queryParam": "server"},
            {"field": "host"}
        ]))
        .unwrap();
        assert_eq!(sources[0], ValueSource::Literal("https://api.example.com".into()));
        assert_eq!(sources[1], ValueSource::Constant { constant: "abc".into() });
        assert_eq!(sources[2], ValueSource::QueryParam { query_param: "server".into() });
        assert_eq!(sources[3], ValueSource::Field { field: "host".into() });
    }

    #[test]
    fn bridge_document_reads_capabilities_in_order() {
        let bridge: BridgeDocument = serde_json::from_value(json!({
            "execute": {"openapiSchemaUri": "api.json"},
            "capabilities": {
                "listUsers": {"operation": {"path": "/users", "method": "get"}},
                "getUser": {"operation": {"operationId": "getUser"}, "postProcess": "pick"}
            },
            "errorMessagePath": "error.message"
        }))
        .unwrap();
        let names: Vec<&str> = bridge.capabilities.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["listUsers", "getUser"]);
        assert!(bridge.execute.is_openapi());
        assert_eq!(bridge.capabilities["getUser"].post_process.as_deref(), Some("pick"));
    }
}
