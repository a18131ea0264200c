//! Structural validation of loaded documents.
//!
//! Serde already rejects documents with the wrong shape. These checks cover
//! the rules that types alone cannot express, such as "exactly one execution
//! source per activity". Violations carry a JSON pointer to the offending
//! node so hosts can point authors at the right place.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::activity::{ActivityDefinition, CommonActivity, ParameterDefinition, SequenceDefinition, SharedParameter};
use crate::bridge::{BridgeDocument, ServiceBridge};
use crate::document::{PageDocument, ProcessDocument};

/// One failed validation rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentViolation {
    /// JSON pointer of the offending node.
    pub instance_path: String,
    pub message: String,
    /// Rule-specific details.
    #[serde(default)]
    pub params: Value,
}

impl DocumentViolation {
    pub fn new(instance_path: impl Into<String>, message: impl Into<String>, params: Value) -> Self {
        Self {
            instance_path: instance_path.into(),
            message: message.into(),
            params,
        }
    }
}

impl std::fmt::Display for DocumentViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.instance_path, self.message)
    }
}

/// Validate a page document, including an inline process when present.
pub fn validate_page(page: &PageDocument) -> Vec<DocumentViolation> {
    let mut violations = Vec::new();
    if page.process.is_empty() {
        violations.push(DocumentViolation::new(
            "/process",
            "must have either `uri` or `instance`",
            json!({"missingProperty": "uri"}),
        ));
    }
    for (service_name, service) in &page.services {
        let path = format!("/services/{service_name}");
        if let Some(bridge) = &service.bridge {
            check_service_bridge(&format!("{path}/bridge"), bridge, &mut violations);
        }
        check_shared_parameters(&format!("{path}/parameters"), &service.parameters, &mut violations);
    }
    check_shared_parameters("/common/parameters", &page.common.parameters, &mut violations);
    if let Some(process) = &page.process.instance {
        for mut violation in validate_process(process) {
            violation.instance_path = format!("/process/instance{}", violation.instance_path);
            violations.push(violation);
        }
    }
    violations
}

/// Validate a process document.
pub fn validate_process(process: &ProcessDocument) -> Vec<DocumentViolation> {
    let mut violations = Vec::new();
    for (service_name, service) in &process.services {
        let path = format!("/services/{service_name}");
        for (activity_name, activity) in &service.activities {
            check_activity(&format!("{path}/activities/{activity_name}"), activity, &mut violations);
        }
        check_sequences(&format!("{path}/sequences"), &service.sequences, &mut violations);
        check_shared_parameters(&format!("{path}/parameters"), &service.parameters, &mut violations);
        if let Some(bridge) = &service.bridge {
            check_service_bridge(&format!("{path}/bridge"), bridge, &mut violations);
        }
    }
    for (activity_name, activity) in &process.common.activities {
        let path = format!("/common/activities/{activity_name}");
        match activity {
            CommonActivity::Definition(definition) => check_activity(&path, definition, &mut violations),
            CommonActivity::Reference(reference) => {
                for (sub_name, sub) in &reference.sub_activities {
                    check_activity(&format!("{path}/subActivities/{sub_name}"), sub, &mut violations);
                }
            }
        }
    }
    check_sequences("/common/sequences", &process.common.sequences, &mut violations);
    check_shared_parameters("/common/parameters", &process.common.parameters, &mut violations);
    violations
}

/// Validate a bridge document.
pub fn validate_bridge(bridge: &BridgeDocument) -> Vec<DocumentViolation> {
    let mut violations = Vec::new();
    let execute = &bridge.execute;
    if !execute.is_openapi() && execute.api_client_module_uri.is_none() {
        violations.push(DocumentViolation::new(
            "/execute",
            "must declare `openapiSchemaUri`, `openapiSchema`, or `apiClientModuleUri`",
            json!({"missingProperty": "openapiSchemaUri"}),
        ));
    }
    for (name, capability) in &bridge.capabilities {
        let path = format!("/capabilities/{name}");
        match (&capability.operation, &capability.function_name) {
            (None, None) => violations.push(DocumentViolation::new(
                path,
                "must declare `operation` or `functionName`",
                json!({"missingProperty": "operation"}),
            )),
            (Some(operation), _) => {
                let by_path = operation.path.is_some() && operation.method.is_some();
                if !by_path && operation.operation_id.is_none() {
                    violations.push(DocumentViolation::new(
                        format!("{path}/operation"),
                        "must declare `operationId` or both `path` and `method`",
                        json!({"missingProperty": "operationId"}),
                    ));
                }
            }
            (None, Some(_)) => {}
        }
    }
    violations
}

fn check_activity(path: &str, activity: &ActivityDefinition, violations: &mut Vec<DocumentViolation>) {
    match (&activity.bridge_capability, &activity.module_function) {
        (Some(_), Some(_)) => violations.push(DocumentViolation::new(
            path,
            "must not declare both `bridgeCapability` and `moduleFunction`",
            json!({"oneOf": ["bridgeCapability", "moduleFunction"]}),
        )),
        (None, None) => violations.push(DocumentViolation::new(
            path,
            "must declare `bridgeCapability` or `moduleFunction`",
            json!({"missingProperty": "bridgeCapability"}),
        )),
        _ => {}
    }
    if let Some(store) = &activity.store_result
        && store.key.trim().is_empty()
    {
        violations.push(DocumentViolation::new(
            format!("{path}/storeResult/key"),
            "must not be empty",
            json!({"limit": 1}),
        ));
    }
    for (index, required) in activity.required_activities.iter().enumerate() {
        if required.activity_name.trim().is_empty() {
            violations.push(DocumentViolation::new(
                format!("{path}/requiredActivities/{index}/activityName"),
                "must not be empty",
                json!({"limit": 1}),
            ));
        }
    }
    for (name, parameter) in &activity.parameters {
        check_parameter(&format!("{path}/parameters/{name}"), parameter, violations);
    }
    if let Some(body) = &activity.request_body {
        for (name, parameter) in body {
            check_parameter(&format!("{path}/requestBody/{name}"), parameter, violations);
        }
    }
    for (name, sub) in &activity.sub_activities {
        check_activity(&format!("{path}/subActivities/{name}"), sub, violations);
    }
}

fn check_parameter(path: &str, parameter: &ParameterDefinition, violations: &mut Vec<DocumentViolation>) {
    if let Some(store) = &parameter.store
        && store.key.trim().is_empty()
    {
        violations.push(DocumentViolation::new(
            format!("{path}/store/key"),
            "must not be empty",
            json!({"limit": 1}),
        ));
    }
    if let Some(generate) = &parameter.generate {
        let sources = [&generate.bridge_capability, &generate.module_function]
            .iter()
            .filter(|source| source.is_some())
            .count();
        if sources != 1 {
            violations.push(DocumentViolation::new(
                format!("{path}/generate"),
                "must declare exactly one of `bridgeCapability` or `moduleFunction`",
                json!({"oneOf": ["bridgeCapability", "moduleFunction"]}),
            ));
        }
        for (name, nested) in &generate.parameters {
            check_parameter(&format!("{path}/generate/parameters/{name}"), nested, violations);
        }
    }
}

fn check_shared_parameters(
    path: &str,
    parameters: &IndexMap<String, SharedParameter>,
    violations: &mut Vec<DocumentViolation>,
) {
    for (name, parameter) in parameters {
        if let SharedParameter::Definition(definition) = parameter {
            check_parameter(&format!("{path}/{name}"), definition, violations);
        }
    }
}

fn check_sequences(
    path: &str,
    sequences: &IndexMap<String, SequenceDefinition>,
    violations: &mut Vec<DocumentViolation>,
) {
    for (name, sequence) in sequences {
        if sequence.activities.is_empty() {
            violations.push(DocumentViolation::new(
                format!("{path}/{name}/activities"),
                "must not be empty",
                json!({"limit": 1}),
            ));
        }
    }
}

fn check_service_bridge(path: &str, bridge: &ServiceBridge, violations: &mut Vec<DocumentViolation>) {
    if bridge.source.is_empty() {
        violations.push(DocumentViolation::new(
            format!("{path}/source"),
            "must have either `uri` or `instance`",
            json!({"missingProperty": "uri"}),
        ));
    }
    if let Some(instance) = &bridge.source.instance {
        for mut violation in validate_bridge(instance) {
            violation.instance_path = format!("{path}/source/instance{}", violation.instance_path);
            violations.push(violation);
        }
    }
}
