//! Execution strategies.
//!
//! [`ActivityExecution`] is the closed set of ways an activity produces its
//! result. Callers branch on [`ExecutionKind`]; backend details stay inside the
//! variant.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::activity::{Activity, ActivityHandle};
use crate::error::ExecutionError;
use crate::module::{FunctionOutput, FunctionResponse, LocalFunction};
use crate::remote::RemoteOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    LocalFunction,
    RemoteOperation,
    BridgeModule,
    Reference,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionKind::LocalFunction => "localFunction",
            ExecutionKind::RemoteOperation => "remoteOperation",
            ExecutionKind::BridgeModule => "bridgeModule",
            ExecutionKind::Reference => "reference",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ActivityExecution {
    /// Function of the process module.
    LocalFunction(LocalFunction),
    RemoteOperation(Arc<RemoteOperation>),
    /// Function exposed by a bridge's client or support module.
    BridgeModule(Arc<ModuleCapability>),
    /// Forward to another activity.
    Reference(ActivityHandle),
}

impl ActivityExecution {
    pub fn kind(&self) -> ExecutionKind {
        match self {
            ActivityExecution::LocalFunction(_) => ExecutionKind::LocalFunction,
            ActivityExecution::RemoteOperation(_) => ExecutionKind::RemoteOperation,
            ActivityExecution::BridgeModule(_) => ExecutionKind::BridgeModule,
            ActivityExecution::Reference(_) => ExecutionKind::Reference,
        }
    }

    /// Names of the parameters the strategy consumes, in call order.
    ///
    /// References report the parameters of their target. Chains of references
    /// are followed; an inactive target contributes no names.
    pub fn parameter_names(&self, activities: &[Activity]) -> Vec<String> {
        let mut current = self;
        let mut hops = 0;
        loop {
            match current {
                ActivityExecution::LocalFunction(function) => return function.parameter_names().to_vec(),
                ActivityExecution::RemoteOperation(operation) => return operation.parameter_names(),
                ActivityExecution::BridgeModule(capability) => return capability.function.parameter_names().to_vec(),
                ActivityExecution::Reference(target) => {
                    hops += 1;
                    match activities.get(target.index()).and_then(|activity| activity.execution.as_ref()) {
                        Some(next) if hops <= activities.len() => current = next,
                        _ => return Vec::new(),
                    }
                }
            }
        }
    }
}

/// Capability backed by a module function.
#[derive(Debug)]
pub struct ModuleCapability {
    pub name: String,
    pub function: LocalFunction,
    pub post_process: Option<LocalFunction>,
}

impl ModuleCapability {
    /// Call the function, normalize its output, and run the post-process hook.
    ///
    /// # Errors
    /// - `Response("No response")` when the function returns `null`
    /// - `Http` when a response-like output carries a status above 299
    /// - the function's own failure
    pub async fn execute(&self, parameters: &IndexMap<String, Value>, body: Option<&Value>) -> Result<Value, ExecutionError> {
        debug!(capability = %self.name, function = %self.function.name(), "calling module capability");
        let output = self.function.call_named(parameters, body).await?;
        let value = match output {
            FunctionOutput::Value(Value::Null) => return Err(ExecutionError::Response("No response".to_string())),
            other => unwrap_function_output(other)?,
        };
        apply_post_process(self.post_process.as_ref(), value).await
    }
}

/// Run a local function and unwrap response-like output.
pub async fn run_local(
    function: &LocalFunction,
    parameters: &IndexMap<String, Value>,
    body: Option<&Value>,
) -> Result<Value, ExecutionError> {
    let output = function.call_named(parameters, body).await?;
    unwrap_function_output(output)
}

/// Plain values pass through. Response-like output is decoded as JSON when its
/// content type says so and as a byte array otherwise.
pub fn unwrap_function_output(output: FunctionOutput) -> Result<Value, ExecutionError> {
    match output {
        FunctionOutput::Value(value) => Ok(value),
        FunctionOutput::Response(response) => unwrap_response(response),
    }
}

fn unwrap_response(response: FunctionResponse) -> Result<Value, ExecutionError> {
    if response.status > 299 {
        let message = if response.status_text.is_empty() {
            format!("status {}", response.status)
        } else {
            response.status_text
        };
        return Err(ExecutionError::Http {
            status: response.status,
            message,
        });
    }
    let is_json = response
        .content_type
        .as_deref()
        .is_some_and(|content_type| content_type.contains("application/json"));
    if is_json {
        return serde_json::from_slice(&response.body).map_err(|error| ExecutionError::Decode(error.to_string()));
    }
    Ok(Value::Array(response.body.into_iter().map(Value::from).collect()))
}

/// Pipe `value` through the post-process hook when one is bound.
pub async fn apply_post_process(post_process: Option<&LocalFunction>, value: Value) -> Result<Value, ExecutionError> {
    let Some(function) = post_process else {
        return Ok(value);
    };
    let output = function
        .call(vec![value])
        .await
        .map_err(|error| ExecutionError::PostProcess(format!("{}: {error}", function.name())))?;
    unwrap_function_output(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FunctionError;
    use serde_json::json;

    fn responding(status: u16, content_type: Option<&str>, body: &str) -> LocalFunction {
        let response = FunctionResponse {
            status,
            status_text: if status > 299 { "Bad Request".into() } else { "OK".into() },
            content_type: content_type.map(str::to_string),
            body: body.as_bytes().to_vec(),
        };
        LocalFunction::new("respond", &[], move |_| {
            let response = response.clone();
            async move { Ok(FunctionOutput::Response(response)) }
        })
    }

    fn capability(function: LocalFunction, post_process: Option<LocalFunction>) -> ModuleCapability {
        ModuleCapability {
            name: "cap".into(),
            function,
            post_process,
        }
    }

    #[tokio::test]
    async fn module_capability_unwraps_json_responses() {
        let cap = capability(responding(200, Some("application/json; charset=utf-8"), r#"{"ok":true}"#), None);
        assert_eq!(cap.execute(&IndexMap::new(), None).await.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn module_capability_returns_bytes_for_other_content() {
        let cap = capability(responding(200, Some("application/octet-stream"), "AB"), None);
        assert_eq!(cap.execute(&IndexMap::new(), None).await.unwrap(), json!([65, 66]));
    }

    #[tokio::test]
    async fn module_capability_rejects_error_status_and_null_output() {
        let cap = capability(responding(400, None, ""), None);
        let error = cap.execute(&IndexMap::new(), None).await.unwrap_err();
        assert_eq!(
            error,
            ExecutionError::Http {
                status: 400,
                message: "Bad Request".into()
            }
        );

        let cap = capability(LocalFunction::sync("nothing", &[], |_| Ok(Value::Null)), None);
        let error = cap.execute(&IndexMap::new(), None).await.unwrap_err();
        assert_eq!(error.to_string(), "No response");
    }

    #[tokio::test]
    async fn post_process_transforms_result() {
        let pick = LocalFunction::sync("pick", &["result"], |arguments| Ok(arguments[0]["name"].clone()));
        let cap = capability(
            LocalFunction::sync("user", &[], |_| Ok(json!({"name": "Ada"}))),
            Some(pick),
        );
        assert_eq!(cap.execute(&IndexMap::new(), None).await.unwrap(), json!("Ada"));
    }

    #[tokio::test]
    async fn post_process_failure_is_reported() {
        let failing = LocalFunction::sync("explode", &["result"], |_| Err(FunctionError::failed("boom")));
        let error = apply_post_process(Some(&failing), json!(1)).await.unwrap_err();
        assert_eq!(error.to_string(), "postProcess failed: explode: boom");
    }

    #[test]
    fn reference_reports_target_parameter_names() {
        let target = Activity {
            execution: Some(ActivityExecution::LocalFunction(LocalFunction::sync("f", &["a", "b"], |_| Ok(Value::Null)))),
            ..Activity::new("users", "target", "Target")
        };
        let activities = vec![target];
        let reference = ActivityExecution::Reference(ActivityHandle::new(0));
        assert_eq!(reference.parameter_names(&activities), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(reference.kind(), ExecutionKind::Reference);

        let dangling = ActivityExecution::Reference(ActivityHandle::new(9));
        assert!(dangling.parameter_names(&activities).is_empty());
    }
}
