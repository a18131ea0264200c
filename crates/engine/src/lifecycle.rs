//! The activity run.
//!
//! [`Process::execute_node`] performs one activity in a fixed order: gate on
//! required activities, resolve parameters and the request body, pre-process,
//! dispatch, store, run sub-activities, hand special results to the UI
//! surface, and record the execution. Sub-activities run strictly one after
//! another so that each sees the result of its predecessor.

use dstk_types::{ExecutedActivity, ServiceUi, StoreScope, ValueSource};
use dstk_util::{select_path, value_to_text};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::activity::{Activity, ActivityHandle};
use crate::error::{ActivityError, ActivityErrorKind, ExecutionError, FunctionError};
use crate::execution::{ActivityExecution, run_local};
use crate::module::FunctionOutput;
use crate::parameter::ParameterResolver;
use crate::process::Process;
use crate::remote::{Endpoint, OpenApiBackend};
use crate::store::Store;

/// Per-run switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Show the completion alert for top-level activities.
    pub alert: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { alert: true }
    }
}

impl RunOptions {
    pub(crate) fn silent() -> Self {
        Self { alert: false }
    }
}

impl Process {
    /// Run one activity and its sub-activities.
    ///
    /// # Arguments
    /// - `parent_result`: Result of the invoking parent, if any
    /// - `previous_result`: Result of the preceding sibling, if any
    ///
    /// # Errors
    /// Rejects when the activity is inactive, a required activity has not run,
    /// a parameter cannot be read, pre-processing fails, the strategy fails, or
    /// a sub-activity fails. Inactive and gated activities reject before any
    /// side effect.
    pub(crate) fn execute_node(
        &self,
        handle: ActivityHandle,
        parent_result: Option<Value>,
        previous_result: Option<Value>,
        options: RunOptions,
    ) -> BoxFuture<'_, Result<Value, ActivityError>> {
        async move {
            let activity = self.activity(handle);
            let service_title = self.service_title(&activity.service);
            let fail = |kind: ActivityErrorKind, message: String| {
                ActivityError::new(service_title.clone(), activity.title.clone(), kind, message)
            };

            let Some(execution) = activity.execution.as_ref() else {
                return Err(fail(ActivityErrorKind::ParametersError, "Activity not active".to_string()));
            };

            if let Some(message) = self.unmet_requirement(activity) {
                self.context.ui().alert(&format!("{}: failed: {message}", activity.title));
                return Err(fail(ActivityErrorKind::RequiredActivitiesNotExecuted, message));
            }

            let mut parameters = self
                .parameter_values(activity, parent_result.as_ref(), previous_result.as_ref())
                .await
                .map_err(|error| fail(ActivityErrorKind::ParametersError, error.to_string()))?;
            let body = self
                .request_body(activity, parent_result.as_ref(), previous_result.as_ref())
                .await
                .map_err(|error| fail(ActivityErrorKind::ParametersError, error.to_string()))?;

            if let Some(pre_process) = &activity.pre_process {
                match pre_process.call_named(&parameters, body.as_ref()).await {
                    Ok(FunctionOutput::Value(Value::Object(overrides))) => parameters.extend(overrides),
                    Ok(_) => {}
                    Err(FunctionError::Cancelled) => {
                        debug!(activity = %activity.name, "preProcess cancelled; continuing with unchanged parameters");
                    }
                    Err(FunctionError::Failed(message)) => {
                        return Err(fail(
                            ActivityErrorKind::ExecutionFailed,
                            format!("PreProcess failed {message}; {}", pre_process.name()),
                        ));
                    }
                }
            }

            let result = if activity.skips_execution() {
                debug!(service = %activity.service, activity = %activity.name, "execution skipped by debug override");
                activity
                    .debug
                    .as_ref()
                    .and_then(|debug| debug.result_data.clone())
                    .unwrap_or_else(|| Value::Object(Map::new()))
            } else {
                match self.call_exec(activity, execution, &parameters, body.as_ref()).await {
                    Ok(result) => result,
                    Err(error) => {
                        let error = fail(ActivityErrorKind::ExecutionFailed, error.to_string());
                        self.context.ui().alert(&error.alert_text());
                        return Err(error);
                    }
                }
            };

            if !activity.is_reference()
                && let Some(store_result) = &activity.store_result
            {
                self.store_for(store_result.scope, &activity.service)
                    .set(store_result.key.clone(), result.clone());
            }

            let mut previous = None;
            for sub_activity in &activity.sub_activities {
                let sub_result = self
                    .execute_node(*sub_activity, Some(result.clone()), previous.take(), options)
                    .await
                    .map_err(|error| fail(ActivityErrorKind::ExecutionFailed, format!("Sub-activity failed:\n{error}")))?;
                previous = Some(sub_result);
            }

            self.present_result(activity, &result)
                .map_err(|message| fail(ActivityErrorKind::ExecutionFailed, message))?;

            if activity.parent.is_none() && !activity.is_reference() && activity.ui.alert != Some(false) && options.alert {
                self.context.ui().alert(&format!("Activity executed: {}", activity.title));
            }

            if !activity.generated {
                self.context
                    .record_executed(ExecutedActivity::new(&activity.service, &activity.name, &activity.title));
            }
            Ok(result)
        }
        .boxed()
    }

    /// Dispatch to the execution strategy.
    pub(crate) async fn call_exec(
        &self,
        activity: &Activity,
        execution: &ActivityExecution,
        parameters: &IndexMap<String, Value>,
        body: Option<&Value>,
    ) -> Result<Value, ExecutionError> {
        debug!(
            service = %activity.service,
            activity = %activity.name,
            strategy = execution.kind().as_str(),
            parameters = parameters.len(),
            "executing activity"
        );
        match execution {
            ActivityExecution::LocalFunction(function) => run_local(function, parameters, body).await,
            ActivityExecution::RemoteOperation(operation) => {
                let endpoint = self.endpoint(&operation.backend).await;
                operation
                    .execute(self.context.transport(), &endpoint, parameters, body)
                    .await
            }
            ActivityExecution::BridgeModule(capability) => capability.execute(parameters, body).await,
            ActivityExecution::Reference(target) => {
                let forwarded = Value::Object(parameters.clone().into_iter().collect());
                self.execute_node(*target, Some(forwarded), None, RunOptions::silent())
                    .await
                    .map_err(|error| ExecutionError::Reference(Box::new(error)))
            }
        }
    }

    /// Message of the first required activity missing from the executed log.
    fn unmet_requirement(&self, activity: &Activity) -> Option<String> {
        activity.required.iter().find_map(|required| {
            let service_name = required.service_name.as_deref().unwrap_or(&activity.service);
            if self.context.is_executed(service_name, &required.activity_name) {
                return None;
            }
            Some(required.error_message.clone().unwrap_or_else(|| {
                let title = self
                    .find_any_activity(service_name, &required.activity_name)
                    .map(|handle| self.activity(handle).title.clone())
                    .unwrap_or_else(|| required.activity_name.clone());
                format!(
                    "You need to execute '{title}' from the service '{}' before",
                    self.service_title(service_name)
                )
            }))
        })
    }

    /// Values of every static and dynamic parameter.
    ///
    /// Dynamic parameters pick their resolver anew on each call. A dynamic
    /// parameter that cannot be resolved is skipped with a warning.
    pub(crate) async fn parameter_values(
        &self,
        activity: &Activity,
        parent_result: Option<&Value>,
        previous_result: Option<&Value>,
    ) -> Result<IndexMap<String, Value>, ExecutionError> {
        let mut values = IndexMap::new();
        for (name, resolver) in &activity.parameters {
            let value = self.resolve_parameter(activity, resolver, parent_result, previous_result).await?;
            values.insert(name.clone(), value);
        }
        for (name, dynamic) in &activity.dynamic_parameters {
            let Some(resolver) = dynamic.resolver() else {
                warn!(activity = %activity.name, parameter = %name, "Undefined parameter assignment for dynamic parameter");
                continue;
            };
            match self.resolve_parameter(activity, &resolver, parent_result, previous_result).await {
                Ok(value) => {
                    values.insert(name.clone(), value);
                }
                Err(error) => warn!(activity = %activity.name, parameter = %name, error = %error, "dynamic parameter failed"),
            }
        }
        Ok(values)
    }

    /// Request body of the activity, if it declares one.
    ///
    /// A `data` part is sent as the raw body and any other parts are ignored.
    /// Otherwise the parts are assembled into an object.
    pub(crate) async fn request_body(
        &self,
        activity: &Activity,
        parent_result: Option<&Value>,
        previous_result: Option<&Value>,
    ) -> Result<Option<Value>, ExecutionError> {
        if activity.request_body.is_empty() {
            return Ok(None);
        }
        if let Some(data) = activity.request_body.get("data") {
            if activity.request_body.len() > 1 {
                warn!(activity = %activity.name, "requestBody declares 'data' next to other parts; only 'data' is sent");
            }
            return self
                .resolve_parameter(activity, data, parent_result, previous_result)
                .await
                .map(Some);
        }
        let mut body = Map::new();
        for (name, resolver) in &activity.request_body {
            let value = self.resolve_parameter(activity, resolver, parent_result, previous_result).await?;
            body.insert(name.clone(), value);
        }
        Ok(Some(Value::Object(body)))
    }

    async fn resolve_parameter(
        &self,
        activity: &Activity,
        resolver: &ParameterResolver,
        parent_result: Option<&Value>,
        previous_result: Option<&Value>,
    ) -> Result<Value, ExecutionError> {
        let value = match resolver {
            ParameterResolver::Input(name) | ParameterResolver::FileInput(name) => {
                let Some(input) = self.service(&activity.service).and_then(|service| service.input(name)) else {
                    warn!(service = %activity.service, input = %name, "bound input does not exist");
                    return Ok(Value::Null);
                };
                input.value(&self.context).await?
            }
            ParameterResolver::ParentResult => parent_result.cloned().unwrap_or(Value::Null),
            ParameterResolver::PreviousResult => previous_result.cloned().unwrap_or(Value::Null),
            ParameterResolver::Constant(value) => value.clone(),
            ParameterResolver::Store { scope, key, path } => {
                let stored = self.store_for(*scope, &activity.service).get(key);
                match path {
                    Some(path) => select_path(&stored, path).cloned().unwrap_or(Value::Null),
                    None => stored,
                }
            }
            ParameterResolver::QueryParam(name) => self
                .context
                .query_param(name)
                .map(|value| Value::String(value.to_string()))
                .unwrap_or(Value::Null),
            ParameterResolver::Generate(generator) => {
                match self.execute_node(*generator, None, None, RunOptions::silent()).await {
                    Ok(value) => value,
                    Err(error) => {
                        error!(activity = %activity.name, "GenerateVariable-activity failed: {error}");
                        Value::Null
                    }
                }
            }
        };
        Ok(value)
    }

    /// Store addressed by `scope` from an activity of `service`.
    pub(crate) fn store_for(&self, scope: StoreScope, service: &str) -> &Store {
        match scope {
            StoreScope::Activity => self.context.activity_store(),
            StoreScope::Process => self.process_store(),
            StoreScope::Service => self
                .service(service)
                .map(|service| &service.store)
                .unwrap_or_else(|| self.process_store()),
        }
    }

    /// Server and credentials refreshed from their sources.
    async fn endpoint(&self, backend: &OpenApiBackend) -> Endpoint {
        let server = match &backend.server {
            Some(source) => self.resolve_value_source(&backend.service, source).await,
            None => None,
        };
        let mut credentials = IndexMap::new();
        for (scheme, source) in &backend.authorization {
            match self.resolve_value_source(&backend.service, source).await {
                Some(credential) => {
                    credentials.insert(scheme.clone(), credential);
                }
                None => debug!(service = %backend.service, scheme = %scheme, "no credential available"),
            }
        }
        Endpoint { server, credentials }
    }

    async fn resolve_value_source(&self, service: &str, source: &ValueSource) -> Option<String> {
        match source {
            ValueSource::Literal(value) | ValueSource::Constant { constant: value } => Some(value.clone()),
            ValueSource::QueryParam { query_param } => self.context.query_param(query_param).map(str::to_string),
            ValueSource::Field { field } => {
                let input = self.service(service).and_then(|service| service.input(field))?;
                match input.value(&self.context).await {
                    Ok(Value::Null) => None,
                    Ok(value) => Some(value_to_text(&value)).filter(|text| !text.is_empty()),
                    Err(error) => {
                        warn!(service = %service, field = %field, error = %error, "value source field could not be read");
                        None
                    }
                }
            }
        }
    }

    /// Hand the result to the UI surface as the activity's `ui` section asks.
    fn present_result(&self, activity: &Activity, result: &Value) -> Result<(), String> {
        let surface = self.context.ui();
        if let Some(target) = &activity.ui.result_as_output_html {
            surface.replace_output(&activity.service, target, result);
        } else if activity.ui.result_as_dynamic_ui {
            let dynamic: ServiceUi =
                serde_json::from_value(result.clone()).map_err(|error| format!("result is not a valid dynamic UI: {error}"))?;
            if let Some(service) = self.service(&activity.service) {
                service.register_inputs(&dynamic);
            }
            surface.insert_inputs(&activity.service, &dynamic);
        } else if let Some(position) = activity
            .ui
            .results_as_open_input
            .and_then(|setting| setting.position())
        {
            surface.append_open_input(&activity.service, result, position);
        }
        Ok(())
    }
}
