//! A loaded process and the operations hosts call on it.
//!
//! [`Process`] owns every activity in one arena and every service (including
//! the `process` pseudo-service) by name. Activities refer to each other and to
//! their service through handles and names resolved here.

use dstk_types::{ExecutedActivity, PROCESS_SERVICE_NAME};
use dstk_util::select_path;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{error, info};

use crate::activity::{Activity, ActivityHandle, ActivityInfo};
use crate::context::ExecutionContext;
use crate::error::{ActivityError, ActivityErrorKind, EngineError};
use crate::lifecycle::RunOptions;
use crate::service::Service;
use crate::store::Store;

/// Options of [`Process::external_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalCallOptions {
    /// Resolve the activity's own parameters before applying overrides.
    pub get_params: bool,
}

impl Default for ExternalCallOptions {
    fn default() -> Self {
        Self { get_params: true }
    }
}

pub struct Process {
    title: String,
    pub(crate) activities: Vec<Activity>,
    services: IndexMap<String, Service>,
    process_service: Service,
    pub(crate) context: ExecutionContext,
}

impl Process {
    pub(crate) fn new(
        title: String,
        activities: Vec<Activity>,
        services: IndexMap<String, Service>,
        process_service: Service,
        context: ExecutionContext,
    ) -> Self {
        Self {
            title,
            activities,
            services,
            process_service,
            context,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Service by name; `process` names the process pseudo-service.
    pub fn service(&self, name: &str) -> Option<&Service> {
        if name == PROCESS_SERVICE_NAME {
            return Some(&self.process_service);
        }
        self.services.get(name)
    }

    /// Declared services followed by the process pseudo-service.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values().chain(std::iter::once(&self.process_service))
    }

    pub fn activity(&self, handle: ActivityHandle) -> &Activity {
        &self.activities[handle.index()]
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    /// Top-level activity of `service`. Sub-activities are only reachable through their parent.
    pub fn find_activity(&self, service: &str, name: &str) -> Option<ActivityHandle> {
        self.service(service)
            .and_then(|service| service.activities.get(name))
            .copied()
    }

    /// Top-level activity of `service`, or a nested one with that name.
    pub(crate) fn find_any_activity(&self, service: &str, name: &str) -> Option<ActivityHandle> {
        if let Some(handle) = self.find_activity(service, name) {
            return Some(handle);
        }
        self.activities
            .iter()
            .position(|activity| !activity.generated && activity.service == service && activity.name == name)
            .map(ActivityHandle::new)
    }

    pub(crate) fn service_title(&self, name: &str) -> String {
        self.service(name)
            .map(|service| service.title.clone())
            .unwrap_or_else(|| name.to_string())
    }

    pub fn process_store(&self) -> &Store {
        &self.process_service.store
    }

    pub async fn execute_activity(&self, service: &str, activity: &str) -> Result<Value, EngineError> {
        self.execute_activity_with(service, activity, RunOptions::default()).await
    }

    /// Run a top-level activity.
    ///
    /// The service is marked running for the duration; a second call on the
    /// same service while one is in flight fails with
    /// [`EngineError::AlreadyRunning`] and leaves the first untouched. The
    /// per-invocation store is cleared when the run ends.
    pub async fn execute_activity_with(&self, service_name: &str, activity_name: &str, options: RunOptions) -> Result<Value, EngineError> {
        let service = self
            .service(service_name)
            .ok_or_else(|| EngineError::UnknownService(service_name.to_string()))?;
        let handle = self
            .find_activity(service_name, activity_name)
            .ok_or_else(|| EngineError::UnknownActivity {
                service: service_name.to_string(),
                activity: activity_name.to_string(),
            })?;
        let _guard = service.try_start(activity_name, self.context.activity_store())?;

        match self.execute_node(handle, None, None, options).await {
            Ok(result) => Ok(result),
            Err(error) => {
                let activity = self.activity(handle);
                self.context
                    .record_failed(ExecutedActivity::new(service_name, activity_name, &activity.title));
                Err(error.into())
            }
        }
    }

    /// Run the activities of a sequence back to back under one running flag.
    ///
    /// Stops at the first failure. The per-invocation store is shared by the
    /// whole sequence and cleared at its end.
    pub async fn execute_sequence(&self, service_name: &str, sequence_name: &str) -> Result<Vec<Value>, EngineError> {
        let service = self
            .service(service_name)
            .ok_or_else(|| EngineError::UnknownService(service_name.to_string()))?;
        let sequence = service
            .sequences
            .get(sequence_name)
            .ok_or_else(|| EngineError::UnknownSequence {
                service: service_name.to_string(),
                sequence: sequence_name.to_string(),
            })?;
        let _guard = service.try_start(sequence_name, self.context.activity_store())?;

        let mut results = Vec::with_capacity(sequence.activities.len());
        for activity_name in &sequence.activities {
            let handle = self
                .find_activity(service_name, activity_name)
                .ok_or_else(|| EngineError::UnknownActivity {
                    service: service_name.to_string(),
                    activity: activity_name.clone(),
                })?;
            match self.execute_node(handle, None, None, RunOptions::default()).await {
                Ok(result) => results.push(result),
                Err(error) => {
                    let activity = self.activity(handle);
                    self.context
                        .record_failed(ExecutedActivity::new(service_name, activity_name, &activity.title));
                    return Err(error.into());
                }
            }
        }
        Ok(results)
    }

    /// Run the autostart activities of every service, then those of the process.
    ///
    /// A service naming an unknown activity is skipped entirely; all unknown
    /// names are reported together.
    pub async fn autostart(&self) -> Result<(), EngineError> {
        for service in self.services() {
            if service.autostart.is_empty() {
                continue;
            }
            let unknown: Vec<&str> = service
                .autostart
                .iter()
                .filter(|name| self.find_activity(&service.name, name).is_none())
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                error!(service = %service.name, unknown = ?unknown, "Unknown autostart activities; autostart skipped for service");
                continue;
            }
            for activity_name in &service.autostart {
                info!(service = %service.name, activity = %activity_name, "autostart");
                self.execute_activity(&service.name, activity_name)
                    .await
                    .map_err(|error| EngineError::Autostart(Box::new(error)))?;
            }
        }
        Ok(())
    }

    /// Run only the execution strategy of an activity with caller-supplied values.
    ///
    /// `parameters` are merged over the activity's own values (resolved unless
    /// [`ExternalCallOptions::get_params`] is off) and `body`, when given,
    /// replaces its request body. Gating, storage, sub-activities, and the executed log are
    /// not involved. Failures are alerted.
    pub async fn external_call(
        &self,
        service_name: &str,
        activity_name: &str,
        parameters: IndexMap<String, Value>,
        body: Option<Value>,
        options: ExternalCallOptions,
    ) -> Result<Value, EngineError> {
        let outcome = self
            .external_call_inner(service_name, activity_name, parameters, body, options)
            .await;
        outcome.map_err(|error| {
            let error = match error {
                unknown @ EngineError::UnknownActivity { .. } => unknown,
                other => EngineError::ExternalCall {
                    service: service_name.to_string(),
                    activity: activity_name.to_string(),
                    source: Box::new(other),
                },
            };
            self.context.ui().alert(&error.to_string());
            error
        })
    }

    async fn external_call_inner(
        &self,
        service_name: &str,
        activity_name: &str,
        parameters: IndexMap<String, Value>,
        body: Option<Value>,
        options: ExternalCallOptions,
    ) -> Result<Value, EngineError> {
        let service = self
            .service(service_name)
            .ok_or_else(|| EngineError::UnknownService(service_name.to_string()))?;
        let handle = self
            .find_activity(service_name, activity_name)
            .ok_or_else(|| EngineError::UnknownActivity {
                service: service_name.to_string(),
                activity: activity_name.to_string(),
            })?;
        let _guard = service.try_start(activity_name, self.context.activity_store())?;

        let activity = self.activity(handle);
        let fail = |kind: ActivityErrorKind, message: String| {
            EngineError::from(ActivityError::new(service.title.clone(), activity.title.clone(), kind, message))
        };
        let Some(execution) = activity.execution.as_ref() else {
            return Err(fail(ActivityErrorKind::ParametersError, "Activity not active".to_string()));
        };

        let mut values = if options.get_params {
            self.parameter_values(activity, None, None)
                .await
                .map_err(|error| fail(ActivityErrorKind::ParametersError, error.to_string()))?
        } else {
            IndexMap::new()
        };
        values.extend(parameters);

        let body = match body {
            Some(body) => Some(body),
            None => self
                .request_body(activity, None, None)
                .await
                .map_err(|error| fail(ActivityErrorKind::ParametersError, error.to_string()))?,
        };

        self.call_exec(activity, execution, &values, body.as_ref())
            .await
            .map_err(|error| fail(ActivityErrorKind::ExecutionFailed, error.to_string()))
    }

    /// Stored value of a service, or of the process when `service` is `None`.
    ///
    /// A dotted key projects into the stored value: `user.name` reads `user`
    /// and selects `name`.
    pub fn storage_value(&self, key: &str, service: Option<&str>) -> Result<Value, EngineError> {
        let store = match service {
            Some(name) => {
                &self
                    .service(name)
                    .ok_or_else(|| EngineError::UnknownService(name.to_string()))?
                    .store
            }
            None => self.process_store(),
        };
        match key.split_once('.') {
            Some((base, path)) if !path.is_empty() => Ok(select_path(&store.get(base), path).cloned().unwrap_or(Value::Null)),
            _ => Ok(store.get(key.trim_end_matches('.'))),
        }
    }

    /// Current value of one UI input of a service.
    pub async fn parameter_value(&self, service_name: &str, input_name: &str) -> Result<Value, EngineError> {
        let service = self
            .service(service_name)
            .ok_or_else(|| EngineError::UnknownService(service_name.to_string()))?;
        let input = service.input(input_name).ok_or_else(|| EngineError::UnknownInput {
            service: service_name.to_string(),
            input: input_name.to_string(),
        })?;
        input.value(&self.context).await.map_err(|source| EngineError::Input {
            service: service_name.to_string(),
            input: input_name.to_string(),
            source,
        })
    }

    /// Current values of every UI input of a service.
    pub async fn ui_values(&self, service_name: &str) -> Result<IndexMap<String, Value>, EngineError> {
        let service = self
            .service(service_name)
            .ok_or_else(|| EngineError::UnknownService(service_name.to_string()))?;
        let mut values = IndexMap::new();
        for input in service.inputs() {
            let value = input.value(&self.context).await.map_err(|source| EngineError::Input {
                service: service_name.to_string(),
                input: input.name.clone(),
                source,
            })?;
            values.insert(input.name.clone(), value);
        }
        Ok(values)
    }

    pub fn executed_activities(&self) -> Vec<ExecutedActivity> {
        self.context.executed_activities()
    }

    /// Every activity whose execution strategy could not be resolved.
    pub fn inactive_activities(&self) -> Vec<ActivityInfo> {
        self.activities
            .iter()
            .filter(|activity| !activity.is_active())
            .map(Activity::info)
            .collect()
    }
}
