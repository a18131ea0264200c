//! Error types for loading and running processes.

use dstk_api::TransportError;
use dstk_types::DocumentViolation;
use thiserror::Error;

/// Category of an [`ActivityError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityErrorKind {
    RequiredActivitiesNotExecuted,
    ParametersError,
    ExecutionFailed,
}

/// Run-time failure of one activity.
///
/// `service` and `activity` carry the human-readable titles, which is what the
/// alert surface shows.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct ActivityError {
    pub service: String,
    pub activity: String,
    pub kind: ActivityErrorKind,
    pub message: String,
}

impl ActivityError {
    pub fn new(service: impl Into<String>, activity: impl Into<String>, kind: ActivityErrorKind, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            activity: activity.into(),
            kind,
            message: message.into(),
        }
    }

    /// Text shown on the alert surface.
    pub fn alert_text(&self) -> String {
        format!("Activity-error (service: {}):{} : {}", self.service, self.activity, self.message)
    }
}

/// Failure reported by a local function.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FunctionError {
    #[error("{0}")]
    Failed(String),
    /// Raised by pre-process hooks to continue with the unchanged parameters.
    #[error("cancelled")]
    Cancelled,
}

impl FunctionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Failure of an execution strategy or of resolving one of its inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("{0}")]
    Function(String),
    /// Non-2xx response; `message` already carries the extracted error text.
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("postProcess failed: {0}")]
    PostProcess(String),
    #[error("Referenced activity failed: {0}")]
    Reference(Box<ActivityError>),
    /// Unusable function or HTTP response.
    #[error("{0}")]
    Response(String),
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Configuration(String),
    /// A bound input could not be read.
    #[error("{0}")]
    Input(String),
}

impl From<FunctionError> for ExecutionError {
    fn from(error: FunctionError) -> Self {
        ExecutionError::Function(error.to_string())
    }
}

/// Failure of a service- or process-level operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Activity already running")]
    AlreadyRunning { service: String },
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("Service-activity {service}:{activity} not found")]
    UnknownActivity { service: String, activity: String },
    #[error("unknown sequence '{sequence}' in service '{service}'")]
    UnknownSequence { service: String, sequence: String },
    #[error("Service-UIElement {service}:{input} not found")]
    UnknownInput { service: String, input: String },
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error("Service-UIElement {service}:{input} failed: {source}")]
    Input {
        service: String,
        input: String,
        #[source]
        source: ExecutionError,
    },
    #[error("autostart activity failed: {0}")]
    Autostart(Box<EngineError>),
    #[error("Service-activity {service}:{activity} failed: {source}")]
    ExternalCall {
        service: String,
        activity: String,
        #[source]
        source: Box<EngineError>,
    },
}

/// Failure while loading documents or constructing a process.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch {location}: {message}")]
    Fetch { location: String, message: String },
    #[error("invalid {kind} document {location}: {message}")]
    Parse {
        kind: &'static str,
        location: String,
        message: String,
    },
    #[error("{kind} document failed validation:\n{}", join_violations(.violations))]
    Validation {
        kind: &'static str,
        violations: Vec<DocumentViolation>,
    },
    #[error("integrity check failed:\n{}", .0.join("\n"))]
    Integrity(Vec<String>),
    #[error("module '{0}' is not registered")]
    ModuleNotFound(String),
    #[error("Loading bridge failed for service:'{service}': {message}")]
    Bridge { service: String, message: String },
    #[error("page document defines no process")]
    MissingProcess,
}

fn join_violations(violations: &[DocumentViolation]) -> String {
    violations
        .iter()
        .map(|violation| format!("  {violation}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn alert_text_names_service_and_activity() {
        let error = ActivityError::new("Users", "Fetch user", ActivityErrorKind::ExecutionFailed, "boom");
        assert_eq!(error.alert_text(), "Activity-error (service: Users):Fetch user : boom");
        assert_eq!(error.to_string(), "boom");
    }

    #[test]
    fn validation_error_lists_every_violation() {
        let error = LoadError::Validation {
            kind: "page",
            violations: vec![
                DocumentViolation::new("/title", "must be string", Value::Null),
                DocumentViolation::new("/services", "must be object", Value::Null),
            ],
        };
        let message = error.to_string();
        assert!(message.contains("/title: must be string"), "unexpected error: {message}");
        assert!(message.contains("/services: must be object"), "unexpected error: {message}");
    }

    #[test]
    fn external_call_wraps_inner_error() {
        let error = EngineError::ExternalCall {
            service: "users".into(),
            activity: "fetch".into(),
            source: Box::new(EngineError::AlreadyRunning { service: "users".into() }),
        };
        assert_eq!(error.to_string(), "Service-activity users:fetch failed: Activity already running");
    }
}
