//! Activity, parameter, and storage definitions.
//!
//! These models describe the authoring surface of a single activity inside a
//! service. Maps use `IndexMap` so declaration order survives deserialization;
//! the engine relies on that order for sibling tie-breaking and for the order
//! in which parameters are mapped.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declarative description of one activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDefinition {
    /// Human-readable title shown in alerts and the executed-activity log.
    #[serde(default)]
    pub title: String,
    /// Optional module function run before the execution strategy.
    #[serde(default)]
    pub pre_process: Option<String>,
    /// Capability name resolved through the owning service's bridge.
    #[serde(default)]
    pub bridge_capability: Option<String>,
    /// Function name resolved through the process module.
    #[serde(default)]
    pub module_function: Option<String>,
    /// Explicit parameter definitions keyed by execution parameter name.
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterDefinition>,
    /// Request body parts keyed by part name. A single `data` part is sent as the raw body.
    #[serde(default)]
    pub request_body: Option<IndexMap<String, ParameterDefinition>>,
    /// Activities that must appear in the executed-activity log before this one may run.
    #[serde(default)]
    pub required_activities: Vec<RequiredActivity>,
    /// Nested activities executed after this one completes.
    #[serde(default)]
    pub sub_activities: IndexMap<String, ActivityDefinition>,
    /// Where the execution result is stored.
    #[serde(default)]
    pub store_result: Option<StoreResult>,
    /// Sibling ordering key. Missing priorities sort last.
    #[serde(default)]
    pub priority: Option<f64>,
    /// Special handling of the result by the UI collaborator.
    #[serde(default)]
    pub ui: ActivityUi,
    /// Development overrides.
    #[serde(default)]
    pub debug: Option<ActivityDebug>,
}

impl ActivityDefinition {
    /// Ordering key used when sorting siblings.
    pub fn effective_priority(&self) -> f64 {
        self.priority.unwrap_or(f64::INFINITY)
    }
}

/// Process-level activity that forwards to an activity of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReference {
    pub service_name: String,
    pub activity_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sub_activities: IndexMap<String, ActivityDefinition>,
    #[serde(default)]
    pub debug: Option<ActivityDebug>,
}

/// Entry of the process-level `common.activities` map.
///
/// References are tried first because a plain definition accepts any object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CommonActivity {
    Reference(ActivityReference),
    Definition(ActivityDefinition),
}

/// Reference to an activity that must have run before the declaring activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequiredActivity {
    /// Owning service. Defaults to the service of the declaring activity.
    #[serde(default)]
    pub service_name: Option<String>,
    pub activity_name: String,
    /// Message used instead of the templated default when the gate fails.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Storage scope of a result or a stored-value lookup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StoreScope {
    /// Store owned by the service of the activity.
    #[default]
    Service,
    /// Store shared by the whole process.
    Process,
    /// Per-invocation store cleared after each top-level run or sequence.
    #[serde(alias = "activit")]
    Activity,
}

impl std::fmt::Display for StoreScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StoreScope::Service => "service",
            StoreScope::Process => "process",
            StoreScope::Activity => "activity",
        };
        f.write_str(label)
    }
}

/// `{scope, key}` directive used for result storage and store lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreResult {
    #[serde(rename = "context", alias = "scope", default)]
    pub scope: StoreScope,
    pub key: String,
}

impl StoreResult {
    /// Split the key into the stored name and an optional dotted sub-path.
    ///
    /// `user.address.city` reads `user` and projects `address.city` out of it.
    pub fn split_key(&self) -> (&str, Option<&str>) {
        match self.key.split_once('.') {
            Some((base, rest)) if !rest.is_empty() => (base, Some(rest)),
            Some((base, _)) => (base, None),
            None => (self.key.as_str(), None),
        }
    }
}

/// Describes where a single parameter value comes from.
///
/// At most one source is expected. When several are present the engine picks
/// the first in this order: `field`, `parent`, `previous`, `constant`, `store`,
/// `queryParam`, `generate`, `fileInput`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    #[serde(default, rename = "type")]
    pub value_type: Option<String>,
    /// Name of a UI input of the owning service.
    #[serde(default)]
    pub field: Option<String>,
    /// Use the parent activity's result.
    #[serde(default)]
    pub parent: bool,
    /// Use the preceding sibling's result.
    #[serde(default)]
    pub previous: bool,
    #[serde(default)]
    pub constant: Option<Value>,
    #[serde(default)]
    pub store: Option<StoreResult>,
    #[serde(default)]
    pub query_param: Option<String>,
    /// Embedded activity whose result becomes the value.
    #[serde(default)]
    pub generate: Option<GenerateDefinition>,
    /// Name of a file input of the owning service.
    #[serde(default)]
    pub file_input: Option<String>,
    /// Re-resolve the parameter on every execution instead of once.
    #[serde(default)]
    pub dynamic: bool,
}

impl ParameterDefinition {
    /// Definition bound to a UI input.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            field: Some(name.into()),
            ..Self::default()
        }
    }

    /// Definition returning a fixed literal.
    pub fn constant(value: Value) -> Self {
        Self {
            constant: Some(value),
            ..Self::default()
        }
    }
}

/// Embedded activity used by a `generate` parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateDefinition {
    #[serde(default)]
    pub bridge_capability: Option<String>,
    #[serde(default)]
    pub module_function: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterDefinition>,
}

impl GenerateDefinition {
    /// Expand into a full activity definition titled `title`.
    pub fn to_activity(&self, title: &str) -> ActivityDefinition {
        ActivityDefinition {
            title: title.to_string(),
            bridge_capability: self.bridge_capability.clone(),
            module_function: self.module_function.clone(),
            parameters: self.parameters.clone(),
            ..ActivityDefinition::default()
        }
    }
}

/// Entry of a shared (service- or page-level) parameter map.
///
/// A bare string is shorthand for a UI field binding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SharedParameter {
    Field(String),
    Definition(ParameterDefinition),
}

impl SharedParameter {
    pub fn to_definition(&self) -> ParameterDefinition {
        match self {
            SharedParameter::Field(name) => ParameterDefinition::field(name.clone()),
            SharedParameter::Definition(definition) => definition.clone(),
        }
    }
}

/// Result presentation hints consumed after execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityUi {
    /// Output target whose content is replaced with the result.
    #[serde(default)]
    pub result_as_output_html: Option<String>,
    /// Interpret the result as a UI description and insert its inputs.
    #[serde(default, rename = "resultAsDynamicUI")]
    pub result_as_dynamic_ui: bool,
    #[serde(default)]
    pub results_as_open_input: Option<OpenInputSetting>,
    /// Set to `false` to suppress the completion alert.
    #[serde(default)]
    pub alert: Option<bool>,
    #[serde(default)]
    pub include_in_status: Option<bool>,
}

/// `true | false | "start" | "end"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OpenInputSetting {
    Flag(bool),
    Position(InsertPosition),
}

impl OpenInputSetting {
    /// Insertion point, or `None` when disabled.
    pub fn position(&self) -> Option<InsertPosition> {
        match self {
            OpenInputSetting::Flag(true) => Some(InsertPosition::End),
            OpenInputSetting::Flag(false) => None,
            OpenInputSetting::Position(position) => Some(*position),
        }
    }
}

/// Where appended open-input content goes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Start,
    #[default]
    End,
}

/// Development overrides on an activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDebug {
    /// `false` skips the execution strategy.
    #[serde(default)]
    pub execute: Option<bool>,
    /// Result used when execution is skipped.
    #[serde(default)]
    pub result_data: Option<Value>,
}

impl ActivityDebug {
    pub fn skips_execution(&self) -> bool {
        !self.execute.unwrap_or(true)
    }
}

/// Named, ordered list of activities of one service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceDefinition {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
}
