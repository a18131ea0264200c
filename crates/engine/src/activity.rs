//! Activities as stored in the process arena.
//!
//! Activities never point at each other directly. Parents, sub-activities,
//! reference targets, and generators are [`ActivityHandle`]s into the arena
//! owned by [`crate::Process`].

use dstk_types::{ActivityDebug, ActivityUi, ParameterDefinition, RequiredActivity, StoreResult};
use indexmap::IndexMap;
use serde::Serialize;

use crate::execution::{ActivityExecution, ExecutionKind};
use crate::module::LocalFunction;
use crate::parameter::{DynamicParameter, ParameterResolver};

/// Index of an activity in the process arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityHandle(usize);

impl ActivityHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Activity {
    pub name: String,
    pub title: String,
    /// Owning service name.
    pub service: String,
    pub parent: Option<ActivityHandle>,
    /// `None` when the execution strategy could not be resolved.
    pub execution: Option<ActivityExecution>,
    pub pre_process: Option<LocalFunction>,
    pub parameters: IndexMap<String, ParameterResolver>,
    pub dynamic_parameters: IndexMap<String, DynamicParameter>,
    pub request_body: IndexMap<String, ParameterResolver>,
    pub required: Vec<RequiredActivity>,
    /// Sorted by ascending priority, declaration order on ties.
    pub sub_activities: Vec<ActivityHandle>,
    pub store_result: Option<StoreResult>,
    pub ui: ActivityUi,
    pub debug: Option<ActivityDebug>,
    pub parameter_definitions: IndexMap<String, ParameterDefinition>,
    pub request_body_definitions: IndexMap<String, ParameterDefinition>,
    /// Built for a `generate` parameter rather than declared.
    pub generated: bool,
}

impl Activity {
    pub fn new(service: impl Into<String>, name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            service: service.into(),
            parent: None,
            execution: None,
            pre_process: None,
            parameters: IndexMap::new(),
            dynamic_parameters: IndexMap::new(),
            request_body: IndexMap::new(),
            required: Vec::new(),
            sub_activities: Vec::new(),
            store_result: None,
            ui: ActivityUi::default(),
            debug: None,
            parameter_definitions: IndexMap::new(),
            request_body_definitions: IndexMap::new(),
            generated: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.execution.is_some()
    }

    pub fn kind(&self) -> Option<ExecutionKind> {
        self.execution.as_ref().map(ActivityExecution::kind)
    }

    pub fn is_reference(&self) -> bool {
        self.kind() == Some(ExecutionKind::Reference)
    }

    pub fn skips_execution(&self) -> bool {
        self.debug.as_ref().is_some_and(ActivityDebug::skips_execution)
    }

    pub fn info(&self) -> ActivityInfo {
        ActivityInfo {
            service_name: self.service.clone(),
            activity_name: self.name.clone(),
            title: self.title.clone(),
        }
    }
}

/// Identity of an activity as reported to hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInfo {
    pub service_name: String,
    pub activity_name: String,
    pub title: String,
}

impl std::fmt::Display for ActivityInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.service_name, self.activity_name, self.title)
    }
}
