//! Services and their running-activity flag.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use dstk_types::{SequenceDefinition, ServiceUi};
use indexmap::IndexMap;

use crate::activity::ActivityHandle;
use crate::bridge::Bridge;
use crate::error::EngineError;
use crate::store::Store;
use crate::ui::UiInput;

/// Whether a top-level activity or sequence of the service is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running(String),
}

/// A group of activities sharing a store, UI inputs, and a bridge.
///
/// The process itself is represented as a service named `process`.
#[derive(Debug)]
pub struct Service {
    pub name: String,
    pub title: String,
    pub store: Store,
    inputs: RwLock<IndexMap<String, UiInput>>,
    /// Top-level activities by name.
    pub activities: IndexMap<String, ActivityHandle>,
    pub sequences: IndexMap<String, SequenceDefinition>,
    pub autostart: Vec<String>,
    pub bridge: Option<Arc<Bridge>>,
    state: Mutex<RunState>,
}

impl Service {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            store: Store::new(format!("{name} store")),
            title: title.into(),
            name,
            inputs: RwLock::new(IndexMap::new()),
            activities: IndexMap::new(),
            sequences: IndexMap::new(),
            autostart: Vec::new(),
            bridge: None,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn input(&self, name: &str) -> Option<UiInput> {
        self.inputs.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    pub fn inputs(&self) -> Vec<UiInput> {
        self.inputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    /// Register the inputs declared by `ui`, replacing same-named ones.
    pub fn register_inputs(&self, ui: &ServiceUi) {
        let added = UiInput::from_service_ui(&self.name, ui);
        self.inputs.write().unwrap_or_else(PoisonError::into_inner).extend(added);
    }

    pub fn state(&self) -> RunState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Mark `activity` as running.
    ///
    /// The flag is advisory and not reentrant: a second start while one is in
    /// flight is rejected, never queued. The returned guard resets the flag and
    /// clears `activity_store` when dropped.
    pub fn try_start<'a>(&'a self, activity: &str, activity_store: &'a Store) -> Result<RunGuard<'a>, EngineError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let RunState::Running(_) = *state {
            return Err(EngineError::AlreadyRunning {
                service: self.name.clone(),
            });
        }
        *state = RunState::Running(activity.to_string());
        Ok(RunGuard {
            state: &self.state,
            activity_store,
        })
    }
}

/// Resets the running flag of a service when the run ends.
#[derive(Debug)]
pub struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
    activity_store: &'a Store,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = RunState::Idle;
        self.activity_store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn second_start_is_rejected_until_guard_drops() {
        let service = Service::new("users", "Users");
        let activity_store = Store::new("activity");
        activity_store.set("scratch", json!(1));

        let guard = service.try_start("fetchUser", &activity_store).unwrap();
        assert_eq!(service.state(), RunState::Running("fetchUser".into()));
        match service.try_start("saveUser", &activity_store) {
            Err(error @ EngineError::AlreadyRunning { .. }) => assert_eq!(error.to_string(), "Activity already running"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second start was accepted"),
        }

        drop(guard);
        assert_eq!(service.state(), RunState::Idle);
        assert!(activity_store.snapshot().is_empty());
        assert!(service.try_start("saveUser", &activity_store).is_ok());
    }

    #[test]
    fn registered_inputs_are_visible() {
        let service = Service::new("users", "Users");
        let ui: ServiceUi = serde_json::from_value(json!({"inputFields": {"email": {"label": "Email"}}})).unwrap();
        service.register_inputs(&ui);
        assert!(service.has_input("email"));
        assert_eq!(service.inputs().len(), 1);
    }
}
