//! Runtime collaborators shared by every activity of a process.
//!
//! An [`ExecutionContext`] is handed to the process at load time and replaces
//! any process-wide global: the UI surface, the HTTP transport, the page's
//! query parameters, the per-invocation store, the executed-activity log, and
//! the optional event channel all live here.

use std::sync::{Arc, Mutex, PoisonError};

use dstk_api::HttpTransport;
use dstk_types::{ExecutedActivity, ToolkitEvent};
use indexmap::IndexMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::store::Store;
use crate::ui::UiSurface;

pub struct ExecutionContext {
    ui: Arc<dyn UiSurface>,
    transport: Arc<dyn HttpTransport>,
    query: IndexMap<String, String>,
    activity_store: Store,
    executed: Mutex<Vec<ExecutedActivity>>,
    events: Option<UnboundedSender<ToolkitEvent>>,
}

impl ExecutionContext {
    pub fn new(ui: Arc<dyn UiSurface>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            ui,
            transport,
            query: IndexMap::new(),
            activity_store: Store::new("Activity store"),
            executed: Mutex::new(Vec::new()),
            events: None,
        }
    }

    /// Query parameters of the page the process runs in.
    pub fn with_query(mut self, query: IndexMap<String, String>) -> Self {
        self.query = query;
        self
    }

    /// Channel receiving activity-completed and activity-failed events.
    pub fn with_events(mut self, sender: UnboundedSender<ToolkitEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn ui(&self) -> &dyn UiSurface {
        self.ui.as_ref()
    }

    pub fn transport(&self) -> &dyn HttpTransport {
        self.transport.as_ref()
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn activity_store(&self) -> &Store {
        &self.activity_store
    }

    pub fn is_executed(&self, service_name: &str, activity_name: &str) -> bool {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|entry| entry.is_same_activity(service_name, activity_name))
    }

    /// Append to the executed-activity log once per activity and emit a completed event every time.
    pub fn record_executed(&self, activity: ExecutedActivity) {
        {
            let mut executed = self.executed.lock().unwrap_or_else(PoisonError::into_inner);
            if !executed
                .iter()
                .any(|entry| entry.is_same_activity(&activity.service_name, &activity.activity_name))
            {
                executed.push(activity.clone());
            }
        }
        self.emit(ToolkitEvent::completed(activity));
    }

    pub fn record_failed(&self, activity: ExecutedActivity) {
        self.emit(ToolkitEvent::failed(activity));
    }

    pub fn executed_activities(&self) -> Vec<ExecutedActivity> {
        self.executed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn emit(&self, event: ToolkitEvent) {
        if let Some(sender) = &self.events
            && sender.send(event).is_err()
        {
            debug!("event receiver dropped; event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::NullSurface;
    use dstk_api::{HttpRequest, HttpResponse, TransportError};
    use dstk_types::ToolkitEventKind;

    struct Unreachable;

    #[async_trait::async_trait]
    impl HttpTransport for Unreachable {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Network(format!("no network in tests: {}", request.url)))
        }
    }

    #[test]
    fn executed_log_is_idempotent_but_events_repeat() {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let context = ExecutionContext::new(Arc::new(NullSurface), Arc::new(Unreachable)).with_events(sender);

        context.record_executed(ExecutedActivity::new("users", "fetch", "Fetch"));
        context.record_executed(ExecutedActivity::new("users", "fetch", "Fetch"));
        context.record_failed(ExecutedActivity::new("users", "save", "Save"));

        assert_eq!(context.executed_activities().len(), 1);
        assert!(context.is_executed("users", "fetch"));
        assert!(!context.is_executed("users", "save"));

        let kinds: Vec<ToolkitEventKind> = std::iter::from_fn(|| receiver.try_recv().ok()).map(|event| event.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ToolkitEventKind::ActivityCompleted,
                ToolkitEventKind::ActivityCompleted,
                ToolkitEventKind::ActivityFailed
            ]
        );
    }
}
