//! Executed-activity records and process-wide events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{serviceName, activityName, title}` entry of the executed-activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedActivity {
    pub service_name: String,
    pub activity_name: String,
    pub title: String,
}

impl ExecutedActivity {
    pub fn new(service_name: impl Into<String>, activity_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            activity_name: activity_name.into(),
            title: title.into(),
        }
    }

    /// Identity comparison that ignores the title.
    pub fn is_same_activity(&self, service_name: &str, activity_name: &str) -> bool {
        self.service_name == service_name && self.activity_name == activity_name
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ToolkitEventKind {
    ActivityCompleted,
    ActivityFailed,
}

/// Event delivered to the host's event channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolkitEvent {
    #[serde(rename = "type")]
    pub kind: ToolkitEventKind,
    pub event_data: ExecutedActivity,
    pub emitted_at: DateTime<Utc>,
}

impl ToolkitEvent {
    pub fn completed(activity: ExecutedActivity) -> Self {
        Self {
            kind: ToolkitEventKind::ActivityCompleted,
            event_data: activity,
            emitted_at: Utc::now(),
        }
    }

    pub fn failed(activity: ExecutedActivity) -> Self {
        Self {
            kind: ToolkitEventKind::ActivityFailed,
            event_data: activity,
            emitted_at: Utc::now(),
        }
    }
}
