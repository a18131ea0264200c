//! Page and process documents.
//!
//! A page document binds a process document to concrete bridges, shared
//! parameters, and autostart lists. The process document describes services,
//! their activities and sequences, and the process-level common section.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityDefinition, CommonActivity, SequenceDefinition, SharedParameter};
use crate::bridge::ServiceBridge;
use crate::ui::ServiceUi;

/// Name of the pseudo-service representing the process itself.
pub const PROCESS_SERVICE_NAME: &str = "process";

/// A document given either by location or inline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSource<T> {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub instance: Option<T>,
}

impl<T> Default for DocumentSource<T> {
    fn default() -> Self {
        Self { uri: None, instance: None }
    }
}

impl<T> DocumentSource<T> {
    pub fn inline(instance: T) -> Self {
        Self {
            uri: None,
            instance: Some(instance),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uri.is_none() && self.instance.is_none()
    }
}

/// One activity name or a list of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "OneOrMany", into = "Vec<String>")]
pub struct Autostart(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Autostart {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(name) => Autostart(vec![name]),
            OneOrMany::Many(names) => Autostart(names),
        }
    }
}

impl From<Autostart> for Vec<String> {
    fn from(value: Autostart) -> Self {
        value.0
    }
}

impl Autostart {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Top-level page document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub process: DocumentSource<ProcessDocument>,
    /// Page-level description per process service, keyed like the process services.
    #[serde(default)]
    pub services: IndexMap<String, PageServiceDescription>,
    /// Module merged over the process module; page functions win.
    #[serde(default)]
    pub script_uri: Option<String>,
    #[serde(default)]
    pub common: PageCommon,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageServiceDescription {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bridge: Option<ServiceBridge>,
    #[serde(default)]
    pub parameters: IndexMap<String, SharedParameter>,
    #[serde(default)]
    pub autostart: Autostart,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageCommon {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, SharedParameter>,
    #[serde(default, alias = "autostart")]
    pub auto_start: Autostart,
}

/// Process document: services plus the process-level common section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub services: IndexMap<String, ServiceDescription>,
    #[serde(default)]
    pub common: ProcessCommon,
    #[serde(default)]
    pub script_uri: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescription {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ui: ServiceUi,
    #[serde(default)]
    pub activities: IndexMap<String, ActivityDefinition>,
    #[serde(default)]
    pub sequences: IndexMap<String, SequenceDefinition>,
    #[serde(default)]
    pub parameters: IndexMap<String, SharedParameter>,
    #[serde(default)]
    pub autostart: Autostart,
    #[serde(default)]
    pub bridge: Option<ServiceBridge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCommon {
    #[serde(default)]
    pub ui: ServiceUi,
    #[serde(default)]
    pub activities: IndexMap<String, CommonActivity>,
    #[serde(default)]
    pub sequences: IndexMap<String, SequenceDefinition>,
    #[serde(default)]
    pub parameters: IndexMap<String, SharedParameter>,
    #[serde(default, alias = "autoStart")]
    pub autostart: Autostart,
}
