//! Service UI input declarations.
//!
//! The engine never renders these; it only needs to know which inputs exist,
//! their defaults, and how file inputs should be read.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Inputs and triggers declared by a service (or by the process itself).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUi {
    #[serde(default)]
    pub input_fields: IndexMap<String, InputFieldDefinition>,
    #[serde(default)]
    pub selects: IndexMap<String, SelectDefinition>,
    #[serde(default)]
    pub check_boxes: IndexMap<String, CheckBoxDefinition>,
    #[serde(default)]
    pub buttons: IndexMap<String, ButtonDefinition>,
    #[serde(default)]
    pub file_inputs: IndexMap<String, FileInputDefinition>,
}

impl ServiceUi {
    /// Names of every value-producing input, in declaration order per kind.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.input_fields
            .keys()
            .chain(self.selects.keys())
            .chain(self.check_boxes.keys())
            .chain(self.file_inputs.keys())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.input_fields.is_empty()
            && self.selects.is_empty()
            && self.check_boxes.is_empty()
            && self.buttons.is_empty()
            && self.file_inputs.is_empty()
    }
}

/// Text field or text area.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InputFieldDefinition {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub default: Option<String>,
    /// When the named query parameter is present its value wins and the field is read-only.
    #[serde(default)]
    pub from_query_param: Option<String>,
    #[serde(default)]
    pub text_area: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectDefinition {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckBoxDefinition {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub default: bool,
}

/// Button wiring. Informational to the engine; hosts use it to trigger runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ButtonDefinition {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub trigger_activity: Option<String>,
    #[serde(default)]
    pub trigger_sequence: Option<String>,
    /// Target service for process-level buttons.
    #[serde(default)]
    pub activity_service: Option<String>,
}

/// File picker. `binary` reads bytes, `keepAsFile` passes file metadata instead of content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileInputDefinition {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub accept: Option<String>,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub read_immediately: bool,
    #[serde(default)]
    pub keep_as_file: bool,
}
