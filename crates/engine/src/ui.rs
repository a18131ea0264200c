//! UI collaborator contract and service inputs.
//!
//! The engine never renders anything. It reads input values through a
//! [`UiSurface`] and hands results back to it for display. [`UiInput`] pairs a
//! declared input with the rules for turning the surface's raw value into a
//! parameter value.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use dstk_types::{CheckBoxDefinition, FileInputDefinition, InputFieldDefinition, InsertPosition, SelectDefinition, ServiceUi};
use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::context::ExecutionContext;
use crate::error::ExecutionError;

/// Input and output surface of the host.
pub trait UiSurface: Send + Sync {
    /// Current value of an input, or `None` when the host has nothing for it.
    fn input_value(&self, service: &str, input: &str) -> Option<Value>;

    /// File currently selected in a file input.
    fn selected_file(&self, service: &str, input: &str) -> Option<PathBuf>;

    /// Replace the content of an output target with a result.
    fn replace_output(&self, service: &str, target: &str, content: &Value);

    /// Add inputs built from a result to the service.
    fn insert_inputs(&self, service: &str, ui: &ServiceUi);

    /// Append a result at the service's open-input insertion point.
    fn append_open_input(&self, service: &str, content: &Value, position: InsertPosition);

    fn alert(&self, message: &str);
}

/// Surface with no inputs that discards all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl UiSurface for NullSurface {
    fn input_value(&self, _service: &str, _input: &str) -> Option<Value> {
        None
    }

    fn selected_file(&self, _service: &str, _input: &str) -> Option<PathBuf> {
        None
    }

    fn replace_output(&self, _service: &str, _target: &str, _content: &Value) {}

    fn insert_inputs(&self, _service: &str, _ui: &ServiceUi) {}

    fn append_open_input(&self, _service: &str, _content: &Value, _position: InsertPosition) {}

    fn alert(&self, _message: &str) {}
}

/// Something the engine asked a [`MemorySurface`] to show.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOutput {
    Output { service: String, target: String, content: Value },
    Inputs { service: String, names: Vec<String> },
    OpenInput { service: String, content: Value, position: InsertPosition },
    Alert(String),
}

/// In-memory surface: values are set by the host, output is recorded.
#[derive(Debug, Default)]
pub struct MemorySurface {
    values: Mutex<IndexMap<(String, String), Value>>,
    files: Mutex<IndexMap<(String, String), PathBuf>>,
    outputs: Mutex<Vec<SurfaceOutput>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&self, service: &str, input: &str, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service.to_string(), input.to_string()), value);
    }

    pub fn set_file(&self, service: &str, input: &str, path: impl Into<PathBuf>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service.to_string(), input.to_string()), path.into());
    }

    pub fn outputs(&self) -> Vec<SurfaceOutput> {
        self.outputs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.outputs()
            .into_iter()
            .filter_map(|output| match output {
                SurfaceOutput::Alert(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, output: SurfaceOutput) {
        self.outputs.lock().unwrap_or_else(PoisonError::into_inner).push(output);
    }
}

impl UiSurface for MemorySurface {
    fn input_value(&self, service: &str, input: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(service.to_string(), input.to_string()))
            .cloned()
    }

    fn selected_file(&self, service: &str, input: &str) -> Option<PathBuf> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(service.to_string(), input.to_string()))
            .cloned()
    }

    fn replace_output(&self, service: &str, target: &str, content: &Value) {
        self.record(SurfaceOutput::Output {
            service: service.to_string(),
            target: target.to_string(),
            content: content.clone(),
        });
    }

    fn insert_inputs(&self, service: &str, ui: &ServiceUi) {
        self.record(SurfaceOutput::Inputs {
            service: service.to_string(),
            names: ui.input_names().map(str::to_string).collect(),
        });
    }

    fn append_open_input(&self, service: &str, content: &Value, position: InsertPosition) {
        self.record(SurfaceOutput::OpenInput {
            service: service.to_string(),
            content: content.clone(),
            position,
        });
    }

    fn alert(&self, message: &str) {
        self.record(SurfaceOutput::Alert(message.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiInputKind {
    Field(InputFieldDefinition),
    Select(SelectDefinition),
    CheckBox(CheckBoxDefinition),
    File(FileInputDefinition),
}

/// A declared input of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct UiInput {
    pub service: String,
    pub name: String,
    pub kind: UiInputKind,
}

impl UiInput {
    /// Every value-producing input declared in `ui`.
    pub fn from_service_ui(service: &str, ui: &ServiceUi) -> IndexMap<String, UiInput> {
        let mut inputs = IndexMap::new();
        let mut add = |name: &String, kind: UiInputKind| {
            inputs.insert(
                name.clone(),
                UiInput {
                    service: service.to_string(),
                    name: name.clone(),
                    kind,
                },
            );
        };
        for (name, field) in &ui.input_fields {
            add(name, UiInputKind::Field(field.clone()));
        }
        for (name, select) in &ui.selects {
            add(name, UiInputKind::Select(select.clone()));
        }
        for (name, check_box) in &ui.check_boxes {
            add(name, UiInputKind::CheckBox(check_box.clone()));
        }
        for (name, file_input) in &ui.file_inputs {
            add(name, UiInputKind::File(file_input.clone()));
        }
        inputs
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, UiInputKind::File(_))
    }

    /// Current value of the input.
    ///
    /// A text field bound to a present query parameter always reports that
    /// parameter. Otherwise the surface value wins over the declared default.
    pub async fn value(&self, context: &ExecutionContext) -> Result<Value, ExecutionError> {
        let surface = context.ui();
        match &self.kind {
            UiInputKind::Field(field) => {
                if let Some(query_value) = field.from_query_param.as_deref().and_then(|name| context.query_param(name)) {
                    return Ok(Value::String(query_value.to_string()));
                }
                Ok(surface
                    .input_value(&self.service, &self.name)
                    .or_else(|| field.default.clone().map(Value::String))
                    .unwrap_or(Value::Null))
            }
            UiInputKind::Select(select) => Ok(surface
                .input_value(&self.service, &self.name)
                .or_else(|| select.default.clone().map(Value::String))
                .or_else(|| select.options.first().map(|option| Value::String(option.value.clone())))
                .unwrap_or(Value::Null)),
            UiInputKind::CheckBox(check_box) => Ok(surface
                .input_value(&self.service, &self.name)
                .unwrap_or(Value::Bool(check_box.default))),
            UiInputKind::File(file_input) => match surface.selected_file(&self.service, &self.name) {
                Some(path) => read_file_input(&path, file_input).await,
                None => Ok(Value::Null),
            },
        }
    }
}

/// Name and path of a file kept by reference by a `keepAsFile` input.
///
/// Matches the `{name, path, size}` value such an input resolves to.
pub(crate) fn kept_file(value: &Value) -> Option<(&str, &Path)> {
    let fields = value.as_object()?;
    if fields.len() != 3 || !fields.get("size")?.is_u64() {
        return None;
    }
    Some((fields.get("name")?.as_str()?, Path::new(fields.get("path")?.as_str()?)))
}

async fn read_file_input(path: &Path, definition: &FileInputDefinition) -> Result<Value, ExecutionError> {
    let unreadable = |error: std::io::Error| ExecutionError::Input(format!("File could not be read: {}: {error}", path.display()));
    if definition.keep_as_file {
        let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
        let name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        return Ok(json!({
            "name": name,
            "path": path.display().to_string(),
            "size": metadata.len(),
        }));
    }
    if definition.binary {
        let bytes = tokio::fs::read(path).await.map_err(unreadable)?;
        return Ok(Value::Array(bytes.into_iter().map(Value::from).collect()));
    }
    tokio::fs::read_to_string(path).await.map(Value::String).map_err(unreadable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstk_api::{HttpRequest, HttpResponse, HttpTransport, TransportError};
    use std::sync::Arc;

    struct Offline;

    #[async_trait::async_trait]
    impl HttpTransport for Offline {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Network("offline".into()))
        }
    }

    fn context(surface: Arc<MemorySurface>, query: &[(&str, &str)]) -> ExecutionContext {
        let query = query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ExecutionContext::new(surface, Arc::new(Offline)).with_query(query)
    }

    fn field(default: Option<&str>, from_query_param: Option<&str>) -> UiInput {
        UiInput {
            service: "users".into(),
            name: "userId".into(),
            kind: UiInputKind::Field(InputFieldDefinition {
                default: default.map(str::to_string),
                from_query_param: from_query_param.map(str::to_string),
                ..InputFieldDefinition::default()
            }),
        }
    }

    #[tokio::test]
    async fn field_prefers_query_then_surface_then_default() {
        let surface = Arc::new(MemorySurface::new());
        let input = field(Some("fallback"), Some("uid"));

        let ctx = context(surface.clone(), &[]);
        assert_eq!(input.value(&ctx).await.unwrap(), Value::String("fallback".into()));

        surface.set_value("users", "userId", Value::String("typed".into()));
        assert_eq!(input.value(&ctx).await.unwrap(), Value::String("typed".into()));

        let ctx = context(surface, &[("uid", "42")]);
        assert_eq!(input.value(&ctx).await.unwrap(), Value::String("42".into()));
    }

    #[tokio::test]
    async fn check_box_defaults_to_declared_state() {
        let surface = Arc::new(MemorySurface::new());
        let input = UiInput {
            service: "users".into(),
            name: "verbose".into(),
            kind: UiInputKind::CheckBox(CheckBoxDefinition {
                label: "Verbose".into(),
                default: false,
            }),
        };
        assert_eq!(input.value(&context(surface, &[])).await.unwrap(), Value::Bool(false));
    }

    #[tokio::test]
    async fn file_inputs_read_text_bytes_or_metadata() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("notes.txt");
        std::fs::write(&path, "hi").unwrap();

        let surface = Arc::new(MemorySurface::new());
        surface.set_file("users", "upload", &path);
        let ctx = context(surface, &[]);

        let mut input = UiInput {
            service: "users".into(),
            name: "upload".into(),
            kind: UiInputKind::File(FileInputDefinition::default()),
        };
        assert_eq!(input.value(&ctx).await.unwrap(), Value::String("hi".into()));

        input.kind = UiInputKind::File(FileInputDefinition {
            binary: true,
            ..FileInputDefinition::default()
        });
        assert_eq!(input.value(&ctx).await.unwrap(), json!([104, 105]));

        input.kind = UiInputKind::File(FileInputDefinition {
            keep_as_file: true,
            ..FileInputDefinition::default()
        });
        let metadata = input.value(&ctx).await.unwrap();
        assert_eq!(metadata["name"], json!("notes.txt"));
        assert_eq!(metadata["size"], json!(2));
    }

    #[tokio::test]
    async fn missing_file_selection_is_null() {
        let input = UiInput {
            service: "users".into(),
            name: "upload".into(),
            kind: UiInputKind::File(FileInputDefinition::default()),
        };
        let ctx = context(Arc::new(MemorySurface::new()), &[]);
        assert_eq!(input.value(&ctx).await.unwrap(), Value::Null);
    }
}
