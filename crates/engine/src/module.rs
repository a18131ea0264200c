//! Local functions and the modules that group them.
//!
//! Every function carries an explicit list of parameter names. Arguments are
//! passed positionally in that order, followed by the request body when one is
//! present. Modules are registered under a URI (for example `builtin:std`) and
//! documents refer to them through `scriptUri`, `apiClientModuleUri`, or
//! `supportModuleUri`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::error::{FunctionError, LoadError};

/// What a local function produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutput {
    Value(Value),
    /// HTTP-response-like output, unwrapped by the caller.
    Response(FunctionResponse),
}

impl From<Value> for FunctionOutput {
    fn from(value: Value) -> Self {
        FunctionOutput::Value(value)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

pub type FunctionFuture = BoxFuture<'static, Result<FunctionOutput, FunctionError>>;
type FunctionBody = dyn Fn(Vec<Value>) -> FunctionFuture + Send + Sync;

/// A named callable with declared parameter names.
#[derive(Clone)]
pub struct LocalFunction {
    name: String,
    parameter_names: Vec<String>,
    body: Arc<FunctionBody>,
}

impl LocalFunction {
    /// Wrap an async function.
    pub fn new<F, Fut>(name: impl Into<String>, parameter_names: &[&str], function: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FunctionOutput, FunctionError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            parameter_names: parameter_names.iter().map(|name| name.to_string()).collect(),
            body: Arc::new(move |arguments| function(arguments).boxed()),
        }
    }

    /// Wrap a synchronous function returning a plain value.
    pub fn sync<F>(name: impl Into<String>, parameter_names: &[&str], function: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        let function = Arc::new(function);
        Self::new(name, parameter_names, move |arguments| {
            let function = function.clone();
            async move { function(arguments).map(FunctionOutput::Value) }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub async fn call(&self, arguments: Vec<Value>) -> Result<FunctionOutput, FunctionError> {
        (self.body)(arguments).await
    }

    /// Call with arguments picked from `parameters` by declared name, then `body`.
    ///
    /// Missing parameters are passed as `null`.
    pub async fn call_named(&self, parameters: &IndexMap<String, Value>, body: Option<&Value>) -> Result<FunctionOutput, FunctionError> {
        let mut arguments: Vec<Value> = self
            .parameter_names
            .iter()
            .map(|name| parameters.get(name).cloned().unwrap_or(Value::Null))
            .collect();
        if let Some(body) = body {
            arguments.push(body.clone());
        }
        self.call(arguments).await
    }
}

impl fmt::Debug for LocalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFunction")
            .field("name", &self.name)
            .field("parameter_names", &self.parameter_names)
            .finish_non_exhaustive()
    }
}

/// Functions addressable by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionModule {
    functions: IndexMap<String, LocalFunction>,
}

impl FunctionModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, function: LocalFunction) -> Self {
        self.insert(function);
        self
    }

    pub fn insert(&mut self, function: LocalFunction) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<&LocalFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Add every function of `other`, replacing same-named ones with a warning.
    pub fn merge(&mut self, other: &FunctionModule) {
        for (name, function) in &other.functions {
            if self.functions.contains_key(name) {
                warn!(function = %name, "module function overridden by page module");
            }
            self.functions.insert(name.clone(), function.clone());
        }
    }
}

/// Modules available to documents, keyed by URI.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, FunctionModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, uri: impl Into<String>, module: FunctionModule) {
        self.modules.insert(uri.into(), module);
    }

    pub fn with(mut self, uri: impl Into<String>, module: FunctionModule) -> Self {
        self.register(uri, module);
        self
    }

    pub fn get(&self, uri: &str) -> Option<&FunctionModule> {
        self.modules.get(uri)
    }

    pub fn resolve(&self, uri: &str) -> Result<FunctionModule, LoadError> {
        self.get(uri).cloned().ok_or_else(|| LoadError::ModuleNotFound(uri.to_string()))
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn concat() -> LocalFunction {
        LocalFunction::sync("concat", &["first", "second"], |arguments| {
            let text: Vec<String> = arguments.iter().map(|value| value.to_string()).collect();
            Ok(Value::String(text.join("|")))
        })
    }

    #[tokio::test]
    async fn named_call_orders_arguments_and_appends_body() {
        let mut parameters = IndexMap::new();
        parameters.insert("second".to_string(), json!(2));
        parameters.insert("first".to_string(), json!(1));

        let output = concat().call_named(&parameters, None).await.unwrap();
        assert_eq!(output, FunctionOutput::Value(json!("1|2")));

        parameters.shift_remove("first");
        let output = concat().call_named(&parameters, Some(&json!("body"))).await.unwrap();
        assert_eq!(output, FunctionOutput::Value(json!("null|2|\"body\"")));
    }

    #[test]
    fn merge_prefers_later_module() {
        let mut process = FunctionModule::new().with(concat());
        let page = FunctionModule::new().with(LocalFunction::sync("concat", &["only"], |_| Ok(Value::Null)));
        process.merge(&page);
        assert_eq!(process.get("concat").map(|f| f.parameter_names().len()), Some(1));
    }

    #[test]
    fn registry_reports_unknown_modules() {
        let registry = ModuleRegistry::new().with("builtin:test", FunctionModule::new().with(concat()));
        assert!(registry.resolve("builtin:test").is_ok());
        let error = registry.resolve("builtin:missing").unwrap_err();
        assert_eq!(error.to_string(), "module 'builtin:missing' is not registered");
    }
}
