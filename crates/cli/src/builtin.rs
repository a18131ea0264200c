//! The `builtin:std` module available to every page run from the command line.
//!
//! Documents name it through `scriptUri`, `apiClientModuleUri`, or
//! `supportModuleUri` like any other module.

use dstk_engine::{FunctionError, FunctionModule, LocalFunction, ModuleRegistry};
use dstk_util::{select_path, value_to_text};
use serde_json::Value;

pub const STD_MODULE_URI: &str = "builtin:std";

/// Registry holding the modules the `dstk` binary ships with.
pub fn registry() -> ModuleRegistry {
    ModuleRegistry::new().with(STD_MODULE_URI, std_module())
}

fn std_module() -> FunctionModule {
    FunctionModule::new()
        .with(LocalFunction::sync("echo", &["value"], |arguments| Ok(first(&arguments))))
        .with(LocalFunction::sync("concat", &["first", "second"], |arguments| {
            let joined: String = arguments.iter().take(2).map(value_to_text).collect();
            Ok(Value::String(joined))
        }))
        .with(LocalFunction::sync("uppercase", &["text"], |arguments| match first(&arguments) {
            Value::String(text) => Ok(Value::String(text.to_uppercase())),
            Value::Null => Ok(Value::Null),
            other => Err(FunctionError::failed(format!("uppercase expects text, got {other}"))),
        }))
        .with(LocalFunction::sync("json_get", &["value", "path"], |arguments| {
            let path = arguments.get(1).and_then(Value::as_str).unwrap_or_default();
            let value = first(&arguments);
            if path.is_empty() {
                return Ok(value);
            }
            Ok(select_path(&value, path).cloned().unwrap_or(Value::Null))
        }))
}

fn first(arguments: &[Value]) -> Value {
    arguments.first().cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstk_engine::FunctionOutput;
    use serde_json::json;

    async fn call(name: &str, arguments: Vec<Value>) -> Result<Value, FunctionError> {
        let module = std_module();
        let function = module.get(name).unwrap_or_else(|| panic!("missing function {name}"));
        match function.call(arguments).await? {
            FunctionOutput::Value(value) => Ok(value),
            FunctionOutput::Response(response) => panic!("unexpected response: {response:?}"),
        }
    }

    #[tokio::test]
    async fn std_functions() {
        assert_eq!(call("echo", vec![json!({"a": 1})]).await.unwrap(), json!({"a": 1}));
        assert_eq!(call("concat", vec![json!("ab"), json!(3)]).await.unwrap(), json!("ab3"));
        assert_eq!(call("uppercase", vec![json!("ada")]).await.unwrap(), json!("ADA"));
        assert_eq!(
            call("json_get", vec![json!({"user": {"name": "ada"}}), json!("user.name")]).await.unwrap(),
            json!("ada")
        );
    }

    #[tokio::test]
    async fn uppercase_rejects_non_text() {
        let error = call("uppercase", vec![json!(1)]).await.unwrap_err();
        assert_eq!(error.to_string(), "uppercase expects text, got 1");
    }

    #[test]
    fn registry_exposes_std() {
        assert!(registry().get(STD_MODULE_URI).is_some_and(|module| module.contains("json_get")));
    }
}
