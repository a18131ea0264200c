//! Per-service bridges.
//!
//! A bridge turns a bridge document into named capabilities. The backend is
//! an OpenAPI document when one is configured and a client module otherwise.
//! The optional support module provides post-process hooks and functions for
//! capabilities the backend cannot satisfy. A capability that cannot be
//! resolved is kept as a diagnostic; it never aborts the rest of the bridge.

use std::sync::Arc;

use dstk_types::{BridgeDocument, CapabilityDefinition, ServiceBridge, validate_bridge};
use dstk_util::{
    DocumentLocation, default_server_url, fetch_document, find_operation, openapi_violations, security_schemes,
    unresolved_capabilities,
};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::LoadError;
use crate::execution::{ActivityExecution, ModuleCapability};
use crate::module::{FunctionModule, LocalFunction, ModuleRegistry};
use crate::remote::{OpenApiBackend, RemoteOperation};

#[derive(Debug, Clone)]
pub enum Capability {
    Remote(Arc<RemoteOperation>),
    Module(Arc<ModuleCapability>),
}

impl Capability {
    pub fn execution(&self) -> ActivityExecution {
        match self {
            Capability::Remote(operation) => ActivityExecution::RemoteOperation(operation.clone()),
            Capability::Module(capability) => ActivityExecution::BridgeModule(capability.clone()),
        }
    }
}

enum Backend {
    OpenApi(Value),
    Module(FunctionModule),
}

#[derive(Debug)]
pub struct Bridge {
    pub service: String,
    /// Resolved capabilities, or the reason resolution failed.
    pub capabilities: IndexMap<String, Result<Capability, String>>,
}

impl Bridge {
    /// Load the bridge bound to `service`.
    ///
    /// The backend and the support module are resolved concurrently. With
    /// `validate` set, structural violations in the bridge or OpenAPI document
    /// are fatal; otherwise they are logged.
    ///
    /// # Arguments
    /// - `binding`: Effective bridge binding of the service
    /// - `base`: Location relative bridge URIs are resolved against
    ///
    /// # Errors
    /// Fails when a document cannot be fetched or parsed, a referenced module is
    /// not registered, or validation fails while requested.
    pub async fn load(
        service: &str,
        binding: &ServiceBridge,
        base: &DocumentLocation,
        modules: &ModuleRegistry,
        validate: bool,
    ) -> Result<Self, LoadError> {
        let (document, document_base) = bridge_document(service, binding, base).await?;
        report_violations("bridge", validate_bridge(&document), validate)?;

        let (backend, support) = tokio::join!(
            load_backend(service, &document, &document_base, modules),
            load_support(&document, modules)
        );
        let backend = backend?;
        let support = support?;

        let capabilities = match backend {
            Backend::OpenApi(openapi) => {
                report_violations("openapi", openapi_violations(&openapi), validate)?;
                for violation in unresolved_capabilities(&openapi, &document.capabilities) {
                    warn!(service = %service, violation = %violation, "capability has no matching operation");
                }
                let backend = Arc::new(OpenApiBackend {
                    service: service.to_string(),
                    default_server: default_server_url(&openapi),
                    security: security_schemes(&openapi),
                    server: binding.server.clone(),
                    authorization: binding.authorization.clone(),
                    error_message_path: document.error_message_path.clone(),
                });
                document
                    .capabilities
                    .iter()
                    .map(|(name, definition)| {
                        let capability = openapi_capability(name, definition, &openapi, &backend, support.as_ref());
                        (name.clone(), capability)
                    })
                    .collect()
            }
            Backend::Module(module) => document
                .capabilities
                .iter()
                .map(|(name, definition)| {
                    let capability = module_capability(name, definition, &module, support.as_ref());
                    (name.clone(), capability)
                })
                .collect::<IndexMap<_, _>>(),
        };

        for (name, capability) in &capabilities {
            if let Err(reason) = capability {
                error!(service = %service, capability = %name, reason = %reason, "capability could not be resolved");
            }
        }
        debug!(service = %service, capabilities = capabilities.len(), "bridge loaded");

        Ok(Self {
            service: service.to_string(),
            capabilities,
        })
    }

    pub fn capability(&self, name: &str) -> Result<&Capability, String> {
        match self.capabilities.get(name) {
            Some(Ok(capability)) => Ok(capability),
            Some(Err(reason)) => Err(format!("Capability '{name}' is not available: {reason}")),
            None => Err(format!("Capability '{name}' not found in bridge of service '{}'", self.service)),
        }
    }
}

/// Fail with the violations when validating, log them otherwise.
pub(crate) fn report_violations(
    kind: &'static str,
    violations: Vec<dstk_types::DocumentViolation>,
    validate: bool,
) -> Result<(), LoadError> {
    if violations.is_empty() {
        return Ok(());
    }
    if validate {
        return Err(LoadError::Validation { kind, violations });
    }
    for violation in &violations {
        warn!(kind, violation = %violation, "document violation ignored");
    }
    Ok(())
}

async fn bridge_document(
    service: &str,
    binding: &ServiceBridge,
    base: &DocumentLocation,
) -> Result<(BridgeDocument, DocumentLocation), LoadError> {
    if let Some(instance) = &binding.source.instance {
        return Ok((instance.clone(), base.clone()));
    }
    let Some(uri) = &binding.source.uri else {
        return Err(LoadError::Bridge {
            service: service.to_string(),
            message: "bridge has neither uri nor instance".to_string(),
        });
    };
    let location = base.join(uri).map_err(|error| LoadError::Fetch {
        location: uri.clone(),
        message: error.to_string(),
    })?;
    let value = fetch_document(&location).await.map_err(|error| LoadError::Fetch {
        location: location.to_string(),
        message: format!("{error:#}"),
    })?;
    let document = serde_json::from_value(value).map_err(|error| LoadError::Parse {
        kind: "bridge",
        location: location.to_string(),
        message: error.to_string(),
    })?;
    Ok((document, location))
}

async fn load_backend(
    service: &str,
    document: &BridgeDocument,
    base: &DocumentLocation,
    modules: &ModuleRegistry,
) -> Result<Backend, LoadError> {
    if let Some(openapi) = &document.execute.openapi_schema {
        return Ok(Backend::OpenApi(openapi.clone()));
    }
    if let Some(uri) = &document.execute.openapi_schema_uri {
        let location = base.join(uri).map_err(|error| LoadError::Fetch {
            location: uri.clone(),
            message: error.to_string(),
        })?;
        let openapi = fetch_document(&location).await.map_err(|error| LoadError::Fetch {
            location: location.to_string(),
            message: format!("{error:#}"),
        })?;
        return Ok(Backend::OpenApi(openapi));
    }
    if let Some(uri) = &document.execute.api_client_module_uri {
        return modules.resolve(uri).map(Backend::Module);
    }
    Err(LoadError::Bridge {
        service: service.to_string(),
        message: "bridge declares no execution backend".to_string(),
    })
}

async fn load_support(document: &BridgeDocument, modules: &ModuleRegistry) -> Result<Option<FunctionModule>, LoadError> {
    document
        .support_module_uri
        .as_deref()
        .map(|uri| modules.resolve(uri))
        .transpose()
}

fn openapi_capability(
    name: &str,
    definition: &CapabilityDefinition,
    openapi: &Value,
    backend: &Arc<OpenApiBackend>,
    support: Option<&FunctionModule>,
) -> Result<Capability, String> {
    let lookup = match &definition.operation {
        Some(selector) => find_operation(openapi, selector).map_err(|error| error.to_string()),
        None => Err("no operation selector".to_string()),
    };
    match lookup {
        Ok(operation) => Ok(Capability::Remote(Arc::new(RemoteOperation {
            capability: name.to_string(),
            operation,
            post_process: post_process(name, definition, support),
            backend: backend.clone(),
        }))),
        Err(reason) => support_capability(name, definition, support).ok_or(reason),
    }
}

fn module_capability(
    name: &str,
    definition: &CapabilityDefinition,
    module: &FunctionModule,
    support: Option<&FunctionModule>,
) -> Result<Capability, String> {
    let function_name = definition.function_name.as_deref().unwrap_or(name);
    if let Some(function) = module.get(function_name) {
        return Ok(module_entry(name, function.clone(), post_process(name, definition, support)));
    }
    support_capability(name, definition, support).ok_or_else(|| format!("function '{function_name}' not found in client module"))
}

/// Fallback through the support module's `functionName`.
fn support_capability(name: &str, definition: &CapabilityDefinition, support: Option<&FunctionModule>) -> Option<Capability> {
    let function = support?.get(definition.function_name.as_deref()?)?;
    Some(module_entry(name, function.clone(), post_process(name, definition, support)))
}

fn module_entry(name: &str, function: LocalFunction, post_process: Option<LocalFunction>) -> Capability {
    Capability::Module(Arc::new(ModuleCapability {
        name: name.to_string(),
        function,
        post_process,
    }))
}

fn post_process(capability: &str, definition: &CapabilityDefinition, support: Option<&FunctionModule>) -> Option<LocalFunction> {
    let function_name = definition.post_process.as_deref()?;
    match support.and_then(|module| module.get(function_name)) {
        Some(function) => Some(function.clone()),
        None => {
            error!(capability = %capability, function = %function_name, "postProcess function not found in support module");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstk_types::{BridgeExecute, DocumentSource, OperationSelector};
    use serde_json::json;

    fn openapi() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Users", "version": "1"},
            "servers": [{"url": "https://api.example.com"}],
            "paths": {
                "/users/{id}": {
                    "get": {
                        "operationId": "getUser",
                        "parameters": [{"name": "id", "in": "path", "required": true}]
                    }
                }
            }
        })
    }

    fn registry() -> ModuleRegistry {
        let support = FunctionModule::new()
            .with(LocalFunction::sync("pick", &["result"], |arguments| Ok(arguments[0].clone())))
            .with(LocalFunction::sync("localSearch", &["term"], |arguments| Ok(arguments[0].clone())));
        let client = FunctionModule::new().with(LocalFunction::sync("listUsers", &["limit"], |_| Ok(json!([]))));
        ModuleRegistry::new().with("builtin:support", support).with("builtin:client", client)
    }

    fn binding(document: BridgeDocument) -> ServiceBridge {
        ServiceBridge {
            source: DocumentSource::inline(document),
            ..ServiceBridge::default()
        }
    }

    fn capability(operation_id: Option<&str>, function_name: Option<&str>, post_process: Option<&str>) -> CapabilityDefinition {
        CapabilityDefinition {
            operation: operation_id.map(|id| OperationSelector {
                operation_id: Some(id.to_string()),
                ..OperationSelector::default()
            }),
            function_name: function_name.map(str::to_string),
            post_process: post_process.map(str::to_string),
        }
    }

    fn base() -> DocumentLocation {
        DocumentLocation::File(std::env::temp_dir())
    }

    #[tokio::test]
    async fn openapi_bridge_resolves_operations_and_falls_back_to_support() {
        let mut capabilities = IndexMap::new();
        capabilities.insert("getUser".to_string(), capability(Some("getUser"), None, Some("pick")));
        capabilities.insert("search".to_string(), capability(Some("searchUsers"), Some("localSearch"), None));
        capabilities.insert("broken".to_string(), capability(Some("nope"), None, None));
        let document = BridgeDocument {
            execute: BridgeExecute {
                openapi_schema: Some(openapi()),
                ..BridgeExecute::default()
            },
            capabilities,
            support_module_uri: Some("builtin:support".into()),
            error_message_path: None,
        };

        let bridge = Bridge::load("users", &binding(document), &base(), &registry(), false).await.unwrap();

        match bridge.capability("getUser") {
            Ok(Capability::Remote(operation)) => {
                assert_eq!(operation.operation.path, "/users/{id}");
                assert!(operation.post_process.is_some());
                assert_eq!(operation.backend.default_server.as_deref(), Some("https://api.example.com"));
            }
            other => panic!("unexpected capability: {other:?}"),
        }
        assert!(matches!(bridge.capability("search"), Ok(Capability::Module(_))));
        assert!(bridge.capability("broken").is_err());
        assert!(bridge.capability("missing").unwrap_err().contains("not found"));
    }

    #[tokio::test]
    async fn module_bridge_uses_client_functions() {
        let mut capabilities = IndexMap::new();
        capabilities.insert("listUsers".to_string(), capability(None, Some("listUsers"), None));
        capabilities.insert("other".to_string(), capability(None, Some("absent"), None));
        let document = BridgeDocument {
            execute: BridgeExecute {
                api_client_module_uri: Some("builtin:client".into()),
                ..BridgeExecute::default()
            },
            capabilities,
            ..BridgeDocument::default()
        };

        let bridge = Bridge::load("users", &binding(document), &base(), &registry(), true).await.unwrap();
        match bridge.capability("listUsers") {
            Ok(Capability::Module(capability)) => assert_eq!(capability.function.parameter_names(), ["limit".to_string()]),
            other => panic!("unexpected capability: {other:?}"),
        }
        assert!(bridge.capability("other").is_err());
    }

    #[tokio::test]
    async fn invalid_openapi_is_fatal_only_when_validating() {
        let document = BridgeDocument {
            execute: BridgeExecute {
                openapi_schema: Some(json!({"swagger": "2.0", "paths": {}})),
                ..BridgeExecute::default()
            },
            ..BridgeDocument::default()
        };
        let error = Bridge::load("users", &binding(document.clone()), &base(), &registry(), true)
            .await
            .unwrap_err();
        assert!(matches!(error, LoadError::Validation { kind: "openapi", .. }), "unexpected error: {error}");

        assert!(Bridge::load("users", &binding(document), &base(), &registry(), false).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_modules_fail_the_bridge() {
        let document = BridgeDocument {
            execute: BridgeExecute {
                api_client_module_uri: Some("builtin:absent".into()),
                ..BridgeExecute::default()
            },
            ..BridgeDocument::default()
        };
        let error = Bridge::load("users", &binding(document), &base(), &registry(), false).await.unwrap_err();
        assert!(matches!(error, LoadError::ModuleNotFound(_)), "unexpected error: {error}");
    }
}
