//! Loading a page document into a runnable [`Process`].
//!
//! Loading runs these steps in order. The page is fetched and validated. Its
//! process is fetched and validated. Integrity is checked across both. The
//! modules are resolved and the bridges of all services are loaded
//! concurrently. Finally the activity tree is built. A bridge that fails to
//! load leaves the activities of its service inactive instead of failing the
//! load, unless it failed validation while validation was requested.

use std::sync::Arc;

use dstk_types::{PageDocument, ProcessDocument, ServiceBridge, validate_page, validate_process};
use dstk_util::{DocumentLocation, fetch_document};
use futures_util::future::join_all;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use crate::bridge::{Bridge, report_violations};
use crate::builder::ProcessBuilder;
use crate::context::ExecutionContext;
use crate::error::LoadError;
use crate::integrity::{self, IntegrityChecks};
use crate::module::{FunctionModule, ModuleRegistry};
use crate::process::Process;

/// Options governing [`load_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Reject documents with structural violations; otherwise they are logged.
    /// Also makes every integrity check fatal.
    pub validate: bool,
    /// Integrity checks that are fatal even without `validate`.
    pub integrity: IntegrityChecks,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            validate: true,
            integrity: IntegrityChecks::default(),
        }
    }
}

impl LoadOptions {
    fn fatal_checks(&self) -> IntegrityChecks {
        if self.validate { IntegrityChecks::all() } else { self.integrity }
    }
}

/// Fetch the page document at `location` and load it.
///
/// # Errors
/// See [`load_page_document`]; also fails when the page cannot be fetched or parsed.
pub async fn load_page(
    location: &DocumentLocation,
    options: &LoadOptions,
    modules: &ModuleRegistry,
    context: ExecutionContext,
) -> Result<Process, LoadError> {
    let page: PageDocument = fetch_parsed("page", location).await?;
    load_page_document(&page, location, options, modules, context).await
}

/// Load an already parsed page document.
///
/// # Arguments
/// - `base`: Location relative URIs of the page resolve against
/// - `context`: Runtime collaborators handed to the built process
///
/// # Errors
/// Fails on validation or integrity problems (as configured), on a missing or
/// unreadable process document, and on an unregistered `scriptUri` module.
pub async fn load_page_document(
    page: &PageDocument,
    base: &DocumentLocation,
    options: &LoadOptions,
    modules: &ModuleRegistry,
    context: ExecutionContext,
) -> Result<Process, LoadError> {
    report_violations("page", validate_page(page), options.validate)?;

    let (process, process_base) = load_process_document(page, base).await?;
    report_violations("process", validate_process(&process), options.validate)?;

    integrity::check(page, &process, options.fatal_checks())?;

    let module = process_module(page, &process, modules)?;
    let bridges = load_bridges(page, &process, base, &process_base, modules, options.validate).await?;

    let built = ProcessBuilder::new(page, &process, &bridges, &module).build(context);

    for activity in built.inactive_activities() {
        warn!(activity = %activity, "activity is inactive");
    }
    info!(
        title = %built.title(),
        services = process.services.len(),
        activities = built.activities().len(),
        "process loaded"
    );
    Ok(built)
}

async fn fetch_parsed<T: DeserializeOwned>(kind: &'static str, location: &DocumentLocation) -> Result<T, LoadError> {
    let value = fetch_document(location).await.map_err(|error| LoadError::Fetch {
        location: location.to_string(),
        message: format!("{error:#}"),
    })?;
    serde_json::from_value(value).map_err(|error| LoadError::Parse {
        kind,
        location: location.to_string(),
        message: error.to_string(),
    })
}

async fn load_process_document(page: &PageDocument, base: &DocumentLocation) -> Result<(ProcessDocument, DocumentLocation), LoadError> {
    if let Some(instance) = &page.process.instance {
        return Ok((instance.clone(), base.clone()));
    }
    let Some(uri) = &page.process.uri else {
        return Err(LoadError::MissingProcess);
    };
    let location = base.join(uri).map_err(|error| LoadError::Fetch {
        location: uri.clone(),
        message: error.to_string(),
    })?;
    let process = fetch_parsed("process", &location).await?;
    Ok((process, location))
}

/// Process module with the page module merged over it.
fn process_module(page: &PageDocument, process: &ProcessDocument, modules: &ModuleRegistry) -> Result<FunctionModule, LoadError> {
    let mut module = match &process.script_uri {
        Some(uri) => modules.resolve(uri)?,
        None => FunctionModule::new(),
    };
    if let Some(uri) = &page.script_uri {
        module.merge(&modules.resolve(uri)?);
    }
    Ok(module)
}

/// Bridge binding of a service and the location its URIs resolve against.
///
/// The process description's own bridge wins over the page's. `server` and
/// `authorization` set on the page override those of the process.
fn effective_binding(
    service: &str,
    page: &PageDocument,
    process: &ProcessDocument,
    page_base: &DocumentLocation,
    process_base: &DocumentLocation,
) -> Option<(ServiceBridge, DocumentLocation)> {
    let from_process = process.services.get(service).and_then(|description| description.bridge.as_ref());
    let from_page = page.services.get(service).and_then(|description| description.bridge.as_ref());

    let (mut binding, base) = match (from_process, from_page) {
        (Some(binding), _) if !binding.source.is_empty() => (binding.clone(), process_base.clone()),
        (_, Some(binding)) if !binding.source.is_empty() => (binding.clone(), page_base.clone()),
        _ => return None,
    };
    if let Some(page_binding) = from_page {
        if page_binding.server.is_some() {
            binding.server = page_binding.server.clone();
        }
        if !page_binding.authorization.is_empty() {
            binding.authorization = page_binding.authorization.clone();
        }
    }
    if binding.server.is_none()
        && let Some(process_binding) = from_process
    {
        binding.server = process_binding.server.clone();
    }
    Some((binding, base))
}

async fn load_bridges(
    page: &PageDocument,
    process: &ProcessDocument,
    page_base: &DocumentLocation,
    process_base: &DocumentLocation,
    modules: &ModuleRegistry,
    validate: bool,
) -> Result<IndexMap<String, Arc<Bridge>>, LoadError> {
    let bindings: Vec<(&str, ServiceBridge, DocumentLocation)> = process
        .services
        .keys()
        .filter_map(|service| {
            effective_binding(service, page, process, page_base, process_base).map(|(binding, base)| (service.as_str(), binding, base))
        })
        .collect();

    let outcomes = join_all(
        bindings
            .iter()
            .map(|(service, binding, base)| Bridge::load(service, binding, base, modules, validate)),
    )
    .await;

    let mut bridges = IndexMap::new();
    for ((service, _, _), outcome) in bindings.iter().zip(outcomes) {
        match outcome {
            Ok(bridge) => {
                bridges.insert(service.to_string(), Arc::new(bridge));
            }
            Err(validation @ LoadError::Validation { .. }) if validate => return Err(validation),
            Err(load_error) => {
                error!(service = %service, error = %load_error, "Loading bridge failed; activities of the service stay inactive");
            }
        }
    }
    Ok(bridges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstk_types::ValueSource;
    use serde_json::json;

    fn page_base() -> DocumentLocation {
        DocumentLocation::File("/docs/page.json".into())
    }

    fn process_base() -> DocumentLocation {
        DocumentLocation::File("/docs/process/process.json".into())
    }

    #[test]
    fn process_bridge_wins_but_page_overrides_server() {
        let page: PageDocument = serde_json::from_value(json!({
            "services": {"users": {"bridge": {
                "source": {"uri": "page.bridge.json"},
                "server": "https://page.example.com"
            }}}
        }))
        .unwrap();
        let process: ProcessDocument = serde_json::from_value(json!({
            "services": {"users": {"bridge": {
                "source": {"uri": "users.bridge.json"},
                "server": "https://process.example.com",
                "authorization": {"token": {"constant": "abc"}}
            }}}
        }))
        .unwrap();

        let (binding, base) = effective_binding("users", &page, &process, &page_base(), &process_base()).unwrap();
        assert_eq!(binding.source.uri.as_deref(), Some("users.bridge.json"));
        assert_eq!(base, process_base());
        assert_eq!(binding.server, Some(ValueSource::Literal("https://page.example.com".into())));
        assert_eq!(binding.authorization.len(), 1);
    }

    #[test]
    fn page_bridge_is_used_when_process_has_none() {
        let page: PageDocument = serde_json::from_value(json!({
            "services": {"users": {"bridge": {"source": {"uri": "page.bridge.json"}}}}
        }))
        .unwrap();
        let process: ProcessDocument = serde_json::from_value(json!({"services": {"users": {}, "orders": {}}})).unwrap();

        let (binding, base) = effective_binding("users", &page, &process, &page_base(), &process_base()).unwrap();
        assert_eq!(binding.source.uri.as_deref(), Some("page.bridge.json"));
        assert_eq!(base, page_base());
        assert!(effective_binding("orders", &page, &process, &page_base(), &process_base()).is_none());
    }

    #[test]
    fn page_module_overrides_process_module() {
        use crate::module::LocalFunction;
        use serde_json::Value;

        let modules = ModuleRegistry::new()
            .with(
                "builtin:process",
                FunctionModule::new()
                    .with(LocalFunction::sync("shared", &[], |_| Ok(json!("process"))))
                    .with(LocalFunction::sync("only_process", &[], |_| Ok(Value::Null))),
            )
            .with(
                "builtin:page",
                FunctionModule::new().with(LocalFunction::sync("shared", &["x"], |_| Ok(json!("page")))),
            );
        let page = PageDocument {
            script_uri: Some("builtin:page".into()),
            ..PageDocument::default()
        };
        let process = ProcessDocument {
            script_uri: Some("builtin:process".into()),
            ..ProcessDocument::default()
        };

        let module = process_module(&page, &process, &modules).unwrap();
        assert!(module.contains("only_process"));
        assert_eq!(module.get("shared").map(|f| f.parameter_names().len()), Some(1));

        let missing = PageDocument {
            script_uri: Some("builtin:absent".into()),
            ..PageDocument::default()
        };
        let error = process_module(&missing, &process, &modules).unwrap_err();
        assert!(matches!(error, LoadError::ModuleNotFound(uri) if uri == "builtin:absent"));
    }
}
