mod common;

use std::path::Path;
use std::sync::Arc;

use common::ScriptedTransport;
use dstk_api::HttpResponse;
use dstk_engine::{
    ExecutionContext, FunctionModule, IntegrityChecks, LoadError, LoadOptions, LocalFunction, ModuleRegistry, NullSurface,
    load_page,
};
use dstk_util::DocumentLocation;
use serde_json::{Value, json};

fn context() -> ExecutionContext {
    ExecutionContext::new(Arc::new(NullSurface), ScriptedTransport::new(HttpResponse::new(204, "")))
}

fn registry() -> ModuleRegistry {
    let client = FunctionModule::new().with(LocalFunction::sync("listFiles", &["folder"], |arguments| {
        Ok(json!([format!("{}/a.txt", arguments[0].as_str().unwrap_or_default())]))
    }));
    let process = FunctionModule::new().with(LocalFunction::sync("count", &["files"], |arguments| {
        Ok(json!(arguments[0].as_array().map(Vec::len).unwrap_or_default()))
    }));
    ModuleRegistry::new()
        .with("builtin:client", client)
        .with("builtin:process", process)
}

fn write(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn process_document() -> Value {
    json!({
        "title": "Files",
        "scriptUri": "builtin:process",
        "services": {
            "files": {
                "title": "Files",
                "ui": {"inputFields": {"folder": {"label": "Folder", "fromQueryParam": "folder"}}},
                "bridge": {"source": {"uri": "files.bridge.json"}},
                "activities": {
                    "list": {
                        "title": "List files",
                        "bridgeCapability": "listFiles",
                        "storeResult": {"key": "files"},
                        "subActivities": {
                            "count": {"moduleFunction": "count", "parameters": {"files": {"parent": true}}, "storeResult": {"context": "process", "key": "fileCount"}}
                        }
                    }
                }
            }
        }
    })
}

fn bridge_document(client_module: &str) -> Value {
    json!({
        "execute": {"apiClientModuleUri": client_module},
        "capabilities": {"listFiles": {"functionName": "listFiles"}}
    })
}

/// Write page, process and bridge documents into `root` and return the page location.
///
/// The bridge sits next to the process document, which names it relatively.
fn write_documents(root: &Path, client_module: &str) -> DocumentLocation {
    write(&root.join("process/files.bridge.json"), &bridge_document(client_module));
    write(&root.join("process/process.json"), &process_document());
    write(
        &root.join("page.json"),
        &json!({"title": "Files page", "process": {"uri": "process/process.json"}, "services": {"files": {}}}),
    );
    DocumentLocation::File(root.join("page.json"))
}

#[tokio::test]
async fn loads_documents_relative_to_each_other() {
    let directory = tempfile::tempdir().unwrap();
    let location = write_documents(directory.path(), "builtin:client");
    let query = [("folder".to_string(), "docs".to_string())].into_iter().collect();
    let context = context().with_query(query);

    let process = load_page(&location, &LoadOptions::default(), &registry(), context)
        .await
        .unwrap_or_else(|error| panic!("unexpected error: {error}"));

    assert_eq!(process.title(), "Files");
    assert!(process.inactive_activities().is_empty());
    let files = process.execute_activity("files", "list").await.unwrap();
    assert_eq!(files, json!(["docs/a.txt"]));
    assert_eq!(process.storage_value("fileCount", None).unwrap(), json!(1));
}

#[tokio::test]
async fn unusable_bridge_leaves_its_activities_inactive() {
    let directory = tempfile::tempdir().unwrap();
    let location = write_documents(directory.path(), "builtin:absent");

    let process = load_page(&location, &LoadOptions::default(), &registry(), context())
        .await
        .unwrap_or_else(|error| panic!("unexpected error: {error}"));

    let inactive: Vec<String> = process
        .inactive_activities()
        .into_iter()
        .map(|activity| activity.activity_name)
        .collect();
    assert_eq!(inactive, vec!["list"]);
    assert!(process.service("files").unwrap().bridge.is_none());
}

#[tokio::test]
async fn invalid_page_is_rejected_only_when_validating() {
    let directory = tempfile::tempdir().unwrap();
    let page_path = directory.path().join("page.json");
    write(
        &page_path,
        &json!({
            "title": "Broken",
            "process": {"instance": {"services": {"svc": {"activities": {"noop": {"title": "No source"}}}}}},
            "services": {"svc": {}}
        }),
    );
    let location = DocumentLocation::File(page_path);

    let error = load_page(&location, &LoadOptions::default(), &registry(), context())
        .await
        .err()
        .expect("validation fails");
    match error {
        LoadError::Validation { kind, violations } => {
            assert_eq!(kind, "page");
            assert_eq!(violations[0].instance_path, "/process/instance/services/svc/activities/noop");
        }
        other => panic!("unexpected error: {other}"),
    }

    let lenient = LoadOptions {
        validate: false,
        ..LoadOptions::default()
    };
    let process = load_page(&location, &lenient, &registry(), context()).await.unwrap();
    assert_eq!(process.inactive_activities().len(), 1);
}

#[tokio::test]
async fn integrity_problems_follow_the_configured_checks() {
    let directory = tempfile::tempdir().unwrap();
    let page_path = directory.path().join("page.json");
    write(
        &page_path,
        &json!({
            "process": {"instance": {
                "scriptUri": "builtin:process",
                "services": {
                    "files": {
                        "activities": {"count": {"moduleFunction": "count"}},
                        "sequences": {"all": {"activities": ["count", "missing"]}}
                    }
                }
            }},
            "services": {"files": {}}
        }),
    );
    let location = DocumentLocation::File(page_path);

    let error = load_page(&location, &LoadOptions::default(), &registry(), context())
        .await
        .err()
        .expect("integrity check fails");
    assert!(matches!(&error, LoadError::Integrity(problems) if problems.len() == 1), "unexpected error: {error}");

    let lenient = LoadOptions {
        validate: false,
        integrity: IntegrityChecks::default(),
    };
    assert!(load_page(&location, &lenient, &registry(), context()).await.is_ok());

    let strict = LoadOptions {
        validate: false,
        integrity: IntegrityChecks {
            sequences: true,
            ..IntegrityChecks::default()
        },
    };
    assert!(matches!(
        load_page(&location, &strict, &registry(), context()).await,
        Err(LoadError::Integrity(_))
    ));
}

#[tokio::test]
async fn missing_page_is_a_fetch_error() {
    let directory = tempfile::tempdir().unwrap();
    let location = DocumentLocation::File(directory.path().join("absent.json"));
    let error = load_page(&location, &LoadOptions::default(), &registry(), context())
        .await
        .err()
        .expect("fetch fails");
    assert!(matches!(error, LoadError::Fetch { .. }), "unexpected error: {error}");
}
