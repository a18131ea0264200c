#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use dstk_api::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use dstk_engine::{ExecutionContext, LoadOptions, MemorySurface, ModuleRegistry, Process, load_page_document};
use dstk_types::{PageDocument, ToolkitEvent};
use dstk_util::DocumentLocation;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

/// Transport answering every request with the same response and remembering the requests.
pub struct ScriptedTransport {
    response: HttpResponse,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(response: HttpResponse) -> Arc<Self> {
        Arc::new(Self {
            response,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|request| request.url.clone()).collect()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.response.clone())
    }
}

pub struct Harness {
    pub process: Process,
    pub surface: Arc<MemorySurface>,
    pub transport: Arc<ScriptedTransport>,
    pub events: UnboundedReceiver<ToolkitEvent>,
}

impl Harness {
    pub fn drain_events(&mut self) -> Vec<ToolkitEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

pub fn page_base() -> DocumentLocation {
    DocumentLocation::File(std::env::temp_dir().join("page.json"))
}

/// Load `page` with validation on and a transport that always answers 200 `{}`.
pub async fn load(page: Value, modules: ModuleRegistry) -> Harness {
    load_with(page, modules, HttpResponse::json(200, &serde_json::json!({}))).await
}

pub async fn load_with(page: Value, modules: ModuleRegistry, response: HttpResponse) -> Harness {
    let page: PageDocument = serde_json::from_value(page).expect("page fixture parses");
    let surface = Arc::new(MemorySurface::new());
    let transport = ScriptedTransport::new(response);
    let (sender, events) = tokio::sync::mpsc::unbounded_channel();
    let context = ExecutionContext::new(surface.clone(), transport.clone()).with_events(sender);

    let process = load_page_document(&page, &page_base(), &LoadOptions::default(), &modules, context)
        .await
        .expect("page fixture loads");
    Harness {
        process,
        surface,
        transport,
        events,
    }
}

/// Page with an inline process declaring `services`, each mirrored by an empty page service.
pub fn page(services: Value) -> Value {
    page_with_common(services, serde_json::json!({}))
}

pub fn page_with_common(services: Value, common: Value) -> Value {
    let page_services: serde_json::Map<String, Value> = services
        .as_object()
        .map(|services| services.keys().map(|name| (name.clone(), serde_json::json!({}))).collect())
        .unwrap_or_default();
    serde_json::json!({
        "title": "Test page",
        "scriptUri": "builtin:test",
        "process": {"instance": {"title": "Test process", "services": services, "common": common}},
        "services": page_services
    })
}
