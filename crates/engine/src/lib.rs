//! # DS Toolkit Engine
//!
//! The engine turns a page document and its process document into a runnable
//! [`Process`]: services with stores and UI inputs, a tree of activities per
//! service, and the bridges that connect capabilities to remote operations or
//! local modules.
//!
//! ## Key Features
//!
//! - **Loading**: Fetches, validates, and integrity-checks the document family
//! - **Parameter resolution**: Explicit definitions, shared parameters, then UI inputs
//! - **Execution strategies**: Local functions, OpenAPI operations, bridge modules, and references
//! - **Lifecycle**: Required-activity gating, pre-processing, storage, ordered sub-activities
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dstk_api::ReqwestTransport;
//! use dstk_engine::{ExecutionContext, LoadOptions, ModuleRegistry, NullSurface, load_page};
//! use dstk_util::DocumentLocation;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let context = ExecutionContext::new(Arc::new(NullSurface), Arc::new(ReqwestTransport::from_env()?));
//! let location = DocumentLocation::parse("page.json")?;
//! let process = load_page(&location, &LoadOptions::default(), &ModuleRegistry::new(), context).await?;
//! let user = process.execute_activity("users", "fetchUser").await?;
//! println!("{user}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`loader`** / **`builder`**: Documents to a [`Process`]
//! - **`process`** / **`service`**: Operations hosts call and the running-activity flag
//! - **`lifecycle`**: Execution of one activity node and its sub-activities
//! - **`parameter`**: Where parameter values come from
//! - **`execution`** / **`remote`** / **`bridge`**: Execution strategies
//! - **`context`** / **`store`** / **`ui`**: Runtime collaborators

pub mod activity;
pub mod bridge;
mod builder;
pub mod context;
pub mod error;
pub mod execution;
pub mod integrity;
mod lifecycle;
pub mod loader;
pub mod module;
pub mod parameter;
pub mod process;
pub mod remote;
pub mod service;
pub mod store;
pub mod ui;

pub use activity::{Activity, ActivityHandle, ActivityInfo};
pub use bridge::{Bridge, Capability};
pub use context::ExecutionContext;
pub use error::{ActivityError, ActivityErrorKind, EngineError, ExecutionError, FunctionError, LoadError};
pub use execution::{ActivityExecution, ExecutionKind, ModuleCapability};
pub use integrity::IntegrityChecks;
pub use lifecycle::RunOptions;
pub use loader::{LoadOptions, load_page, load_page_document};
pub use module::{FunctionModule, FunctionOutput, FunctionResponse, LocalFunction, ModuleRegistry};
pub use parameter::{DynamicParameter, ParameterResolver};
pub use process::{ExternalCallOptions, Process};
pub use remote::{Endpoint, OpenApiBackend, RemoteOperation};
pub use service::{RunState, Service};
pub use store::Store;
pub use ui::{MemorySurface, NullSurface, SurfaceOutput, UiInput, UiInputKind, UiSurface};
