//! Shared document model for DS Toolkit.
//!
//! The types in this crate mirror the JSON document family consumed by the
//! engine: page documents, process documents, bridge documents, and the
//! activity/parameter definitions nested inside them. They carry no runtime
//! behaviour beyond small helpers and structural validation.

pub mod activity;
pub mod bridge;
pub mod document;
pub mod event;
pub mod ui;
pub mod validation;

pub use activity::{
    ActivityDebug, ActivityDefinition, ActivityReference, ActivityUi, CommonActivity, GenerateDefinition, InsertPosition,
    OpenInputSetting, ParameterDefinition, RequiredActivity, SequenceDefinition, SharedParameter, StoreResult, StoreScope,
};
pub use bridge::{BridgeDocument, BridgeExecute, CapabilityDefinition, OperationSelector, ServiceBridge, ValueSource};
pub use document::{
    Autostart, DocumentSource, PROCESS_SERVICE_NAME, PageCommon, PageDocument, PageServiceDescription, ProcessCommon,
    ProcessDocument, ServiceDescription,
};
pub use event::{ExecutedActivity, ToolkitEvent, ToolkitEventKind};
pub use ui::{
    ButtonDefinition, CheckBoxDefinition, FileInputDefinition, InputFieldDefinition, SelectDefinition, SelectOption, ServiceUi,
};
pub use validation::{DocumentViolation, validate_bridge, validate_page, validate_process};
