//! Construction of a [`Process`] from loaded documents.
//!
//! Building happens in two passes. The first creates every service and the
//! activity tree of each, resolving execution strategies; an activity whose
//! strategy cannot be resolved is kept but inactive. The second pass maps the
//! parameters of every activity once the whole tree exists, so references and
//! generators can see their targets.

use std::sync::Arc;

use dstk_types::{
    ActivityDefinition, ActivityReference, CommonActivity, GenerateDefinition, PROCESS_SERVICE_NAME, PageDocument,
    ParameterDefinition, ProcessDocument, SharedParameter,
};
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::activity::{Activity, ActivityHandle};
use crate::bridge::Bridge;
use crate::context::ExecutionContext;
use crate::execution::{ActivityExecution, ExecutionKind};
use crate::module::FunctionModule;
use crate::parameter::{DynamicParameter, ParameterResolver};
use crate::process::Process;
use crate::service::Service;
use crate::ui::UiInput;

pub struct ProcessBuilder<'a> {
    page: &'a PageDocument,
    process: &'a ProcessDocument,
    bridges: &'a IndexMap<String, Arc<Bridge>>,
    module: &'a FunctionModule,
    activities: Vec<Activity>,
    /// Shared parameter maps per service, consulted in order.
    shared: IndexMap<String, Vec<&'a IndexMap<String, SharedParameter>>>,
    inputs: IndexMap<String, IndexMap<String, UiInput>>,
}

impl<'a> ProcessBuilder<'a> {
    /// # Arguments
    /// - `bridges`: Loaded bridges by service name; services without an entry have none
    /// - `module`: Process module with page functions merged over it
    pub fn new(
        page: &'a PageDocument,
        process: &'a ProcessDocument,
        bridges: &'a IndexMap<String, Arc<Bridge>>,
        module: &'a FunctionModule,
    ) -> Self {
        Self {
            page,
            process,
            bridges,
            module,
            activities: Vec::new(),
            shared: IndexMap::new(),
            inputs: IndexMap::new(),
        }
    }

    pub fn build(mut self, context: ExecutionContext) -> Process {
        let (page, process) = (self.page, self.process);
        let mut services = IndexMap::new();
        for (name, description) in &process.services {
            let page_description = page.services.get(name);
            let title = page_description
                .and_then(|page| page.title.clone())
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| non_empty_or(&description.title, name));

            let mut service = Service::new(name.clone(), title);
            service.register_inputs(&description.ui);
            service.sequences = description.sequences.clone();
            service.autostart = description
                .autostart
                .names()
                .iter()
                .chain(page_description.map(|page| page.autostart.names()).unwrap_or_default())
                .cloned()
                .collect();
            service.bridge = self.bridges.get(name).cloned();

            let mut shared = vec![&description.parameters];
            if let Some(page) = page_description {
                shared.push(&page.parameters);
            }
            self.shared.insert(name.clone(), shared);
            self.inputs.insert(name.clone(), UiInput::from_service_ui(name, &description.ui));

            let bridge = service.bridge.clone();
            for (activity_name, definition) in &description.activities {
                let handle = self.build_activity(name, activity_name, definition, None, bridge.as_deref());
                service.activities.insert(activity_name.clone(), handle);
            }
            services.insert(name.clone(), service);
        }

        let common = &process.common;
        let mut process_service = Service::new(PROCESS_SERVICE_NAME, non_empty_or(&process.title, PROCESS_SERVICE_NAME));
        process_service.register_inputs(&common.ui);
        process_service.sequences = common.sequences.clone();
        process_service.autostart = common
            .autostart
            .names()
            .iter()
            .chain(page.common.auto_start.names())
            .cloned()
            .collect();
        self.shared
            .insert(PROCESS_SERVICE_NAME.to_string(), vec![&common.parameters, &page.common.parameters]);
        self.inputs
            .insert(PROCESS_SERVICE_NAME.to_string(), UiInput::from_service_ui(PROCESS_SERVICE_NAME, &common.ui));
        for (activity_name, entry) in &common.activities {
            let handle = match entry {
                CommonActivity::Definition(definition) => {
                    self.build_activity(PROCESS_SERVICE_NAME, activity_name, definition, None, None)
                }
                CommonActivity::Reference(reference) => self.build_reference(activity_name, reference, &services),
            };
            process_service.activities.insert(activity_name.clone(), handle);
        }

        // Generators are appended while mapping and mapped when the loop reaches them.
        let mut index = 0;
        while index < self.activities.len() {
            self.map_parameters(ActivityHandle::new(index));
            index += 1;
        }

        let title = non_empty_or(&process.title, &page.title);
        Process::new(title, self.activities, services, process_service, context)
    }

    fn push(&mut self, activity: Activity) -> ActivityHandle {
        let handle = ActivityHandle::new(self.activities.len());
        self.activities.push(activity);
        handle
    }

    fn build_activity(
        &mut self,
        service: &str,
        name: &str,
        definition: &ActivityDefinition,
        parent: Option<ActivityHandle>,
        bridge: Option<&Bridge>,
    ) -> ActivityHandle {
        let mut activity = Activity::new(service, name, non_empty_or(&definition.title, name));
        activity.parent = parent;
        activity.execution = self.resolve_execution(service, name, definition, bridge);
        activity.parameter_definitions = definition.parameters.clone();
        activity.request_body_definitions = definition.request_body.clone().unwrap_or_default();
        activity.required = definition.required_activities.clone();
        activity.store_result = definition.store_result.clone();
        activity.ui = definition.ui.clone();
        activity.debug = definition.debug.clone();

        if let Some(function_name) = &definition.pre_process {
            match self.module.get(function_name) {
                Some(function) => {
                    if let Some(execution) = &activity.execution {
                        let expected = execution.parameter_names(&self.activities);
                        if function.parameter_names() != expected.as_slice() {
                            info!(
                                service = %service,
                                activity = %name,
                                pre_process = ?function.parameter_names(),
                                execution = ?expected,
                                "preProcess parameters differ from execution parameters"
                            );
                        }
                    }
                    activity.pre_process = Some(function.clone());
                }
                None => {
                    error!(service = %service, activity = %name, function = %function_name, "preProcess function not found; activity inactive");
                    activity.execution = None;
                }
            }
        }

        let handle = self.push(activity);
        let sub_activities = self.build_sub_activities(service, &definition.sub_activities, handle, bridge);
        self.activities[handle.index()].sub_activities = sub_activities;
        handle
    }

    /// Build children in ascending priority; the stable sort keeps declaration order on ties.
    fn build_sub_activities(
        &mut self,
        service: &str,
        definitions: &IndexMap<String, ActivityDefinition>,
        parent: ActivityHandle,
        bridge: Option<&Bridge>,
    ) -> Vec<ActivityHandle> {
        let mut ordered: Vec<(&String, &ActivityDefinition)> = definitions.iter().collect();
        ordered.sort_by(|(_, left), (_, right)| left.effective_priority().total_cmp(&right.effective_priority()));
        ordered
            .into_iter()
            .map(|(name, definition)| self.build_activity(service, name, definition, Some(parent), bridge))
            .collect()
    }

    fn build_reference(&mut self, name: &str, reference: &ActivityReference, services: &IndexMap<String, Service>) -> ActivityHandle {
        let target = services
            .get(&reference.service_name)
            .and_then(|service| service.activities.get(&reference.activity_name))
            .copied();
        let title = reference
            .title
            .clone()
            .or_else(|| target.map(|target| self.activities[target.index()].title.clone()))
            .unwrap_or_else(|| name.to_string());

        let mut activity = Activity::new(PROCESS_SERVICE_NAME, name, title);
        activity.debug = reference.debug.clone();
        match target {
            Some(target) => activity.execution = Some(ActivityExecution::Reference(target)),
            None => error!(
                activity = %name,
                service = %reference.service_name,
                target = %reference.activity_name,
                "Referenced activity not found"
            ),
        }

        let handle = self.push(activity);
        let sub_activities = self.build_sub_activities(PROCESS_SERVICE_NAME, &reference.sub_activities, handle, None);
        self.activities[handle.index()].sub_activities = sub_activities;
        handle
    }

    fn resolve_execution(
        &self,
        service: &str,
        name: &str,
        definition: &ActivityDefinition,
        bridge: Option<&Bridge>,
    ) -> Option<ActivityExecution> {
        if let Some(capability) = &definition.bridge_capability {
            if service == PROCESS_SERVICE_NAME {
                error!(activity = %name, capability = %capability, "process activities cannot use a bridgeCapability");
                return None;
            }
            let Some(bridge) = bridge else {
                error!(service = %service, activity = %name, capability = %capability, "service has no loaded bridge");
                return None;
            };
            return match bridge.capability(capability) {
                Ok(capability) => Some(capability.execution()),
                Err(reason) => {
                    error!(service = %service, activity = %name, "{reason}");
                    None
                }
            };
        }
        if let Some(function_name) = &definition.module_function {
            return match self.module.get(function_name) {
                Some(function) => Some(ActivityExecution::LocalFunction(function.clone())),
                None => {
                    error!(service = %service, activity = %name, function = %function_name, "module function not found");
                    None
                }
            };
        }
        error!(service = %service, activity = %name, "activity declares neither bridgeCapability nor moduleFunction");
        None
    }

    /// Pick a resolver for every parameter the execution strategy consumes.
    ///
    /// An explicit definition wins, then the shared parameter maps, then a UI
    /// input of the same name. Unmatched parameters are reported and left out.
    fn map_parameters(&mut self, handle: ActivityHandle) {
        let activity = &self.activities[handle.index()];
        let Some(execution) = activity.execution.clone() else {
            error!(
                service = %activity.service,
                activity = %activity.name,
                "No Parameter-mapping is done for inactive Activity"
            );
            return;
        };
        if execution.kind() == ExecutionKind::Reference {
            return;
        }

        let service = activity.service.clone();
        let activity_name = activity.name.clone();
        let definitions = activity.parameter_definitions.clone();
        let body_definitions = activity.request_body_definitions.clone();
        let names = execution.parameter_names(&self.activities);

        let mut parameters = IndexMap::new();
        let mut dynamic_parameters = IndexMap::new();
        for name in &names {
            let definition = definitions.get(name).cloned().or_else(|| self.shared_definition(&service, name));
            let Some(definition) = definition else {
                match self.inputs.get(&service).and_then(|inputs| inputs.get(name)) {
                    Some(input) if input.is_file() => {
                        parameters.insert(name.clone(), ParameterResolver::FileInput(name.clone()));
                    }
                    Some(_) => {
                        parameters.insert(name.clone(), ParameterResolver::Input(name.clone()));
                    }
                    None => error!("Missing ActivityParameter: '{name}' of activity: {activity_name}"),
                }
                continue;
            };

            if definition.dynamic {
                let generator = definition
                    .generate
                    .as_ref()
                    .map(|generate| self.build_generator(&service, &activity_name, name, generate));
                dynamic_parameters.insert(name.clone(), DynamicParameter { definition, generator });
                continue;
            }
            let resolver = self.resolver(&service, &activity_name, name, &definition);
            debug!(activity = %activity_name, parameter = %name, resolver = %resolver, "parameter mapped");
            parameters.insert(name.clone(), resolver);
        }

        for defined in definitions.keys().filter(|defined| !names.contains(defined)) {
            info!(activity = %activity_name, parameter = %defined, "parameter is defined but not required by the execution");
        }

        let mut request_body = IndexMap::new();
        if execution.kind() == ExecutionKind::RemoteOperation {
            for (part, definition) in &body_definitions {
                let resolver = self.resolver(&service, &activity_name, part, definition);
                request_body.insert(part.clone(), resolver);
            }
        } else if !body_definitions.is_empty() {
            warn!(activity = %activity_name, "requestBody is only sent by remote operations; ignored");
        }

        let activity = &mut self.activities[handle.index()];
        activity.parameters = parameters;
        activity.dynamic_parameters = dynamic_parameters;
        activity.request_body = request_body;
    }

    fn shared_definition(&self, service: &str, name: &str) -> Option<ParameterDefinition> {
        self.shared
            .get(service)?
            .iter()
            .find_map(|shared| shared.get(name))
            .map(SharedParameter::to_definition)
    }

    /// Resolver for `definition`, falling back to a `null` constant.
    fn resolver(&mut self, service: &str, activity: &str, parameter: &str, definition: &ParameterDefinition) -> ParameterResolver {
        let resolver = ParameterResolver::from_definition(definition, |generate| {
            Some(self.build_generator(service, activity, parameter, generate))
        });
        resolver.unwrap_or_else(|| {
            error!(activity = %activity, parameter = %parameter, "Undefined parameter assignment");
            ParameterResolver::Constant(serde_json::Value::Null)
        })
    }

    /// Synthetic activity producing the value of a `generate` parameter.
    fn build_generator(&mut self, service: &str, activity: &str, parameter: &str, generate: &GenerateDefinition) -> ActivityHandle {
        let name = format!("PARAMETER-GENERATE-ACTIVITY-{activity}_{parameter}");
        let definition = generate.to_activity(&name);
        let bridge = self.bridges.get(service).cloned();
        let handle = self.build_activity(service, &name, &definition, None, bridge.as_deref());
        self.activities[handle.index()].generated = true;
        handle
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() { fallback.to_string() } else { value.to_string() }
}
