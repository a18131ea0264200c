//! Cross-document integrity checks run before a process is built.
//!
//! Structural validation only looks at one document at a time. These checks
//! look across the page and process documents: services known to both,
//! required-activity references, store reads, and sequence entries.

use std::collections::HashSet;

use dstk_types::{
    ActivityDefinition, CommonActivity, PROCESS_SERVICE_NAME, PageDocument, ParameterDefinition, ProcessDocument, SharedParameter,
    StoreResult, StoreScope,
};
use indexmap::IndexMap;
use tracing::warn;

use crate::error::LoadError;

/// Which checks are fatal.
///
/// Every check always runs; problems found by a check that is not fatal are
/// logged and loading continues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrityChecks {
    pub page_services: bool,
    pub required_activities: bool,
    pub storage_access: bool,
    pub sequences: bool,
}

impl IntegrityChecks {
    pub fn all() -> Self {
        Self {
            page_services: true,
            required_activities: true,
            storage_access: true,
            sequences: true,
        }
    }
}

/// Run every check.
///
/// # Errors
/// Returns [`LoadError::Integrity`] listing the problems of every fatal check.
pub fn check(page: &PageDocument, process: &ProcessDocument, fatal: IntegrityChecks) -> Result<(), LoadError> {
    let index = ActivityIndex::new(process);
    let mut failures = Vec::new();
    let mut collect = |problems: Vec<String>, is_fatal: bool, check: &str| {
        for problem in problems {
            if is_fatal {
                failures.push(problem);
            } else {
                warn!(check, problem = %problem, "integrity check failed");
            }
        }
    };

    collect(page_services(page, process), fatal.page_services, "pageServices");
    collect(required_activities(&index), fatal.required_activities, "requiredActivities");
    collect(storage_access(page, process, &index), fatal.storage_access, "storageAccess");
    collect(sequences(process, &index), fatal.sequences, "sequences");

    if failures.is_empty() { Ok(()) } else { Err(LoadError::Integrity(failures)) }
}

/// Every activity definition of the process with its service, depth first.
struct ActivityIndex<'a> {
    entries: Vec<(&'a str, &'a str, &'a ActivityDefinition)>,
    top_level: HashSet<(&'a str, &'a str)>,
    names: HashSet<(&'a str, &'a str)>,
}

impl<'a> ActivityIndex<'a> {
    fn new(process: &'a ProcessDocument) -> Self {
        let mut index = Self {
            entries: Vec::new(),
            top_level: HashSet::new(),
            names: HashSet::new(),
        };
        for (service, description) in &process.services {
            for (name, definition) in &description.activities {
                index.top_level.insert((service.as_str(), name.as_str()));
                index.add(service, name, definition);
            }
        }
        for (name, entry) in &process.common.activities {
            index.top_level.insert((PROCESS_SERVICE_NAME, name.as_str()));
            index.names.insert((PROCESS_SERVICE_NAME, name.as_str()));
            match entry {
                CommonActivity::Definition(definition) => index.add(PROCESS_SERVICE_NAME, name, definition),
                CommonActivity::Reference(reference) => {
                    for (sub_name, sub) in &reference.sub_activities {
                        index.add(PROCESS_SERVICE_NAME, sub_name, sub);
                    }
                }
            }
        }
        index
    }

    fn add(&mut self, service: &'a str, name: &'a str, definition: &'a ActivityDefinition) {
        self.names.insert((service, name));
        self.entries.push((service, name, definition));
        for (sub_name, sub) in &definition.sub_activities {
            self.add(service, sub_name, sub);
        }
    }

    fn contains(&self, service: &str, name: &str) -> bool {
        self.names.contains(&(service, name))
    }
}

fn page_services(page: &PageDocument, process: &ProcessDocument) -> Vec<String> {
    let missing_in_process = page
        .services
        .keys()
        .filter(|name| !process.services.contains_key(*name))
        .map(|name| format!("Service '{name}' from the page is not defined in the process"));
    let missing_in_page = process
        .services
        .keys()
        .filter(|name| !page.services.contains_key(*name))
        .map(|name| format!("Service '{name}' from the process is not defined in the page"));
    missing_in_process.chain(missing_in_page).collect()
}

fn required_activities(index: &ActivityIndex<'_>) -> Vec<String> {
    let mut problems = Vec::new();
    for (service, name, definition) in &index.entries {
        for required in &definition.required_activities {
            let target_service = required.service_name.as_deref().unwrap_or(*service);
            if !index.contains(target_service, &required.activity_name) {
                problems.push(format!(
                    "activity '{service}:{name}' requires unknown activity '{target_service}:{}'",
                    required.activity_name
                ));
            }
        }
    }
    problems
}

/// Store scope and key as seen by reads: service scope of the process is the process store.
fn store_slot<'a>(service: &'a str, store: &'a StoreResult) -> (StoreScope, &'a str, &'a str) {
    let (key, _) = store.split_key();
    match store.scope {
        StoreScope::Service if service != PROCESS_SERVICE_NAME => (StoreScope::Service, service, key),
        StoreScope::Service | StoreScope::Process => (StoreScope::Process, "", key),
        StoreScope::Activity => (StoreScope::Activity, "", key),
    }
}

fn storage_access(page: &PageDocument, process: &ProcessDocument, index: &ActivityIndex<'_>) -> Vec<String> {
    let written: HashSet<(StoreScope, &str, &str)> = index
        .entries
        .iter()
        .filter_map(|(service, _, definition)| definition.store_result.as_ref().map(|store| store_slot(service, store)))
        .collect();

    let mut reads: Vec<(String, &str, &StoreResult)> = Vec::new();
    for (service, name, definition) in &index.entries {
        let origin = format!("activity '{service}:{name}'");
        for parameter in activity_parameters(definition) {
            collect_store_reads(&origin, service, parameter, &mut reads);
        }
    }
    let shared_maps = process
        .services
        .iter()
        .map(|(service, description)| (service.as_str(), &description.parameters))
        .chain(page.services.iter().map(|(service, description)| (service.as_str(), &description.parameters)))
        .chain([
            (PROCESS_SERVICE_NAME, &process.common.parameters),
            (PROCESS_SERVICE_NAME, &page.common.parameters),
        ]);
    for (service, parameters) in shared_maps {
        collect_shared_reads(service, parameters, &mut reads);
    }

    reads
        .into_iter()
        .filter(|(_, service, store)| !written.contains(&store_slot(service, store)))
        .map(|(origin, _, store)| format!("{origin} reads '{}' from the {} store but no activity stores it", store.key, store.scope))
        .collect()
}

fn activity_parameters(definition: &ActivityDefinition) -> impl Iterator<Item = &ParameterDefinition> {
    definition
        .parameters
        .values()
        .chain(definition.request_body.iter().flat_map(|body| body.values()))
}

fn collect_store_reads<'a>(
    origin: &str,
    service: &'a str,
    parameter: &'a ParameterDefinition,
    reads: &mut Vec<(String, &'a str, &'a StoreResult)>,
) {
    if let Some(store) = &parameter.store {
        reads.push((origin.to_string(), service, store));
    }
    if let Some(generate) = &parameter.generate {
        for nested in generate.parameters.values() {
            collect_store_reads(origin, service, nested, reads);
        }
    }
}

fn collect_shared_reads<'a>(
    service: &'a str,
    parameters: &'a IndexMap<String, SharedParameter>,
    reads: &mut Vec<(String, &'a str, &'a StoreResult)>,
) {
    for (name, shared) in parameters {
        if let SharedParameter::Definition(definition) = shared {
            collect_store_reads(&format!("shared parameter '{service}:{name}'"), service, definition, reads);
        }
    }
}

fn sequences(process: &ProcessDocument, index: &ActivityIndex<'_>) -> Vec<String> {
    let service_sequences = process
        .services
        .iter()
        .map(|(service, description)| (service.as_str(), &description.sequences));
    let all = service_sequences.chain(std::iter::once((PROCESS_SERVICE_NAME, &process.common.sequences)));

    let mut problems = Vec::new();
    for (service, sequences) in all {
        for (sequence, definition) in sequences {
            for activity in &definition.activities {
                if !index.top_level.contains(&(service, activity.as_str())) {
                    problems.push(format!("sequence '{service}:{sequence}' names unknown activity '{activity}'"));
                }
            }
        }
    }
    problems
}
