//! Parameter resolvers.
//!
//! A resolver is chosen once per execution parameter when parameters are
//! mapped, and asked for a value on every run. Values are produced by
//! [`crate::Process`], which owns the stores and the activities that
//! `generate` parameters run.

use std::fmt;

use dstk_types::{GenerateDefinition, ParameterDefinition, StoreScope};
use serde_json::Value;

use crate::activity::ActivityHandle;

/// Closed set of value sources.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterResolver {
    /// Text field, select, or check box of the owning service, looked up when read.
    Input(String),
    ParentResult,
    PreviousResult,
    Constant(Value),
    /// Stored value; `path` projects into the stored result.
    Store {
        scope: StoreScope,
        key: String,
        path: Option<String>,
    },
    QueryParam(String),
    /// Result of a pre-built generator activity.
    Generate(ActivityHandle),
    FileInput(String),
}

impl ParameterResolver {
    /// Pick a resolver for `definition`.
    ///
    /// The first present source wins, in this order: `field`, `parent`,
    /// `previous`, `constant`, `store`, `queryParam`, `generate`, `fileInput`.
    /// `generate` asks `generator` for the activity that produces the value.
    /// Returns `None` when no source is usable.
    pub fn from_definition<F>(definition: &ParameterDefinition, generator: F) -> Option<Self>
    where
        F: FnOnce(&GenerateDefinition) -> Option<ActivityHandle>,
    {
        if let Some(field) = &definition.field {
            return Some(Self::Input(field.clone()));
        }
        if definition.parent {
            return Some(Self::ParentResult);
        }
        if definition.previous {
            return Some(Self::PreviousResult);
        }
        if let Some(constant) = &definition.constant {
            return Some(Self::Constant(constant.clone()));
        }
        if let Some(store) = &definition.store {
            let (key, path) = store.split_key();
            return Some(Self::Store {
                scope: store.scope,
                key: key.to_string(),
                path: path.map(str::to_string),
            });
        }
        if let Some(name) = &definition.query_param {
            return Some(Self::QueryParam(name.clone()));
        }
        if let Some(generate) = &definition.generate {
            return generator(generate).map(Self::Generate);
        }
        if let Some(file_input) = &definition.file_input {
            return Some(Self::FileInput(file_input.clone()));
        }
        None
    }
}

impl fmt::Display for ParameterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(name) => write!(f, "input: {name}"),
            Self::ParentResult => f.write_str("parentResult"),
            Self::PreviousResult => f.write_str("previousActivityResult"),
            Self::Constant(value) => write!(f, "constant: {value}"),
            Self::Store { scope, key, path } => match path {
                Some(path) => write!(f, "store: {scope}-{key}.{path}"),
                None => write!(f, "store: {scope}-{key}"),
            },
            Self::QueryParam(name) => write!(f, "queryParam: {name}"),
            Self::Generate(handle) => write!(f, "generate: activity #{}", handle.index()),
            Self::FileInput(name) => write!(f, "fileInput: {name}"),
        }
    }
}

/// Parameter re-resolved on every execution.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicParameter {
    pub definition: ParameterDefinition,
    /// Generator built up front for `generate` definitions.
    pub generator: Option<ActivityHandle>,
}

impl DynamicParameter {
    pub fn resolver(&self) -> Option<ParameterResolver> {
        ParameterResolver::from_definition(&self.definition, |_| self.generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstk_types::StoreResult;
    use serde_json::json;

    fn no_generator(_: &GenerateDefinition) -> Option<ActivityHandle> {
        None
    }

    #[test]
    fn field_wins_over_every_other_source() {
        let definition = ParameterDefinition {
            field: Some("userId".into()),
            parent: true,
            constant: Some(json!(7)),
            ..ParameterDefinition::default()
        };
        assert_eq!(
            ParameterResolver::from_definition(&definition, no_generator),
            Some(ParameterResolver::Input("userId".into()))
        );
    }

    #[test]
    fn constant_beats_store_and_query() {
        let definition = ParameterDefinition {
            constant: Some(json!(false)),
            query_param: Some("q".into()),
            ..ParameterDefinition::default()
        };
        assert_eq!(
            ParameterResolver::from_definition(&definition, no_generator),
            Some(ParameterResolver::Constant(json!(false)))
        );
    }

    #[test]
    fn store_keys_split_into_key_and_path() {
        let definition = ParameterDefinition {
            store: Some(StoreResult {
                scope: StoreScope::Process,
                key: "user.address.city".into(),
            }),
            ..ParameterDefinition::default()
        };
        let resolver = ParameterResolver::from_definition(&definition, no_generator).unwrap();
        assert_eq!(
            resolver,
            ParameterResolver::Store {
                scope: StoreScope::Process,
                key: "user".into(),
                path: Some("address.city".into()),
            }
        );
        assert_eq!(resolver.to_string(), "store: process-user.address.city");
    }

    #[test]
    fn generate_uses_the_supplied_generator() {
        let definition = ParameterDefinition {
            generate: Some(GenerateDefinition::default()),
            ..ParameterDefinition::default()
        };
        let handle = ActivityHandle::new(4);
        assert_eq!(
            ParameterResolver::from_definition(&definition, |_| Some(handle)),
            Some(ParameterResolver::Generate(handle))
        );
        assert_eq!(ParameterResolver::from_definition(&definition, no_generator), None);
    }

    #[test]
    fn empty_definition_has_no_resolver() {
        assert_eq!(ParameterResolver::from_definition(&ParameterDefinition::default(), no_generator), None);
    }
}
