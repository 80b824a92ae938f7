// resource/mod.rs - Declarative resource definitions and the registry that serves them
//
// A resource is declared once (YAML) with a schema and per-verb validation
// rules. The router never indexes these by raw strings: every request goes
// through `ResourceRegistry::policy`, which either hands back a fully checked
// `EndpointPolicy` or a `LookupError` the HTTP layer turns into a 404.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::auth::roles::RoleSet;
use crate::database::Collection;
use crate::types::{Endpoint, Scope, Verb};
use crate::validation::{FieldRule, FieldType, RuleSet};

/// Persisted shape of a single field
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    pub fields: BTreeMap<String, FieldSpec>,
    /// Field used to address a record when the path id is not a store identifier
    #[serde(default)]
    pub natural_key: Option<String>,
}

impl Schema {
    pub fn unique_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.unique)
            .map(|(name, _)| name.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Drop fields the schema does not know about. With `apply_defaults`,
    /// missing fields that declare a default are filled in.
    pub fn shape(&self, data: &Map<String, Value>, apply_defaults: bool) -> Map<String, Value> {
        let mut shaped = Map::new();
        for (name, spec) in &self.fields {
            match data.get(name) {
                Some(value) => {
                    shaped.insert(name.clone(), value.clone());
                }
                None if apply_defaults => {
                    if let Some(default) = &spec.default {
                        shaped.insert(name.clone(), default.clone());
                    }
                }
                None => {}
            }
        }
        shaped
    }
}

/// Validation rules and role requirements for one verb
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerbRules {
    /// Roles for collection-scope endpoints (list, create)
    #[serde(default)]
    pub roles: Option<RoleSet>,
    /// Roles for count and single-record endpoints
    #[serde(default, alias = "singleRoles")]
    pub single_roles: Option<RoleSet>,
    #[serde(default)]
    pub rules: RuleSet,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDefinition {
    pub name: String,
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default, alias = "validationRules")]
    pub validation: HashMap<Verb, VerbRules>,
}

/// Everything the router needs to serve one endpoint of one resource
#[derive(Debug, Clone)]
pub struct EndpointPolicy<'a> {
    pub resource: &'a ResourceDefinition,
    pub schema: &'a Schema,
    pub endpoint: Endpoint,
    pub verb_rules: &'a VerbRules,
}

impl<'a> EndpointPolicy<'a> {
    /// Role set that applies to this endpoint's scope
    pub fn roles(&self) -> Option<&'a RoleSet> {
        match self.endpoint.scope() {
            Scope::Collection => self.verb_rules.roles.as_ref(),
            Scope::Count | Scope::Single => self.verb_rules.single_roles.as_ref(),
        }
    }

    /// Declared rules plus the implicit `id` rule of the scope
    pub fn rules(&self) -> RuleSet {
        let declared = self.verb_rules.rules.clone();
        match self.endpoint.scope() {
            Scope::Collection => declared,
            Scope::Count => declared.with_default("id", FieldRule::optional_string()),
            Scope::Single => declared.with("id", FieldRule::required_string()),
        }
    }

    pub fn collection(&self) -> Collection<'a> {
        Collection {
            name: &self.resource.name,
            schema: self.schema,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Resource '{0}' has no schema")]
    MissingSchema(String),

    #[error("Resource '{resource}' declares no rules for {verb:?}")]
    VerbNotDeclared { resource: String, verb: Verb },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read resource file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid resource file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    #[error("Resource declared twice: {0}")]
    DuplicateName(String),

    #[error("Natural key '{key}' of resource '{resource}' is not a schema field")]
    InvalidNaturalKey { resource: String, key: String },
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    resources: Vec<ResourceDefinition>,
}

/// Read-only table of declared resources, keyed by lowercase name
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, ResourceDefinition>,
}

impl ResourceRegistry {
    pub fn new(definitions: Vec<ResourceDefinition>) -> Result<Self, RegistryError> {
        let mut resources = HashMap::new();

        for mut definition in definitions {
            let key = definition.name.to_lowercase();
            if !Self::is_valid_name(&key) {
                return Err(RegistryError::InvalidName(definition.name));
            }
            if let Some(schema) = &definition.schema {
                if let Some(natural_key) = &schema.natural_key {
                    if !schema.has_field(natural_key) {
                        return Err(RegistryError::InvalidNaturalKey {
                            resource: definition.name.clone(),
                            key: natural_key.clone(),
                        });
                    }
                }
            }
            definition.name = key.clone();
            if resources.insert(key.clone(), definition).is_some() {
                return Err(RegistryError::DuplicateName(key));
            }
        }

        info!("Registered {} resource(s)", resources.len());
        Ok(Self { resources })
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(source)?;
        Self::new(file.resources)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&ResourceDefinition> {
        self.resources.get(&name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resolve the policy for `endpoint` on resource `name`
    pub fn policy(&self, name: &str, endpoint: Endpoint) -> Result<EndpointPolicy<'_>, LookupError> {
        let resource = self
            .get(name)
            .ok_or_else(|| LookupError::UnknownResource(name.to_string()))?;

        let schema = resource
            .schema
            .as_ref()
            .ok_or_else(|| LookupError::MissingSchema(resource.name.clone()))?;

        let verb = endpoint.verb();
        let verb_rules = resource
            .validation
            .get(&verb)
            .ok_or_else(|| LookupError::VerbNotDeclared {
                resource: resource.name.clone(),
                verb,
            })?;

        Ok(EndpointPolicy {
            resource,
            schema,
            endpoint,
            verb_rules,
        })
    }

    /// Names double as URL segments and table names
    fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_lowercase() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}
