//! Per-parameter transforms: hide, rename, default and describe.
//!
//! The exposed schema is derived from the upstream schema once at resolve
//! time. Incoming arguments are mapped back to upstream names on every call.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value};

use crate::{
    core::config::ParameterConfig,
    error::{McpError, McpResult},
};

#[derive(Debug, Clone, Default)]
pub struct ParamTransforms {
    rules: BTreeMap<String, ParameterConfig>,
    /// exposed name -> upstream name, for renamed visible parameters
    renamed: HashMap<String, String>,
}

impl ParamTransforms {
    /// Build transforms for one tool, rejecting renames that collide with
    /// another exposed parameter.
    pub fn new(
        tool: &str,
        rules: &BTreeMap<String, ParameterConfig>,
        upstream_schema: &Map<String, Value>,
    ) -> McpResult<Self> {
        let mut renamed = HashMap::new();
        for (param, rule) in rules {
            if rule.hidden {
                continue;
            }
            if let Some(new_name) = &rule.rename {
                renamed.insert(new_name.clone(), param.clone());
            }
        }

        let transforms = Self {
            rules: rules.clone(),
            renamed,
        };

        let mut seen = HashSet::new();
        for name in transforms.exposed_names(upstream_schema) {
            if !seen.insert(name.clone()) {
                return Err(McpError::Config(format!(
                    "tool '{}' exposes parameter '{}' more than once",
                    tool, name
                )));
            }
        }

        Ok(transforms)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn exposed_names(&self, schema: &Map<String, Value>) -> Vec<String> {
        let mut names: Vec<String> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .keys()
                    .filter(|k| !self.rules.contains_key(*k))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for (param, rule) in &self.rules {
            if rule.hidden {
                continue;
            }
            names.push(rule.rename.clone().unwrap_or_else(|| param.clone()));
        }
        names
    }

    /// Exposed schema: hidden parameters removed, renames applied, and
    /// defaulted parameters made optional.
    pub fn transform_schema(&self, schema: &Map<String, Value>) -> Map<String, Value> {
        if self.rules.is_empty() {
            return schema.clone();
        }

        let mut out = schema.clone();
        let mut properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut required: Vec<String> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| {
                r.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        // Hidden first, so a rename may take over a hidden parameter's name.
        for (param, _) in self.rules.iter().filter(|(_, r)| r.hidden) {
            properties.remove(param);
            required.retain(|r| r != param);
        }

        for (param, rule) in self.rules.iter().filter(|(_, r)| !r.hidden) {
            let was_required = required.iter().any(|r| r == param);

            let mut prop = properties
                .remove(param)
                .unwrap_or_else(|| Value::Object(Map::new()));
            if let Value::Object(obj) = &mut prop {
                if let Some(description) = &rule.description {
                    obj.insert("description".to_string(), Value::from(description.clone()));
                }
                if let Some(default) = &rule.default {
                    obj.insert("default".to_string(), default.clone());
                }
            }

            let exposed = rule.rename.clone().unwrap_or_else(|| param.clone());
            required.retain(|r| r != param);
            if was_required && rule.default.is_none() {
                required.push(exposed.clone());
            }
            properties.insert(exposed, prop);
        }

        out.insert("properties".to_string(), Value::Object(properties));
        if required.is_empty() {
            out.remove("required");
        } else {
            out.insert(
                "required".to_string(),
                Value::Array(required.into_iter().map(Value::from).collect()),
            );
        }
        out
    }

    /// Map caller arguments to upstream names and inject defaults.
    ///
    /// Hidden parameters always receive their configured default; a caller
    /// value for a hidden parameter is dropped.
    pub fn transform_args(&self, args: Map<String, Value>) -> Map<String, Value> {
        if self.rules.is_empty() {
            return args;
        }

        let mut out = Map::new();
        let mut mapped = Vec::new();
        for (key, value) in args {
            if let Some(upstream) = self.renamed.get(&key) {
                mapped.push((upstream.clone(), value));
            } else if self.rules.get(&key).is_some_and(|r| r.hidden) {
                continue;
            } else {
                out.insert(key, value);
            }
        }
        for (key, value) in mapped {
            out.insert(key, value);
        }

        for (param, rule) in &self.rules {
            let Some(default) = &rule.default else {
                continue;
            };
            if rule.hidden || !out.contains_key(param) {
                out.insert(param.clone(), default.clone());
            }
        }
        out
    }
}
