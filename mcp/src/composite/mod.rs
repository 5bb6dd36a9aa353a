//! Composite tools: one exposed tool fanning out to several upstream calls.

pub mod executor;
pub mod template;

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

pub use executor::CompositeExecutor;
pub use template::ArgTemplate;

use crate::{
    core::config::{CompositeToolConfig, InputSpec},
    error::{McpError, McpResult},
    inventory::QualifiedToolName,
};

#[derive(Debug, Clone)]
pub struct CompositeBranch {
    pub name: String,
    pub target: QualifiedToolName,
    pub template: ArgTemplate,
}

#[derive(Debug, Clone)]
pub struct CompositeTool {
    pub name: String,
    pub description: String,
    pub inputs: BTreeMap<String, InputSpec>,
    /// Declaration order; output keys follow it.
    pub branches: Vec<CompositeBranch>,
}

fn type_matches(kind: &str, value: &Value) -> bool {
    match kind {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

impl CompositeTool {
    /// Parse every branch template and check that it only references
    /// declared inputs.
    pub fn from_config(name: &str, config: &CompositeToolConfig) -> McpResult<Self> {
        let mut branches = Vec::with_capacity(config.parallel.len());
        for branch in &config.parallel {
            let target = QualifiedToolName::parse(&branch.tool).ok_or_else(|| {
                McpError::Config(format!(
                    "branch '{}' of '{}' must target 'server.tool'",
                    branch.name, name
                ))
            })?;
            let template = ArgTemplate::parse(&branch.args).map_err(|e| {
                McpError::Config(format!("branch '{}' of '{}': {}", branch.name, name, e))
            })?;
            if let Some(undeclared) = template
                .references()
                .into_iter()
                .find(|r| !config.inputs.contains_key(*r))
            {
                return Err(McpError::Config(format!(
                    "branch '{}' of '{}' references undeclared input '{}'",
                    branch.name, name, undeclared
                )));
            }
            branches.push(CompositeBranch {
                name: branch.name.clone(),
                target,
                template,
            });
        }

        Ok(Self {
            name: name.to_string(),
            description: config.description.clone(),
            inputs: config.inputs.clone(),
            branches,
        })
    }

    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.inputs {
            let mut prop = Map::new();
            prop.insert("type".to_string(), Value::from(spec.kind.clone()));
            if let Some(description) = &spec.description {
                prop.insert("description".to_string(), Value::from(description.clone()));
            }
            if let Some(default) = &spec.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(name.clone(), Value::Object(prop));
            if spec.required && spec.default.is_none() {
                required.push(Value::from(name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        schema
    }

    /// Apply declared defaults and reject missing or mistyped inputs.
    pub fn bind_inputs(&self, mut args: Map<String, Value>) -> McpResult<Map<String, Value>> {
        for (name, spec) in &self.inputs {
            let present = args.get(name).is_some_and(|v| !v.is_null());
            if !present {
                match &spec.default {
                    Some(default) => {
                        args.insert(name.clone(), default.clone());
                    }
                    None if spec.required => {
                        return Err(McpError::InvalidArguments(format!(
                            "missing required input '{}' for '{}'",
                            name, self.name
                        )));
                    }
                    None => {}
                }
                continue;
            }
            if let Some(value) = args.get(name) {
                if !type_matches(&spec.kind, value) {
                    return Err(McpError::InvalidArguments(format!(
                        "input '{}' of '{}' must be of type {}",
                        name, self.name, spec.kind
                    )));
                }
            }
        }
        Ok(args)
    }
}
