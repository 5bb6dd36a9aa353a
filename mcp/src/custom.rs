//! In-process tools bound to views by handler key.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{
    dispatch::ToolCallContext,
    error::{McpError, McpResult},
};

/// A tool implemented inside the proxy.
///
/// Custom tools go through the same hook pipeline, cache decision and
/// metrics as upstream tools. Through [`ToolCallContext::call_tool`] they can
/// call other tools of the same view one level deeper.
#[async_trait]
pub trait CustomTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Map<String, Value> {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), json!({}));
        schema
    }

    async fn call(&self, args: Map<String, Value>, ctx: &ToolCallContext) -> McpResult<Value>;
}

#[derive(Clone, Default)]
pub struct CustomToolRegistry {
    handlers: HashMap<String, Arc<dyn CustomTool>>,
}

impl fmt::Debug for CustomToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("CustomToolRegistry")
            .field("handlers", &keys)
            .finish()
    }
}

impl CustomToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, tool: Arc<dyn CustomTool>) {
        self.handlers.insert(key.into(), tool);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn CustomTool>> {
        self.handlers.get(key).cloned()
    }

    pub fn resolve(&self, view: &str, key: &str) -> McpResult<Arc<dyn CustomTool>> {
        self.get(key).ok_or_else(|| {
            McpError::Config(format!(
                "view '{}' binds unknown custom tool handler '{}'",
                view, key
            ))
        })
    }
}
