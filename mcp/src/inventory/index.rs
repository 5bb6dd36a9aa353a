//! Per-server catalog index.
//!
//! Thread-safe store of the tools each upstream server advertised on its last
//! listing. Lookups by qualified name never take a lock across servers.

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use super::types::{QualifiedToolName, ToolEntry};
use crate::core::config::Tool;

pub struct ToolInventory {
    tools_by_qualified: DashMap<QualifiedToolName, ToolEntry>,
    /// Tool names per server, in listing order. Presence marks a fetched catalog.
    tools_by_server: DashMap<String, Vec<String>>,
}

/// Entry counts for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexCounts {
    pub servers: usize,
    pub tools: usize,
}

impl ToolInventory {
    pub fn new() -> Self {
        Self {
            tools_by_qualified: DashMap::new(),
            tools_by_server: DashMap::new(),
        }
    }
}

impl Default for ToolInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolInventory {
    /// Replace a server's catalog with a fresh listing.
    pub fn replace_server_tools(&self, server_key: &str, tools: Vec<Tool>) {
        self.clear_server_tools(server_key);

        let mut names = Vec::with_capacity(tools.len());
        for tool in tools {
            let entry = ToolEntry::from_server_tool(server_key, tool);
            names.push(entry.tool_name().to_string());
            self.tools_by_qualified
                .insert(entry.qualified_name.clone(), entry);
        }
        debug!(server = %server_key, tools = names.len(), "Catalog stored");
        self.tools_by_server.insert(server_key.to_string(), names);
    }

    /// Tools of a server in listing order, or `None` when never fetched.
    pub fn server_tools(&self, server_key: &str) -> Option<Vec<Tool>> {
        let names = self.tools_by_server.get(server_key)?;
        Some(
            names
                .iter()
                .filter_map(|name| {
                    let qualified = QualifiedToolName::new(server_key, name.as_str());
                    self.tools_by_qualified.get(&qualified).map(|e| e.tool.clone())
                })
                .collect(),
        )
    }

    /// Drop a server's catalog so the next listing refetches it.
    pub fn clear_server_tools(&self, server_key: &str) {
        if let Some((_, names)) = self.tools_by_server.remove(server_key) {
            for name in names {
                self.tools_by_qualified
                    .remove(&QualifiedToolName::new(server_key, name));
            }
        }
    }

    pub fn clear_all(&self) {
        self.tools_by_qualified.clear();
        self.tools_by_server.clear();
    }

    pub fn counts(&self) -> IndexCounts {
        IndexCounts {
            servers: self.tools_by_server.len(),
            tools: self.tools_by_qualified.len(),
        }
    }
}
