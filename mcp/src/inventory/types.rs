//! Core types for the tool inventory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::config::{split_tool_ref, Tool};

/// Unique tool identifier: `server_key.tool_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedToolName {
    pub server_key: String,
    pub tool_name: String,
}

impl QualifiedToolName {
    pub fn new(server_key: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
            tool_name: tool_name.into(),
        }
    }

    /// Parse from "server.tool" format.
    pub fn parse(s: &str) -> Option<Self> {
        let (server, tool) = split_tool_ref(s)?;
        Some(Self::new(server, tool))
    }
}

impl fmt::Display for QualifiedToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.server_key, self.tool_name)
    }
}

/// An upstream tool as last listed by its server.
#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub qualified_name: QualifiedToolName,
    pub tool: Tool,
}

impl ToolEntry {
    pub fn from_server_tool(server_key: impl Into<String>, tool: Tool) -> Self {
        let name = tool.name.to_string();
        Self {
            qualified_name: QualifiedToolName::new(server_key, name),
            tool,
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.qualified_name.tool_name
    }
}

#[cfg(test)]
mod tests {
    use std::{borrow::Cow, sync::Arc};

    use super::*;

    fn create_test_tool(name: &str) -> Tool {
        Tool {
            name: Cow::Owned(name.to_string()),
            title: None,
            description: Some(Cow::Owned(format!("Test tool: {}", name))),
            input_schema: Arc::new(serde_json::Map::new()),
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }

    #[test]
    fn test_qualified_tool_name() {
        let name = QualifiedToolName::new("server", "tool");
        assert_eq!(name.server_key, "server");
        assert_eq!(name.tool_name, "tool");
        assert_eq!(format!("{}", name), "server.tool");
    }

    #[test]
    fn test_qualified_tool_name_parse() {
        let parsed = QualifiedToolName::parse("github.search_code").unwrap();
        assert_eq!(parsed.server_key, "github");
        assert_eq!(parsed.tool_name, "search_code");

        assert!(QualifiedToolName::parse("no_dot").is_none());
    }

    #[test]
    fn test_tool_entry_creation() {
        let entry = ToolEntry::from_server_tool("fs", create_test_tool("read_file"));
        assert_eq!(entry.qualified_name.to_string(), "fs.read_file");
        assert_eq!(entry.tool_name(), "read_file");
    }
}
