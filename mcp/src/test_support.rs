//! Mock upstreams shared by unit tests.

use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rmcp::model::{CallToolResult, Content};
use serde_json::{json, Map, Value};

use crate::{
    core::{
        config::{McpTransport, Tool, UpstreamServerConfig},
        transport::{UpstreamClient, UpstreamConnector},
    },
    error::{McpError, McpResult},
};

pub(crate) fn test_tool(name: &str, description: &str) -> Tool {
    test_tool_with_schema(
        name,
        description,
        json!({"type": "object", "properties": {}}),
    )
}

pub(crate) fn test_tool_with_schema(name: &str, description: &str, schema: Value) -> Tool {
    let schema_map = match schema {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    Tool {
        name: Cow::Owned(name.to_string()),
        title: None,
        description: Some(Cow::Owned(description.to_string())),
        input_schema: Arc::new(schema_map),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

pub(crate) fn stdio_server() -> UpstreamServerConfig {
    UpstreamServerConfig {
        transport: McpTransport::Stdio {
            command: "mock-server".to_string(),
            args: Vec::new(),
            envs: HashMap::new(),
        },
        tools: Default::default(),
        cache_outputs: false,
        lazy: false,
        required: false,
    }
}

#[derive(Clone)]
enum Behavior {
    Text(String),
    Structured(Value),
    Fail(String),
    ToolError(String),
}

/// Scriptable upstream that records every call.
pub(crate) struct MockUpstream {
    tools: Vec<Tool>,
    behaviors: DashMap<String, Behavior>,
    delays: DashMap<String, Duration>,
    calls: Mutex<Vec<(String, Option<Map<String, Value>>)>>,
    lists: AtomicUsize,
    crashes_left: AtomicUsize,
    multiplexed: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockUpstream {
    pub(crate) fn new(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            behaviors: DashMap::new(),
            delays: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            lists: AtomicUsize::new(0),
            crashes_left: AtomicUsize::new(0),
            multiplexed: true,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn single_flight(mut self) -> Self {
        self.multiplexed = false;
        self
    }

    pub(crate) fn respond_text(&self, tool: &str, text: impl Into<String>) {
        self.behaviors
            .insert(tool.to_string(), Behavior::Text(text.into()));
    }

    pub(crate) fn respond_structured(&self, tool: &str, value: Value) {
        self.behaviors
            .insert(tool.to_string(), Behavior::Structured(value));
    }

    pub(crate) fn fail(&self, tool: &str, message: impl Into<String>) {
        self.behaviors
            .insert(tool.to_string(), Behavior::Fail(message.into()));
    }

    pub(crate) fn tool_error(&self, tool: &str, message: impl Into<String>) {
        self.behaviors
            .insert(tool.to_string(), Behavior::ToolError(message.into()));
    }

    pub(crate) fn delay(&self, tool: &str, delay: Duration) {
        self.delays.insert(tool.to_string(), delay);
    }

    pub(crate) fn crash_next(&self, count: usize) {
        self.crashes_left.store(count, Ordering::SeqCst);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn calls_to(&self, tool: &str) -> Vec<Option<Map<String, Value>>> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        self.calls.lock().push((name.to_string(), arguments.clone()));

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let _done = scopeguard::guard(&self.in_flight, |counter| {
            counter.fetch_sub(1, Ordering::SeqCst);
        });

        let delay = self.delays.get(name).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let crashed = self
            .crashes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if crashed {
            return Err(McpError::Transport("process exited".to_string()));
        }

        let behavior = self.behaviors.get(name).map(|b| b.clone());
        match behavior {
            Some(Behavior::Text(text)) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Some(Behavior::Structured(value)) => Ok(CallToolResult::structured(value)),
            Some(Behavior::Fail(message)) => Err(McpError::upstream(message)),
            Some(Behavior::ToolError(message)) => {
                Ok(CallToolResult::error(vec![Content::text(message)]))
            }
            None => {
                let echo = json!({"tool": name, "args": arguments.unwrap_or_default()});
                Ok(CallToolResult::success(vec![Content::text(
                    echo.to_string(),
                )]))
            }
        }
    }

    fn multiplexed(&self) -> bool {
        self.multiplexed
    }

    async fn shutdown(&self) {}
}

/// Hands out registered mocks by server name.
pub(crate) struct MockConnector {
    upstreams: DashMap<String, Arc<MockUpstream>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self {
            upstreams: DashMap::new(),
            connects: AtomicUsize::new(0),
        }
    }

    pub(crate) fn add(&self, server: &str, upstream: MockUpstream) -> Arc<MockUpstream> {
        let upstream = Arc::new(upstream);
        self.upstreams.insert(server.to_string(), upstream.clone());
        upstream
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamConnector for MockConnector {
    async fn connect(
        &self,
        server: &str,
        _config: &UpstreamServerConfig,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let upstream = self
            .upstreams
            .get(server)
            .map(|u| u.value().clone())
            .ok_or_else(|| McpError::ConnectionFailed(format!("no mock for {}", server)))?;
        Ok(upstream)
    }
}
