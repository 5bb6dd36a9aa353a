//! One MCP server per view, served over streamable HTTP.

use std::future::Future;

use mcp_views::{Dispatcher, McpError};
use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    },
    ErrorData, RoleServer, ServerHandler,
};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ViewMcpServer {
    dispatcher: Dispatcher,
    view: String,
}

impl ViewMcpServer {
    pub fn new(dispatcher: Dispatcher, view: impl Into<String>) -> Self {
        Self {
            dispatcher,
            view: view.into(),
        }
    }

    pub fn view_name(&self) -> &str {
        &self.view
    }

    /// Streamable HTTP service that creates a handler per session.
    pub fn into_service(self) -> StreamableHttpService<ViewMcpServer, LocalSessionManager> {
        StreamableHttpService::new(
            move || Ok(self.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig::default(),
        )
    }

    /// Names and schemas of the view's exposed tools.
    pub fn list(&self) -> Result<ListToolsResult, ErrorData> {
        let view = self
            .dispatcher
            .view(&self.view)
            .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        Ok(ListToolsResult::with_all_items(
            view.tools().iter().map(|tool| tool.to_tool()).collect(),
        ))
    }

    /// Dispatch one call. Failures come back as error results so the
    /// calling agent can read the message.
    pub async fn call(&self, request: CallToolRequestParam) -> CallToolResult {
        let args = request.arguments.unwrap_or_default();
        match self.dispatcher.dispatch(&self.view, &request.name, args).await {
            Ok(value) => into_call_result(value),
            Err(e) => {
                debug!(view = %self.view, tool = %request.name, error = %e, "Tool call failed");
                error_result(&e)
            }
        }
    }
}

fn error_result(err: &McpError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(err.to_string())])
}

/// Upstream results keep their shape; anything else is sent as text.
pub fn into_call_result(value: Value) -> CallToolResult {
    match value {
        Value::String(text) => CallToolResult::success(vec![Content::text(text)]),
        Value::Object(ref map) if map.contains_key("content") => {
            match serde_json::from_value::<CallToolResult>(value.clone()) {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Result carried content but did not parse as a tool result");
                    CallToolResult::success(vec![Content::text(value.to_string())])
                }
            }
        }
        other => CallToolResult::success(vec![Content::text(other.to_string())]),
    }
}

impl ServerHandler for ViewMcpServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = self
            .dispatcher
            .view(&self.view)
            .ok()
            .and_then(|view| view.description.clone());
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: format!("mcp-view-proxy/{}", self.view),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions,
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        async { self.list() }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move { Ok(self.call(request).await) }
    }
}
