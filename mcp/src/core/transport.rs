//! Upstream transport clients.
//!
//! [`UpstreamClient`] is the seam between the registry and the wire. The rmcp
//! implementation covers subprocess (stdio), SSE and streamable HTTP servers.

use std::{borrow::Cow, collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult},
    service::{RunningService, ServiceError},
    RoleClient,
};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::{McpTransport, Tool, UpstreamServerConfig};
use crate::error::{McpError, McpResult};

/// A live session with one upstream server.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn list_tools(&self) -> McpResult<Vec<Tool>>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult>;

    /// Whether concurrent in-flight requests are safe on this session.
    fn multiplexed(&self) -> bool {
        true
    }

    async fn shutdown(&self);
}

/// Opens sessions for configured servers.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(
        &self,
        server: &str,
        config: &UpstreamServerConfig,
    ) -> McpResult<Arc<dyn UpstreamClient>>;
}

/// Build request headers from token and custom headers.
fn build_request_headers(
    token: &Option<String>,
    custom_headers: &HashMap<String, String>,
) -> McpResult<reqwest::header::HeaderMap> {
    let mut headers = reqwest::header::HeaderMap::new();

    if let Some(tok) = token {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", tok)
                .parse()
                .map_err(|e| McpError::Transport(format!("auth token: {}", e)))?,
        );
    }

    for (key, value) in custom_headers {
        headers.insert(
            reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| McpError::Transport(format!("header name: {}", e)))?,
            value
                .parse()
                .map_err(|e| McpError::Transport(format!("header value: {}", e)))?,
        );
    }

    Ok(headers)
}

fn build_http_client(
    token: &Option<String>,
    custom_headers: &HashMap<String, String>,
) -> McpResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));

    let req_headers = build_request_headers(token, custom_headers)?;
    if !req_headers.is_empty() {
        builder = builder.default_headers(req_headers);
    }

    builder
        .build()
        .map_err(|e| McpError::Transport(format!("build HTTP client: {}", e)))
}

fn map_service_error(err: ServiceError) -> McpError {
    match err {
        ServiceError::McpError(data) => McpError::Upstream {
            code: i64::from(data.code.0),
            message: data.message.to_string(),
        },
        other => McpError::Transport(other.to_string()),
    }
}

/// Connector backed by rmcp client transports.
#[derive(Debug, Default, Clone)]
pub struct RmcpConnector;

#[async_trait]
impl UpstreamConnector for RmcpConnector {
    async fn connect(
        &self,
        server: &str,
        config: &UpstreamServerConfig,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        use rmcp::{
            transport::{
                sse_client::SseClientConfig,
                streamable_http_client::StreamableHttpClientTransportConfig, ConfigureCommandExt,
                SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
            },
            ServiceExt,
        };

        let cancel = CancellationToken::new();

        let client = match &config.transport {
            McpTransport::Stdio {
                command,
                args,
                envs,
            } => {
                let transport = TokioChildProcess::new(
                    tokio::process::Command::new(command).configure(|cmd| {
                        cmd.args(args)
                            .envs(envs.iter())
                            .stderr(std::process::Stdio::inherit());
                    }),
                )
                .map_err(|e| McpError::Transport(format!("create stdio transport: {}", e)))?;

                ().serve_with_ct(transport, cancel.clone())
                    .await
                    .map_err(|e| {
                        McpError::ConnectionFailed(format!("initialize stdio client: {}", e))
                    })?
            }

            McpTransport::Sse {
                url,
                token,
                headers,
            } => {
                let http_client = build_http_client(token, headers)?;
                let sse_config = SseClientConfig {
                    sse_endpoint: url.clone().into(),
                    ..Default::default()
                };

                let transport = SseClientTransport::start_with_client(http_client, sse_config)
                    .await
                    .map_err(|e| McpError::Transport(format!("create SSE transport: {}", e)))?;

                ().serve_with_ct(transport, cancel.clone())
                    .await
                    .map_err(|e| {
                        McpError::ConnectionFailed(format!("initialize SSE client: {}", e))
                    })?
            }

            McpTransport::Streamable {
                url,
                token,
                headers,
            } => {
                let http_client = build_http_client(token, headers)?;
                let cfg = StreamableHttpClientTransportConfig::with_uri(url.as_str());
                let transport = StreamableHttpClientTransport::with_client(http_client, cfg);

                ().serve_with_ct(transport, cancel.clone())
                    .await
                    .map_err(|e| {
                        McpError::ConnectionFailed(format!("initialize streamable client: {}", e))
                    })?
            }
        };

        info!(server = %server, transport = ?config.transport, "Connected to upstream");

        Ok(Arc::new(RmcpUpstream {
            client,
            cancel,
            multiplexed: !config.transport.is_subprocess(),
        }))
    }
}

/// An rmcp client session.
pub struct RmcpUpstream {
    client: RunningService<RoleClient, ()>,
    cancel: CancellationToken,
    multiplexed: bool,
}

#[async_trait]
impl UpstreamClient for RmcpUpstream {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.client
            .peer()
            .list_all_tools()
            .await
            .map_err(map_service_error)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments,
        };
        self.client
            .call_tool(request)
            .await
            .map_err(map_service_error)
    }

    fn multiplexed(&self) -> bool {
        self.multiplexed
    }

    async fn shutdown(&self) {
        debug!("Cancelling upstream session");
        self.cancel.cancel();
    }
}
