//! Upstream server registry.
//!
//! Holds one session per upstream server plus its cached catalog. Sessions that
//! cannot multiplex requests are serialized through a per-server queue; calls to
//! other servers never wait on it. A crashed session is restarted within the
//! configured budget before the server is marked degraded.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use parking_lot::RwLock;
use rmcp::model::CallToolResult;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::{
    config::{ProxyConfig, Tool, UpstreamServerConfig},
    metrics::ProxyMetrics,
    reconnect::RestartPolicy,
    transport::{RmcpConnector, UpstreamClient, UpstreamConnector},
};
use crate::{
    error::{McpError, McpResult},
    inventory::{IndexCounts, ToolInventory},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ServerStatus {
    /// Registered but not connected yet (lazy, or startup connect failed).
    Pending,
    Connected,
    Degraded(String),
}

struct ServerSlot {
    config: UpstreamServerConfig,
    client: RwLock<Option<Arc<dyn UpstreamClient>>>,
    status: RwLock<ServerStatus>,
    /// Serializes calls when the session cannot multiplex.
    queue: tokio::sync::Mutex<()>,
    /// Single connect or restart at a time.
    connect_lock: tokio::sync::Mutex<()>,
    /// Crashes since the last successful call.
    crashes: AtomicU32,
}

impl ServerSlot {
    fn new(config: UpstreamServerConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
            status: RwLock::new(ServerStatus::Pending),
            queue: tokio::sync::Mutex::new(()),
            connect_lock: tokio::sync::Mutex::new(()),
            crashes: AtomicU32::new(0),
        }
    }

    fn current_client(&self) -> Option<Arc<dyn UpstreamClient>> {
        self.client.read().clone()
    }
}

pub struct UpstreamRegistry {
    servers: DashMap<String, Arc<ServerSlot>>,
    inventory: ToolInventory,
    connector: Arc<dyn UpstreamConnector>,
    restart: RestartPolicy,
    call_timeout: Duration,
    metrics: Arc<ProxyMetrics>,
}

impl UpstreamRegistry {
    pub fn new(
        connector: Arc<dyn UpstreamConnector>,
        restart: RestartPolicy,
        call_timeout: Duration,
        metrics: Arc<ProxyMetrics>,
    ) -> Self {
        Self {
            servers: DashMap::new(),
            inventory: ToolInventory::new(),
            connector,
            restart,
            call_timeout,
            metrics,
        }
    }

    /// Registry using rmcp transports with settings from `config`.
    pub fn from_config(config: &ProxyConfig, metrics: Arc<ProxyMetrics>) -> Self {
        Self::new(
            Arc::new(RmcpConnector),
            RestartPolicy::from_config(&config.restart),
            Duration::from_secs(config.dispatch.call_timeout_secs),
            metrics,
        )
    }

    /// Register a server and connect unless it is lazy.
    ///
    /// A failed connect is fatal only for required servers; others stay
    /// pending and are retried on first use.
    pub async fn register(&self, name: &str, config: UpstreamServerConfig) -> McpResult<()> {
        let lazy = config.lazy;
        let required = config.required;
        let slot = Arc::new(ServerSlot::new(config));
        self.servers.insert(name.to_string(), slot.clone());

        if lazy {
            debug!(server = %name, "Deferring connection for lazy server");
            return Ok(());
        }

        match self.ensure_client(name, &slot).await {
            Ok(_) => Ok(()),
            Err(e) if required => {
                error!(server = %name, error = %e, "Required server failed to connect");
                Err(e)
            }
            Err(e) => {
                warn!(server = %name, error = %e, "Server unavailable at startup, will retry on use");
                Ok(())
            }
        }
    }

    /// Register every configured server concurrently.
    pub async fn register_all(&self, config: &ProxyConfig) -> McpResult<()> {
        let results = futures::future::join_all(
            config
                .mcp_servers
                .iter()
                .map(|(name, server)| self.register(name, server.clone())),
        )
        .await;
        results.into_iter().collect::<McpResult<Vec<()>>>()?;
        Ok(())
    }

    fn slot(&self, name: &str) -> McpResult<Arc<ServerSlot>> {
        self.servers
            .get(name)
            .map(|s| s.value().clone())
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))
    }

    pub fn server_config(&self, name: &str) -> Option<UpstreamServerConfig> {
        self.servers.get(name).map(|s| s.config.clone())
    }

    /// Registered server ids, sorted.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn server_status(&self, name: &str) -> Option<ServerStatus> {
        self.servers.get(name).map(|s| s.status.read().clone())
    }

    /// How many servers have a fetched catalog, and their tools in total.
    pub fn catalog_counts(&self) -> IndexCounts {
        self.inventory.counts()
    }

    pub fn statuses(&self) -> Vec<(String, ServerStatus)> {
        self.server_names()
            .into_iter()
            .filter_map(|name| self.server_status(&name).map(|status| (name, status)))
            .collect()
    }

    async fn ensure_client(
        &self,
        name: &str,
        slot: &ServerSlot,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        if let ServerStatus::Degraded(_) = &*slot.status.read() {
            return Err(McpError::ServerDegraded(name.to_string()));
        }
        if let Some(client) = slot.current_client() {
            return Ok(client);
        }

        let _connecting = slot.connect_lock.lock().await;
        if let Some(client) = slot.current_client() {
            return Ok(client);
        }

        match self.connector.connect(name, &slot.config).await {
            Ok(client) => {
                *slot.client.write() = Some(client.clone());
                *slot.status.write() = ServerStatus::Connected;
                Ok(client)
            }
            Err(e) => {
                self.metrics.record_connection_error();
                Err(e)
            }
        }
    }

    /// Replace a crashed session, unless another caller already did.
    async fn restart_session(
        &self,
        name: &str,
        slot: &ServerSlot,
        crashed: &Arc<dyn UpstreamClient>,
    ) -> McpResult<()> {
        let _connecting = slot.connect_lock.lock().await;

        if let Some(current) = slot.current_client() {
            if !Arc::ptr_eq(&current, crashed) {
                return Ok(());
            }
        }
        crashed.shutdown().await;
        *slot.client.write() = None;

        let crashes = slot.crashes.fetch_add(1, Ordering::SeqCst) + 1;
        if crashes > self.restart.max_restarts {
            let reason = format!("crashed {} times without a successful call", crashes);
            error!(server = %name, %reason, "Marking server degraded");
            *slot.status.write() = ServerStatus::Degraded(reason);
            return Err(McpError::ServerDegraded(name.to_string()));
        }

        warn!(server = %name, crashes, "Upstream session lost, restarting");
        let connector = self.connector.clone();
        let config = slot.config.clone();
        match self
            .restart
            .restart(name, || connector.connect(name, &config))
            .await
        {
            Ok(client) => {
                self.metrics.record_restart();
                *slot.client.write() = Some(client);
                *slot.status.write() = ServerStatus::Connected;
                Ok(())
            }
            Err(e) => {
                *slot.status.write() = ServerStatus::Degraded(e.to_string());
                Err(e)
            }
        }
    }

    /// Catalog of a server, fetched on first use and cached until refreshed.
    pub async fn list_tools(&self, name: &str) -> McpResult<Vec<Tool>> {
        if let Some(tools) = self.inventory.server_tools(name) {
            return Ok(tools);
        }

        let slot = self.slot(name)?;
        let client = self.ensure_client(name, &slot).await?;
        let tools = {
            let _queued = if client.multiplexed() {
                None
            } else {
                Some(slot.queue.lock().await)
            };
            tokio::time::timeout(self.call_timeout, client.list_tools())
                .await
                .map_err(|_| McpError::Timeout(self.call_timeout.as_millis() as u64))??
        };

        info!(server = %name, tools = tools.len(), "Fetched upstream catalog");
        self.inventory.replace_server_tools(name, tools.clone());
        Ok(tools)
    }

    /// Invalidate cached catalogs; `None` invalidates every server.
    pub fn invalidate_tools(&self, name: Option<&str>) {
        match name {
            Some(server) => self.inventory.clear_server_tools(server),
            None => self.inventory.clear_all(),
        }
    }

    /// Invalidate and refetch one server's catalog.
    pub async fn refresh_tools(&self, name: &str) -> McpResult<Vec<Tool>> {
        self.invalidate_tools(Some(name));
        self.list_tools(name).await
    }

    /// Catalogs of every registered server. Unreachable servers contribute
    /// nothing and are logged.
    pub async fn catalogs(&self) -> Vec<(String, Vec<Tool>)> {
        let names = self.server_names();
        let fetched =
            futures::future::join_all(names.iter().map(|name| self.list_tools(name))).await;

        names
            .into_iter()
            .zip(fetched)
            .filter_map(|(name, result)| match result {
                Ok(tools) => Some((name, tools)),
                Err(e) => {
                    warn!(server = %name, error = %e, "Skipping catalog of unavailable server");
                    None
                }
            })
            .collect()
    }

    pub async fn call_tool(
        &self,
        name: &str,
        tool: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        let slot = self.slot(name)?;
        let client = self.ensure_client(name, &slot).await?;

        let result = {
            let _queued = if client.multiplexed() {
                None
            } else {
                Some(slot.queue.lock().await)
            };
            match tokio::time::timeout(self.call_timeout, client.call_tool(tool, arguments)).await
            {
                Ok(result) => result,
                Err(_) => Err(McpError::Timeout(self.call_timeout.as_millis() as u64)),
            }
        };

        match result {
            Ok(output) => {
                slot.crashes.store(0, Ordering::SeqCst);
                Ok(output)
            }
            Err(e) if e.is_connection_loss() => {
                self.metrics.record_connection_error();
                if slot.config.transport.is_subprocess() {
                    // The call is not retried: it may have run before the crash.
                    if let Err(restart_err) = self.restart_session(name, &slot, &client).await {
                        return Err(restart_err);
                    }
                }
                Err(McpError::ConnectionFailed(format!("{}: {}", name, e)))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn shutdown(&self) {
        for entry in self.servers.iter() {
            let client = entry.value().client.write().take();
            if let Some(client) = client {
                client.shutdown().await;
                info!(server = %entry.key(), "Upstream session closed");
            }
        }
        self.inventory.clear_all();
    }
}
