//! Per-call routing through a resolved view.
//!
//! Every call walks the same states:
//!
//! ```text
//! RESOLVING -> PRE_HOOK -> EXECUTING -> CACHE_DECISION -> POST_HOOK -> DONE
//!                 |            |                              |
//!              ABORTED       FAILED (still seen by post hooks) ABORTED
//! ```
//!
//! Nested calls from custom tools and from `*_call_tool` meta-tools re-enter
//! at `depth + 1`. The depth travels in [`ToolCallContext`], so concurrent
//! calls never share a counter.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{future::BoxFuture, FutureExt};
use rmcp::model::CallToolResult;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::{
    cache::OutputCache,
    composite::{CompositeBranch, CompositeExecutor},
    core::{
        config::{ProxyConfig, DEFAULT_VIEW},
        metrics::{CallOutcome, ProxyMetrics},
        registry::UpstreamRegistry,
    },
    custom::CustomToolRegistry,
    error::{McpError, McpResult},
    hooks::HookRegistry,
    view::{
        rank,
        resolver::{resolve_default_view, resolve_view, ResolveContext},
        DirectTool, MetaAction, MetaTool, ResolvedTool, ResolvedView, ToolKind,
        DEFAULT_SEARCH_LIMIT,
    },
};

/// Ambient data for one call, handed to hooks and custom tools.
#[derive(Clone)]
pub struct ToolCallContext {
    pub view_name: String,
    pub tool_name: String,
    pub upstream_server: Option<String>,
    pub depth: usize,
    pub started_at: Instant,
    dispatcher: Option<Dispatcher>,
}

impl std::fmt::Debug for ToolCallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallContext")
            .field("view_name", &self.view_name)
            .field("tool_name", &self.tool_name)
            .field("upstream_server", &self.upstream_server)
            .field("depth", &self.depth)
            .finish()
    }
}

impl ToolCallContext {
    /// A context not bound to any dispatcher; nested calls fail.
    pub fn detached(view_name: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            view_name: view_name.into(),
            tool_name: tool_name.into(),
            upstream_server: None,
            depth: 0,
            started_at: Instant::now(),
            dispatcher: None,
        }
    }

    /// Call another tool of the same view, one level deeper.
    pub async fn call_tool(&self, name: &str, args: Map<String, Value>) -> McpResult<Value> {
        let dispatcher = self.dispatcher.as_ref().ok_or_else(|| {
            McpError::Config(format!(
                "'{}' cannot call '{}': no dispatcher bound",
                self.tool_name, name
            ))
        })?;
        dispatcher
            .dispatch_at_depth(&self.view_name, name, args, self.depth + 1)
            .await
    }

    /// Exposed tool names of the current view.
    pub fn available_tools(&self) -> Vec<String> {
        self.dispatcher
            .as_ref()
            .and_then(|d| d.view(&self.view_name).ok())
            .map(|view| view.tool_names().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

struct DispatcherInner {
    registry: Arc<UpstreamRegistry>,
    views: BTreeMap<String, Arc<ResolvedView>>,
    server_cache_flags: HashMap<String, bool>,
    cache: Arc<OutputCache>,
    executor: CompositeExecutor,
    metrics: Arc<ProxyMetrics>,
    max_depth: usize,
}

/// Routes `(view, tool, args)` to upstreams, composites, custom tools and
/// meta-tools. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

/// Upstream result as JSON (`content`, `structuredContent`, `isError`).
fn result_to_value(result: &CallToolResult) -> McpResult<Value> {
    Ok(serde_json::to_value(result)?)
}

fn is_error_result(value: &Value) -> bool {
    value.get("isError").and_then(Value::as_bool).unwrap_or(false)
}

/// Concatenated text when every content item is text.
pub fn text_content(value: &Value) -> Option<String> {
    let items = value.get("content")?.as_array()?;
    if items.is_empty() {
        return None;
    }
    let mut text = String::new();
    for item in items {
        if item.get("type").and_then(Value::as_str) != Some("text") {
            return None;
        }
        text.push_str(item.get("text").and_then(Value::as_str)?);
    }
    Some(text)
}

fn upstream_failure(value: &Value) -> McpError {
    let message = text_content(value).unwrap_or_else(|| value.to_string());
    McpError::upstream(message)
}

/// What a composite branch contributes: structured content, else text parsed
/// as JSON, else the text itself.
fn branch_payload(value: Value) -> Value {
    if let Some(structured) = value.get("structuredContent").filter(|v| !v.is_null()) {
        return structured.clone();
    }
    match text_content(&value) {
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        None => value,
    }
}

fn outcome_of(result: &McpResult<Value>) -> CallOutcome {
    match result {
        Ok(_) => CallOutcome::Success,
        Err(McpError::AbortedByHook { .. }) => CallOutcome::Aborted,
        Err(_) => CallOutcome::Failure,
    }
}

/// Bytes stored for a cached result. A result made of exactly one text item
/// is stored as that text; anything richer is stored as compact JSON of the
/// whole result so nothing is lost on retrieval.
fn cache_payload(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => single_text(other).unwrap_or_else(|| other.to_string()),
    }
}

/// Text of a result carrying one text item and no structured content.
fn single_text(value: &Value) -> Option<String> {
    let has_structured = value
        .get("structuredContent")
        .is_some_and(|structured| !structured.is_null());
    if has_structured {
        return None;
    }
    match value.get("content")?.as_array()?.as_slice() {
        [item] if item.get("type").and_then(Value::as_str) == Some("text") => {
            item.get("text").and_then(Value::as_str).map(str::to_string)
        }
        _ => None,
    }
}

impl Dispatcher {
    /// Resolve every configured view against the registry's catalogs.
    pub async fn build(
        config: &ProxyConfig,
        registry: Arc<UpstreamRegistry>,
        hooks: &HookRegistry,
        customs: &CustomToolRegistry,
        cache: Arc<OutputCache>,
        metrics: Arc<ProxyMetrics>,
    ) -> McpResult<Self> {
        let catalogs: BTreeMap<String, _> = registry.catalogs().await.into_iter().collect();
        let ctx = ResolveContext {
            servers: &config.mcp_servers,
            catalogs: &catalogs,
            hooks,
            customs,
        };

        let mut views = BTreeMap::new();
        for (name, view_config) in &config.tool_views {
            let view = resolve_view(name, view_config, &ctx)?;
            info!(
                view = %name,
                mode = view.exposure_mode.as_str(),
                tools = view.tools().len(),
                "View ready"
            );
            views.insert(name.clone(), Arc::new(view));
        }
        let default_view = resolve_default_view(&ctx)?;
        info!(tools = default_view.tools().len(), "Default view ready");
        views.insert(DEFAULT_VIEW.to_string(), Arc::new(default_view));

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                registry,
                views,
                server_cache_flags: config
                    .mcp_servers
                    .iter()
                    .map(|(name, server)| (name.clone(), server.cache_outputs))
                    .collect(),
                cache,
                executor: CompositeExecutor::new(Duration::from_secs(
                    config.dispatch.composite_timeout_secs,
                )),
                metrics,
                max_depth: config.dispatch.max_depth,
            }),
        })
    }

    /// Configured views; the default view is not among them.
    pub fn views(&self) -> impl Iterator<Item = &Arc<ResolvedView>> {
        self.inner
            .views
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT_VIEW)
            .map(|(_, view)| view)
    }

    /// Every upstream tool under server-level overrides, served at `/mcp`.
    pub fn default_view(&self) -> McpResult<Arc<ResolvedView>> {
        self.view(DEFAULT_VIEW)
    }

    pub fn view(&self, name: &str) -> McpResult<Arc<ResolvedView>> {
        self.inner
            .views
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::ViewNotFound(name.to_string()))
    }

    pub fn cache(&self) -> &Arc<OutputCache> {
        &self.inner.cache
    }

    pub fn metrics(&self) -> &Arc<ProxyMetrics> {
        &self.inner.metrics
    }

    pub fn registry(&self) -> &Arc<UpstreamRegistry> {
        &self.inner.registry
    }

    pub async fn dispatch(
        &self,
        view: &str,
        tool: &str,
        args: Map<String, Value>,
    ) -> McpResult<Value> {
        self.dispatch_at_depth(view, tool, args, 0).await
    }

    pub fn dispatch_at_depth<'a>(
        &'a self,
        view: &'a str,
        tool: &'a str,
        args: Map<String, Value>,
        depth: usize,
    ) -> BoxFuture<'a, McpResult<Value>> {
        async move {
            if depth > self.inner.max_depth {
                warn!(view = %view, tool = %tool, depth, "Nested call depth exceeded");
                return Err(McpError::RecursionLimit {
                    depth,
                    limit: self.inner.max_depth,
                });
            }
            let resolved = self.view(view)?;
            let entry = resolved.get(tool).cloned().ok_or_else(|| {
                McpError::ToolNotFound(format!("Tool '{}' not found in view '{}'", tool, view))
            })?;
            self.run(resolved, entry, args, depth).await
        }
        .boxed()
    }

    fn run(
        &self,
        view: Arc<ResolvedView>,
        entry: Arc<ResolvedTool>,
        args: Map<String, Value>,
        depth: usize,
    ) -> BoxFuture<'_, McpResult<Value>> {
        async move {
            let metrics = &self.inner.metrics;
            metrics.record_call_start();
            let started_at = Instant::now();
            let mut outcome = scopeguard::guard(CallOutcome::Failure, |outcome| {
                metrics.record_call_end(
                    &view.name,
                    &entry.name,
                    outcome,
                    started_at.elapsed().as_millis() as u64,
                );
            });

            let ctx = ToolCallContext {
                view_name: view.name.clone(),
                tool_name: entry.name.clone(),
                upstream_server: entry.upstream_server().map(str::to_string),
                depth,
                started_at,
                dispatcher: Some(self.clone()),
            };

            // Meta-tools route to an underlying tool whose own run carries
            // the view's hooks.
            if let ToolKind::Meta(meta) = &entry.kind {
                let result = self.run_meta(&view, meta, args, depth).await;
                *outcome = outcome_of(&result);
                return result;
            }

            let (args, decided) = match view.hooks.run_pre(args.clone(), &ctx).await {
                Ok(args) => {
                    let raw = self.execute(&view, &entry, args.clone(), &ctx).await;
                    if let Err(e) = &raw {
                        debug!(view = %view.name, tool = %entry.name, error = %e, "Execution failed");
                    }
                    (args, raw.map(|value| self.cache_decision(&view, &entry, value)))
                }
                Err(e @ McpError::AbortedByHook { .. }) => {
                    *outcome = CallOutcome::Aborted;
                    return Err(e);
                }
                // A failed pre hook skips execution but is still seen by post hooks.
                Err(e) => (args, Err(e)),
            };
            let result = view.hooks.run_post(decided, &args, &ctx).await;

            *outcome = outcome_of(&result);
            result
        }
        .boxed()
    }

    async fn execute(
        &self,
        view: &Arc<ResolvedView>,
        entry: &ResolvedTool,
        args: Map<String, Value>,
        ctx: &ToolCallContext,
    ) -> McpResult<Value> {
        match &entry.kind {
            ToolKind::Direct(direct) => self.call_direct(direct, args).await,
            ToolKind::Composite(composite) => {
                self.inner
                    .executor
                    .execute(composite, args, |branch, branch_args| {
                        self.call_branch(branch, branch_args)
                    })
                    .await
            }
            ToolKind::Custom(custom) => custom.call(args, ctx).await,
            ToolKind::Meta(meta) => self.run_meta(view, meta, args, ctx.depth).await,
        }
    }

    async fn call_direct(&self, direct: &DirectTool, args: Map<String, Value>) -> McpResult<Value> {
        let upstream_args = direct.params.transform_args(args);
        let result = self
            .inner
            .registry
            .call_tool(&direct.server, &direct.upstream_name, Some(upstream_args))
            .await?;
        let value = result_to_value(&result)?;
        if is_error_result(&value) {
            return Err(upstream_failure(&value));
        }
        Ok(value)
    }

    async fn call_branch(
        &self,
        branch: &CompositeBranch,
        args: Map<String, Value>,
    ) -> McpResult<Value> {
        let target = &branch.target;
        let result = self
            .inner
            .registry
            .call_tool(&target.server_key, &target.tool_name, Some(args))
            .await?;
        let value = result_to_value(&result)?;
        if is_error_result(&value) {
            return Err(upstream_failure(&value));
        }
        Ok(branch_payload(value))
    }

    async fn run_meta(
        &self,
        view: &Arc<ResolvedView>,
        meta: &MetaTool,
        args: Map<String, Value>,
        depth: usize,
    ) -> McpResult<Value> {
        match meta.action {
            MetaAction::Search => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or("");
                let limit = match args.get("limit") {
                    None | Some(Value::Null) => DEFAULT_SEARCH_LIMIT,
                    Some(v) => v.as_u64().ok_or_else(|| {
                        McpError::InvalidArguments("limit must be a non-negative integer".into())
                    })? as usize,
                };
                let hits = rank(meta.catalog.hits(), query, limit);
                Ok(json!({ "tools": hits }))
            }
            MetaAction::Call => {
                let tool_name = args
                    .get("tool_name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidArguments("tool_name is required".into()))?;
                let arguments = match args.get("arguments") {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(map)) => map.clone(),
                    Some(_) => {
                        return Err(McpError::InvalidArguments(
                            "arguments must be an object".into(),
                        ))
                    }
                };
                let target = meta.catalog.get(tool_name).cloned().ok_or_else(|| {
                    McpError::ToolNotFound(format!(
                        "Unknown tool '{}'. Use {} to find available tools.",
                        tool_name, meta.search_tool_name
                    ))
                })?;
                if depth + 1 > self.inner.max_depth {
                    return Err(McpError::RecursionLimit {
                        depth: depth + 1,
                        limit: self.inner.max_depth,
                    });
                }
                self.run(Arc::clone(view), target, arguments, depth + 1).await
            }
        }
    }

    fn server_caches(&self, server: &str) -> bool {
        self.inner
            .server_cache_flags
            .get(server)
            .copied()
            .unwrap_or(false)
    }

    /// Replace a large result by its cache capability when the originating
    /// server or view has caching on.
    fn cache_decision(&self, view: &ResolvedView, entry: &ResolvedTool, value: Value) -> Value {
        let origin_enabled = match &entry.kind {
            ToolKind::Direct(direct) => view.caches_outputs_of(self.server_caches(&direct.server)),
            ToolKind::Composite(composite) => view.caches_outputs_of(
                composite
                    .branches
                    .iter()
                    .any(|b| self.server_caches(&b.target.server_key)),
            ),
            ToolKind::Custom(_) => view.caches_outputs_of(false),
            // The underlying call already went through its own decision.
            ToolKind::Meta(_) => return value,
        };
        let cache = &self.inner.cache;
        if !origin_enabled || !cache.is_enabled() {
            return value;
        }

        let payload = cache_payload(&value);
        if !cache.should_cache(origin_enabled, payload.len()) {
            return value;
        }
        let Some(cached) = cache.store(payload) else {
            return value;
        };
        self.inner.metrics.record_cached_result();
        info!(
            view = %view.name,
            tool = %entry.name,
            size_bytes = cached.size_bytes,
            "Result cached behind capability URL"
        );
        match serde_json::to_value(&cached) {
            Ok(reference) => reference,
            Err(e) => {
                warn!(error = %e, "Failed to encode cached result reference");
                value
            }
        }
    }
}
