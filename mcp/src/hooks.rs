//! Pre/post call interceptors.
//!
//! Hooks are registered under string keys at startup and bound to views by
//! key. Unknown keys fail view resolution.
//!
//! Pipeline semantics:
//! - pre_call hooks run in order; each may replace the arguments or abort.
//!   An abort skips the remaining hooks and the call itself.
//! - post_call hooks run in order whenever pre_call did not abort, including
//!   after a failed call. Each sees the current outcome and may replace it,
//!   which can turn a failure into a result, or abort.
//! - A hook that both replaces and aborts aborts.

use std::{collections::HashMap, fmt, sync::Arc, time::Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    dispatch::ToolCallContext,
    error::{McpError, McpResult},
};

/// What a hook asks the pipeline to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookResult {
    /// Replacement arguments (pre_call).
    pub args: Option<Map<String, Value>>,
    /// Replacement result (post_call).
    pub result: Option<Value>,
    pub abort_reason: Option<String>,
}

impl HookResult {
    pub fn proceed() -> Self {
        Self::default()
    }

    pub fn replace_args(args: Map<String, Value>) -> Self {
        Self {
            args: Some(args),
            ..Self::default()
        }
    }

    pub fn replace_result(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        Self {
            abort_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_abort(&self) -> bool {
        self.abort_reason.is_some()
    }
}

#[async_trait]
pub trait ToolHook: Send + Sync {
    async fn pre_call(
        &self,
        _args: &Map<String, Value>,
        _ctx: &ToolCallContext,
    ) -> McpResult<HookResult> {
        Ok(HookResult::proceed())
    }

    async fn post_call(
        &self,
        _result: &McpResult<Value>,
        _args: &Map<String, Value>,
        _ctx: &ToolCallContext,
    ) -> McpResult<HookResult> {
        Ok(HookResult::proceed())
    }
}

/// Startup-populated map from hook key to implementation.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn ToolHook>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.hooks.keys().collect();
        keys.sort();
        f.debug_struct("HookRegistry").field("keys", &keys).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the hooks shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("audit_log", Arc::new(AuditLogHook));
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, hook: Arc<dyn ToolHook>) {
        self.hooks.insert(key.into(), hook);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ToolHook>> {
        self.hooks.get(key).cloned()
    }

    /// Resolve an ordered list of keys for `view`.
    pub fn resolve(&self, view: &str, keys: &[String]) -> McpResult<Vec<(String, Arc<dyn ToolHook>)>> {
        keys.iter()
            .map(|key| {
                self.get(key).map(|hook| (key.clone(), hook)).ok_or_else(|| {
                    McpError::Config(format!("view '{}' binds unknown hook '{}'", view, key))
                })
            })
            .collect()
    }
}

/// Ordered hooks bound to one view.
#[derive(Clone, Default)]
pub struct HookPipeline {
    pre: Vec<(String, Arc<dyn ToolHook>)>,
    post: Vec<(String, Arc<dyn ToolHook>)>,
}

impl HookPipeline {
    pub fn new(pre: Vec<(String, Arc<dyn ToolHook>)>, post: Vec<(String, Arc<dyn ToolHook>)>) -> Self {
        Self { pre, post }
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    fn aborted(reason: String, ctx: &ToolCallContext) -> McpError {
        McpError::AbortedByHook {
            reason,
            tool: ctx.tool_name.clone(),
            view: ctx.view_name.clone(),
        }
    }

    /// Run pre_call hooks in order.
    ///
    /// Returns `AbortedByHook` when a hook aborts. A hook that fails is
    /// reported as `Hook`; the call is then not executed, but it is not an
    /// abort, so post_call hooks still see the failure.
    pub async fn run_pre(
        &self,
        mut args: Map<String, Value>,
        ctx: &ToolCallContext,
    ) -> McpResult<Map<String, Value>> {
        for (key, hook) in &self.pre {
            let outcome = match hook.pre_call(&args, ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(hook = %key, error = %e, "pre_call hook failed");
                    return Err(McpError::Hook(format!("{}: {}", key, e)));
                }
            };
            if let Some(reason) = outcome.abort_reason {
                info!(hook = %key, view = %ctx.view_name, tool = %ctx.tool_name, %reason, "pre_call hook aborted");
                return Err(Self::aborted(reason, ctx));
            }
            if let Some(replacement) = outcome.args {
                args = replacement;
            }
        }
        Ok(args)
    }

    pub async fn run_post(
        &self,
        mut result: McpResult<Value>,
        args: &Map<String, Value>,
        ctx: &ToolCallContext,
    ) -> McpResult<Value> {
        for (key, hook) in &self.post {
            match hook.post_call(&result, args, ctx).await {
                Ok(outcome) => {
                    if let Some(reason) = outcome.abort_reason {
                        info!(hook = %key, view = %ctx.view_name, tool = %ctx.tool_name, %reason, "post_call hook aborted");
                        return Err(Self::aborted(reason, ctx));
                    }
                    if let Some(replacement) = outcome.result {
                        result = Ok(replacement);
                    }
                }
                Err(e) => {
                    warn!(hook = %key, error = %e, "post_call hook failed");
                    result = Err(McpError::Hook(format!("{}: {}", key, e)));
                }
            }
        }
        result
    }
}

/// Logs every call through the view with its outcome.
struct AuditLogHook;

#[async_trait]
impl ToolHook for AuditLogHook {
    async fn pre_call(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolCallContext,
    ) -> McpResult<HookResult> {
        info!(
            view = %ctx.view_name,
            tool = %ctx.tool_name,
            upstream = ctx.upstream_server.as_deref().unwrap_or("-"),
            arg_keys = ?args.keys().collect::<Vec<_>>(),
            "tool call"
        );
        Ok(HookResult::proceed())
    }

    async fn post_call(
        &self,
        result: &McpResult<Value>,
        _args: &Map<String, Value>,
        ctx: &ToolCallContext,
    ) -> McpResult<HookResult> {
        let elapsed_ms = Instant::now().saturating_duration_since(ctx.started_at).as_millis();
        match result {
            Ok(_) => info!(view = %ctx.view_name, tool = %ctx.tool_name, elapsed_ms, "tool call ok"),
            Err(e) => info!(view = %ctx.view_name, tool = %ctx.tool_name, elapsed_ms, error = %e, "tool call failed"),
        }
        Ok(HookResult::proceed())
    }
}
