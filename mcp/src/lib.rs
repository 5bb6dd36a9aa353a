//! Tool views over upstream MCP servers.
//!
//! ## Modules
//!
//! - [`core`]: configuration, upstream transports and the server registry
//! - [`inventory`]: cached upstream catalogs
//! - [`view`]: view resolution, parameter transforms and tool search
//! - [`composite`]: fan-out tools and their argument templates
//! - [`hooks`]: pre/post call interceptors
//! - [`custom`]: in-process tools
//! - [`cache`]: output cache and signed retrieval URLs
//! - [`dispatch`]: the per-call routing state machine

pub mod error;

pub mod cache;
pub mod composite;
pub mod core;
pub mod custom;
pub mod dispatch;
pub mod hooks;
pub mod inventory;
pub mod view;

#[cfg(test)]
mod test_support;

pub use core::{
    config, ExposureMode, MetricsSnapshot, ProxyConfig, ProxyMetrics, ServerStatus, Tool,
    UpstreamRegistry, DEFAULT_VIEW,
};

pub use cache::{CachedResult, OutputCache};
pub use custom::{CustomTool, CustomToolRegistry};
pub use dispatch::{Dispatcher, ToolCallContext};
pub use error::{CacheError, McpError, McpResult};
pub use hooks::{HookPipeline, HookRegistry, HookResult, ToolHook};
pub use inventory::{QualifiedToolName, ToolEntry, ToolInventory};
pub use view::{ResolvedTool, ResolvedView, ToolKind};
