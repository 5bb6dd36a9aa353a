//! Error types for view resolution, dispatch and the output cache.
//!
//! Config errors are raised while resolving views and never at call time.
//! Cache errors form their own sub-enum so the server shell can map each
//! one to a distinct status code.

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("View '{0}' not found")]
    ViewNotFound(String),

    /// Carries the full caller-facing message.
    #[error("{0}")]
    ToolNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream error ({code}): {message}")]
    Upstream { code: i64, message: String },

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Tool '{tool}' in view '{view}' aborted by hook: {reason}")]
    AbortedByHook {
        reason: String,
        tool: String,
        view: String,
    },

    #[error("Recursion limit exceeded: depth {depth} > limit {limit}")]
    RecursionLimit { depth: usize, limit: usize },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("All composite branches failed: {0}")]
    CompositeFailed(String),

    #[error("Server degraded: {0}")]
    ServerDegraded(String),

    #[error("Hook error: {0}")]
    Hook(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Output cache retrieval errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The capability's expiry has passed.
    #[error("Cache entry expired")]
    Expired,

    /// The signature does not match the token and expiry.
    #[error("Invalid cache signature")]
    InvalidSignature,

    /// Unknown token, or the entry was evicted.
    #[error("Cache entry not found")]
    NotFound,
}

impl CacheError {
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::Expired => "expired",
            CacheError::InvalidSignature => "invalid_signature",
            CacheError::NotFound => "not_found",
        }
    }
}

impl McpError {
    /// Stable machine-readable code, used in error markers and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            McpError::Config(_) => "config_error",
            McpError::ServerNotFound(_) | McpError::ViewNotFound(_) | McpError::ToolNotFound(_) => {
                "not_found"
            }
            McpError::ConnectionFailed(_) | McpError::Transport(_) => "connection_error",
            McpError::Upstream { .. } => "upstream_error",
            McpError::Timeout(_) => "timeout",
            McpError::AbortedByHook { .. } => "aborted_by_hook",
            McpError::RecursionLimit { .. } => "recursion_limit",
            McpError::InvalidArguments(_) => "invalid_arguments",
            McpError::Template(_) => "template_error",
            McpError::CompositeFailed(_) => "composite_failed",
            McpError::ServerDegraded(_) => "server_degraded",
            McpError::Hook(_) => "hook_error",
            McpError::Cache(e) => e.code(),
            McpError::Io(_) | McpError::Serialization(_) | McpError::Yaml(_) => "internal_error",
            McpError::Http(_) => "connection_error",
        }
    }

    /// Whether the failure means the upstream session is gone and a reconnect may help.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            McpError::ConnectionFailed(_) | McpError::Transport(_) | McpError::Io(_)
        )
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        McpError::Upstream {
            code: -32603,
            message: message.into(),
        }
    }
}
