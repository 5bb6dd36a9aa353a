//! Upstream connectivity: configuration, transports, the server registry,
//! restart policy and counters.

pub mod config;
pub mod metrics;
pub mod reconnect;
pub mod registry;
pub mod transport;

pub use config::{
    CacheConfig, CompositeToolConfig, DispatchConfig, ExposureMode, McpTransport, ProxyConfig,
    RestartConfig, Tool, ToolConfig, ToolViewConfig, UpstreamServerConfig, DEFAULT_VIEW,
};
pub use metrics::{CallOutcome, LatencySnapshot, MetricsSnapshot, ProxyMetrics};
pub use reconnect::RestartPolicy;
pub use registry::{ServerStatus, UpstreamRegistry};
pub use transport::{RmcpConnector, UpstreamClient, UpstreamConnector};
