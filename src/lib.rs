//! Server shell for the view proxy: HTTP routes, per-view MCP endpoints and
//! logging setup. The proxy core lives in the `mcp_views` crate.

pub mod logging;
pub mod server;

pub use server::{build_router, AppState, ViewMcpServer};
