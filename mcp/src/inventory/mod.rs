//! Upstream tool catalogs.
//!
//! Catalogs are fetched once per server and kept until an explicit refresh.
//! Tools are addressed by their qualified `server.tool` name.

pub mod index;
pub mod types;

pub use index::{IndexCounts, ToolInventory};
pub use types::{QualifiedToolName, ToolEntry};
