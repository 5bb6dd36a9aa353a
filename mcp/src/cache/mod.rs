//! Output cache with signed, time-bound retrieval URLs.
//!
//! Results above a size threshold are stored here and the caller receives a
//! preview plus a capability URL. Retrieval goes straight to
//! [`OutputCache::retrieve`] and never through dispatch.

pub mod capability;
pub mod store;

pub use capability::{capability_url, generate_token, CapabilitySigner};
pub use store::{CacheEntry, CacheStats, CachedResult, OutputCache};
