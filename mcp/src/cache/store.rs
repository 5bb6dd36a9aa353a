//! Byte-bounded TTL store for large tool outputs.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::capability::{capability_url, generate_token, CapabilitySigner};
use crate::{
    core::config::CacheConfig,
    error::{CacheError, McpError, McpResult},
};

/// One stored payload. Immutable once written.
#[derive(Debug)]
pub struct CacheEntry {
    pub token: String,
    pub payload: String,
    pub size_bytes: usize,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// What the caller receives instead of a large result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedResult {
    pub cached: bool,
    pub preview: String,
    pub token: String,
    pub retrieve_url: String,
    pub expires_at: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub max_total_bytes: usize,
}

pub struct OutputCache {
    enabled: bool,
    signer: Option<CapabilitySigner>,
    ttl: chrono::Duration,
    min_size: usize,
    preview_chars: usize,
    base_url: String,
    max_total_bytes: usize,
    purge_interval: Duration,
    entries: DashMap<String, Arc<CacheEntry>>,
    total_bytes: AtomicUsize,
}

impl std::fmt::Debug for OutputCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCache")
            .field("enabled", &self.enabled)
            .field("entries", &self.entries.len())
            .field("total_bytes", &self.total_bytes.load(Ordering::Relaxed))
            .finish()
    }
}

fn preview_of(payload: &str, chars: usize) -> String {
    payload.chars().take(chars).collect()
}

impl OutputCache {
    pub fn new(config: &CacheConfig) -> McpResult<Self> {
        let signer = match (&config.secret, config.enabled) {
            (Some(secret), _) if !secret.is_empty() => {
                Some(CapabilitySigner::new(secret.as_bytes())?)
            }
            (_, true) => {
                return Err(McpError::Config(
                    "cache.secret is required when caching is enabled".to_string(),
                ))
            }
            (_, false) => None,
        };

        Ok(Self {
            enabled: config.enabled,
            signer,
            ttl: chrono::Duration::seconds(config.ttl_seconds as i64),
            min_size: config.min_size,
            preview_chars: config.preview_chars,
            base_url: config.base_url.clone(),
            max_total_bytes: config.max_total_bytes,
            purge_interval: Duration::from_secs(config.purge_interval_secs.max(1)),
            entries: DashMap::new(),
            total_bytes: AtomicUsize::new(0),
        })
    }

    /// Cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            signer: None,
            ttl: chrono::Duration::zero(),
            min_size: usize::MAX,
            preview_chars: 0,
            base_url: String::new(),
            max_total_bytes: 0,
            purge_interval: Duration::from_secs(60),
            entries: DashMap::new(),
            total_bytes: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.signer.is_some()
    }

    /// Whether a payload of `size_bytes` from an origin with caching
    /// `origin_enabled` should be replaced by a capability.
    pub fn should_cache(&self, origin_enabled: bool, size_bytes: usize) -> bool {
        self.is_enabled() && origin_enabled && size_bytes > self.min_size
    }

    pub fn store(&self, payload: String) -> Option<CachedResult> {
        self.store_at(payload, Utc::now())
    }

    /// Store `payload` and return its capability. `None` when caching is off
    /// or the payload alone exceeds the byte bound.
    pub fn store_at(&self, payload: String, now: DateTime<Utc>) -> Option<CachedResult> {
        let signer = self.signer.as_ref().filter(|_| self.enabled)?;
        let size_bytes = payload.len();
        if size_bytes > self.max_total_bytes {
            warn!(
                size_bytes,
                max_total_bytes = self.max_total_bytes,
                "Result larger than cache capacity, returning it inline"
            );
            return None;
        }
        if !self.reserve(size_bytes, now) {
            warn!(size_bytes, "Cache space held by in-flight stores, returning result inline");
            return None;
        }

        let token = generate_token();
        let expires_at = now + self.ttl;
        let expires = expires_at.timestamp();
        let signature = signer.sign(&token, expires);
        let entry = Arc::new(CacheEntry {
            token: token.clone(),
            preview: preview_of(&payload, self.preview_chars),
            payload,
            size_bytes,
            created_at: now,
            expires_at,
        });

        let result = CachedResult {
            cached: true,
            preview: entry.preview.clone(),
            token: token.clone(),
            retrieve_url: capability_url(&self.base_url, &token, expires, &signature),
            expires_at: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            size_bytes,
        };

        self.entries.insert(token, entry);
        debug!(size_bytes, expires, "Cached tool output");
        Some(result)
    }

    pub fn retrieve(
        &self,
        token: &str,
        expires: i64,
        signature: &str,
    ) -> Result<Arc<CacheEntry>, CacheError> {
        self.retrieve_at(token, expires, signature, Utc::now())
    }

    /// Validate a capability and return the stored entry.
    ///
    /// Order: signature, then the signed expiry, then lookup. An entry past
    /// its own expiry is never served even if not purged yet.
    pub fn retrieve_at(
        &self,
        token: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<CacheEntry>, CacheError> {
        let signer = self.signer.as_ref().ok_or(CacheError::NotFound)?;
        if !signer.verify(token, expires, signature) {
            return Err(CacheError::InvalidSignature);
        }
        if now.timestamp() > expires {
            return Err(CacheError::Expired);
        }

        let entry = self
            .entries
            .get(token)
            .map(|e| e.value().clone())
            .ok_or(CacheError::NotFound)?;
        if entry.is_expired(now) {
            self.remove(token);
            return Err(CacheError::Expired);
        }
        Ok(entry)
    }

    fn remove(&self, token: &str) -> Option<Arc<CacheEntry>> {
        let (_, entry) = self.entries.remove(token)?;
        self.total_bytes.fetch_sub(entry.size_bytes, Ordering::SeqCst);
        Some(entry)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        expired.iter().filter(|t| self.remove(t).is_some()).count()
    }

    /// Count `incoming` bytes against the bound before the entry exists, so
    /// concurrent stores can never overshoot it together. Evicts as needed;
    /// false when nothing is left to evict and the bytes still do not fit.
    fn reserve(&self, incoming: usize, now: DateTime<Utc>) -> bool {
        loop {
            let reserved = self
                .total_bytes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    current
                        .checked_add(incoming)
                        .filter(|total| *total <= self.max_total_bytes)
                });
            if reserved.is_ok() {
                return true;
            }
            if self.make_room(incoming, now) == 0 {
                return false;
            }
        }
    }

    /// Free space for `incoming` bytes: expired entries first, then oldest.
    /// Returns how many entries were removed.
    fn make_room(&self, incoming: usize, now: DateTime<Utc>) -> usize {
        let fits = |cache: &Self| {
            cache.total_bytes.load(Ordering::SeqCst) + incoming <= cache.max_total_bytes
        };

        let purged = self.purge_expired(now);
        if purged > 0 {
            debug!(purged, "Evicted expired cache entries under pressure");
        }
        if fits(self) {
            return purged;
        }

        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|e| (e.value().created_at, e.key().clone()))
            .collect();
        by_age.sort();

        let mut evicted = 0usize;
        for (_, token) in by_age {
            if fits(self) {
                break;
            }
            if self.remove(&token).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "Evicted oldest cache entries to bound memory");
        }
        purged + evicted
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_bytes: self.total_bytes.load(Ordering::SeqCst),
            max_total_bytes: self.max_total_bytes,
        }
    }

    /// Periodically purge expired entries until `cancel` fires.
    pub fn spawn_purge_task(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cache.purge_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Cache purge task stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let purged = cache.purge_expired(Utc::now());
                        if purged > 0 {
                            info!(purged, "Purged expired cache entries");
                        }
                    }
                }
            }
        })
    }
}
