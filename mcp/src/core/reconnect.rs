//! Bounded restart of crashed upstream sessions.

use std::{future::Future, time::Duration};

use tracing::{error, info, warn};

use super::config::RestartConfig;
use crate::error::{McpError, McpResult};

/// Restarts an upstream session with exponential backoff, giving up after
/// `max_restarts` consecutive failures.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from_config(&RestartConfig::default())
    }
}

impl RestartPolicy {
    pub fn from_config(config: &RestartConfig) -> Self {
        Self {
            max_restarts: config.max_restarts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// delay = min(base_delay * 2^(attempt-1), max_delay)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 2u64.saturating_pow(exponent);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    /// Run `connect_fn` until it succeeds or the restart budget is spent.
    ///
    /// A spent budget yields [`McpError::ServerDegraded`].
    pub async fn restart<F, Fut, T>(&self, server: &str, mut connect_fn: F) -> McpResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = McpResult<T>>,
    {
        for attempt in 1..=self.max_restarts {
            let delay = self.calculate_backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match connect_fn().await {
                Ok(val) => {
                    info!(server = %server, attempt, "Restarted upstream session");
                    return Ok(val);
                }
                Err(e) => {
                    warn!(server = %server, attempt, error = %e, "Restart attempt failed");
                }
            }
        }
        error!(
            server = %server,
            restarts = self.max_restarts,
            "Restart budget exhausted, marking server degraded"
        );
        Err(McpError::ServerDegraded(server.to_string()))
    }
}
