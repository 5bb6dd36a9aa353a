//! Concurrent fan-out and ordered fan-in of composite branches.

use std::{future::Future, time::Duration};

use futures::future::join_all;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{CompositeBranch, CompositeTool};
use crate::error::{McpError, McpResult};

#[derive(Debug, Clone)]
pub struct CompositeExecutor {
    timeout: Duration,
}

/// Error marker stored under a failed branch's key.
pub fn branch_error(err: &McpError) -> Value {
    json!({"error": err.to_string(), "error_type": err.code()})
}

impl CompositeExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run every branch concurrently and join within the outer timeout.
    ///
    /// Inputs are bound and every template rendered before any branch is
    /// issued. A failed or timed-out branch becomes an error marker under its
    /// own key; the call fails only when every branch failed. Dropping the
    /// returned future cancels branches still in flight.
    pub async fn execute<'a, F, Fut>(
        &self,
        tool: &'a CompositeTool,
        args: Map<String, Value>,
        call: F,
    ) -> McpResult<Value>
    where
        F: Fn(&'a CompositeBranch, Map<String, Value>) -> Fut,
        Fut: Future<Output = McpResult<Value>>,
    {
        let inputs = tool.bind_inputs(args)?;
        let rendered = tool
            .branches
            .iter()
            .map(|branch| branch.template.render(&inputs).map(|args| (branch, args)))
            .collect::<McpResult<Vec<_>>>()?;

        let deadline = Instant::now() + self.timeout;
        let timeout_ms = self.timeout.as_millis() as u64;
        let pending = rendered.into_iter().map(|(branch, args)| {
            let fut = call(branch, args);
            async move {
                match tokio::time::timeout_at(deadline, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(McpError::Timeout(timeout_ms)),
                }
            }
        });
        let results = join_all(pending).await;

        let mut output = Map::new();
        let mut failures = Vec::new();
        for (branch, result) in tool.branches.iter().zip(results) {
            match result {
                Ok(value) => {
                    output.insert(branch.name.clone(), value);
                }
                Err(e) => {
                    warn!(
                        composite = %tool.name,
                        branch = %branch.name,
                        error = %e,
                        "Composite branch failed"
                    );
                    output.insert(branch.name.clone(), branch_error(&e));
                    failures.push(format!("{}: {}", branch.name, e));
                }
            }
        }

        if failures.len() == tool.branches.len() {
            return Err(McpError::CompositeFailed(failures.join("; ")));
        }
        debug!(
            composite = %tool.name,
            branches = tool.branches.len(),
            failed = failures.len(),
            "Composite call joined"
        );
        Ok(Value::Object(output))
    }
}
