//! Iteration discovery.
//!
//! Sources may configure an external discovery tool that returns the set of
//! items to fetch on this firing (e.g. one record per geographic region).
//! [`IterationResolver`] always yields a non-empty item list for
//! unconfigured sources — the sentinel item — so the orchestrator has a
//! single fan-out path for both the single-fetch and many-fetch cases.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use sluice_core::{IterationItem, IterationSpec};

#[derive(Debug, thiserror::Error)]
#[error("tool call failed: {0}")]
pub struct ToolInvokeError(pub String);

/// External discovery tool interface: opaque call by name, JSON records out.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool_name: &str, params: &Value) -> Result<Vec<Value>, ToolInvokeError>;
}

/// Discovery failed; the whole run is aborted because there is nothing
/// valid to fetch.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery tool '{tool}' failed: {message}")]
    Invocation { tool: String, message: String },

    #[error("discovery tool '{tool}' returned a malformed record: {detail}")]
    Malformed { tool: String, detail: String },
}

/// Resolves the item list for one orchestrator run.
pub struct IterationResolver {
    invoker: Arc<dyn ToolInvoker>,
}

impl IterationResolver {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { invoker }
    }

    /// Resolve the fan-out items: the sentinel for non-iterating sources,
    /// otherwise one item per record returned by the discovery tool.
    pub async fn resolve(
        &self,
        spec: Option<&IterationSpec>,
    ) -> Result<Vec<IterationItem>, DiscoveryError> {
        let Some(spec) = spec else {
            return Ok(vec![IterationItem::none()]);
        };

        let records = self
            .invoker
            .invoke(&spec.tool_name, &spec.params)
            .await
            .map_err(|e| DiscoveryError::Invocation {
                tool: spec.tool_name.clone(),
                message: e.0,
            })?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            match record {
                Value::Object(fields) => items.push(IterationItem::from_map(fields)),
                other => {
                    return Err(DiscoveryError::Malformed {
                        tool: spec.tool_name.clone(),
                        detail: format!("expected a JSON object, got {other}"),
                    });
                }
            }
        }
        debug!(tool = %spec.tool_name, items = items.len(), "iteration resolved");
        Ok(items)
    }
}

/// [`ToolInvoker`] that POSTs `{"tool": ..., "params": ...}` to a discovery
/// endpoint and expects a JSON array of records back.
pub struct HttpToolInvoker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpToolInvoker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, tool_name: &str, params: &Value) -> Result<Vec<Value>, ToolInvokeError> {
        let body = serde_json::json!({
            "tool": tool_name,
            "params": params,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolInvokeError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolInvokeError(format!(
                "discovery endpoint returned http status {status}"
            )));
        }

        let records: Value = response
            .json()
            .await
            .map_err(|e| ToolInvokeError(format!("invalid discovery response: {e}")))?;
        match records {
            Value::Array(records) => Ok(records),
            other => Err(ToolInvokeError(format!(
                "expected a JSON array of records, got {other}"
            ))),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
