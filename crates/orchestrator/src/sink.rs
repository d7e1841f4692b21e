//! Downstream pipeline interface.
//!
//! The content pipeline dedups payloads by content, so delivery from here is
//! at-least-once: the orchestrator guarantees exactly one attempt per
//! discovered item per firing and leaves duplicate suppression downstream.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

/// Downstream acknowledgement of one payload.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IngestReceipt {
    pub accepted: bool,
    #[serde(default)]
    pub duplicate: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("ingest call failed: {0}")]
pub struct SinkError(pub String);

/// Hands one fetched payload to the downstream content pipeline.
#[async_trait]
pub trait IngestSink: Send + Sync {
    async fn ingest(
        &self,
        payload: Bytes,
        linkage: &BTreeMap<String, String>,
        source_id: &str,
    ) -> Result<IngestReceipt, SinkError>;
}

/// [`IngestSink`] that POSTs the raw payload to an HTTP pipeline endpoint.
///
/// The source id travels in the `x-sluice-source` header and linkage fields
/// as query parameters, keeping the body exactly the fetched bytes.
pub struct HttpIngestSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpIngestSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl IngestSink for HttpIngestSink {
    async fn ingest(
        &self,
        payload: Bytes,
        linkage: &BTreeMap<String, String>,
        source_id: &str,
    ) -> Result<IngestReceipt, SinkError> {
        let pairs: Vec<(&str, &str)> = linkage
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-sluice-source", source_id)
            .query(&pairs)
            .body(payload)
            .send()
            .await
            .map_err(|e| SinkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError(format!("pipeline returned http status {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| SinkError(format!("invalid pipeline response: {e}")))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_duplicate_defaults_false() {
        let receipt: IngestReceipt = serde_json::from_str(r#"{"accepted":true}"#).unwrap();
        assert!(receipt.accepted);
        assert!(!receipt.duplicate);
    }
}
