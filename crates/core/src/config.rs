//! Configuration model for scheduled pull sources.
//!
//! A [`PullSourceConfig`] describes one external HTTP API that is fetched on
//! a recurring schedule: the request template, optional authentication,
//! optional dynamic iteration (fan-out), and the retry/concurrency knobs.
//! Configs are created and versioned by external configuration management;
//! this subsystem only ever reads them, via the [`ConfigStore`] trait.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

// ── Request template ─────────────────────────────────────────────────

/// Base URL plus static query parameters.
///
/// Any value (including the URL itself) may contain `{item.<dot.path>}`
/// placeholders that are substituted per iteration item at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// Request URL, possibly containing placeholders.
    pub base_url: String,
    /// Query parameters in declaration order.
    #[serde(default)]
    pub params: IndexMap<String, String>,
}

// ── Authentication ───────────────────────────────────────────────────

/// How a request to this source is authenticated, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Unauthenticated requests.
    None,
    /// API key fetched from a secret store and attached as a header.
    ApiKey(ApiKeyAuth),
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::None
    }
}

/// Secret-store reference for API-key authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyAuth {
    /// Secret store name.
    pub store: String,
    /// Key within the store.
    pub key: String,
    /// Header the resolved secret is sent under.
    #[serde(default = "default_header_name")]
    pub header_name: String,
}

// ── Iteration ────────────────────────────────────────────────────────

/// Dynamic fan-out configuration: discover items via an external tool and
/// fetch once per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSpec {
    /// Name of the discovery tool to invoke.
    pub tool_name: String,
    /// Item fields forwarded downstream as linkage alongside each payload.
    #[serde(default)]
    pub inject_fields: Vec<String>,
    /// Static parameters passed to the discovery tool.
    #[serde(default)]
    pub params: serde_json::Value,
}

// ── Retry policy ─────────────────────────────────────────────────────

/// Exponential backoff retry policy applied per fetch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total tries per task, including the first attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `backoff_base_ms * 2^(n-1)`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

// ── Source configuration ─────────────────────────────────────────────

/// Immutable-per-version configuration for one scheduled pull source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullSourceConfig {
    /// Unique source identifier.
    pub source_id: String,
    /// Cron expression (5 or 6 fields), opaque to this model.
    pub schedule: String,
    /// HTTP request template.
    pub request: RequestTemplate,
    /// Authentication, defaults to none.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Optional dynamic iteration; absent means a single fetch per firing.
    #[serde(default)]
    pub iteration: Option<IterationSpec>,
    /// Per-task retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Max fetches in flight at any instant within one run.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Per-fetch HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Disabled sources keep their config but are never scheduled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PullSourceConfig {
    /// Fingerprint of the fetch target, used by reconciliation to detect
    /// that a source must be re-registered even when its id is unchanged.
    pub fn target_fingerprint(&self) -> String {
        self.request.base_url.clone()
    }
}

// ── Default value functions ──────────────────────────────────────────

fn default_header_name() -> String {
    "X-Api-Key".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_concurrency_limit() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

// ── Config store ─────────────────────────────────────────────────────

/// Errors from the configuration store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("no configuration for source '{0}'")]
    NotFound(String),

    #[error("config store error: {0}")]
    Store(String),
}

/// Read-only access to pull source configurations.
///
/// Backed elsewhere in the system by a cached configuration store; tests
/// and the worker binary use [`InMemoryConfigStore`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the config for one source.
    async fn load(&self, source_id: &str) -> Result<PullSourceConfig, ConfigStoreError>;

    /// List all known configs (enabled or not).
    async fn list(&self) -> Result<Vec<PullSourceConfig>, ConfigStoreError>;
}

/// In-memory [`ConfigStore`] keyed by `source_id`.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    configs: RwLock<HashMap<String, PullSourceConfig>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite one config.
    pub async fn upsert(&self, config: PullSourceConfig) {
        let mut configs = self.configs.write().await;
        configs.insert(config.source_id.clone(), config);
    }

    /// Replace the full config set (used after a sources-file reload).
    pub async fn replace_all(&self, new_configs: Vec<PullSourceConfig>) {
        let mut configs = self.configs.write().await;
        configs.clear();
        for config in new_configs {
            configs.insert(config.source_id.clone(), config);
        }
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self, source_id: &str) -> Result<PullSourceConfig, ConfigStoreError> {
        let configs = self.configs.read().await;
        configs
            .get(source_id)
            .cloned()
            .ok_or_else(|| ConfigStoreError::NotFound(source_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<PullSourceConfig>, ConfigStoreError> {
        let configs = self.configs.read().await;
        Ok(configs.values().cloned().collect())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "source_id": "weather-api",
            "schedule": "0 */15 * * * *",
            "request": {"base_url": "https://api.example.com/v1/weather"}
        }"#
    }

    #[test]
    fn test_config_defaults() {
        let config: PullSourceConfig = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(config.source_id, "weather-api");
        assert_eq!(config.auth, AuthConfig::None);
        assert!(config.iteration.is_none());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_base_ms, 500);
        assert_eq!(config.concurrency_limit, 5);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.enabled);
        assert!(config.request.params.is_empty());
    }

    #[test]
    fn test_auth_config_tagged_roundtrip() {
        let json = r#"{"type":"api_key","store":"vault","key":"weather_token"}"#;
        let auth: AuthConfig = serde_json::from_str(json).unwrap();
        if let AuthConfig::ApiKey(ref api_key) = auth {
            assert_eq!(api_key.store, "vault");
            assert_eq!(api_key.key, "weather_token");
            assert_eq!(api_key.header_name, "X-Api-Key");
        } else {
            panic!("expected ApiKey variant");
        }

        let json2 = serde_json::to_string(&auth).unwrap();
        let back: AuthConfig = serde_json::from_str(&json2).unwrap();
        assert_eq!(back, auth);

        let none: AuthConfig = serde_json::from_str(r#"{"type":"none"}"#).unwrap();
        assert_eq!(none, AuthConfig::None);
    }

    #[test]
    fn test_iteration_spec_defaults() {
        let json = r#"{"tool_name":"list_regions"}"#;
        let spec: IterationSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.tool_name, "list_regions");
        assert!(spec.inject_fields.is_empty());
        assert!(spec.params.is_null());
    }

    #[test]
    fn test_request_template_preserves_param_order() {
        let json = r#"{"base_url":"https://x","params":{"b":"2","a":"1","c":"3"}}"#;
        let template: RequestTemplate = serde_json::from_str(json).unwrap();
        let keys: Vec<&String> = template.params.keys().collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn test_target_fingerprint_tracks_base_url() {
        let mut config: PullSourceConfig = serde_json::from_str(minimal_json()).unwrap();
        let before = config.target_fingerprint();
        config.request.base_url = "https://api.example.com/v2/weather".to_string();
        assert_ne!(before, config.target_fingerprint());
    }

    #[tokio::test]
    async fn test_in_memory_store_load_and_not_found() {
        let store = InMemoryConfigStore::new();
        let config: PullSourceConfig = serde_json::from_str(minimal_json()).unwrap();
        store.upsert(config.clone()).await;

        let loaded = store.load("weather-api").await.unwrap();
        assert_eq!(loaded, config);

        let missing = store.load("nope").await;
        assert!(matches!(missing, Err(ConfigStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_in_memory_store_replace_all() {
        let store = InMemoryConfigStore::new();
        let config: PullSourceConfig = serde_json::from_str(minimal_json()).unwrap();
        store.upsert(config.clone()).await;

        let mut other = config.clone();
        other.source_id = "prices-api".to_string();
        store.replace_all(vec![other]).await;

        assert!(store.load("weather-api").await.is_err());
        assert!(store.load("prices-api").await.is_ok());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
