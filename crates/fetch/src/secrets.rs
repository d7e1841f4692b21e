//! Secret resolution for authenticated sources.
//!
//! Lookups target an external secret store identified by a (store, key)
//! pair. Failures are deliberately non-retryable: a missing credential is a
//! configuration problem that retries cannot fix, and retrying would only
//! burn quota against the store.

use std::collections::HashMap;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret '{key}' not found in store '{store}'")]
    NotFound { store: String, key: String },

    #[error("secret store error: {0}")]
    Store(String),
}

/// Synchronous-style lookup against an external secret store.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, store: &str, key: &str) -> Result<String, SecretError>;
}

/// Resolves secrets from process environment variables.
///
/// The variable name is `{STORE}_{KEY}` upper-snake-cased, so
/// `(vault, weather-token)` reads `VAULT_WEATHER_TOKEN`.
#[derive(Debug, Default)]
pub struct EnvSecretResolver;

impl EnvSecretResolver {
    pub fn new() -> Self {
        Self
    }

    fn var_name(store: &str, key: &str) -> String {
        format!("{}_{}", store, key)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

#[async_trait]
impl SecretResolver for EnvSecretResolver {
    async fn resolve(&self, store: &str, key: &str) -> Result<String, SecretError> {
        let name = Self::var_name(store, key);
        std::env::var(&name)
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SecretError::NotFound {
                store: store.to_string(),
                key: key.to_string(),
            })
    }
}

/// Fixed in-memory secrets, for tests and local development.
#[derive(Debug, Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<(String, String), String>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, store: &str, key: &str, value: &str) -> Self {
        self.secrets
            .insert((store.to_string(), key.to_string()), value.to_string());
        self
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn resolve(&self, store: &str, key: &str) -> Result<String, SecretError> {
        self.secrets
            .get(&(store.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| SecretError::NotFound {
                store: store.to_string(),
                key: key.to_string(),
            })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
