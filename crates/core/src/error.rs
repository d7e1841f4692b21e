use serde::{Deserialize, Serialize};

/// Terminal classification of a failure, used for per-category metrics
/// and retry decisions.
///
/// Run-level categories (`ConfigNotFound`, `DiscoveryFailed`) abort an
/// entire orchestrator run before any fetch is attempted. The remaining
/// categories are per-item: they terminate one fetch task and never
/// affect its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No configuration exists for the requested source.
    ConfigNotFound,
    /// The discovery tool call failed or returned malformed records.
    DiscoveryFailed,
    /// A template placeholder referenced a field the item does not have.
    TemplateResolution,
    /// Secret store lookup failed. Never retried: retrying cannot fix
    /// a missing or misconfigured credential.
    AuthConfig,
    /// Network error, timeout, HTTP 5xx, or HTTP 429. Retryable.
    NetworkOrServer,
    /// Any other non-2xx HTTP status. The request itself is defective,
    /// so retrying cannot help.
    ClientRequest,
    /// All retry attempts were consumed by retryable failures.
    ExhaustedRetries,
}

impl ErrorCategory {
    /// Whether a failure of this category may be retried.
    ///
    /// Only `NetworkOrServer` qualifies; everything else is terminal on
    /// the first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::NetworkOrServer)
    }

    /// Stable snake_case label for logging and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ConfigNotFound => "config_not_found",
            ErrorCategory::DiscoveryFailed => "discovery_failed",
            ErrorCategory::TemplateResolution => "template_resolution",
            ErrorCategory::AuthConfig => "auth_config",
            ErrorCategory::NetworkOrServer => "network_or_server",
            ErrorCategory::ClientRequest => "client_request",
            ErrorCategory::ExhaustedRetries => "exhausted_retries",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
