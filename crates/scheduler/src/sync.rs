//! Reconciliation of the job registry against the configured source set.
//!
//! `sync_all` is a pure diff-and-apply over an immutable snapshot: register
//! sources that are missing, unregister ones that disappeared or were
//! disabled, and re-register any whose schedule or fetch target changed.
//! Runs at startup and whenever configuration changes are observed. Each
//! source is handled independently: one failure is logged and never aborts
//! the rest of the reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use sluice_core::PullSourceConfig;
use sluice_orchestrator::PullOrchestrator;

use crate::registry::{JobRegistry, JobTarget};

/// [`JobTarget`] that spawns one orchestrator run per firing, so a slow run
/// and the next firing of the same source proceed concurrently.
pub struct OrchestratorTarget {
    orchestrator: Arc<PullOrchestrator>,
}

impl OrchestratorTarget {
    pub fn new(orchestrator: Arc<PullOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobTarget for OrchestratorTarget {
    async fn fire(&self, source_id: &str) {
        let orchestrator = self.orchestrator.clone();
        let source_id = source_id.to_string();
        tokio::spawn(async move {
            orchestrator.run(&source_id).await;
        });
    }
}

/// Keeps the [`JobRegistry`] consistent with the desired source configs.
pub struct JobSyncService {
    registry: Arc<JobRegistry>,
    target: Arc<dyn JobTarget>,
}

impl JobSyncService {
    pub fn new(registry: Arc<JobRegistry>, target: Arc<dyn JobTarget>) -> Self {
        Self { registry, target }
    }

    /// Reconcile the registry against `configs`.
    pub fn sync_all(&self, configs: &[PullSourceConfig]) {
        let desired: HashMap<&str, &PullSourceConfig> = configs
            .iter()
            .filter(|config| config.enabled)
            .map(|config| (config.source_id.as_str(), config))
            .collect();

        let current = self.registry.snapshot();

        for entry in &current {
            if !desired.contains_key(entry.source_id.as_str()) {
                self.registry.unregister(&entry.source_id);
            }
        }

        let current_by_id: HashMap<&str, &crate::registry::JobEntry> = current
            .iter()
            .map(|entry| (entry.source_id.as_str(), entry))
            .collect();

        for (source_id, config) in &desired {
            let fingerprint = config.target_fingerprint();
            let unchanged = current_by_id.get(source_id).is_some_and(|entry| {
                entry.schedule == config.schedule && entry.fingerprint == fingerprint
            });
            if unchanged {
                debug!(source_id = %source_id, "source unchanged, keeping registration");
                continue;
            }
            if let Err(e) = self.registry.register(
                source_id,
                &config.schedule,
                &fingerprint,
                self.target.clone(),
            ) {
                warn!(source_id = %source_id, error = %e, "failed to register source, skipping");
            }
        }

        info!(
            desired = desired.len(),
            registered = self.registry.len(),
            "reconciliation complete"
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────────
