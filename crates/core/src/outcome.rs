//! Per-task and per-run outcome types.
//!
//! Every fetch task terminates in exactly one of success or permanent
//! failure; a run aggregates all task outcomes (or a run-level abort) into a
//! [`JobRunResult`] that is logged, never persisted.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorCategory;

/// A successfully fetched payload plus the linkage fields that associate it
/// with the originating item downstream.
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    /// Raw response body, opaque to this subsystem.
    pub payload: Bytes,
    /// The `inject_fields` subset of the item; possibly empty.
    pub linkage: BTreeMap<String, String>,
}

/// Terminal failure of one fetch task.
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub category: ErrorCategory,
    pub message: String,
    /// HTTP attempts actually issued; zero when the task failed before any
    /// request was made (template or auth errors).
    pub attempts_used: u32,
}

/// The single terminal state of a fetch task.
pub type FetchOutcome = Result<FetchSuccess, FetchFailure>;

/// Run-level abort: the whole firing produced zero fetch tasks.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub category: ErrorCategory,
    pub message: String,
}

/// Aggregate outcome of one orchestrator firing.
#[derive(Debug, Serialize)]
pub struct JobRunResult {
    pub run_id: Uuid,
    pub source_id: String,
    pub total_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Per-task permanent failures, kept for diagnostics.
    pub failures: Vec<FetchFailure>,
    /// Set when the run aborted before fan-out (missing config, discovery
    /// failure); `total_tasks` is zero in that case.
    pub error: Option<RunFailure>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl JobRunResult {
    /// A run that aborted before any fetch was attempted.
    pub fn aborted(
        source_id: &str,
        category: ErrorCategory,
        message: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_id: source_id.to_string(),
            total_tasks: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            error: Some(RunFailure { category, message }),
            started_at,
            duration_ms: 0,
        }
    }

    /// Failure counts per category, for the per-source metrics event.
    pub fn category_counts(&self) -> BTreeMap<ErrorCategory, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.category).or_insert(0) += 1;
        }
        if let Some(ref run_failure) = self.error {
            *counts.entry(run_failure.category).or_insert(0) += 1;
        }
        counts
    }
}

// ── Tests ────────────────────────────────────────────────────────────
