//! The job registry: at most one active recurring trigger per source.
//!
//! Each registered source owns a ticker task that sleeps until the next
//! cron boundary and then fires the [`JobTarget`]. Registration is
//! idempotent replace: an existing entry for the same `source_id` is
//! aborted and swapped out under the registry lock, so the registry never
//! holds two active schedules for one source.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use indexmap::IndexMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::schedule::parse_cron;

/// Receives trigger firings. `fire` must return promptly; long-running work
/// is spawned by the implementation so the ticker is never delayed.
#[async_trait]
pub trait JobTarget: Send + Sync {
    async fn fire(&self, source_id: &str);
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid cron expression '{expr}': {source}")]
    InvalidSchedule {
        expr: String,
        #[source]
        source: cron::error::Error,
    },
}

/// Snapshot entry exposed to reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEntry {
    pub source_id: String,
    pub schedule: String,
    pub fingerprint: String,
}

struct RegisteredJob {
    schedule: String,
    fingerprint: String,
    ticker: JoinHandle<()>,
}

/// Mutex-guarded map of active recurring triggers, keyed by source id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<IndexMap<String, RegisteredJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the trigger for `source_id`.
    ///
    /// Must be called from within a tokio runtime (spawns the ticker task).
    pub fn register(
        &self,
        source_id: &str,
        schedule: &str,
        fingerprint: &str,
        target: Arc<dyn JobTarget>,
    ) -> Result<(), RegistryError> {
        let parsed = parse_cron(schedule).map_err(|e| RegistryError::InvalidSchedule {
            expr: schedule.to_string(),
            source: e,
        })?;

        let mut jobs = self.jobs.lock().unwrap();
        let ticker = tokio::spawn(run_ticker(source_id.to_string(), parsed, target));
        let replaced = jobs.insert(
            source_id.to_string(),
            RegisteredJob {
                schedule: schedule.to_string(),
                fingerprint: fingerprint.to_string(),
                ticker,
            },
        );
        if let Some(previous) = replaced {
            previous.ticker.abort();
            info!(source_id = %source_id, schedule = %schedule, "replaced scheduled job");
        } else {
            info!(source_id = %source_id, schedule = %schedule, "registered scheduled job");
        }
        Ok(())
    }

    /// Remove the trigger for `source_id` if present; no-op when absent.
    pub fn unregister(&self, source_id: &str) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.shift_remove(source_id) {
            job.ticker.abort();
            info!(source_id = %source_id, "unregistered scheduled job");
        }
    }

    /// Current registrations, in registration order.
    pub fn snapshot(&self) -> Vec<JobEntry> {
        let jobs = self.jobs.lock().unwrap();
        jobs.iter()
            .map(|(source_id, job)| JobEntry {
                source_id: source_id.clone(),
                schedule: job.schedule.clone(),
                fingerprint: job.fingerprint.clone(),
            })
            .collect()
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().unwrap().is_empty()
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        let jobs = self.jobs.lock().unwrap();
        for job in jobs.values() {
            job.ticker.abort();
        }
    }
}

/// Sleep until each upcoming cron boundary and fire the target.
///
/// Firings are independent: the ticker does not wait for a previous run to
/// finish, so a slow run and the next firing proceed concurrently.
async fn run_ticker(source_id: String, schedule: Schedule, target: Arc<dyn JobTarget>) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.after(&now).next() else {
            warn!(source_id = %source_id, "schedule has no future fire time, ticker exiting");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        debug!(source_id = %source_id, "trigger fired");
        target.fire(&source_id).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingTarget {
        fires: AtomicUsize,
    }

    #[async_trait]
    impl JobTarget for CountingTarget {
        async fn fire(&self, _source_id: &str) {
            self.fires.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn target() -> Arc<CountingTarget> {
        Arc::new(CountingTarget::default())
    }

    #[tokio::test]
    async fn test_register_twice_keeps_single_entry() {
        let registry = JobRegistry::new();
        let t = target();
        registry
            .register("weather-api", "0 */5 * * * *", "https://a", t.clone())
            .unwrap();
        registry
            .register("weather-api", "0 */10 * * * *", "https://a", t.clone())
            .unwrap();

        assert_eq!(registry.len(), 1);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].schedule, "0 */10 * * * *");
    }

    #[tokio::test]
    async fn test_unregister_absent_is_noop() {
        let registry = JobRegistry::new();
        registry.unregister("never-registered");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let registry = JobRegistry::new();
        let result = registry.register("bad", "not a cron", "fp", target());
        assert!(matches!(result, Err(RegistryError::InvalidSchedule { .. })));
        assert!(!registry.contains("bad"));
    }

    #[tokio::test]
    async fn test_snapshot_carries_fingerprint() {
        let registry = JobRegistry::new();
        registry
            .register("a", "0 * * * * *", "https://one", target())
            .unwrap();
        registry
            .register("b", "0 * * * * *", "https://two", target())
            .unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].fingerprint, "https://one");
        assert_eq!(snapshot[1].fingerprint, "https://two");
    }

    #[tokio::test]
    async fn test_ticker_fires_and_stops_on_unregister() {
        let registry = JobRegistry::new();
        let t = target();
        // Every-second schedule: waiting just over two seconds guarantees
        // at least one boundary crossing.
        registry
            .register("ticking", "* * * * * *", "fp", t.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let fired = t.fires.load(Ordering::SeqCst);
        assert!(fired >= 1, "expected at least one firing, saw {fired}");

        registry.unregister("ticking");
        let after_stop = t.fires.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(t.fires.load(Ordering::SeqCst), after_stop);
    }
}
