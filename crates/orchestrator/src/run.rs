//! The pull orchestrator: entry point for one scheduled trigger firing.
//!
//! [`PullOrchestrator::run`] loads the source config, resolves the item
//! list, fans out one fetch task per item under a counting semaphore, and
//! aggregates every task's terminal outcome into a [`JobRunResult`]. One
//! item's permanent failure never cancels or delays its siblings; run-level
//! failures (missing config, failed discovery) abort before any fetch.
//! Nothing in here propagates an error to the caller — every failure folds
//! into the returned result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sluice_core::{
    AuthConfig, ConfigStore, ErrorCategory, FetchFailure, FetchOutcome, FetchSuccess,
    IterationItem, JobRunResult, PullSourceConfig,
};
use sluice_fetch::{template, HttpFetcher, HttpTransport, SecretResolver};

use crate::iteration::{IterationResolver, ToolInvoker};
use crate::sink::IngestSink;

/// One fanned-out unit of work; terminates in exactly one [`FetchOutcome`].
#[derive(Debug)]
pub struct FetchTask {
    pub item: IterationItem,
}

impl FetchTask {
    fn new(item: IterationItem) -> Self {
        Self { item }
    }
}

/// Coordinates discovery, request building, secret resolution, fetching,
/// and downstream forwarding for one source firing.
pub struct PullOrchestrator {
    configs: Arc<dyn ConfigStore>,
    resolver: IterationResolver,
    secrets: Arc<dyn SecretResolver>,
    fetcher: Arc<HttpFetcher>,
    sink: Arc<dyn IngestSink>,
}

impl PullOrchestrator {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        invoker: Arc<dyn ToolInvoker>,
        secrets: Arc<dyn SecretResolver>,
        transport: Arc<dyn HttpTransport>,
        sink: Arc<dyn IngestSink>,
    ) -> Self {
        Self {
            configs,
            resolver: IterationResolver::new(invoker),
            secrets,
            fetcher: Arc::new(HttpFetcher::new(transport)),
            sink,
        }
    }

    /// Execute one run for `source_id` and return the aggregate outcome.
    pub async fn run(&self, source_id: &str) -> JobRunResult {
        let started_at = Utc::now();
        let wall = Instant::now();

        let config = match self.configs.load(source_id).await {
            Ok(config) => Arc::new(config),
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "pull run aborted: config unavailable");
                return JobRunResult::aborted(
                    source_id,
                    ErrorCategory::ConfigNotFound,
                    e.to_string(),
                    started_at,
                );
            }
        };

        let items = match self.resolver.resolve(config.iteration.as_ref()).await {
            Ok(items) => items,
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "pull run aborted: discovery failed");
                return JobRunResult::aborted(
                    source_id,
                    ErrorCategory::DiscoveryFailed,
                    e.to_string(),
                    started_at,
                );
            }
        };

        let run_id = Uuid::new_v4();
        let total_tasks = items.len();
        info!(
            source_id = %source_id,
            run_id = %run_id,
            total_tasks = total_tasks,
            concurrency_limit = config.concurrency_limit,
            "pull run fanning out"
        );

        // Counting semaphore rather than fixed batches: a finished slot is
        // reused immediately instead of waiting out the whole batch.
        let semaphore = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
        let mut handles = Vec::with_capacity(total_tasks);
        for task in items.into_iter().map(FetchTask::new) {
            let semaphore = semaphore.clone();
            let config = config.clone();
            let secrets = self.secrets.clone();
            let fetcher = self.fetcher.clone();
            let sink = self.sink.clone();
            let source_id = source_id.to_string();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(FetchFailure {
                            category: ErrorCategory::NetworkOrServer,
                            message: "concurrency semaphore closed".to_string(),
                            attempts_used: 0,
                        });
                    }
                };
                execute_task(task, &config, secrets.as_ref(), &fetcher, sink.as_ref(), &source_id)
                    .await
            }));
        }

        let mut succeeded = 0usize;
        let mut failures = Vec::new();
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(_)) => succeeded += 1,
                Ok(Err(failure)) => failures.push(failure),
                // A panicked task is captured as one more failed outcome,
                // never a cancellation signal for its siblings.
                Err(join_error) => failures.push(FetchFailure {
                    category: ErrorCategory::NetworkOrServer,
                    message: format!("fetch task aborted: {join_error}"),
                    attempts_used: 0,
                }),
            }
        }

        let result = JobRunResult {
            run_id,
            source_id: source_id.to_string(),
            total_tasks,
            succeeded,
            failed: failures.len(),
            failures,
            error: None,
            started_at,
            duration_ms: wall.elapsed().as_millis() as u64,
        };

        info!(
            source_id = %result.source_id,
            run_id = %result.run_id,
            total_tasks = result.total_tasks,
            succeeded = result.succeeded,
            failed = result.failed,
            duration_ms = result.duration_ms,
            "pull run completed"
        );
        if result.failed > 0 {
            warn!(
                source_id = %result.source_id,
                run_id = %result.run_id,
                categories = ?result.category_counts(),
                "pull run had failures"
            );
        }
        result
    }
}

/// Run one fetch task to its terminal outcome. Auth and template failures
/// terminate before any HTTP request is issued.
async fn execute_task(
    task: FetchTask,
    config: &PullSourceConfig,
    secrets: &dyn SecretResolver,
    fetcher: &HttpFetcher,
    sink: &dyn IngestSink,
    source_id: &str,
) -> FetchOutcome {
    let inject_fields = config
        .iteration
        .as_ref()
        .map(|spec| spec.inject_fields.as_slice())
        .unwrap_or(&[]);
    let linkage = task.item.linkage(inject_fields);

    let mut headers = BTreeMap::new();
    if let AuthConfig::ApiKey(ref auth) = config.auth {
        match secrets.resolve(&auth.store, &auth.key).await {
            Ok(secret) => {
                headers.insert(auth.header_name.clone(), secret);
            }
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "secret resolution failed");
                return Err(FetchFailure {
                    category: ErrorCategory::AuthConfig,
                    message: e.to_string(),
                    attempts_used: 0,
                });
            }
        }
    }

    let request = match template::build(&config.request, &task.item) {
        Ok(request) => request,
        Err(e) => {
            warn!(source_id = %source_id, error = %e, "request template failed to resolve");
            return Err(FetchFailure {
                category: ErrorCategory::TemplateResolution,
                message: e.to_string(),
                attempts_used: 0,
            });
        }
    };

    let timeout = Duration::from_secs(config.timeout_secs);
    let (payload, attempts) = match fetcher.fetch(&request, &headers, timeout, &config.retry).await
    {
        Ok(fetched) => fetched,
        Err(failure) => {
            warn!(
                source_id = %source_id,
                category = %failure.category,
                attempts = failure.attempts_used,
                error = %failure.message,
                "fetch task failed permanently"
            );
            return Err(failure);
        }
    };
    debug!(
        source_id = %source_id,
        attempts = attempts,
        bytes = payload.len(),
        "fetch succeeded"
    );

    // Delivery is at-least-once; a failed handoff is logged, not retried.
    match sink.ingest(payload.clone(), &linkage, source_id).await {
        Ok(receipt) if receipt.duplicate => {
            debug!(source_id = %source_id, "payload suppressed as duplicate downstream");
        }
        Ok(_) => {}
        Err(e) => {
            warn!(source_id = %source_id, error = %e, "downstream ingest failed");
        }
    }

    Ok(FetchSuccess { payload, linkage })
}

// ── Tests ────────────────────────────────────────────────────────────
