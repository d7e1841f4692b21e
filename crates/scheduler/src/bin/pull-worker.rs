//! pull-worker — schedules and executes configured pull sources.
//!
//! Reads a YAML file of pull source configs, registers one cron trigger per
//! enabled source, and re-reads the file periodically so external config
//! changes are picked up without a restart. Each firing fans out into
//! bounded-concurrency fetches whose payloads are forwarded to the
//! downstream content pipeline endpoint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use sluice_core::{InMemoryConfigStore, PullSourceConfig};
use sluice_fetch::{EnvSecretResolver, ReqwestTransport};
use sluice_orchestrator::{HttpIngestSink, HttpToolInvoker, PullOrchestrator};
use sluice_scheduler::{JobRegistry, JobSyncService, OrchestratorTarget};

// ── CLI ─────────────────────────────────────────────────────────────

/// Scheduled pull ingestion worker.
#[derive(Parser, Debug)]
#[command(name = "pull-worker", version, about)]
struct Cli {
    /// Path to the YAML file listing pull source configs.
    #[arg(long, env = "SLUICE_SOURCES", default_value = "config/sources.yaml")]
    sources: PathBuf,

    /// Discovery tool endpoint (iteration fan-out).
    #[arg(long, env = "SLUICE_DISCOVERY_URL")]
    discovery_url: String,

    /// Downstream content pipeline endpoint.
    #[arg(long, env = "SLUICE_SINK_URL")]
    sink_url: String,

    /// Seconds between sources-file re-reads (config change polling).
    #[arg(long, env = "SLUICE_RELOAD_INTERVAL", default_value_t = 60)]
    reload_interval_secs: u64,
}

fn load_sources(path: &PathBuf) -> anyhow::Result<Vec<PullSourceConfig>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = Arc::new(InMemoryConfigStore::new());
    let orchestrator = Arc::new(PullOrchestrator::new(
        store.clone(),
        Arc::new(HttpToolInvoker::new(cli.discovery_url.clone())),
        Arc::new(EnvSecretResolver::new()),
        Arc::new(ReqwestTransport::new()),
        Arc::new(HttpIngestSink::new(cli.sink_url.clone())),
    ));
    let registry = Arc::new(JobRegistry::new());
    let sync = JobSyncService::new(
        registry.clone(),
        Arc::new(OrchestratorTarget::new(orchestrator)),
    );

    info!(
        sources = %cli.sources.display(),
        reload_interval_secs = cli.reload_interval_secs,
        "pull worker started"
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(cli.reload_interval_secs.max(1)));
    loop {
        interval.tick().await;
        match load_sources(&cli.sources) {
            Ok(configs) => {
                store.replace_all(configs.clone()).await;
                sync.sync_all(&configs);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %cli.sources.display(),
                    "failed to load sources file, keeping previous registrations"
                );
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_sources_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
- source_id: weather-api
  schedule: "0 */15 * * * *"
  request:
    base_url: https://api.example.com/weather
    params:
      region: "{{item.region_id}}"
  iteration:
    tool_name: list_regions
    inject_fields: [region_id]
- source_id: prices-api
  schedule: "0 0 * * *"
  request:
    base_url: https://api.example.com/prices
  enabled: false
"#
        )
        .unwrap();

        let configs = load_sources(&file.path().to_path_buf()).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].source_id, "weather-api");
        assert_eq!(
            configs[0].iteration.as_ref().unwrap().tool_name,
            "list_regions"
        );
        assert_eq!(
            configs[0].request.params["region"],
            "{item.region_id}"
        );
        assert!(!configs[1].enabled);
        assert_eq!(configs[1].retry.max_attempts, 3);
    }

    #[test]
    fn test_load_sources_missing_file_errors() {
        let missing = PathBuf::from("/definitely/not/here.yaml");
        assert!(load_sources(&missing).is_err());
    }
}
