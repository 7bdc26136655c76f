//! Startup wiring: configuration to a running pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{EndpointRegistry, LibsqlStore};
use crate::lifecycle::{
    Pipeline, PipelineReport, PipelineSettings, spawn_signal_listener, stop_signal_listener,
};
use crate::monitoring::{HttpChecker, Partition};
use crate::pipeline::CollectorSettings;
use crate::pool::open_pool;
use crate::sinks::{HttpTelemetrySink, TelemetrySink};

pub struct Orchestrator {
    config: Arc<Config>,
    partition: Partition,
    store: Arc<LibsqlStore>,
}

impl Orchestrator {
    /// Create and start a new orchestrator, stopping on SIGINT or SIGTERM
    pub async fn start(config: Config) -> Result<PipelineReport> {
        let orchestrator = Self::new(config).await?;
        let shutdown = CancellationToken::new();
        let listener = spawn_signal_listener(shutdown.clone());

        let report = orchestrator.run(shutdown.clone()).await;

        stop_signal_listener(&shutdown, listener).await;
        report
    }

    /// Validate the configuration and open the store
    ///
    /// An invalid partition is fatal before any connection is opened.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let partition = Partition::new(config.partition.count, config.partition.id)
            .context("invalid partition configuration")?;

        let store = open_store(&config).await?;

        Ok(Self { config: Arc::new(config), partition, store: Arc::new(store) })
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Load the owned endpoints and run the pipeline until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) -> Result<PipelineReport> {
        let endpoints = self.store.fetch_endpoints(self.partition).await?;
        if endpoints.is_empty() {
            warn!(partition = %self.partition, "no endpoints owned by this partition, nothing to do");
            return Ok(PipelineReport::default());
        }
        info!(partition = %self.partition, endpoints = endpoints.len(), "endpoints assigned");

        let checker = HttpChecker::new(self.config.probe.timeout(), &self.config.probe.user_agent)
            .context("failed to build probe client")?;

        let telemetry = if self.config.telemetry.enabled {
            let sink = HttpTelemetrySink::new(
                &self.config.telemetry.base_url(),
                &self.config.telemetry.measurement,
                self.config.telemetry.timeout(),
            )
            .context("failed to build telemetry client")?;
            info!(url = sink.url(), "telemetry push enabled");
            Some(Arc::new(sink) as Arc<dyn TelemetrySink>)
        } else {
            info!("telemetry push disabled");
            None
        };

        let pipeline = Pipeline::new(
            endpoints,
            Arc::new(checker),
            self.store.clone(),
            telemetry,
            pipeline_settings(&self.config),
        );
        let report = pipeline.run(shutdown).await;

        info!(
            published = report.published,
            batches = report.batches,
            written = report.written,
            dropped = report.dropped,
            leftover = report.leftover,
            "pipeline stopped"
        );
        Ok(report)
    }
}

/// Establish schema readiness and return
pub async fn prepare(config: &Config) -> Result<()> {
    config.validate()?;
    open_store(config).await?;
    info!(path = %config.database.path.display(), "database ready");
    Ok(())
}

async fn open_store(config: &Config) -> Result<LibsqlStore> {
    let pool = open_pool(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open database {}", config.database.path.display()))?;
    let store = LibsqlStore::new_from_pool(pool);
    store.prepare().await.context("failed to prepare database schema")?;
    Ok(store)
}

fn pipeline_settings(config: &Config) -> PipelineSettings {
    PipelineSettings {
        collector: CollectorSettings {
            tick: config.collector.tick(),
            max_batch: config.collector.max_batch,
        },
        worker_collector_ratio: config.collector.worker_collector_ratio,
        buffer_capacity: config.collector.buffer_capacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.database.path = dir.join("watcher.db");
        config.telemetry.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_invalid_partition_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.partition.count = 2;
        config.partition.id = 2;

        assert!(Orchestrator::new(config).await.is_err());
        assert!(!dir.path().join("watcher.db").exists());
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        prepare(&config).await.unwrap();
        prepare(&config).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_endpoints_returns_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(config_in(dir.path())).await.unwrap();

        let report = orchestrator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report, PipelineReport::default());
    }

    #[test]
    fn test_pipeline_settings_follow_config() {
        let mut config = Config::default();
        config.collector.max_batch = 250;
        config.collector.buffer_capacity = Some(64);

        let settings = pipeline_settings(&config);
        assert_eq!(settings.collector.max_batch, 250);
        assert_eq!(settings.buffer_capacity, Some(64));
        assert_eq!(settings.worker_collector_ratio, 5000);
    }
}
