//! Process lifecycle: signal handling and the ordered pipeline shutdown.
//!
//! Probers stop first. Collectors keep draining until every prober has
//! returned, then empty the buffer and exit, so a sample published by an
//! in-flight probe is still written.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::monitoring::{Checker, Endpoint, MonitoringScheduler};
use crate::pipeline::{Collector, CollectorSettings, CollectorStats, SampleBuffer, collector_count};
use crate::pipeline::collector::DEFAULT_WORKER_COLLECTOR_RATIO;
use crate::sinks::{DurableSink, TelemetrySink};

/// Wait for SIGINT or, on unix, SIGTERM
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received interrupt"),
        () = terminate => info!("received terminate"),
    }
}

/// Cancel `token` on the first shutdown signal
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = wait_for_signal() => {
                info!("shutdown requested, stopping probers");
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    })
}

/// Release a listener from [`spawn_signal_listener`] that may still be waiting
pub async fn stop_signal_listener(token: &CancellationToken, listener: JoinHandle<()>) {
    token.cancel();
    if let Err(error) = listener.await {
        warn!(%error, "signal listener task failed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub collector: CollectorSettings,
    pub worker_collector_ratio: usize,
    pub buffer_capacity: Option<usize>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            collector: CollectorSettings::default(),
            worker_collector_ratio: DEFAULT_WORKER_COLLECTOR_RATIO,
            buffer_capacity: None,
        }
    }
}

impl PipelineSettings {
    /// Buffer warning each time another ten batches pile up
    pub fn buffer(&self) -> SampleBuffer {
        SampleBuffer::with_warn_step(
            self.buffer_capacity,
            self.collector.max_batch.saturating_mul(10),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub probers: usize,
    pub collectors: usize,
    pub published: u64,
    pub batches: u64,
    pub written: u64,
    pub dropped: u64,
    /// Samples still buffered after the collectors exited
    pub leftover: usize,
}

/// Probers, buffer and collectors wired together for one partition
pub struct Pipeline {
    endpoints: Vec<Arc<Endpoint>>,
    checker: Arc<dyn Checker>,
    store: Arc<dyn DurableSink>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        endpoints: Vec<Endpoint>,
        checker: Arc<dyn Checker>,
        store: Arc<dyn DurableSink>,
        telemetry: Option<Arc<dyn TelemetrySink>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
            checker,
            store,
            telemetry,
            settings,
        }
    }

    /// Run until `shutdown` is cancelled and the buffer has been drained
    pub async fn run(self, shutdown: CancellationToken) -> PipelineReport {
        let buffer = self.settings.buffer();
        let collectors = collector_count(self.endpoints.len(), self.settings.worker_collector_ratio);
        let drain = CancellationToken::new();

        info!(
            probers = self.endpoints.len(),
            collectors,
            max_batch = self.settings.collector.max_batch,
            "starting pipeline"
        );

        let collector_handles: Vec<_> = (0..collectors)
            .map(|id| {
                let collector = Collector::new(
                    id,
                    buffer.clone(),
                    Arc::clone(&self.store),
                    self.telemetry.clone(),
                    self.settings.collector,
                );
                tokio::spawn(collector.run(drain.clone()))
            })
            .collect();

        let scheduler = MonitoringScheduler::new(Arc::clone(&self.checker), buffer.clone());
        let prober_handles = scheduler.schedule_endpoints(&self.endpoints, &shutdown);

        let mut report = PipelineReport {
            probers: self.endpoints.len(),
            collectors,
            ..PipelineReport::default()
        };

        for result in join_all(prober_handles).await {
            match result {
                Ok(published) => report.published += published,
                Err(error) => warn!(%error, "prober task failed"),
            }
        }
        info!(published = report.published, "all probers stopped, draining buffer");

        drain.cancel();
        let mut stats = CollectorStats::default();
        for result in join_all(collector_handles).await {
            match result {
                Ok(collector_stats) => stats = stats.merge(collector_stats),
                Err(error) => error!(%error, "collector task failed"),
            }
        }

        report.batches = stats.batches;
        report.written = stats.written;
        report.dropped = stats.dropped;
        report.leftover = buffer.len();
        if report.leftover > 0 {
            warn!(leftover = report.leftover, "samples left in buffer at exit");
        }
        report
    }
}
