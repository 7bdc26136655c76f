//! Batch-draining consumers of the sample buffer.
//!
//! Each tick a collector takes at most `max_batch` samples, writes them to the
//! durable sink and forwards them to telemetry. A failed write drops the batch;
//! it is never put back into the buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::buffer::SampleBuffer;
use crate::monitoring::Sample;
use crate::sinks::{DurableSink, TelemetrySink};

/// Upper bound on samples taken from the buffer in one tick
pub const MAX_BATCH: usize = 1000;
/// Pause between two ticks
pub const DEFAULT_TICK: Duration = Duration::from_millis(200);
/// Probers served by one collector
pub const DEFAULT_WORKER_COLLECTOR_RATIO: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub tick: Duration,
    pub max_batch: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self { tick: DEFAULT_TICK, max_batch: MAX_BATCH }
    }
}

/// Number of collectors for `probers` probers: one per `ratio`, at least one
pub fn collector_count(probers: usize, ratio: usize) -> usize {
    probers.div_ceil(ratio.max(1)).max(1)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub batches: u64,
    pub written: u64,
    pub dropped: u64,
}

impl CollectorStats {
    pub fn merge(self, other: Self) -> Self {
        Self {
            batches: self.batches + other.batches,
            written: self.written + other.written,
            dropped: self.dropped + other.dropped,
        }
    }
}

pub struct Collector {
    id: usize,
    buffer: SampleBuffer,
    store: Arc<dyn DurableSink>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    settings: CollectorSettings,
    pushes: JoinSet<()>,
    stats: CollectorStats,
}

impl Collector {
    pub fn new(
        id: usize,
        buffer: SampleBuffer,
        store: Arc<dyn DurableSink>,
        telemetry: Option<Arc<dyn TelemetrySink>>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            id,
            buffer,
            store,
            telemetry,
            settings,
            pushes: JoinSet::new(),
            stats: CollectorStats::default(),
        }
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Drain and deliver one batch. Returns the batch size, 0 when idle.
    pub async fn tick(&mut self) -> usize {
        self.reap_pushes();

        let batch = self.buffer.pop_batch(self.settings.max_batch);
        if batch.is_empty() {
            return 0;
        }

        let size = batch.len();
        let batch: Arc<[Sample]> = batch.into();
        self.stats.batches += 1;
        debug!(collector = self.id, batch = size, "collector consumes batch");

        // Telemetry runs alongside the write and never waits for it.
        if let Some(telemetry) = &self.telemetry {
            let telemetry = Arc::clone(telemetry);
            let batch = Arc::clone(&batch);
            let id = self.id;
            self.pushes.spawn(async move {
                if let Err(error) = telemetry.push(&batch).await {
                    warn!(collector = id, batch = batch.len(), %error, "telemetry push failed");
                }
            });
        }

        match self.store.write_batch(&batch).await {
            Ok(()) => self.stats.written += size as u64,
            Err(error) => {
                self.stats.dropped += size as u64;
                error!(collector = self.id, batch = size, %error, "sample batch dropped, durable write failed");
            }
        }

        size
    }

    /// Tick until `shutdown` fires, then drain what is left.
    pub async fn run(mut self, shutdown: CancellationToken) -> CollectorStats {
        info!(collector = self.id, "collector started");

        while !shutdown.is_cancelled() {
            self.tick().await;

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.settings.tick) => {}
            }
        }

        while self.tick().await > 0 {}
        self.wait_pushes().await;

        info!(
            collector = self.id,
            batches = self.stats.batches,
            written = self.stats.written,
            dropped = self.stats.dropped,
            "collector stopped"
        );
        self.stats
    }

    /// Wait for every telemetry push still in flight
    pub async fn wait_pushes(&mut self) {
        while let Some(result) = self.pushes.join_next().await {
            self.log_push_join(result);
        }
    }

    fn reap_pushes(&mut self) {
        while let Some(result) = self.pushes.try_join_next() {
            self.log_push_join(result);
        }
    }

    fn log_push_join(&self, result: Result<(), tokio::task::JoinError>) {
        if let Err(error) = result {
            warn!(collector = self.id, %error, "telemetry push task failed");
        }
    }
}
