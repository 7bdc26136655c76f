use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::checker::Checker;
use super::endpoint::Endpoint;
use crate::pipeline::SampleBuffer;

/// Polling loop for a single endpoint
pub struct Prober {
    endpoint: Arc<Endpoint>,
    checker: Arc<dyn Checker>,
    buffer: SampleBuffer,
}

impl Prober {
    pub fn new(endpoint: Arc<Endpoint>, checker: Arc<dyn Checker>, buffer: SampleBuffer) -> Self {
        Self { endpoint, checker, buffer }
    }

    /// Probe, publish, sleep, until `shutdown` fires.
    ///
    /// A probe already in flight when shutdown fires still completes and its
    /// sample is published. Returns the number of published samples.
    pub async fn run(self, shutdown: CancellationToken) -> u64 {
        let mut published = 0;

        while !shutdown.is_cancelled() {
            let sample = self.checker.check(&self.endpoint).await;
            debug!(
                endpoint_id = sample.endpoint_id(),
                status_code = sample.status_code(),
                content_match = sample.content_match(),
                duration = sample.duration(),
                "probe finished"
            );

            self.buffer.publish(sample).await;
            published += 1;

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.endpoint.interval()) => {}
            }
        }

        debug!(endpoint_id = self.endpoint.id(), published, "prober stopped");
        published
    }
}

/// Spawns one prober task per endpoint
pub struct MonitoringScheduler {
    checker: Arc<dyn Checker>,
    buffer: SampleBuffer,
}

impl MonitoringScheduler {
    pub fn new(checker: Arc<dyn Checker>, buffer: SampleBuffer) -> Self {
        Self { checker, buffer }
    }

    /// Schedule a single endpoint for periodic probing
    pub fn schedule_endpoint(
        &self,
        endpoint: Arc<Endpoint>,
        shutdown: CancellationToken,
    ) -> JoinHandle<u64> {
        let prober = Prober::new(endpoint, Arc::clone(&self.checker), self.buffer.clone());
        tokio::spawn(prober.run(shutdown))
    }

    /// Schedule every endpoint
    pub fn schedule_endpoints(
        &self,
        endpoints: &[Arc<Endpoint>],
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<u64>> {
        let handles: Vec<_> = endpoints
            .iter()
            .map(|endpoint| self.schedule_endpoint(Arc::clone(endpoint), shutdown.clone()))
            .collect();
        info!(probers = handles.len(), "probers scheduled");
        handles
    }
}
