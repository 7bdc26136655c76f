use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::{SinkError, TelemetrySink};
use crate::monitoring::Sample;

/// Path of the metrics write API on the telemetry agent
pub const WRITE_PATH: &str = "/v1/write/metrics";

/// One metric point as accepted by the telemetry agent
#[derive(Debug, Serialize)]
pub struct MetricPoint<'a> {
    pub measurement: &'a str,
    pub tags: PointTags<'a>,
    pub fields: PointFields,
}

#[derive(Debug, Serialize)]
pub struct PointTags<'a> {
    pub endpoint: &'a str,
    pub endpoint_id: String,
    pub status_code: String,
    pub regex_match: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PointFields {
    pub response_time: f64,
    pub status_code: u16,
    pub regex_match: u8,
}

impl<'a> MetricPoint<'a> {
    pub fn from_sample(measurement: &'a str, sample: &'a Sample) -> Self {
        Self {
            measurement,
            tags: PointTags {
                endpoint: sample.endpoint().url().as_str(),
                endpoint_id: sample.endpoint_id().to_string(),
                status_code: sample.status_code().to_string(),
                regex_match: if sample.content_match() { "true" } else { "false" },
            },
            fields: PointFields {
                response_time: sample.duration(),
                status_code: sample.status_code(),
                regex_match: u8::from(sample.content_match()),
            },
        }
    }
}

/// Fire-and-forget HTTP push of sample batches
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    url: String,
    measurement: String,
}

impl HttpTelemetrySink {
    /// `base_url` is the agent root, e.g. `http://localhost:9529`
    pub fn new(base_url: &str, measurement: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: format!("{}{WRITE_PATH}", base_url.trim_end_matches('/')),
            measurement: measurement.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn push(&self, batch: &[Sample]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }

        let points: Vec<MetricPoint<'_>> =
            batch.iter().map(|sample| MetricPoint::from_sample(&self.measurement, sample)).collect();

        let response = self.client.post(&self.url).json(&points).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::TelemetryStatus { status: status.as_u16(), body });
        }

        debug!(points = points.len(), "telemetry batch pushed");
        Ok(())
    }
}
