//! Downstream destinations for finished sample batches.
//!
//! The collector only talks to these traits, so tests can swap in doubles.

pub mod telemetry;

pub use telemetry::HttpTelemetrySink;

use thiserror::Error;

use crate::monitoring::Sample;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telemetry endpoint answered {status}: {body}")]
    TelemetryStatus { status: u16, body: String },
}

/// Durable, time-partitioned sample storage
#[async_trait::async_trait]
pub trait DurableSink: Send + Sync {
    /// Write the whole batch or nothing
    async fn write_batch(&self, batch: &[Sample]) -> Result<(), SinkError>;
}

/// Best-effort external telemetry
#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn push(&self, batch: &[Sample]) -> Result<(), SinkError>;
}
