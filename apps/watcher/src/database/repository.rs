use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tracing::{debug, warn};

use crate::monitoring::{Endpoint, Partition, Sample};
use crate::pool::LibsqlPool;
use crate::sinks::{DurableSink, SinkError};

/// Width of one storage chunk in seconds (one UTC day)
pub const CHUNK_SECONDS: i64 = 86_400;

/// Source of the endpoints this instance monitors
#[async_trait]
pub trait EndpointRegistry: Send + Sync {
    /// Endpoints owned by `partition`, invalid rows skipped with a warning
    async fn fetch_endpoints(&self, partition: Partition) -> Result<Vec<Endpoint>>;
}

/// A sample row read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSample {
    pub start_time: DateTime<Utc>,
    pub endpoint_id: i64,
    pub duration: f64,
    pub status_code: u16,
    pub content_match: bool,
}

/// Storage chunk holding samples started at `time`
pub fn chunk_of(time: DateTime<Utc>) -> i64 {
    time.timestamp().div_euclid(CHUNK_SECONDS)
}

/// Endpoint registry and sample store on one libsql pool
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &LibsqlPool {
        &self.pool
    }

    /// Make sure every table and index exists
    pub async fn prepare(&self) -> Result<()> {
        let conn = self.pool.get().await?;
        super::initialize_database(&conn).await
    }

    /// Insert a batch in one transaction.
    ///
    /// Rows already present for `(start_time, endpoint_id)` are ignored. Any
    /// other failure, an unknown endpoint included, rolls the whole batch back.
    pub async fn insert_samples(&self, batch: &[Sample]) -> Result<u64, SinkError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let conn = self.pool.get().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await?;

        let outcome = match insert_rows(&conn, batch).await {
            Ok(inserted) => conn.execute("COMMIT", ()).await.map(|_| inserted),
            Err(error) => Err(error),
        };

        if outcome.is_err() {
            if let Err(error) = conn.execute("ROLLBACK", ()).await {
                warn!(%error, "rollback of failed sample batch failed");
            }
        }

        Ok(outcome?)
    }

    /// Number of stored samples for one endpoint
    pub async fn count_samples(&self, endpoint_id: i64) -> Result<u64> {
        let conn = self.pool.get().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM samples WHERE endpoint_id = ?", params![endpoint_id])
            .await?;

        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(u64::try_from(count)?)
    }

    /// Samples started in `[from, to)`, oldest first
    pub async fn samples_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredSample>> {
        let conn = self.pool.get().await?;
        let mut rows = conn
            .query(
                "SELECT start_time, endpoint_id, duration, status_code, regex_match FROM samples
                 WHERE chunk BETWEEN ?1 AND ?2 AND start_time >= ?3 AND start_time < ?4
                 ORDER BY start_time, endpoint_id",
                params![chunk_of(from), chunk_of(to), from.timestamp_micros(), to.timestamp_micros()],
            )
            .await?;

        let mut samples = Vec::new();
        while let Some(row) = rows.next().await? {
            let micros: i64 = row.get(0)?;
            samples.push(StoredSample {
                start_time: DateTime::from_timestamp_micros(micros)
                    .ok_or_else(|| anyhow!("stored start_time {micros} is out of range"))?,
                endpoint_id: row.get(1)?,
                duration: row.get(2)?,
                status_code: u16::try_from(row.get::<i64>(3)?)?,
                content_match: row.get::<i64>(4)? != 0,
            });
        }

        Ok(samples)
    }
}

async fn insert_rows(conn: &Connection, batch: &[Sample]) -> Result<u64, libsql::Error> {
    let mut inserted = 0;
    for sample in batch {
        inserted += conn
            .execute(
                "INSERT OR IGNORE INTO samples
                 (start_time, endpoint_id, duration, status_code, regex_match, chunk)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    sample.start_time().timestamp_micros(),
                    sample.endpoint_id(),
                    sample.duration(),
                    i64::from(sample.status_code()),
                    i64::from(sample.content_match()),
                    chunk_of(sample.start_time())
                ],
            )
            .await?;
    }
    Ok(inserted)
}

#[async_trait]
impl EndpointRegistry for LibsqlStore {
    async fn fetch_endpoints(&self, partition: Partition) -> Result<Vec<Endpoint>> {
        let conn = self.pool.get().await?;
        // Euclidean modulo, same rule as `Partition::owns`.
        let mut rows = conn
            .query(
                "SELECT endpoint_id, url, regex, interval FROM endpoints
                 WHERE ((endpoint_id % ?1) + ?1) % ?1 = ?2
                 ORDER BY endpoint_id",
                params![partition.count(), partition.id()],
            )
            .await?;

        let mut endpoints = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: i64 = row.get(0)?;
            let url: String = row.get(1)?;
            let regex: Option<String> = row.get(2)?;
            let interval = row
                .get::<Option<i64>>(3)?
                .and_then(|seconds| u64::try_from(seconds).ok())
                .unwrap_or(0);

            match Endpoint::new(id, &url, regex.as_deref(), interval) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(error) => warn!(endpoint_id = id, %url, %error, "skipping invalid endpoint"),
            }
        }

        debug!(%partition, count = endpoints.len(), "endpoints loaded");
        Ok(endpoints)
    }
}

#[async_trait]
impl DurableSink for LibsqlStore {
    async fn write_batch(&self, batch: &[Sample]) -> Result<(), SinkError> {
        let inserted = self.insert_samples(batch).await?;
        debug!(batch = batch.len(), inserted, "sample batch stored");
        Ok(())
    }
}
