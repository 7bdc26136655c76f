use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Bring the schema up to date.
///
/// Safe to run on every start and from several instances of the watcher.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!(version = current_version, "database schema is up to date");
        return Ok(());
    }

    tracing::info!(from = current_version, to = SCHEMA_VERSION, "running migrations");

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Endpoint registry").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Time-chunked samples table").await?;
    }

    tracing::info!(version = SCHEMA_VERSION, "database migrations completed");
    Ok(())
}

/// Current schema version, 0 on a fresh database
pub async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!(version, description, "applied migration");
    Ok(())
}

/// Migration v1: endpoint registry
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS endpoints (
            endpoint_id INTEGER PRIMARY KEY,
            url TEXT NOT NULL,
            regex TEXT,
            interval INTEGER CHECK (interval >= 5 AND interval <= 300)
        )",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: samples, clustered by `(start_time, endpoint_id)`.
///
/// `chunk` is the UTC day of `start_time`; range scans go through
/// `idx_samples_chunk` one day-chunk at a time.
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS samples (
            start_time INTEGER NOT NULL,
            endpoint_id INTEGER NOT NULL REFERENCES endpoints(endpoint_id),
            duration REAL NOT NULL CHECK (duration >= 0),
            status_code INTEGER NOT NULL,
            regex_match INTEGER NOT NULL,
            chunk INTEGER NOT NULL,
            PRIMARY KEY (start_time, endpoint_id)
        ) WITHOUT ROWID",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_samples_chunk ON samples(chunk, start_time)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_samples_endpoint ON samples(endpoint_id, start_time DESC)",
        (),
    )
    .await?;

    Ok(())
}
