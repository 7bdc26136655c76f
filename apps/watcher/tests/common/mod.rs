#![allow(dead_code)]

use std::path::Path;

use libsql::params;
use uptime_watcher::config::Config;
use uptime_watcher::database::LibsqlStore;
use uptime_watcher::pool::open_pool;

/// Config pointing at a database inside `dir`, telemetry off
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.database.path = dir.join("watcher.db");
    config.database.max_connections = 4;
    config.collector.tick_interval_ms = 20;
    config.probe.timeout_seconds = 5;
    config.telemetry.enabled = false;
    config
}

pub async fn open_store(config: &Config) -> anyhow::Result<LibsqlStore> {
    let pool = open_pool(&config.database.path, 2).await?;
    let store = LibsqlStore::new_from_pool(pool);
    store.prepare().await?;
    Ok(store)
}

pub async fn insert_endpoint(
    store: &LibsqlStore,
    id: i64,
    url: &str,
    regex: Option<&str>,
    interval: i64,
) -> anyhow::Result<()> {
    let conn = store.pool().get().await?;
    conn.execute(
        "INSERT INTO endpoints (endpoint_id, url, regex, interval) VALUES (?, ?, ?, ?)",
        params![id, url, regex, interval],
    )
    .await?;
    Ok(())
}

/// A local URL nothing listens on
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/")
}
