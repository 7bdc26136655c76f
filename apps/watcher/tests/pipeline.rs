mod common;

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uptime_watcher::orchestrator::Orchestrator;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{insert_endpoint, open_store, refused_url, test_config};

async fn target() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503).set_body_string("hello"))
        .mount(&server)
        .await;
    server
}

fn cancel_after(token: &CancellationToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

#[tokio::test]
async fn test_probe_results_reach_store_and_telemetry() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = target().await;
    let telemetry = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/write/metrics"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&telemetry)
        .await;

    let mut config = test_config(dir.path());
    config.telemetry.enabled = true;
    config.telemetry.host = telemetry.address().ip().to_string();
    config.telemetry.port = telemetry.address().port();

    let store = open_store(&config).await?;
    insert_endpoint(&store, 1, &format!("{}/ok", server.uri()), Some("hello"), 5).await?;
    insert_endpoint(&store, 2, &format!("{}/ok", server.uri()), Some("world"), 5).await?;
    insert_endpoint(&store, 3, &format!("{}/down", server.uri()), None, 5).await?;
    insert_endpoint(&store, 4, &refused_url(), None, 5).await?;

    let started = Utc::now();
    let orchestrator = Orchestrator::new(config).await?;
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, Duration::from_secs(2));
    let report = orchestrator.run(shutdown).await?;

    assert_eq!(report.probers, 4);
    assert_eq!(report.published, 4);
    assert_eq!(report.written, 4);
    assert_eq!(report.leftover, 0);

    let stored = store.samples_between(started - chrono::Duration::minutes(1), Utc::now()).await?;
    let mut rows: Vec<_> = stored.iter().map(|s| (s.endpoint_id, s.status_code, s.content_match)).collect();
    rows.sort();
    assert_eq!(rows, vec![(1, 200, true), (2, 200, false), (3, 503, false), (4, 0, false)]);
    assert!(stored.iter().all(|s| s.duration >= 0.0));

    let pushed: usize = telemetry
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| {
            let points: Value = serde_json::from_slice(&request.body).unwrap();
            let points = points.as_array().unwrap();
            assert!(points.iter().all(|p| p["measurement"] == "site_uptime_watcher"));
            points.len()
        })
        .sum();
    assert_eq!(pushed, 4);
    Ok(())
}

#[tokio::test]
async fn test_partition_probes_only_owned_endpoints() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = test_config(dir.path());
    config.partition.count = 2;
    config.partition.id = 0;

    let store = open_store(&config).await?;
    for id in 1..=4 {
        insert_endpoint(&store, id, &format!("{}/e{id}", server.uri()), None, 5).await?;
    }

    let orchestrator = Orchestrator::new(config).await?;
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, Duration::from_secs(1));
    let report = orchestrator.run(shutdown).await?;
    assert_eq!(report.published, 2);

    let mut paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["/e2", "/e4"]);

    assert_eq!(store.count_samples(2).await?, 1);
    assert_eq!(store.count_samples(1).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_telemetry_failure_does_not_block_storage() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = target().await;

    let mut config = test_config(dir.path());
    config.telemetry.enabled = true;
    let unreachable = url::Url::parse(&refused_url())?;
    config.telemetry.host = unreachable.host_str().unwrap_or("127.0.0.1").to_string();
    config.telemetry.port = unreachable.port().unwrap_or(9);
    config.telemetry.timeout_seconds = 1;

    let store = open_store(&config).await?;
    insert_endpoint(&store, 7, &format!("{}/ok", server.uri()), None, 5).await?;

    let orchestrator = Orchestrator::new(config).await?;
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, Duration::from_secs(1));
    let report = orchestrator.run(shutdown).await?;

    assert_eq!(report.written, 1);
    assert_eq!(store.count_samples(7).await?, 1);
    Ok(())
}
