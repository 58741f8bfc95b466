//! End-to-end tests: replayed drive through the map session, and the HTTP hazard feed

use async_trait::async_trait;
use hazard_nav::domain::error::{HazardFeedError, LocationError, RouteError};
use hazard_nav::domain::types::{EngineStatus, RouteRequest, RouteResult};
use hazard_nav::infra::{Config, Metrics};
use hazard_nav::io::hazard_feed::{FeedBatch, HazardRecord, HazardSource};
use hazard_nav::io::{create_sink_channel, GeoClock, HazardFeedClient, ReplaySource, SinkEvent, SubscribeMode};
use hazard_nav::services::{HazardIndex, MapSession, RoutingProvider};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

struct NoRoutes;

#[async_trait]
impl RoutingProvider for NoRoutes {
    async fn candidates(&self, _request: &RouteRequest) -> Result<Vec<RouteResult>, RouteError> {
        Ok(vec![])
    }
}

fn record(kind: &str, lat: f64, lng: f64, radius: Option<f64>) -> HazardRecord {
    HazardRecord {
        lat,
        lng,
        kind: kind.to_string(),
        message: format!("{kind} ahead"),
        id: None,
        radius,
    }
}

#[tokio::test(start_paused = true)]
async fn test_replayed_drive_alerts_in_order() {
    let mut replay = NamedTempFile::new().unwrap();
    for line in [
        r#"{"lat": 13.0827, "lng": 80.2650}"#,
        r#"{"error": "unavailable", "delay_ms": 1000}"#,
        r#"{"lat": 13.0827, "lng": 80.2690, "delay_ms": 1000}"#,
        r#"{"lat": 13.0827, "lng": 80.2707, "delay_ms": 1000}"#,
        r#"{"lat": 13.1000, "lng": 80.2797, "delay_ms": 1000}"#,
    ] {
        writeln!(replay, "{line}").unwrap();
    }
    replay.flush().unwrap();

    let config = Config::default().without_hazard_feed();
    let index = Arc::new(HazardIndex::new(config.point_trigger_radius_m()));
    let hazards = FeedBatch::from_records(&[
        record("High Traffic", 13.0827, 80.2707, Some(300.0)),
        record("Speed Breaker", 13.1, 80.28, None),
    ])
    .hazards;

    let (sink, mut events) = create_sink_channel(256);
    let metrics = Arc::new(Metrics::new());
    let mut session =
        MapSession::new(&config, index, Arc::new(NoRoutes), Arc::new(sink), metrics.clone())
            .with_static_hazards(hazards);

    let source = ReplaySource::open(replay.path()).await.unwrap();
    let mut clock = GeoClock::new(Box::new(source), config.one_shot_timeout());
    let fixes = clock.subscribe(SubscribeMode::Continuous);
    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    drop(cmd_tx);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    // Returns once the replay is exhausted and no commands can arrive
    session.run(fixes, cmd_rx, shutdown_rx).await;

    let mut alerts = Vec::new();
    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SinkEvent::Alert(a) => alerts.push(a.kind),
            SinkEvent::Status(s) => statuses.push(s.status),
            _ => {}
        }
    }

    assert_eq!(alerts, vec!["traffic_zone", "speed_breaker"]);
    assert_eq!(
        statuses,
        vec![
            EngineStatus::LocationLive,
            EngineStatus::LocationLost { error: LocationError::Unavailable },
            EngineStatus::LocationLive,
        ]
    );
    assert_eq!(metrics.fixes_total(), 4);
    assert_eq!(metrics.alerts_total(), 2);
}

/// Serve one canned HTTP response per connection
async fn serve_once(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });
    format!("http://{addr}/alerts")
}

#[tokio::test]
async fn test_feed_client_parses_backend_response() {
    let url = serve_once(
        "HTTP/1.1 200 OK",
        r#"[{"type": "Speed Breaker", "lat": 13.1, "lng": 80.28, "message": "Speed breaker ahead"},
            {"type": "Broken", "lat": 999, "lng": 80.0}]"#,
    )
    .await;

    let client = HazardFeedClient::new(&url, Duration::from_secs(2)).unwrap();
    let batch = client.fetch().await.unwrap();
    assert_eq!(batch.hazards.len(), 1);
    assert_eq!(batch.skipped, 1);
}

#[tokio::test]
async fn test_feed_client_maps_failures() {
    let url = serve_once("HTTP/1.1 503 Service Unavailable", r#"{"error":"down"}"#).await;
    let client = HazardFeedClient::new(&url, Duration::from_secs(2)).unwrap();
    assert!(matches!(client.fetch().await, Err(HazardFeedError::Unreachable(_))));

    let url = serve_once("HTTP/1.1 200 OK", r#"{"alerts": []}"#).await;
    let client = HazardFeedClient::new(&url, Duration::from_secs(2)).unwrap();
    assert!(matches!(client.fetch().await, Err(HazardFeedError::Malformed(_))));
}
