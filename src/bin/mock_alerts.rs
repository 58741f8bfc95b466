//! Mock hazard alerts backend
//!
//! Serves the hazard feed the map screen consumes:
//!
//!   GET /alerts -> [{"type", "lat", "lng", "message"}, ...]
//!
//! with permissive CORS so a browser map can call it directly.
//!
//! Usage:
//!   cargo run --bin mock_alerts -- --port 5000
//!   cargo run --bin mock_alerts -- --file hazards.json
//!   cargo run --bin mock_alerts -- --fail-every 3

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use hazard_nav::io::hazard_feed::{parse_feed, HazardRecord};
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "mock_alerts")]
#[command(about = "Mock hazard alerts backend for local simulation")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// JSON file with a hazard array to serve instead of the built-in sample
    #[arg(short, long)]
    file: Option<String>,

    /// Answer every Nth request with 503 (0 = never)
    #[arg(long, default_value = "0")]
    fail_every: u64,
}

fn sample_alerts() -> Vec<HazardRecord> {
    let record = |kind: &str, lat: f64, lng: f64, message: &str| HazardRecord {
        lat,
        lng,
        kind: kind.to_string(),
        message: message.to_string(),
        id: None,
        radius: None,
    };
    vec![
        record("High Traffic", 13.0827, 80.2707, "Heavy traffic in Chennai"),
        record("Animal Crossing", 13.07, 80.24, "Watch for animals"),
        record("Speed Breaker", 13.1, 80.28, "Speed breaker ahead"),
    ]
}

struct Feed {
    body: String,
    fail_every: u64,
    requests: AtomicU64,
}

fn respond(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    response
}

async fn handle(req: Request<hyper::body::Incoming>, feed: Arc<Feed>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/alerts") => {
            let n = feed.requests.fetch_add(1, Ordering::Relaxed) + 1;
            if feed.fail_every > 0 && n % feed.fail_every == 0 {
                println!("[MOCK] GET /alerts #{n} -> 503");
                respond(StatusCode::SERVICE_UNAVAILABLE, r#"{"error":"unavailable"}"#.to_string())
            } else {
                println!("[MOCK] GET /alerts #{n}");
                respond(StatusCode::OK, feed.body.clone())
            }
        }
        (&Method::OPTIONS, _) => respond(StatusCode::OK, String::new()),
        _ => respond(StatusCode::NOT_FOUND, r#"{"error":"not found"}"#.to_string()),
    };
    Ok(response)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let body = match &args.file {
        Some(path) => {
            let body = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
            let batch = parse_feed(&body).map_err(|e| anyhow::anyhow!("{path}: {e}"))?;
            println!("[MOCK] Serving {} hazards from {path} ({} invalid entries)", batch.hazards.len(), batch.skipped);
            body
        }
        None => {
            println!("[MOCK] Serving built-in sample alerts");
            serde_json::to_string(&sample_alerts())?
        }
    };

    let feed = Arc::new(Feed { body, fail_every: args.fail_every, requests: AtomicU64::new(0) });
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;
    println!("[MOCK] Listening on http://{addr}/alerts");

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                eprintln!("[MOCK] Accept failed: {e}");
                continue;
            }
        };
        let feed = feed.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, feed.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                eprintln!("[MOCK] Connection error: {e}");
            }
        });
    }
}
