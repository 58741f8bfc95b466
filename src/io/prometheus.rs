//! Metrics and status HTTP endpoint
//!
//! - `GET /metrics` - Prometheus text format
//! - `GET /health` - liveness
//! - `GET /hazards` - current hazard index snapshot as JSON
//!
//! Uses hyper for the HTTP server.

use crate::domain::types::LatLng;
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::hazard_index::{HazardIndex, HazardSet};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {count}");
}

fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(&mut output, "hazard_nav_fixes_total", "Position fixes evaluated", MetricType::Counter, summary.fixes_total);
    write_metric(
        &mut output,
        "hazard_nav_fixes_rejected_total",
        "Fixes dropped as invalid or out of order",
        MetricType::Counter,
        summary.fixes_rejected,
    );
    write_metric(
        &mut output,
        "hazard_nav_location_errors_total",
        "Location provider errors",
        MetricType::Counter,
        summary.location_errors,
    );
    write_histogram(
        &mut output,
        "hazard_nav_fix_eval_latency_us",
        "Fix evaluation latency in microseconds",
        &summary.eval_buckets,
        summary.eval_sum_us,
    );
    write_metric(&mut output, "hazard_nav_alerts_total", "Hazard alerts emitted", MetricType::Counter, summary.alerts_total);
    write_metric(&mut output, "hazard_nav_hazards_loaded", "Hazards in the index", MetricType::Gauge, summary.hazards_loaded);
    write_metric(
        &mut output,
        "hazard_nav_hazard_feed_failures_total",
        "Failed hazard feed loads",
        MetricType::Counter,
        summary.hazard_feed_failures,
    );
    write_metric(&mut output, "hazard_nav_routes_requested_total", "Route requests", MetricType::Counter, summary.routes_requested);
    write_metric(&mut output, "hazard_nav_routes_failed_total", "Route requests that failed", MetricType::Counter, summary.routes_failed);
    write_metric(
        &mut output,
        "hazard_nav_routes_superseded_total",
        "Route responses discarded as superseded",
        MetricType::Counter,
        summary.routes_superseded,
    );
    write_metric(&mut output, "hazard_nav_narrations_total", "Instructions narrated", MetricType::Counter, summary.narrations_total);
    write_metric(
        &mut output,
        "hazard_nav_guidance_cancelled_total",
        "Guidance sessions cancelled",
        MetricType::Counter,
        summary.guidance_cancelled,
    );
    write_metric(
        &mut output,
        "hazard_nav_guidance_completed_total",
        "Guidance sessions completed",
        MetricType::Counter,
        summary.guidance_completed,
    );

    output
}

#[derive(Serialize)]
struct HazardView<'a> {
    id: &'a str,
    kind: &'a str,
    at: LatLng,
    radius_m: f64,
    message: &'a str,
}

fn format_hazards(set: &HazardSet) -> String {
    let views: Vec<HazardView<'_>> = set
        .hazards()
        .iter()
        .map(|h| HazardView {
            id: &h.id.0,
            kind: h.kind.as_str(),
            at: h.location.lat_lng(),
            radius_m: h.radius_m,
            message: &h.message,
        })
        .collect();
    serde_json::to_string(&views).unwrap_or_else(|_| "[]".to_string())
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    index: Arc<HazardIndex>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics.snapshot()),
        ),
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok".to_string()),
        (&Method::GET, "/hazards") => {
            respond(StatusCode::OK, "application/json", format_hazards(&index.snapshot()))
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(response)
}

/// Start the metrics/status HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    index: Arc<HazardIndex>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let index = index.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let index = index.clone();
                                async move { handle_request(req, metrics, index).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "metrics_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "metrics_accept_error");
                    }
                }
            }
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    info!("metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
