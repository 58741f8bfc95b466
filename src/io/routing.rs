//! OSRM-compatible routing provider
//!
//! Calls `{base}/route/v1/{profile}/{lng},{lat};{lng},{lat}` with steps and
//! alternatives enabled and turns each step maneuver into a spoken
//! instruction. Only the first leg is used since requests carry two points.

use crate::domain::error::RouteError;
use crate::domain::types::{Instruction, Position, RouteRequest, RouteResult};
use crate::services::route_service::RoutingProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    /// `[lng, lat]`
    location: [f64; 2],
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
    #[serde(default)]
    exit: Option<u32>,
}

/// "250 m" below a kilometre (rounded to 10 m), "1.2 km" above
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", ((meters / 10.0).round() * 10.0).max(10.0) as u64)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

fn onto(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!(" onto {name}")
    }
}

fn maneuver_text(step: &OsrmStep) -> String {
    let m = &step.maneuver;
    let modifier = m.modifier.as_deref().unwrap_or("straight");
    let name = step.name.as_str();

    match m.kind.as_str() {
        "depart" => {
            if name.is_empty() {
                "Head out".to_string()
            } else {
                format!("Head out on {name}")
            }
        }
        "arrive" => "You have arrived at your destination".to_string(),
        "roundabout" | "rotary" => match m.exit {
            Some(exit) => format!("At the roundabout, take exit {exit}{}", onto(name)),
            None => format!("Enter the roundabout{}", onto(name)),
        },
        "merge" => format!("Merge {modifier}{}", onto(name)),
        "on ramp" => format!("Take the ramp on the {modifier}{}", onto(name)),
        "off ramp" => format!("Take the exit on the {modifier}{}", onto(name)),
        "fork" => format!("Keep {modifier} at the fork{}", onto(name)),
        "end of road" => format!("At the end of the road, turn {modifier}{}", onto(name)),
        "continue" | "new name" => format!("Continue {modifier}{}", onto(name)),
        _ => {
            if modifier == "straight" {
                format!("Go straight{}", onto(name))
            } else if modifier.starts_with("slight") || modifier.starts_with("sharp") {
                format!("Make a {modifier} turn{}", onto(name))
            } else if modifier == "uturn" {
                format!("Make a U-turn{}", onto(name))
            } else {
                format!("Turn {modifier}{}", onto(name))
            }
        }
    }
}

fn to_route(route: OsrmRoute) -> RouteResult {
    let steps: Vec<OsrmStep> = route.legs.into_iter().next().map(|leg| leg.steps).unwrap_or_default();

    let mut instructions = Vec::with_capacity(steps.len());
    let mut lead_in: Option<f64> = None;
    for (idx, step) in steps.iter().enumerate() {
        let text = maneuver_text(step);
        let text = match lead_in {
            Some(d) if d > 0.0 => format!("In {}, {}", format_distance(d), lowercase_first(&text)),
            _ => text,
        };
        let [lng, lat] = step.maneuver.location;
        instructions.push(Instruction {
            text,
            location: Position::new(lat, lng),
            sequence_index: idx as u32,
        });
        lead_in = Some(step.distance);
    }

    RouteResult { instructions, total_distance_m: route.distance }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Decode an OSRM `route` response into candidates, provider order kept
pub fn parse_osrm(body: &str) -> Result<Vec<RouteResult>, RouteError> {
    let response: OsrmResponse = serde_json::from_str(body)
        .map_err(|e| RouteError::ProviderUnavailable(format!("bad response: {e}")))?;

    match response.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(RouteError::NoPath),
        "InvalidQuery" | "InvalidValue" => return Err(RouteError::InvalidPoints),
        other => {
            let detail = response.message.unwrap_or_default();
            return Err(RouteError::ProviderUnavailable(format!("{other}: {detail}")));
        }
    }

    if response.routes.is_empty() {
        return Err(RouteError::NoPath);
    }
    Ok(response.routes.into_iter().map(to_route).collect())
}

pub struct OsrmProvider {
    base_url: String,
    profile: String,
    http: reqwest::Client,
}

impl OsrmProvider {
    pub fn new(base_url: &str, profile: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            profile: profile.to_string(),
            http,
        })
    }

    fn route_url(&self, request: &RouteRequest) -> String {
        let (o, d) = (&request.origin, &request.destination);
        format!(
            "{}/route/v1/{}/{:.6},{:.6};{:.6},{:.6}",
            self.base_url, self.profile, o.longitude, o.latitude, d.longitude, d.latitude
        )
    }
}

#[async_trait]
impl RoutingProvider for OsrmProvider {
    async fn candidates(&self, request: &RouteRequest) -> Result<Vec<RouteResult>, RouteError> {
        let start = Instant::now();
        let url = self.route_url(request);
        debug!(url = %url, "osrm_request");

        let response = self
            .http
            .get(&url)
            .query(&[("steps", "true"), ("alternatives", "true"), ("overview", "false")])
            .send()
            .await
            .map_err(|e| RouteError::ProviderUnavailable(e.to_string()))?;

        // OSRM reports NoRoute with a 400, so the body is parsed regardless
        let status = response.status();
        let body = response.text().await.map_err(|e| RouteError::ProviderUnavailable(e.to_string()))?;
        let result = parse_osrm(&body);
        if result.is_err() && status.is_server_error() {
            return Err(RouteError::ProviderUnavailable(format!("HTTP {}", status.as_u16())));
        }

        if let Ok(ref routes) = result {
            info!(
                candidates = %routes.len(),
                latency_ms = %start.elapsed().as_millis(),
                "osrm_routes_received"
            );
        }
        result
    }
}
