//! Route request/response cycle against an external routing provider
//!
//! Requests run on their own task so a slow provider never holds up fix
//! evaluation or narration. Each request gets a monotonically increasing id;
//! only the response carrying the latest id is honoured, anything older is a
//! superseded result and is dropped without being treated as an error.

use crate::domain::error::RouteError;
use crate::domain::types::{Position, RouteRequest, RouteResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// External routing collaborator. Returns candidate routes in provider order.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn candidates(&self, request: &RouteRequest) -> Result<Vec<RouteResult>, RouteError>;
}

/// Which candidate to keep when the provider returns several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutePreference {
    /// Provider order (deterministic default)
    #[default]
    First,
    Shortest,
}

/// Completed provider call, delivered back to the owning session
#[derive(Debug)]
pub struct RouteResponse {
    pub request_id: u64,
    pub result: Result<RouteResult, RouteError>,
}

/// Build a request; both endpoints must exist and be valid coordinates
pub fn validate_points(
    origin: Option<Position>,
    destination: Option<Position>,
) -> Result<RouteRequest, RouteError> {
    match (origin, destination) {
        (Some(origin), Some(destination)) if origin.is_valid() && destination.is_valid() => {
            Ok(RouteRequest { origin, destination })
        }
        _ => Err(RouteError::InvalidPoints),
    }
}

/// Pick one candidate and renumber its instructions 0..n in order
pub fn select_candidate(
    candidates: Vec<RouteResult>,
    preference: RoutePreference,
) -> Result<RouteResult, RouteError> {
    let chosen = match preference {
        RoutePreference::First => candidates.into_iter().next(),
        RoutePreference::Shortest => candidates
            .into_iter()
            .min_by(|a, b| a.total_distance_m.total_cmp(&b.total_distance_m)),
    };

    let mut route = chosen.ok_or(RouteError::NoPath)?;
    for (idx, instruction) in route.instructions.iter_mut().enumerate() {
        instruction.sequence_index = idx as u32;
    }
    Ok(route)
}

/// Resolve a route in place (no supersession tracking)
pub async fn request_route(
    provider: &dyn RoutingProvider,
    origin: Option<Position>,
    destination: Option<Position>,
    preference: RoutePreference,
) -> Result<RouteResult, RouteError> {
    let request = validate_points(origin, destination)?;
    let candidates = provider.candidates(&request).await?;
    select_candidate(candidates, preference)
}

/// Tracks the outstanding request for one map session
pub struct RouteService {
    provider: Arc<dyn RoutingProvider>,
    preference: RoutePreference,
    response_tx: mpsc::Sender<RouteResponse>,
    /// Last id handed out
    latest_id: u64,
    /// Id still waiting on the provider, if any
    outstanding: Option<u64>,
}

impl RouteService {
    pub fn new(provider: Arc<dyn RoutingProvider>, response_tx: mpsc::Sender<RouteResponse>) -> Self {
        Self {
            provider,
            preference: RoutePreference::default(),
            response_tx,
            latest_id: 0,
            outstanding: None,
        }
    }

    pub fn with_preference(mut self, preference: RoutePreference) -> Self {
        self.preference = preference;
        self
    }

    /// Start a request. Supersedes any request still in flight.
    /// Fails synchronously with `InvalidPoints` when an endpoint is missing.
    pub fn request_route(
        &mut self,
        origin: Option<Position>,
        destination: Option<Position>,
    ) -> Result<u64, RouteError> {
        let request = validate_points(origin, destination)?;

        self.latest_id += 1;
        let request_id = self.latest_id;
        if let Some(previous) = self.outstanding.replace(request_id) {
            info!(superseded_id = %previous, request_id = %request_id, "route_request_superseded");
        }

        let provider = self.provider.clone();
        let preference = self.preference;
        let tx = self.response_tx.clone();

        tokio::spawn(async move {
            let start = Instant::now();
            let result = match provider.candidates(&request).await {
                Ok(candidates) => select_candidate(candidates, preference),
                Err(e) => Err(e),
            };
            debug!(
                request_id = %request_id,
                ok = %result.is_ok(),
                latency_ms = %start.elapsed().as_millis(),
                "route_provider_replied"
            );
            // Receiver gone means the session shut down
            let _ = tx.send(RouteResponse { request_id, result }).await;
        });

        info!(
            request_id = %request_id,
            origin = %request.origin,
            destination = %request.destination,
            "route_requested"
        );
        Ok(request_id)
    }

    /// Filter a provider response. `None` when it belongs to a superseded
    /// or cancelled request.
    pub fn accept(&mut self, response: RouteResponse) -> Option<Result<RouteResult, RouteError>> {
        if self.outstanding != Some(response.request_id) {
            debug!(
                request_id = %response.request_id,
                latest_id = %self.latest_id,
                "route_response_discarded"
            );
            return None;
        }
        self.outstanding = None;

        if let Err(ref e) = response.result {
            warn!(request_id = %response.request_id, error = %e, "route_failed");
        }
        Some(response.result)
    }

    /// Forget the in-flight request; its response will be discarded
    pub fn cancel_outstanding(&mut self) {
        if let Some(id) = self.outstanding.take() {
            debug!(request_id = %id, "route_request_abandoned");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn latest_id(&self) -> u64 {
        self.latest_id
    }
}
