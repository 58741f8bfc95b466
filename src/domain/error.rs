//! Error taxonomy for the guidance engine
//!
//! None of these are fatal. Location and feed errors degrade the engine
//! (no live position, stale hazards); route errors go back to the caller.

use serde::Serialize;
use thiserror::Error;

/// Failure delivering a position fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable")]
    Unavailable,
    #[error("location request timed out")]
    Timeout,
}

impl std::str::FromStr for LocationError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permission_denied" => Ok(LocationError::PermissionDenied),
            "unavailable" => Ok(LocationError::Unavailable),
            "timeout" => Ok(LocationError::Timeout),
            other => Err(format!("unknown location error: {other}")),
        }
    }
}

/// Failure computing a route
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RouteError {
    #[error("no path between origin and destination")]
    NoPath,
    #[error("routing provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("origin or destination missing")]
    InvalidPoints,
}

/// Failure loading the hazard feed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HazardFeedError {
    #[error("hazard feed malformed: {0}")]
    Malformed(String),
    #[error("hazard feed unreachable: {0}")]
    Unreachable(String),
}

/// Failure resolving a free-text search
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("no match for query")]
    NotFound,
    #[error("geocoding provider unavailable: {0}")]
    ProviderUnavailable(String),
}
