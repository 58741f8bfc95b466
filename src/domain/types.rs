//! Shared types for the guidance engine

use crate::domain::error::{HazardFeedError, LocationError, RouteError};
use crate::domain::geo;
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

/// Current epoch milliseconds (for outbound payloads only; engine timing uses `Instant`)
#[inline]
pub fn epoch_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// A single position fix. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: Instant,
}

impl Position {
    /// Fix stamped with the current instant
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude, timestamp: Instant::now() }
    }

    #[inline]
    pub fn at(latitude: f64, longitude: f64, timestamp: Instant) -> Self {
        Self { latitude, longitude, timestamp }
    }

    /// Great-circle distance to another position in metres
    #[inline]
    pub fn distance_m(&self, other: &Position) -> f64 {
        geo::haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        geo::is_valid_coordinate(self.latitude, self.longitude)
    }

    /// Plain lat/lng pair for payloads
    #[inline]
    pub fn lat_lng(&self) -> LatLng {
        LatLng { lat: self.latitude, lng: self.longitude }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Timestamp-free coordinate pair used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Newtype wrapper for hazard IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HazardId(pub String);

impl std::fmt::Display for HazardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HazardId {
    fn from(s: &str) -> Self {
        HazardId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HazardKind {
    SpeedBreaker,
    TrafficZone,
    /// Anything else the feed sends, label preserved
    Custom(String),
}

impl std::str::FromStr for HazardKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(HazardKind::from_label(s))
    }
}

impl HazardKind {
    /// Map a feed `type` label onto a kind; unknown labels become `Custom`
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "speed breaker" | "speedbreaker" | "speed bump" => HazardKind::SpeedBreaker,
            "traffic zone" | "high traffic" | "traffic" => HazardKind::TrafficZone,
            _ => HazardKind::Custom(label.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HazardKind::SpeedBreaker => "speed_breaker",
            HazardKind::TrafficZone => "traffic_zone",
            HazardKind::Custom(label) => label,
        }
    }
}

/// A point (radius 0) or circular-zone hazard
#[derive(Debug, Clone, PartialEq)]
pub struct Hazard {
    pub id: HazardId,
    pub kind: HazardKind,
    pub location: Position,
    /// 0 for point hazards
    pub radius_m: f64,
    pub message: String,
}

impl Hazard {
    #[inline]
    pub fn is_point(&self) -> bool {
        self.radius_m <= 0.0
    }

    /// Distance at which this hazard triggers. Point hazards use `point_radius_m`.
    #[inline]
    pub fn trigger_radius_m(&self, point_radius_m: f64) -> f64 {
        if self.is_point() {
            point_radius_m
        } else {
            self.radius_m
        }
    }
}

/// Emitted once per hazard per cooldown window
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub hazard_id: HazardId,
    pub fired_at: Instant,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub origin: Position,
    pub destination: Position,
}

/// One step of a computed route
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub text: String,
    pub location: Position,
    pub sequence_index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    pub instructions: Vec<Instruction>,
    pub total_distance_m: f64,
}

/// Identifies one guidance session (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceState {
    Idle,
    Playing,
    Cancelled,
    Completed,
}

impl GuidanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuidanceState::Idle => "idle",
            GuidanceState::Playing => "playing",
            GuidanceState::Cancelled => "cancelled",
            GuidanceState::Completed => "completed",
        }
    }
}

/// Status surfaced to the UI layer. Degradations, never crashes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EngineStatus {
    LocationLive,
    LocationLost { error: LocationError },
    HazardsLoaded { count: usize, skipped: usize },
    HazardFeedFailed { error: HazardFeedError },
    RouteFailed { error: RouteError },
    GuidanceStarted { session: SessionId, steps: usize },
    GuidanceCompleted { session: SessionId },
    GuidanceCancelled { session: SessionId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hazard_kind_from_str() {
        assert_eq!("Speed Breaker".parse::<HazardKind>().unwrap(), HazardKind::SpeedBreaker);
        assert_eq!("High Traffic".parse::<HazardKind>().unwrap(), HazardKind::TrafficZone);
        assert_eq!("traffic_zone".parse::<HazardKind>().unwrap(), HazardKind::TrafficZone);
        assert_eq!(
            "Animal Crossing".parse::<HazardKind>().unwrap(),
            HazardKind::Custom("Animal Crossing".to_string())
        );
    }

    #[test]
    fn test_point_hazard_uses_default_radius() {
        let hazard = Hazard {
            id: "h1".into(),
            kind: HazardKind::SpeedBreaker,
            location: Position::new(13.1, 80.28),
            radius_m: 0.0,
            message: "Speed breaker ahead".to_string(),
        };
        assert!(hazard.is_point());
        assert_eq!(hazard.trigger_radius_m(50.0), 50.0);

        let zone = Hazard { radius_m: 300.0, ..hazard };
        assert_eq!(zone.trigger_radius_m(50.0), 300.0);
    }

    #[test]
    fn test_position_display() {
        let p = Position::new(13.08271, 80.27069);
        assert_eq!(p.to_string(), "13.0827, 80.2707");
    }

    #[test]
    fn test_engine_status_serialization() {
        let json = serde_json::to_value(EngineStatus::LocationLost { error: LocationError::Timeout }).unwrap();
        assert_eq!(json["status"], "location_lost");
        assert_eq!(json["error"], "timeout");
    }
}
