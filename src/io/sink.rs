//! Alert sinks - where alerts, narration and status leave the engine
//!
//! The UI layer owns rendering and speech. The engine only talks to the
//! `AlertSink` trait; this module provides a tracing-backed sink, a typed
//! non-blocking channel sink, and a fan-out combinator.

use crate::domain::types::{epoch_ms, EngineStatus, LatLng, Position, RouteResult, SessionId};
use crate::services::guidance::Narration;
use crate::services::proximity_monitor::HazardAlert;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

/// Collaborator that renders markers and speaks text
pub trait AlertSink: Send + Sync {
    /// Render the hazard marker/popup and speak its warning
    fn alert(&self, alert: &HazardAlert);
    /// Speak (and display) one route instruction
    fn narrate(&self, narration: &Narration);
    /// Drop all queued and in-progress speech
    fn cancel_speech(&self);
    /// Draw a freshly accepted route
    fn show_route(&self, session: SessionId, route: &RouteResult);
    fn status(&self, status: &EngineStatus);
    /// "You are here" marker
    fn position(&self, _fix: &Position) {}
}

/// Payload for hazard alerts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    /// Timestamp (epoch ms)
    pub ts: u64,
    pub hazard_id: String,
    pub kind: String,
    pub message: String,
    pub distance_m: f64,
    pub at: LatLng,
}

/// Payload for narrated route instructions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrationPayload {
    pub ts: u64,
    pub session: SessionId,
    pub sequence_index: u32,
    pub text: String,
}

/// Payload for accepted routes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePayload {
    pub ts: u64,
    pub session: SessionId,
    pub steps: usize,
    pub total_distance_m: f64,
    pub waypoints: Vec<LatLng>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub ts: u64,
    #[serde(flatten)]
    pub status: EngineStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionPayload {
    pub ts: u64,
    pub at: LatLng,
}

/// Everything a sink can be told, as data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    Alert(AlertPayload),
    Narration(NarrationPayload),
    CancelSpeech { ts: u64 },
    Route(RoutePayload),
    Status(StatusPayload),
    Position(PositionPayload),
}

impl SinkEvent {
    pub fn from_alert(alert: &HazardAlert) -> Self {
        SinkEvent::Alert(AlertPayload {
            ts: epoch_ms(),
            hazard_id: alert.hazard.id.to_string(),
            kind: alert.hazard.kind.as_str().to_string(),
            message: alert.hazard.message.clone(),
            distance_m: alert.event.distance_m,
            at: alert.hazard.location.lat_lng(),
        })
    }

    pub fn from_narration(narration: &Narration) -> Self {
        SinkEvent::Narration(NarrationPayload {
            ts: epoch_ms(),
            session: narration.session,
            sequence_index: narration.instruction.sequence_index,
            text: narration.instruction.text.clone(),
        })
    }

    pub fn from_route(session: SessionId, route: &RouteResult) -> Self {
        SinkEvent::Route(RoutePayload {
            ts: epoch_ms(),
            session,
            steps: route.instructions.len(),
            total_distance_m: route.total_distance_m,
            waypoints: route.instructions.iter().map(|i| i.location.lat_lng()).collect(),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SinkEvent::Alert(_) => "alert",
            SinkEvent::Narration(_) => "narration",
            SinkEvent::CancelSpeech { .. } => "cancel_speech",
            SinkEvent::Route(_) => "route",
            SinkEvent::Status(_) => "status",
            SinkEvent::Position(_) => "position",
        }
    }
}

/// Logs everything through tracing. Stands in for speech in headless runs.
pub struct LogSink;

impl AlertSink for LogSink {
    fn alert(&self, alert: &HazardAlert) {
        info!(
            hazard_id = %alert.hazard.id,
            kind = %alert.hazard.kind.as_str(),
            distance_m = %format!("{:.0}", alert.event.distance_m),
            "say: {}",
            alert.hazard.message
        );
    }

    fn narrate(&self, narration: &Narration) {
        info!(
            session = %narration.session,
            step = %narration.instruction.sequence_index,
            "say: {}",
            narration.instruction.text
        );
    }

    fn cancel_speech(&self) {
        info!("speech_cancelled");
    }

    fn show_route(&self, session: SessionId, route: &RouteResult) {
        info!(
            session = %session,
            steps = %route.instructions.len(),
            total_distance_m = %format!("{:.0}", route.total_distance_m),
            "route_shown"
        );
    }

    fn status(&self, status: &EngineStatus) {
        match status {
            EngineStatus::LocationLost { .. }
            | EngineStatus::HazardFeedFailed { .. }
            | EngineStatus::RouteFailed { .. } => warn!(status = ?status, "engine_status"),
            _ => info!(status = ?status, "engine_status"),
        }
    }
}

/// Non-blocking typed channel sink. Drops events when the consumer lags.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SinkEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: SinkEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!(event = %event.as_str(), "sink_channel_full"),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl AlertSink for ChannelSink {
    fn alert(&self, alert: &HazardAlert) {
        self.send(SinkEvent::from_alert(alert));
    }

    fn narrate(&self, narration: &Narration) {
        self.send(SinkEvent::from_narration(narration));
    }

    fn cancel_speech(&self) {
        self.send(SinkEvent::CancelSpeech { ts: epoch_ms() });
    }

    fn show_route(&self, session: SessionId, route: &RouteResult) {
        self.send(SinkEvent::from_route(session, route));
    }

    fn status(&self, status: &EngineStatus) {
        self.send(SinkEvent::Status(StatusPayload { ts: epoch_ms(), status: status.clone() }));
    }

    fn position(&self, fix: &Position) {
        self.send(SinkEvent::Position(PositionPayload { ts: epoch_ms(), at: fix.lat_lng() }));
    }
}

/// Create a channel sink and its receiver
pub fn create_sink_channel(buffer_size: usize) -> (ChannelSink, mpsc::Receiver<SinkEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ChannelSink::new(tx), rx)
}

/// Forwards every call to each inner sink in order
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

impl AlertSink for FanoutSink {
    fn alert(&self, alert: &HazardAlert) {
        self.sinks.iter().for_each(|s| s.alert(alert));
    }

    fn narrate(&self, narration: &Narration) {
        self.sinks.iter().for_each(|s| s.narrate(narration));
    }

    fn cancel_speech(&self) {
        self.sinks.iter().for_each(|s| s.cancel_speech());
    }

    fn show_route(&self, session: SessionId, route: &RouteResult) {
        self.sinks.iter().for_each(|s| s.show_route(session, route));
    }

    fn status(&self, status: &EngineStatus) {
        self.sinks.iter().for_each(|s| s.status(status));
    }

    fn position(&self, fix: &Position) {
        self.sinks.iter().for_each(|s| s.position(fix));
    }
}
