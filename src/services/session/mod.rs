//! Map session - the single cooperative event loop
//!
//! One task owns the proximity monitor, the route request state and the
//! guidance sequencer. Everything that can happen to them arrives through
//! this loop:
//!
//! - position fixes and location errors from a `FixStream`
//! - `SessionCommand`s from the UI layer
//! - routing provider replies (already off-loop, delivered by channel)
//! - hazard feed results (same)
//! - the guidance deadline, a `sleep_until` on the sequencer's next slot
//! - the periodic hazard refresh tick and the shutdown signal
//!
//! No state is shared with other tasks except the hazard index, which is a
//! snapshot-swapped structure.

mod handlers;

use crate::domain::error::{HazardFeedError, LocationError};
use crate::domain::types::{GuidanceState, Hazard, Position};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::hazard_feed::{FeedBatch, HazardSource};
use crate::io::location::FixStream;
use crate::io::sink::AlertSink;
use crate::services::guidance::GuidanceSequencer;
use crate::services::hazard_index::HazardIndex;
use crate::services::proximity_monitor::ProximityMonitor;
use crate::services::route_service::{RouteResponse, RouteService, RoutingProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Requests from the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// `None` clears the destination
    SetDestination(Option<Position>),
    /// Route from the last known position to the destination
    RequestRoute,
    SetVoice(bool),
    CancelGuidance,
    ReloadHazards,
}

/// What the session last told the UI about location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationStatus {
    Unknown,
    Live,
    Lost(LocationError),
}

type FeedResult = Result<FeedBatch, HazardFeedError>;

pub struct MapSession {
    index: Arc<HazardIndex>,
    monitor: ProximityMonitor,
    routes: RouteService,
    route_rx: mpsc::Receiver<RouteResponse>,
    guidance: GuidanceSequencer,
    sink: Arc<dyn AlertSink>,
    metrics: Arc<Metrics>,
    hazard_source: Option<Arc<dyn HazardSource>>,
    /// Config hazards, merged ahead of every feed batch
    static_hazards: Vec<Hazard>,
    feed_tx: mpsc::Sender<FeedResult>,
    feed_rx: mpsc::Receiver<FeedResult>,
    feed_in_flight: bool,
    hazard_refresh: Option<Duration>,
    last_position: Option<Position>,
    destination: Option<Position>,
    location: LocationStatus,
}

impl MapSession {
    pub fn new(
        config: &Config,
        index: Arc<HazardIndex>,
        provider: Arc<dyn RoutingProvider>,
        sink: Arc<dyn AlertSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (route_tx, route_rx) = mpsc::channel(16);
        let (feed_tx, feed_rx) = mpsc::channel(4);
        let refresh_secs = config.hazard_refresh_secs();

        Self {
            monitor: ProximityMonitor::new(index.clone(), config.cooldown(), config.jitter_margin_m()),
            index,
            routes: RouteService::new(provider, route_tx),
            route_rx,
            guidance: GuidanceSequencer::new(config.guidance_interval(), config.voice_enabled()),
            sink,
            metrics,
            hazard_source: None,
            static_hazards: Vec::new(),
            feed_tx,
            feed_rx,
            feed_in_flight: false,
            hazard_refresh: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
            last_position: None,
            destination: None,
            location: LocationStatus::Unknown,
        }
    }

    /// Remote hazards, fetched when the session starts and on every refresh
    pub fn with_hazard_source(mut self, source: Arc<dyn HazardSource>) -> Self {
        self.hazard_source = Some(source);
        self
    }

    /// Load fixed hazards now and keep them across feed reloads
    pub fn with_static_hazards(mut self, hazards: Vec<Hazard>) -> Self {
        let loaded = self.index.load_static(hazards.clone());
        self.metrics.set_hazards_loaded(loaded as u64);
        self.static_hazards = hazards;
        self
    }

    /// Seed the last known position (e.g. from a one-shot locate)
    pub fn with_initial_position(mut self, position: Position) -> Self {
        self.last_position = Some(position);
        self
    }

    pub fn with_destination(mut self, destination: Position) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Run until shutdown is signalled or both the fix stream and the
    /// command channel are closed.
    pub async fn run(
        &mut self,
        mut fixes: FixStream,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            hazards = %self.index.len(),
            voice = %self.guidance.voice_enabled(),
            feed = %self.hazard_source.is_some(),
            "map_session_started"
        );

        self.reload_hazards();

        let refresh_enabled = self.hazard_refresh.is_some();
        let period = self.hazard_refresh.unwrap_or(Duration::from_secs(3600));
        let mut refresh = interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut fixes_open = true;
        let mut commands_open = true;

        while fixes_open || commands_open {
            let deadline = self.guidance.next_deadline();

            tokio::select! {
                fix = fixes.recv(), if fixes_open => match fix {
                    Some(Ok(position)) => self.handle_fix(position),
                    Some(Err(error)) => self.handle_location_error(error),
                    None => {
                        info!("location_stream_ended");
                        fixes_open = false;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("command_channel_closed");
                        commands_open = false;
                    }
                },
                Some(response) = self.route_rx.recv() => self.handle_route_response(response),
                Some(result) = self.feed_rx.recv() => self.handle_feed_result(result),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handle_guidance_due();
                }
                _ = refresh.tick(), if refresh_enabled => self.reload_hazards(),
                res = shutdown.changed() => {
                    // A dropped sender can never signal again
                    if res.is_err() || *shutdown.borrow() {
                        info!("map_session_shutdown_requested");
                        break;
                    }
                }
            }
        }

        self.stop();
    }

    /// Cancel narration and forget in-flight requests
    fn stop(&mut self) {
        self.cancel_guidance();
        self.routes.cancel_outstanding();
        info!(
            fixes = %self.metrics.fixes_total(),
            alerts = %self.metrics.alerts_total(),
            "map_session_stopped"
        );
    }

    pub fn last_position(&self) -> Option<Position> {
        self.last_position
    }

    pub fn destination(&self) -> Option<Position> {
        self.destination
    }

    pub fn guidance_state(&self) -> GuidanceState {
        self.guidance.state()
    }

    pub fn voice_enabled(&self) -> bool {
        self.guidance.voice_enabled()
    }

    pub fn monitor(&self) -> &ProximityMonitor {
        &self.monitor
    }
}
