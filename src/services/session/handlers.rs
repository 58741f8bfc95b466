//! Event handlers for MapSession

use super::{FeedResult, LocationStatus, MapSession, SessionCommand};
use crate::domain::error::LocationError;
use crate::domain::types::{EngineStatus, GuidanceState, Position};
use crate::services::route_service::RouteResponse;
use std::time::Instant as StdInstant;
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl MapSession {
    pub(super) fn handle_fix(&mut self, position: Position) {
        let start = StdInstant::now();

        let alerts = match self.monitor.evaluate(&position) {
            Ok(alerts) => alerts,
            Err(rejection) => {
                self.metrics.record_fix_rejected();
                debug!(rejection = ?rejection, position = %position, "fix_dropped");
                return;
            }
        };
        self.metrics.record_fix_evaluated(start.elapsed().as_micros() as u64);

        if self.location != LocationStatus::Live {
            self.location = LocationStatus::Live;
            self.sink.status(&EngineStatus::LocationLive);
        }
        self.last_position = Some(position);
        self.sink.position(&position);

        if !alerts.is_empty() {
            self.metrics.record_alerts(alerts.len() as u64);
            for alert in &alerts {
                self.sink.alert(alert);
            }
        }
    }

    pub(super) fn handle_location_error(&mut self, error: LocationError) {
        self.metrics.record_location_error();
        self.monitor.on_location_error(error);

        // Surface each distinct error once
        if self.location != LocationStatus::Lost(error) {
            self.location = LocationStatus::Lost(error);
            self.sink.status(&EngineStatus::LocationLost { error });
        }
    }

    pub(super) fn handle_command(&mut self, command: SessionCommand) {
        debug!(command = ?command, "session_command");
        match command {
            SessionCommand::SetDestination(destination) => {
                self.destination = destination;
                match destination {
                    Some(p) => info!(destination = %p, "destination_set"),
                    None => info!("destination_cleared"),
                }
            }
            SessionCommand::RequestRoute => self.request_route(),
            SessionCommand::SetVoice(enabled) => {
                if self.guidance.set_voice_enabled(enabled, Instant::now()) {
                    info!(voice = %enabled, "voice_toggled");
                    if !enabled {
                        self.sink.cancel_speech();
                    }
                }
            }
            SessionCommand::CancelGuidance => {
                self.routes.cancel_outstanding();
                self.cancel_guidance();
            }
            SessionCommand::ReloadHazards => self.reload_hazards(),
        }
    }

    /// A new route request always ends the current guidance first
    fn request_route(&mut self) {
        self.cancel_guidance();

        let superseding = self.routes.is_pending();
        match self.routes.request_route(self.last_position, self.destination) {
            Ok(_) => {
                self.metrics.record_route_requested();
                if superseding {
                    self.metrics.record_route_superseded();
                }
            }
            Err(error) => {
                self.metrics.record_route_failed();
                warn!(error = %error, "route_request_rejected");
                self.sink.status(&EngineStatus::RouteFailed { error });
            }
        }
    }

    pub(super) fn cancel_guidance(&mut self) {
        if let Some(session) = self.guidance.cancel() {
            self.metrics.record_guidance_cancelled();
            self.sink.cancel_speech();
            self.sink.status(&EngineStatus::GuidanceCancelled { session });
        }
    }

    pub(super) fn handle_route_response(&mut self, response: RouteResponse) {
        let route = match self.routes.accept(response) {
            None => return,
            Some(Ok(route)) => route,
            Some(Err(error)) => {
                self.metrics.record_route_failed();
                self.sink.status(&EngineStatus::RouteFailed { error });
                return;
            }
        };

        let steps = route.instructions.len();
        let started = self.guidance.start(route, Instant::now());
        if let Some(replaced) = started.replaced {
            self.metrics.record_guidance_cancelled();
            self.sink.cancel_speech();
            self.sink.status(&EngineStatus::GuidanceCancelled { session: replaced });
        }

        if let Some(route) = self.guidance.route() {
            self.sink.show_route(started.session, route);
        }
        self.sink.status(&EngineStatus::GuidanceStarted { session: started.session, steps });

        if self.guidance.state() == GuidanceState::Completed {
            self.metrics.record_guidance_completed();
            self.sink.status(&EngineStatus::GuidanceCompleted { session: started.session });
        }
    }

    pub(super) fn handle_guidance_due(&mut self) {
        let outcome = self.guidance.poll(Instant::now());

        self.metrics.record_narrations(outcome.narrations.len() as u64);
        for narration in &outcome.narrations {
            self.sink.narrate(narration);
        }

        if let Some(session) = outcome.completed {
            self.metrics.record_guidance_completed();
            self.sink.status(&EngineStatus::GuidanceCompleted { session });
        }
    }

    /// Fetch off-loop; the result comes back through `feed_rx`
    pub(super) fn reload_hazards(&mut self) {
        let Some(source) = self.hazard_source.clone() else {
            return;
        };
        if self.feed_in_flight {
            debug!("hazard_reload_already_in_flight");
            return;
        }
        self.feed_in_flight = true;

        let tx = self.feed_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch().await;
            let _ = tx.send(result).await;
        });
    }

    pub(super) fn handle_feed_result(&mut self, result: FeedResult) {
        self.feed_in_flight = false;

        match result {
            Ok(batch) => {
                let mut hazards = self.static_hazards.clone();
                hazards.extend(batch.hazards);
                let offered = hazards.len();
                let count = self.index.load_static(hazards);
                // Feed entries shadowed by a config hazard id count as skipped
                let skipped = batch.skipped + (offered - count);
                self.monitor.prune_unknown(&self.index.snapshot());
                self.metrics.set_hazards_loaded(count as u64);
                self.sink.status(&EngineStatus::HazardsLoaded { count, skipped });
            }
            Err(error) => {
                // Previous index stays in place
                self.metrics.record_hazard_feed_failure();
                warn!(error = %error, kept = %self.index.len(), "hazard_feed_failed");
                self.sink.status(&EngineStatus::HazardFeedFailed { error });
            }
        }
    }
}
