//! Hazard proximity monitoring
//!
//! Evaluates every fresh position fix against the hazard index. Each hazard
//! runs a small state machine:
//!
//! - `Armed` - eligible to fire
//! - fired - the fix that satisfies the trigger condition emits exactly one
//!   `AlertEvent` and moves the hazard straight into cooldown
//! - `Cooldown` - suppressed until `fired_at + cooldown`, then `Armed` again
//!
//! Cooldown is a rate limiter, not a one-shot latch: a user still inside the
//! radius when cooldown expires gets alerted again. Windows are measured on
//! fix timestamps so evaluation is deterministic for replayed streams.

use crate::domain::error::LocationError;
use crate::domain::types::{AlertEvent, Hazard, HazardId, Position};
use crate::services::hazard_index::{HazardIndex, HazardSet};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-hazard alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Armed,
    Cooldown { until: Instant },
}

/// An alert together with the hazard that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct HazardAlert {
    pub event: AlertEvent,
    pub hazard: Hazard,
}

/// Alerts from one fix, nearest first
pub type FixAlerts = SmallVec<[HazardAlert; 4]>;

/// Why a fix produced no evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixRejection {
    InvalidCoordinates,
    /// Older than the last accepted fix
    OutOfOrder,
}

pub struct ProximityMonitor {
    index: Arc<HazardIndex>,
    cooldown: Duration,
    jitter_margin_m: f64,
    /// Hazards in cooldown; absent means armed
    cooldowns: FxHashMap<HazardId, Instant>,
    last_fix_at: Option<Instant>,
}

impl ProximityMonitor {
    pub fn new(index: Arc<HazardIndex>, cooldown: Duration, jitter_margin_m: f64) -> Self {
        Self {
            index,
            cooldown,
            jitter_margin_m,
            cooldowns: FxHashMap::default(),
            last_fix_at: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// State of one hazard as of the last evaluated fix
    pub fn state(&self, hazard_id: &HazardId) -> AlertState {
        match self.cooldowns.get(hazard_id) {
            Some(&until) => AlertState::Cooldown { until },
            None => AlertState::Armed,
        }
    }

    /// Evaluate one fix. Returns the alerts it fires, nearest hazard first.
    pub fn evaluate(&mut self, fix: &Position) -> Result<FixAlerts, FixRejection> {
        if !fix.is_valid() {
            debug!(lat = %fix.latitude, lng = %fix.longitude, "fix_rejected_invalid");
            return Err(FixRejection::InvalidCoordinates);
        }
        if self.last_fix_at.is_some_and(|last| fix.timestamp < last) {
            debug!("fix_rejected_out_of_order");
            return Err(FixRejection::OutOfOrder);
        }
        self.last_fix_at = Some(fix.timestamp);

        // Cooldown -> Armed
        self.cooldowns.retain(|_, until| fix.timestamp < *until);

        let set = self.index.snapshot();
        if set.is_empty() {
            return Ok(FixAlerts::new());
        }

        let search_radius_m = set.max_trigger_radius_m() + self.jitter_margin_m;
        let point_radius_m = self.index.point_trigger_radius_m();
        let mut alerts = FixAlerts::new();

        // Query results are already sorted nearest-first
        for nearby in HazardIndex::query_set(&set, fix, search_radius_m) {
            let hazard = nearby.hazard;
            if nearby.distance_m > hazard.trigger_radius_m(point_radius_m) {
                continue;
            }
            if self.cooldowns.contains_key(&hazard.id) {
                continue;
            }

            self.cooldowns.insert(hazard.id.clone(), fix.timestamp + self.cooldown);

            info!(
                hazard_id = %hazard.id,
                kind = %hazard.kind.as_str(),
                distance_m = %format!("{:.1}", nearby.distance_m),
                cooldown_secs = %self.cooldown.as_secs(),
                "hazard_alert"
            );

            alerts.push(HazardAlert {
                event: AlertEvent {
                    hazard_id: hazard.id.clone(),
                    fired_at: fix.timestamp,
                    distance_m: nearby.distance_m,
                },
                hazard,
            });
        }

        Ok(alerts)
    }

    /// Location errors leave hazard state untouched; the next valid fix resumes evaluation
    pub fn on_location_error(&mut self, error: LocationError) {
        warn!(error = %error, armed_cooldowns = %self.cooldowns.len(), "proximity_location_error");
    }

    /// Drop cooldown entries for hazards that no longer exist after a reload
    pub fn prune_unknown(&mut self, set: &HazardSet) {
        let known: FxHashSet<&HazardId> = set.hazards().iter().map(|h| &h.id).collect();
        let before = self.cooldowns.len();
        self.cooldowns.retain(|id, _| known.contains(id));
        let pruned = before - self.cooldowns.len();
        if pruned > 0 {
            debug!(pruned = %pruned, "proximity_cooldowns_pruned");
        }
    }

    /// Number of hazards currently in cooldown
    pub fn cooling_down(&self) -> usize {
        self.cooldowns.len()
    }
}

#[cfg(test)]
mod tests;
