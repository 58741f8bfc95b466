//! Queryable set of point and zone hazards
//!
//! Read-mostly: queries take a cheap snapshot of the current set, reloads
//! build a complete new set and swap it in under the write lock. A query
//! never observes a half-loaded set.

use crate::domain::types::{Hazard, Position};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// A hazard returned by a proximity query
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyHazard {
    pub hazard: Hazard,
    pub distance_m: f64,
}

/// Immutable hazard set plus values precomputed at load time
#[derive(Debug, Default)]
pub struct HazardSet {
    hazards: Vec<Hazard>,
    max_trigger_radius_m: f64,
}

impl HazardSet {
    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub fn max_trigger_radius_m(&self) -> f64 {
        self.max_trigger_radius_m
    }

    pub fn len(&self) -> usize {
        self.hazards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hazards.is_empty()
    }
}

pub struct HazardIndex {
    current: RwLock<Arc<HazardSet>>,
    /// Trigger radius for point hazards (radius 0)
    point_trigger_radius_m: f64,
}

impl HazardIndex {
    pub fn new(point_trigger_radius_m: f64) -> Self {
        Self { current: RwLock::new(Arc::new(HazardSet::default())), point_trigger_radius_m }
    }

    pub fn point_trigger_radius_m(&self) -> f64 {
        self.point_trigger_radius_m
    }

    /// Replace the whole set atomically. Duplicate ids keep the first entry.
    /// Returns the number of hazards now indexed.
    pub fn load_static(&self, hazards: Vec<Hazard>) -> usize {
        let mut seen = FxHashSet::default();
        let mut unique = Vec::with_capacity(hazards.len());
        for hazard in hazards {
            if seen.insert(hazard.id.clone()) {
                unique.push(hazard);
            } else {
                warn!(hazard_id = %hazard.id, "hazard_duplicate_id_dropped");
            }
        }

        let max_trigger_radius_m = unique
            .iter()
            .map(|h| h.trigger_radius_m(self.point_trigger_radius_m))
            .fold(0.0_f64, f64::max);

        let set = Arc::new(HazardSet { hazards: unique, max_trigger_radius_m });
        let count = set.len();

        *self.current.write() = set;

        info!(count = %count, max_trigger_radius_m = %max_trigger_radius_m, "hazard_index_loaded");
        count
    }

    /// Current set; stays valid even if a reload happens meanwhile
    pub fn snapshot(&self) -> Arc<HazardSet> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Largest trigger radius in the current set (0 when empty)
    pub fn max_trigger_radius_m(&self) -> f64 {
        self.current.read().max_trigger_radius_m
    }

    /// Hazards whose centre lies within `radius_m` of `point`, nearest first.
    /// Never fails; no match is an empty result.
    pub fn query(&self, point: &Position, radius_m: f64) -> Vec<NearbyHazard> {
        Self::query_set(&self.snapshot(), point, radius_m)
    }

    /// Query against an explicit snapshot
    pub fn query_set(set: &HazardSet, point: &Position, radius_m: f64) -> Vec<NearbyHazard> {
        if !point.is_valid() || radius_m.is_nan() || radius_m < 0.0 {
            return Vec::new();
        }

        let mut hits: Vec<NearbyHazard> = set
            .hazards
            .iter()
            .filter(|h| {
                crate::domain::geo::within_bbox(
                    point.latitude,
                    point.longitude,
                    h.location.latitude,
                    h.location.longitude,
                    radius_m,
                )
            })
            .filter_map(|h| {
                let distance_m = point.distance_m(&h.location);
                (distance_m <= radius_m).then(|| NearbyHazard { hazard: h.clone(), distance_m })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance_m.total_cmp(&b.distance_m).then_with(|| a.hazard.id.cmp(&b.hazard.id))
        });
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{HazardId, HazardKind};
    use crate::io::hazard_feed::parse_feed;
    use std::time::Instant;

    fn hazard(id: &str, lat: f64, lng: f64, radius_m: f64) -> Hazard {
        Hazard {
            id: HazardId(id.to_string()),
            kind: HazardKind::SpeedBreaker,
            location: Position::new(lat, lng),
            radius_m,
            message: format!("{id} ahead"),
        }
    }

    #[test]
    fn test_empty_index_query() {
        let index = HazardIndex::new(50.0);
        assert!(index.query(&Position::new(13.0, 80.0), 1000.0).is_empty());
        assert_eq!(index.max_trigger_radius_m(), 0.0);
    }

    #[test]
    fn test_query_sorted_by_distance() {
        let index = HazardIndex::new(50.0);
        index.load_static(vec![
            hazard("far", 13.0836, 80.2707, 0.0),  // ~100 m
            hazard("near", 13.0829, 80.2707, 0.0), // ~22 m
            hazard("out", 13.1, 80.28, 0.0),       // ~2 km
        ]);

        let hits = index.query(&Position::new(13.0827, 80.2707), 150.0);
        let ids: Vec<_> = hits.iter().map(|h| h.hazard.id.0.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert!(hits[0].distance_m < hits[1].distance_m);
    }

    #[test]
    fn test_query_boundary_inclusive() {
        let index = HazardIndex::new(50.0);
        index.load_static(vec![hazard("h", 13.0832, 80.2707, 0.0)]);
        let p = Position::new(13.0827, 80.2707);
        let d = p.distance_m(&index.snapshot().hazards()[0].location);
        assert_eq!(index.query(&p, d).len(), 1);
        assert!(index.query(&p, d - 0.01).is_empty());
    }

    #[test]
    fn test_max_trigger_radius() {
        let index = HazardIndex::new(50.0);
        index.load_static(vec![hazard("p", 13.0, 80.0, 0.0), hazard("z", 13.1, 80.1, 400.0)]);
        assert_eq!(index.max_trigger_radius_m(), 400.0);

        index.load_static(vec![hazard("p", 13.0, 80.0, 0.0)]);
        assert_eq!(index.max_trigger_radius_m(), 50.0);
    }

    #[test]
    fn test_reload_replaces_set() {
        let index = HazardIndex::new(50.0);
        index.load_static(vec![hazard("a", 13.0, 80.0, 0.0)]);
        let old = index.snapshot();

        index.load_static(vec![hazard("b", 13.0, 80.0, 0.0), hazard("c", 13.0001, 80.0, 0.0)]);

        // Old snapshot is untouched, new queries see only the new set
        assert_eq!(old.len(), 1);
        assert_eq!(index.len(), 2);
        let ids: Vec<_> =
            index.query(&Position::new(13.0, 80.0), 100.0).into_iter().map(|h| h.hazard.id.0).collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let index = HazardIndex::new(50.0);
        let count = index.load_static(vec![hazard("a", 13.0, 80.0, 0.0), hazard("a", 14.0, 81.0, 0.0)]);
        assert_eq!(count, 1);
        assert_eq!(index.snapshot().hazards()[0].location.latitude, 13.0);
    }

    #[test]
    fn test_feed_with_malformed_entries_round_trip() {
        let body = r#"[
            {"type": "Speed Breaker", "lat": 13.1, "lng": 80.28, "message": "a"},
            {"type": "High Traffic", "lat": 13.0827, "lng": 80.2707, "message": "b"},
            {"type": "Speed Breaker", "lat": null, "lng": 80.28},
            {"nonsense": true},
            {"type": "Animal Crossing", "lat": 13.07, "lng": 80.24, "message": "c"}
        ]"#;
        let batch = parse_feed(body).unwrap();
        assert_eq!(batch.skipped, 2);

        let index = HazardIndex::new(50.0);
        assert_eq!(index.load_static(batch.hazards), 3);

        // Every loaded hazard is reachable by a query at its own location
        for h in index.snapshot().hazards() {
            let at = Position::at(h.location.latitude, h.location.longitude, Instant::now());
            assert!(index.query(&at, 1.0).iter().any(|n| n.hazard.id == h.id));
        }
    }

    #[test]
    fn test_colocated_feed_entries_all_indexed() {
        let body = r#"[
            {"type": "Speed Breaker", "lat": 13.1, "lng": 80.28, "message": "first"},
            {"type": "Speed Breaker", "lat": 13.1, "lng": 80.28, "message": "second"}
        ]"#;
        let batch = parse_feed(body).unwrap();
        assert_eq!(batch.skipped, 0);

        let index = HazardIndex::new(50.0);
        assert_eq!(index.load_static(batch.hazards), 2);
        let here = Position::at(13.1, 80.28, Instant::now());
        let mut messages: Vec<_> = index.query(&here, 1.0).into_iter().map(|n| n.hazard.message).collect();
        messages.sort();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_concurrent_reads_during_reload() {
        let index = Arc::new(HazardIndex::new(50.0));
        let set_a: Vec<_> = (0..10).map(|i| hazard(&format!("a{i}"), 13.0, 80.0 + i as f64 * 1e-5, 0.0)).collect();
        let set_b: Vec<_> = (0..20).map(|i| hazard(&format!("b{i}"), 13.0, 80.0 + i as f64 * 1e-5, 0.0)).collect();
        index.load_static(set_a.clone());

        let reader = {
            let index = index.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let n = index.query(&Position::new(13.0, 80.0), 1000.0).len();
                    assert!(n == 10 || n == 20, "observed partial set of {n}");
                }
            })
        };

        for i in 0..100 {
            index.load_static(if i % 2 == 0 { set_b.clone() } else { set_a.clone() });
        }
        reader.join().unwrap();
    }
}
