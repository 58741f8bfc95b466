//! Tests for the ProximityMonitor

use super::*;
use crate::domain::types::HazardKind;
use proptest::prelude::*;

const BASE_LAT: f64 = 13.0827;
const BASE_LNG: f64 = 80.2707;
/// Roughly one metre of latitude in degrees
const DEG_PER_M: f64 = 1.0 / 111_195.0;

fn point_hazard(id: &str, lat: f64, lng: f64) -> Hazard {
    Hazard {
        id: HazardId(id.to_string()),
        kind: HazardKind::SpeedBreaker,
        location: Position::new(lat, lng),
        radius_m: 0.0,
        message: "Speed breaker ahead".to_string(),
    }
}

fn zone_hazard(id: &str, lat: f64, lng: f64, radius_m: f64) -> Hazard {
    Hazard {
        id: HazardId(id.to_string()),
        kind: HazardKind::TrafficZone,
        location: Position::new(lat, lng),
        radius_m,
        message: "Heavy traffic".to_string(),
    }
}

fn create_monitor(hazards: Vec<Hazard>, cooldown_secs: u64) -> ProximityMonitor {
    let index = Arc::new(HazardIndex::new(50.0));
    index.load_static(hazards);
    ProximityMonitor::new(index, Duration::from_secs(cooldown_secs), 25.0)
}

/// Fix `north_m` metres north of the base point, `secs` after `t0`
fn fix_at(t0: Instant, secs: u64, north_m: f64) -> Position {
    Position::at(BASE_LAT + north_m * DEG_PER_M, BASE_LNG, t0 + Duration::from_secs(secs))
}

fn ids(alerts: &FixAlerts) -> Vec<&str> {
    alerts.iter().map(|a| a.event.hazard_id.0.as_str()).collect()
}

#[test]
fn test_fires_once_when_entering_radius() {
    let mut monitor = create_monitor(vec![point_hazard("sb", BASE_LAT, BASE_LNG)], 60);
    let t0 = Instant::now();

    // Approach from 200 m out in 20 m steps, one per second
    let mut fired = Vec::new();
    for (i, north) in (0..=10).rev().map(|k| k as f64 * 20.0).enumerate() {
        let alerts = monitor.evaluate(&fix_at(t0, i as u64, north)).unwrap();
        fired.extend(alerts.into_iter().map(|a| (i, a.event.distance_m)));
    }

    assert_eq!(fired.len(), 1);
    let (step, distance) = fired[0];
    // 40 m is the first fix inside the 50 m default radius
    assert_eq!(step, 8);
    assert!((distance - 40.0).abs() < 0.5, "distance {distance}");
}

#[test]
fn test_no_repeat_while_dwelling_in_cooldown() {
    let mut monitor = create_monitor(vec![zone_hazard("tz", BASE_LAT, BASE_LNG, 200.0)], 60);
    let t0 = Instant::now();

    assert_eq!(monitor.evaluate(&fix_at(t0, 0, 10.0)).unwrap().len(), 1);
    for secs in 1..60 {
        assert!(monitor.evaluate(&fix_at(t0, secs, 10.0)).unwrap().is_empty(), "repeat at {secs}s");
    }
    assert!(matches!(monitor.state(&HazardId("tz".into())), AlertState::Cooldown { .. }));
}

#[test]
fn test_retriggers_after_cooldown_while_inside() {
    let mut monitor = create_monitor(vec![zone_hazard("tz", BASE_LAT, BASE_LNG, 200.0)], 60);
    let t0 = Instant::now();

    assert_eq!(monitor.evaluate(&fix_at(t0, 0, 0.0)).unwrap().len(), 1);
    assert!(monitor.evaluate(&fix_at(t0, 59, 0.0)).unwrap().is_empty());
    let again = monitor.evaluate(&fix_at(t0, 60, 0.0)).unwrap();
    assert_eq!(ids(&again), vec!["tz"]);
}

#[test]
fn test_cooldown_expiry_outside_rearms() {
    let mut monitor = create_monitor(vec![point_hazard("sb", BASE_LAT, BASE_LNG)], 30);
    let t0 = Instant::now();
    let id = HazardId("sb".into());

    monitor.evaluate(&fix_at(t0, 0, 0.0)).unwrap();
    assert_ne!(monitor.state(&id), AlertState::Armed);

    monitor.evaluate(&fix_at(t0, 40, 500.0)).unwrap();
    assert_eq!(monitor.state(&id), AlertState::Armed);

    // Second crossing fires again
    assert_eq!(monitor.evaluate(&fix_at(t0, 41, 10.0)).unwrap().len(), 1);
}

#[test]
fn test_multiple_hazards_nearest_first() {
    let hazards = vec![
        point_hazard("far", BASE_LAT + 40.0 * DEG_PER_M, BASE_LNG),
        point_hazard("near", BASE_LAT + 5.0 * DEG_PER_M, BASE_LNG),
        zone_hazard("zone", BASE_LAT + 100.0 * DEG_PER_M, BASE_LNG, 150.0),
    ];
    let mut monitor = create_monitor(hazards, 60);

    let alerts = monitor.evaluate(&fix_at(Instant::now(), 0, 0.0)).unwrap();
    assert_eq!(ids(&alerts), vec!["near", "far", "zone"]);
    assert!(alerts.windows(2).all(|w| w[0].event.distance_m <= w[1].event.distance_m));
}

#[test]
fn test_zone_uses_own_radius_not_default() {
    // 80 m away: outside the 50 m point radius, inside a 100 m zone
    let hazards = vec![
        point_hazard("point", BASE_LAT + 80.0 * DEG_PER_M, BASE_LNG),
        zone_hazard("zone", BASE_LAT + 80.0 * DEG_PER_M, BASE_LNG + 1e-6, 100.0),
    ];
    let mut monitor = create_monitor(hazards, 60);

    let alerts = monitor.evaluate(&fix_at(Instant::now(), 0, 0.0)).unwrap();
    assert_eq!(ids(&alerts), vec!["zone"]);
}

#[test]
fn test_small_zone_radius_respected() {
    // A zone smaller than the point default only fires inside its own radius
    let mut monitor = create_monitor(vec![zone_hazard("tiny", BASE_LAT, BASE_LNG, 10.0)], 60);
    let t0 = Instant::now();
    assert!(monitor.evaluate(&fix_at(t0, 0, 30.0)).unwrap().is_empty());
    assert_eq!(monitor.evaluate(&fix_at(t0, 1, 5.0)).unwrap().len(), 1);
}

#[test]
fn test_location_error_keeps_monitor_armed() {
    let mut monitor = create_monitor(vec![point_hazard("sb", BASE_LAT, BASE_LNG)], 60);
    let t0 = Instant::now();

    monitor.on_location_error(LocationError::Unavailable);
    monitor.on_location_error(LocationError::Timeout);
    assert_eq!(monitor.state(&HazardId("sb".into())), AlertState::Armed);

    assert_eq!(monitor.evaluate(&fix_at(t0, 0, 0.0)).unwrap().len(), 1);
}

#[test]
fn test_rejects_invalid_and_out_of_order_fixes() {
    let mut monitor = create_monitor(vec![point_hazard("sb", BASE_LAT, BASE_LNG)], 60);
    let t0 = Instant::now();

    let bad = Position::at(f64::NAN, BASE_LNG, t0);
    assert_eq!(monitor.evaluate(&bad), Err(FixRejection::InvalidCoordinates));

    monitor.evaluate(&fix_at(t0, 10, 500.0)).unwrap();
    assert_eq!(monitor.evaluate(&fix_at(t0, 5, 0.0)), Err(FixRejection::OutOfOrder));
    assert_eq!(monitor.cooling_down(), 0);
}

#[test]
fn test_empty_index_never_alerts() {
    let mut monitor = create_monitor(vec![], 60);
    assert!(monitor.evaluate(&fix_at(Instant::now(), 0, 0.0)).unwrap().is_empty());
}

#[test]
fn test_reload_keeps_cooldown_for_same_id_and_prunes_removed() {
    let index = Arc::new(HazardIndex::new(50.0));
    index.load_static(vec![point_hazard("a", BASE_LAT, BASE_LNG), point_hazard("b", BASE_LAT, BASE_LNG + 1e-6)]);
    let mut monitor = ProximityMonitor::new(index.clone(), Duration::from_secs(60), 25.0);
    let t0 = Instant::now();

    assert_eq!(monitor.evaluate(&fix_at(t0, 0, 0.0)).unwrap().len(), 2);

    index.load_static(vec![point_hazard("a", BASE_LAT, BASE_LNG)]);
    monitor.prune_unknown(&index.snapshot());
    assert_eq!(monitor.cooling_down(), 1);

    // "a" survived the reload with its cooldown intact
    assert!(monitor.evaluate(&fix_at(t0, 1, 0.0)).unwrap().is_empty());
}

proptest! {
    /// No hazard ever fires twice within one cooldown window, whatever the walk
    #[test]
    fn prop_at_most_one_alert_per_cooldown_window(
        offsets in proptest::collection::vec((-150.0f64..150.0, -150.0f64..150.0), 1..6),
        steps in proptest::collection::vec((-30.0f64..30.0, -30.0f64..30.0, 0u64..20), 1..120),
        cooldown_secs in 1u64..90,
    ) {
        let hazards: Vec<Hazard> = offsets
            .iter()
            .enumerate()
            .map(|(i, (dn, de))| point_hazard(&format!("h{i}"), BASE_LAT + dn * DEG_PER_M, BASE_LNG + de * DEG_PER_M))
            .collect();
        let mut monitor = create_monitor(hazards, cooldown_secs);
        let cooldown = Duration::from_secs(cooldown_secs);

        let t0 = Instant::now();
        let (mut north, mut east, mut t) = (0.0f64, 0.0f64, 0u64);
        let mut last_fired: FxHashMap<HazardId, Instant> = FxHashMap::default();

        for (dn, de, dt) in steps {
            north += dn;
            east += de;
            t += dt;
            let fix = Position::at(BASE_LAT + north * DEG_PER_M, BASE_LNG + east * DEG_PER_M, t0 + Duration::from_secs(t));
            let alerts = monitor.evaluate(&fix).unwrap();

            prop_assert!(alerts.windows(2).all(|w| w[0].event.distance_m <= w[1].event.distance_m));
            for alert in alerts {
                if let Some(prev) = last_fired.get(&alert.event.hazard_id) {
                    prop_assert!(alert.event.fired_at.duration_since(*prev) >= cooldown);
                }
                last_fired.insert(alert.event.hazard_id.clone(), alert.event.fired_at);
            }
        }
    }
}
