//! Anomaly rules
//!
//!  Every [`AnomalyKind`] has one check function. `evaluate` runs them in a
//!  fixed order, then applies airport suppression, the per-kind cooldown gate
//!  and hospital enrichment to the candidates.

use tracing::debug;

use crate::aircraft::{StateSnapshot, TrackedAircraft};
use crate::anomaly::{AnomalyEvent, AnomalyKind, NearestFacility};
use crate::config::EvaluatorConfig;
use crate::errors::StoreError;
use crate::geo::{Facility, GeoIndex};
use crate::store::{AircraftStateStore, HISTORY_LEN};

/// Absolute heading change folded onto the shorter arc, 0..=180
pub fn heading_delta(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 { 360.0 - diff } else { diff }
}

pub struct AnomalyEvaluator {
    config: EvaluatorConfig,
}

impl AnomalyEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate `current` against `previous` and the stored history.
    ///
    /// Returned events are either actionable or marked `suppressed`;
    /// candidates swallowed by the cooldown gate are not returned. Takeoffs
    /// and alert times are recorded in `store` as a side effect. Without
    /// `geo`, suppression and enrichment are skipped.
    pub fn evaluate(
        &self,
        aircraft: &TrackedAircraft,
        previous: Option<&StateSnapshot>,
        current: &StateSnapshot,
        geo: Option<&GeoIndex>,
        store: &AircraftStateStore,
    ) -> Result<Vec<AnomalyEvent>, StoreError> {
        let ident = aircraft.tail_number.as_deref().unwrap_or(&aircraft.icao24);
        let history = store.recent_history(&current.icao24, HISTORY_LEN - 1)?;

        let candidates = [
            self.check_emergency_squawk(ident, current),
            self.check_high_speed(ident, current),
            self.check_sudden_speed_increase(ident, &history, current),
            self.check_rapid_altitude(ident, previous, current),
            self.check_erratic_heading(ident, previous, current),
            self.check_hovering(ident, &history, current),
            self.check_multiple_launch(ident, previous, current, store)?,
        ];

        let mut events = Vec::new();
        for mut event in candidates.into_iter().flatten() {
            let squawk = matches!(event.kind, AnomalyKind::EmergencySquawk(_));

            if event.kind.suppressible() {
                if let Some(reason) = self.suppression_reason(current, geo) {
                    debug!(icao24 = %current.icao24, kind = %event.kind, "Suppressed: {}", reason);
                    event.suppress(reason);
                    events.push(event);
                    continue;
                }
            }

            if !squawk
                && !store.should_alert(
                    &current.icao24,
                    event.kind,
                    self.config.cooldown,
                    current.timestamp,
                )?
            {
                debug!(icao24 = %current.icao24, kind = %event.kind, "Within cooldown, dropped");
                continue;
            }

            event.nearest_hospital = self.nearest_hospital(current, geo);
            events.push(event);
        }
        Ok(events)
    }

    fn check_emergency_squawk(&self, ident: &str, current: &StateSnapshot) -> Option<AnomalyEvent> {
        let squawk = current.emergency()?;
        Some(AnomalyEvent::new(
            AnomalyKind::EmergencySquawk(squawk),
            format!("{} squawking {} ({})", ident, squawk.code(), squawk.label()),
            current,
        ))
    }

    fn check_high_speed(&self, ident: &str, current: &StateSnapshot) -> Option<AnomalyEvent> {
        if current.on_ground {
            return None;
        }
        let speed = current.ground_speed?;
        if speed <= self.config.speed_threshold_kt {
            return None;
        }
        Some(AnomalyEvent::new(
            AnomalyKind::HighSpeed,
            format!(
                "{} at {:.0} kt, above {:.0} kt",
                ident, speed, self.config.speed_threshold_kt
            ),
            current,
        ))
    }

    /// Current speed against the average of the last (up to) three stored
    /// observations
    fn check_sudden_speed_increase(
        &self,
        ident: &str,
        history: &[StateSnapshot],
        current: &StateSnapshot,
    ) -> Option<AnomalyEvent> {
        if current.on_ground || history.len() < 2 {
            return None;
        }
        let speed = current.ground_speed?;
        if speed <= self.config.speed_increase_min_kt {
            return None;
        }
        let baseline: Vec<f64> = history
            .iter()
            .rev()
            .take(3)
            .filter_map(|s| s.ground_speed)
            .filter(|v| *v > 0.0)
            .collect();
        if baseline.is_empty() {
            return None;
        }
        let average = baseline.iter().sum::<f64>() / baseline.len() as f64;
        let rise = speed - average;
        let pct = rise / average * 100.0;
        if pct <= self.config.speed_increase_pct || rise <= self.config.speed_increase_kt {
            return None;
        }
        Some(AnomalyEvent::new(
            AnomalyKind::SuddenSpeedIncrease,
            format!(
                "{} accelerated to {:.0} kt from a {:.0} kt average (+{:.0}%)",
                ident, speed, average, pct
            ),
            current,
        ))
    }

    fn check_rapid_altitude(
        &self,
        ident: &str,
        previous: Option<&StateSnapshot>,
        current: &StateSnapshot,
    ) -> Option<AnomalyEvent> {
        let previous = previous?;

        if let Some(rate) = current.vertical_rate {
            if rate.abs() > self.config.vertical_rate_fpm {
                let kind = if rate > 0.0 { AnomalyKind::RapidClimb } else { AnomalyKind::RapidDescent };
                let verb = if rate > 0.0 { "climbing" } else { "descending" };
                return Some(AnomalyEvent::new(
                    kind,
                    format!(
                        "{} {} at {:.0} ft/min, limit {:.0} ft/min",
                        ident,
                        verb,
                        rate.abs(),
                        self.config.vertical_rate_fpm
                    ),
                    current,
                ));
            }
        }

        let (prev_alt, cur_alt) = (previous.altitude?, current.altitude?);
        let elapsed = (current.timestamp - previous.timestamp).max(1) as f64;
        let window = self.config.altitude_delta_window.as_secs_f64();
        let limit = self.config.altitude_delta_ft * (elapsed / window).max(1.0);
        let delta = cur_alt - prev_alt;
        if delta.abs() <= limit {
            return None;
        }
        let kind = if delta > 0.0 { AnomalyKind::RapidClimb } else { AnomalyKind::RapidDescent };
        let verb = if delta > 0.0 { "gained" } else { "lost" };
        Some(AnomalyEvent::new(
            kind,
            format!(
                "{} {} {:.0} ft in {:.0} s ({:.0} -> {:.0} ft)",
                ident,
                verb,
                delta.abs(),
                elapsed,
                prev_alt,
                cur_alt
            ),
            current,
        ))
    }

    fn check_erratic_heading(
        &self,
        ident: &str,
        previous: Option<&StateSnapshot>,
        current: &StateSnapshot,
    ) -> Option<AnomalyEvent> {
        let previous = previous?;
        if current.on_ground {
            return None;
        }
        let (prev_hdg, cur_hdg) = (previous.heading?, current.heading?);
        let delta = heading_delta(prev_hdg, cur_hdg);
        let elapsed = (current.timestamp - previous.timestamp).max(1) as f64;
        let intervals = (elapsed / self.config.poll_interval.as_secs_f64()).max(1.0);
        if delta / intervals <= self.config.heading_delta_deg {
            return None;
        }
        Some(AnomalyEvent::new(
            AnomalyKind::ErraticHeading,
            format!(
                "{} turned {:.0} deg ({:.0} -> {:.0}) in {:.0} s",
                ident, delta, prev_hdg, cur_hdg, elapsed
            ),
            current,
        ))
    }

    /// Slow flight at high altitude across the full history window
    fn check_hovering(
        &self,
        ident: &str,
        history: &[StateSnapshot],
        current: &StateSnapshot,
    ) -> Option<AnomalyEvent> {
        if history.len() + 1 < HISTORY_LEN {
            return None;
        }
        let window = || history.iter().chain(std::iter::once(current));
        let altitudes: Vec<f64> = window().filter_map(|s| s.altitude).collect();
        let speeds: Vec<f64> = window().filter_map(|s| s.ground_speed).collect();
        if altitudes.len() < 3 || speeds.len() < 3 {
            return None;
        }
        let avg_altitude = altitudes.iter().sum::<f64>() / altitudes.len() as f64;
        let avg_speed = speeds.iter().sum::<f64>() / speeds.len() as f64;
        if avg_altitude <= self.config.hover_altitude_ft || avg_speed >= self.config.hover_speed_kt {
            return None;
        }
        Some(AnomalyEvent::new(
            AnomalyKind::HoveringHighAltitude,
            format!(
                "{} holding at {:.0} ft averaging {:.0} kt",
                ident, avg_altitude, avg_speed
            ),
            current,
        ))
    }

    fn is_takeoff(&self, previous: &StateSnapshot, current: &StateSnapshot) -> bool {
        if previous.on_ground && !current.on_ground {
            return true;
        }
        let ground = self.config.ground_altitude_ft;
        match (previous.altitude, current.altitude, previous.ground_speed, current.ground_speed) {
            (Some(prev_alt), Some(cur_alt), Some(prev_spd), Some(cur_spd)) => {
                prev_alt <= ground && cur_alt > ground && cur_spd > prev_spd
            }
            _ => false,
        }
    }

    fn check_multiple_launch(
        &self,
        ident: &str,
        previous: Option<&StateSnapshot>,
        current: &StateSnapshot,
        store: &AircraftStateStore,
    ) -> Result<Option<AnomalyEvent>, StoreError> {
        let Some(previous) = previous else {
            return Ok(None);
        };
        if !self.is_takeoff(previous, current) {
            return Ok(None);
        }

        store.record_takeoff(&current.icao24, current.timestamp)?;
        let count = store.recent_takeoff_count(
            &current.icao24,
            self.config.multi_launch_window,
            current.timestamp,
        )?;
        debug!(icao24 = %current.icao24, count, "Takeoff recorded");
        if count < self.config.multi_launch_count {
            return Ok(None);
        }
        Ok(Some(AnomalyEvent::new(
            AnomalyKind::MultipleLaunch,
            format!(
                "{} launched {} times within {} min",
                ident,
                count,
                self.config.multi_launch_window.as_secs() / 60
            ),
            current,
        )))
    }

    fn suppression_reason(&self, current: &StateSnapshot, geo: Option<&GeoIndex>) -> Option<String> {
        let (lat, lon) = current.position()?;
        let (airport, distance) =
            geo?.nearest(Facility::Airport, lat, lon, self.config.suppression_radius_km)?;
        Some(format!("{:.1} km from airport {}", distance, airport.name))
    }

    fn nearest_hospital(&self, current: &StateSnapshot, geo: Option<&GeoIndex>) -> Option<NearestFacility> {
        let (lat, lon) = current.position()?;
        let (hospital, distance) =
            geo?.nearest(Facility::Hospital, lat, lon, self.config.enrichment_radius_km)?;
        Some(NearestFacility {
            name: hospital.name.clone(),
            distance_km: distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::aircraft::{Category, EmergencySquawk};
    use crate::geo::GeoPoint;

    const CODE: &str = "A1B2C3";

    fn setup() -> (AnomalyEvaluator, AircraftStateStore, TrackedAircraft) {
        let config = EvaluatorConfig::default();
        let store = AircraftStateStore::in_memory(config.multi_launch_window).unwrap();
        let mut aircraft = TrackedAircraft::new(CODE, Category::Ems);
        aircraft.tail_number = Some("N911LF".into());
        (AnomalyEvaluator::new(config), store, aircraft)
    }

    fn airborne(ts: i64) -> StateSnapshot {
        let mut s = StateSnapshot::new(CODE, ts);
        s.latitude = Some(40.0);
        s.longitude = Some(-75.0);
        s.altitude = Some(1500.0);
        s.ground_speed = Some(110.0);
        s.heading = Some(90.0);
        s.vertical_rate = Some(0.0);
        s
    }

    fn on_ground(ts: i64) -> StateSnapshot {
        let mut s = airborne(ts);
        s.on_ground = true;
        s.altitude = Some(0.0);
        s.ground_speed = Some(0.0);
        s
    }

    fn geo_with(airports: Vec<(f64, f64)>, hospitals: Vec<(f64, f64)>) -> GeoIndex {
        let point = |category, name: &str, (lat, lon): (f64, f64)| GeoPoint {
            name: name.to_string(),
            lat,
            lon,
            category,
        };
        GeoIndex::new(
            airports.into_iter().map(|p| point(Facility::Airport, "Field", p)).collect(),
            hospitals.into_iter().map(|p| point(Facility::Hospital, "Mercy", p)).collect(),
        )
    }

    fn kinds(events: &[AnomalyEvent]) -> Vec<AnomalyKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_heading_delta_shorter_arc() {
        assert_eq!(heading_delta(350.0, 10.0), 20.0);
        assert_eq!(heading_delta(10.0, 350.0), 20.0);
        assert_eq!(heading_delta(0.0, 180.0), 180.0);
        assert_eq!(heading_delta(90.0, 90.0), 0.0);
    }

    #[test]
    fn test_no_high_speed_on_ground() {
        let (eval, store, ac) = setup();
        for speed in [0.0, 40.0, 149.0, 400.0] {
            let mut s = on_ground(100);
            s.ground_speed = Some(speed);
            let events = eval.evaluate(&ac, None, &s, None, &store).unwrap();
            assert!(!kinds(&events).contains(&AnomalyKind::HighSpeed));
        }
    }

    #[test]
    fn test_high_speed_on_first_observation() {
        let (eval, store, ac) = setup();
        let mut s = airborne(100);
        s.ground_speed = Some(165.0);
        let events = eval.evaluate(&ac, None, &s, None, &store).unwrap();
        assert_eq!(kinds(&events), vec![AnomalyKind::HighSpeed]);
        assert!(events[0].description.contains("N911LF"));
    }

    #[test]
    fn test_emergency_squawk_first_observation_and_no_cooldown() {
        let (eval, store, ac) = setup();
        let mut s = airborne(100);
        s.squawk = Some("7700".into());

        let events = eval.evaluate(&ac, None, &s, None, &store).unwrap();
        assert_eq!(
            kinds(&events),
            vec![AnomalyKind::EmergencySquawk(EmergencySquawk::Emergency)]
        );

        // Fires again on the next poll; never gated
        let mut next = s.clone();
        next.timestamp = 110;
        let events = eval.evaluate(&ac, Some(&s), &next, None, &store).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_squawk_never_suppressed_near_airport() {
        let (eval, store, ac) = setup();
        let geo = geo_with(vec![(40.0, -75.0)], vec![]);
        let mut s = airborne(100);
        s.squawk = Some("7500".into());
        let events = eval.evaluate(&ac, None, &s, Some(&geo), &store).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].suppressed);
    }

    #[test]
    fn test_rapid_descent_scenario() {
        let (eval, store, ac) = setup();
        let mut prev = airborne(1000);
        prev.altitude = Some(2000.0);
        let mut cur = airborne(1005);
        cur.altitude = Some(500.0);
        cur.vertical_rate = Some(-3000.0);

        let events = eval.evaluate(&ac, Some(&prev), &cur, None, &store).unwrap();
        assert_eq!(kinds(&events), vec![AnomalyKind::RapidDescent]);
        assert!(!events[0].suppressed);

        // Same profile with an airport 2 km away
        let (eval, store, ac) = setup();
        let geo = geo_with(vec![(40.018, -75.0)], vec![]);
        let events = eval.evaluate(&ac, Some(&prev), &cur, Some(&geo), &store).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].suppressed);
        assert!(events[0].suppression_reason.as_deref().unwrap().contains("Field"));
    }

    #[test]
    fn test_altitude_delta_without_vertical_rate() {
        let (eval, store, ac) = setup();
        let prev = airborne(1000);
        let mut cur = airborne(1060);
        cur.vertical_rate = None;

        // 60 s is two 30 s windows: limit is 2000 ft
        cur.altitude = Some(1500.0 + 1900.0);
        assert!(eval.evaluate(&ac, Some(&prev), &cur, None, &store).unwrap().is_empty());

        cur.altitude = Some(1500.0 + 2100.0);
        let events = eval.evaluate(&ac, Some(&prev), &cur, None, &store).unwrap();
        assert_eq!(kinds(&events), vec![AnomalyKind::RapidClimb]);
    }

    #[test]
    fn test_delta_rules_need_previous_snapshot() {
        let (eval, store, ac) = setup();
        let mut s = airborne(100);
        s.vertical_rate = Some(-5000.0);
        s.heading = Some(270.0);
        assert!(eval.evaluate(&ac, None, &s, None, &store).unwrap().is_empty());
    }

    #[test]
    fn test_erratic_heading() {
        let (eval, store, ac) = setup();
        let prev = airborne(1000);

        let mut cur = airborne(1060);
        cur.heading = Some(200.0);
        let events = eval.evaluate(&ac, Some(&prev), &cur, None, &store).unwrap();
        assert_eq!(kinds(&events), vec![AnomalyKind::ErraticHeading]);

        // Same turn spread over three poll intervals is fine
        let (eval, store, ac) = setup();
        let mut slow = airborne(1180);
        slow.heading = Some(200.0);
        assert!(eval.evaluate(&ac, Some(&prev), &slow, None, &store).unwrap().is_empty());

        // Taxiing turns are ignored
        let mut taxi = on_ground(1060);
        taxi.heading = Some(270.0);
        let mut taxi_prev = on_ground(1000);
        taxi_prev.heading = Some(90.0);
        assert!(eval.evaluate(&ac, Some(&taxi_prev), &taxi, None, &store).unwrap().is_empty());
    }

    #[test]
    fn test_multiple_launch_fires_on_third_takeoff() {
        let (eval, store, ac) = setup();
        let mut emitted = Vec::new();
        for cycle in 0..3 {
            let base = 1000 + cycle * 60;
            let ground = on_ground(base);
            let mut air = airborne(base + 30);
            air.ground_speed = Some(90.0);
            air.altitude = Some(800.0);
            let events = eval.evaluate(&ac, Some(&ground), &air, None, &store).unwrap();
            emitted.push(kinds(&events));
        }
        assert!(emitted[0].is_empty());
        assert!(emitted[1].is_empty());
        assert_eq!(emitted[2], vec![AnomalyKind::MultipleLaunch]);
        assert_eq!(store.recent_takeoff_count(CODE, Duration::from_secs(300), 1150).unwrap(), 3);
    }

    #[test]
    fn test_takeoff_from_altitude_crossing() {
        let (eval, store, ac) = setup();
        let mut prev = airborne(1000);
        prev.altitude = Some(50.0);
        prev.ground_speed = Some(20.0);
        let mut cur = airborne(1030);
        cur.altitude = Some(400.0);
        cur.ground_speed = Some(80.0);

        eval.evaluate(&ac, Some(&prev), &cur, None, &store).unwrap();
        assert_eq!(store.recent_takeoff_count(CODE, Duration::from_secs(300), 1030).unwrap(), 1);
    }

    #[test]
    fn test_cooldown_deduplicates_sustained_condition() {
        let (eval, store, ac) = setup();
        let mut s = airborne(1000);
        s.ground_speed = Some(170.0);

        assert_eq!(eval.evaluate(&ac, None, &s, None, &store).unwrap().len(), 1);
        let mut next = s.clone();
        next.timestamp = 1060;
        assert!(eval.evaluate(&ac, Some(&s), &next, None, &store).unwrap().is_empty());
        let mut later = s.clone();
        later.timestamp = 1300;
        assert_eq!(eval.evaluate(&ac, Some(&next), &later, None, &store).unwrap().len(), 1);
    }

    #[test]
    fn test_suppressed_event_does_not_consume_cooldown() {
        let (eval, store, ac) = setup();
        let geo = geo_with(vec![(40.0, -75.0)], vec![]);
        let mut s = airborne(1000);
        s.ground_speed = Some(170.0);

        let events = eval.evaluate(&ac, None, &s, Some(&geo), &store).unwrap();
        assert!(events[0].suppressed);

        // Away from the airport shortly after: alert is not blocked
        let mut away = s.clone();
        away.timestamp = 1010;
        away.latitude = Some(41.0);
        let events = eval.evaluate(&ac, Some(&s), &away, Some(&geo), &store).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].suppressed);
    }

    #[test]
    fn test_rapid_climb_is_not_suppressed() {
        let (eval, store, ac) = setup();
        let geo = geo_with(vec![(40.0, -75.0)], vec![]);
        let prev = airborne(1000);
        let mut cur = airborne(1010);
        cur.vertical_rate = Some(2500.0);
        let events = eval.evaluate(&ac, Some(&prev), &cur, Some(&geo), &store).unwrap();
        assert_eq!(kinds(&events), vec![AnomalyKind::RapidClimb]);
        assert!(!events[0].suppressed);
    }

    fn record(store: &AircraftStateStore, snaps: &[StateSnapshot]) {
        for s in snaps {
            store.update(CODE, s).unwrap();
        }
    }

    #[test]
    fn test_sudden_speed_increase_against_recent_average() {
        let (eval, store, ac) = setup();
        let mut slow = Vec::new();
        for i in 0..3 {
            let mut s = airborne(1000 + i * 60);
            s.ground_speed = Some(60.0);
            slow.push(s);
        }
        record(&store, &slow);

        let mut cur = airborne(1180);
        cur.ground_speed = Some(110.0);
        let events = eval.evaluate(&ac, slow.last(), &cur, None, &store).unwrap();
        assert_eq!(kinds(&events), vec![AnomalyKind::SuddenSpeedIncrease]);
        assert_eq!(events[0].severity, crate::anomaly::Severity::Medium);

        // +50% is below the 60% rise
        let (eval, store, ac) = setup();
        record(&store, &slow);
        cur.ground_speed = Some(90.0);
        assert!(eval.evaluate(&ac, slow.last(), &cur, None, &store).unwrap().is_empty());
    }

    #[test]
    fn test_sudden_speed_increase_needs_two_stored_observations() {
        let (eval, store, ac) = setup();
        let mut prev = airborne(1000);
        prev.ground_speed = Some(40.0);
        record(&store, std::slice::from_ref(&prev));

        let mut cur = airborne(1060);
        cur.ground_speed = Some(120.0);
        assert!(eval.evaluate(&ac, Some(&prev), &cur, None, &store).unwrap().is_empty());
    }

    #[test]
    fn test_sudden_speed_increase_suppressed_near_airport() {
        let (eval, store, ac) = setup();
        let geo = geo_with(vec![(40.0, -75.0)], vec![]);
        let mut slow = Vec::new();
        for i in 0..2 {
            let mut s = airborne(1000 + i * 60);
            s.ground_speed = Some(40.0);
            slow.push(s);
        }
        record(&store, &slow);

        let mut cur = airborne(1120);
        cur.ground_speed = Some(100.0);
        let events = eval.evaluate(&ac, slow.last(), &cur, Some(&geo), &store).unwrap();
        assert_eq!(kinds(&events), vec![AnomalyKind::SuddenSpeedIncrease]);
        assert!(events[0].suppressed);
    }

    #[test]
    fn test_hovering_high_altitude() {
        let (eval, store, ac) = setup();
        let mut hover = Vec::new();
        for i in 0..4 {
            let mut s = airborne(1000 + i * 60);
            s.altitude = Some(6000.0);
            s.ground_speed = Some(10.0);
            hover.push(s);
        }
        record(&store, &hover);

        let mut cur = airborne(1240);
        cur.altitude = Some(6000.0);
        cur.ground_speed = Some(12.0);
        let events = eval.evaluate(&ac, hover.last(), &cur, None, &store).unwrap();
        assert_eq!(kinds(&events), vec![AnomalyKind::HoveringHighAltitude]);
        assert_eq!(events[0].severity, crate::anomaly::Severity::Low);

        // Four samples are not enough
        let (eval, store, ac) = setup();
        record(&store, &hover[1..]);
        assert!(eval.evaluate(&ac, hover.last(), &cur, None, &store).unwrap().is_empty());

        // Low and slow is a normal hover
        let (eval, store, ac) = setup();
        let low: Vec<StateSnapshot> = hover
            .iter()
            .cloned()
            .map(|mut s| {
                s.altitude = Some(800.0);
                s
            })
            .collect();
        record(&store, &low);
        cur.altitude = Some(800.0);
        assert!(eval.evaluate(&ac, low.last(), &cur, None, &store).unwrap().is_empty());
    }

    #[test]
    fn test_hospital_enrichment() {
        let (eval, store, ac) = setup();
        let geo = geo_with(vec![], vec![(40.05, -75.0), (40.5, -75.0)]);
        let mut s = airborne(1000);
        s.ground_speed = Some(170.0);

        let events = eval.evaluate(&ac, None, &s, Some(&geo), &store).unwrap();
        let hospital = events[0].nearest_hospital.as_ref().unwrap();
        assert_eq!(hospital.name, "Mercy");
        assert!((hospital.distance_km - 5.56).abs() < 0.1);

        // Nothing within radius
        let (eval, store, ac) = setup();
        let far = geo_with(vec![], vec![(41.0, -75.0)]);
        let events = eval.evaluate(&ac, None, &s, Some(&far), &store).unwrap();
        assert!(events[0].nearest_hospital.is_none());
    }
}
