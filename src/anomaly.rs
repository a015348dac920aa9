//! Anomaly event types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aircraft::{EmergencySquawk, StateSnapshot};

/// Closed set of anomaly patterns, one evaluation rule each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "squawk", rename_all = "snake_case")]
pub enum AnomalyKind {
    HighSpeed,
    RapidClimb,
    RapidDescent,
    EmergencySquawk(EmergencySquawk),
    ErraticHeading,
    MultipleLaunch,
    SuddenSpeedIncrease,
    HoveringHighAltitude,
}

impl AnomalyKind {
    /// Stable key used for cooldown bookkeeping
    pub fn key(&self) -> &'static str {
        match self {
            AnomalyKind::HighSpeed => "high_speed",
            AnomalyKind::RapidClimb => "rapid_climb",
            AnomalyKind::RapidDescent => "rapid_descent",
            AnomalyKind::EmergencySquawk(EmergencySquawk::Hijack) => "squawk_7500",
            AnomalyKind::EmergencySquawk(EmergencySquawk::RadioFailure) => "squawk_7600",
            AnomalyKind::EmergencySquawk(EmergencySquawk::Emergency) => "squawk_7700",
            AnomalyKind::ErraticHeading => "erratic_heading",
            AnomalyKind::MultipleLaunch => "multiple_launch",
            AnomalyKind::SuddenSpeedIncrease => "sudden_speed_increase",
            AnomalyKind::HoveringHighAltitude => "hovering_high_altitude",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AnomalyKind::EmergencySquawk(_) => Severity::Critical,
            AnomalyKind::RapidDescent => Severity::Critical,
            AnomalyKind::MultipleLaunch => Severity::Critical,
            AnomalyKind::HighSpeed => Severity::High,
            AnomalyKind::RapidClimb => Severity::High,
            AnomalyKind::ErraticHeading => Severity::Medium,
            AnomalyKind::SuddenSpeedIncrease => Severity::Medium,
            AnomalyKind::HoveringHighAltitude => Severity::Low,
        }
    }

    /// Kinds that an airport nearby can explain away
    pub fn suppressible(&self) -> bool {
        matches!(
            self,
            AnomalyKind::HighSpeed
                | AnomalyKind::SuddenSpeedIncrease
                | AnomalyKind::RapidDescent
                | AnomalyKind::MultipleLaunch
        )
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Closest facility attached to an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestFacility {
    pub name: String,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub icao24: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub snapshot: StateSnapshot,
    pub nearest_hospital: Option<NearestFacility>,
    pub suppressed: bool,
    pub suppression_reason: Option<String>,
}

impl AnomalyEvent {
    pub fn new(kind: AnomalyKind, description: String, snapshot: &StateSnapshot) -> Self {
        Self {
            icao24: snapshot.icao24.clone(),
            kind,
            severity: kind.severity(),
            description,
            snapshot: snapshot.clone(),
            nearest_hospital: None,
            suppressed: false,
            suppression_reason: None,
        }
    }

    pub fn suppress(&mut self, reason: String) {
        self.suppressed = true;
        self.suppression_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_keys_are_distinct() {
        let kinds = [
            AnomalyKind::HighSpeed,
            AnomalyKind::RapidClimb,
            AnomalyKind::RapidDescent,
            AnomalyKind::EmergencySquawk(EmergencySquawk::Hijack),
            AnomalyKind::EmergencySquawk(EmergencySquawk::RadioFailure),
            AnomalyKind::EmergencySquawk(EmergencySquawk::Emergency),
            AnomalyKind::ErraticHeading,
            AnomalyKind::MultipleLaunch,
            AnomalyKind::SuddenSpeedIncrease,
            AnomalyKind::HoveringHighAltitude,
        ];
        let keys: std::collections::HashSet<_> = kinds.iter().map(|k| k.key()).collect();
        assert_eq!(keys.len(), kinds.len());
    }

    #[test]
    fn test_every_severity_is_reachable() {
        assert_eq!(AnomalyKind::HoveringHighAltitude.severity(), Severity::Low);
        assert_eq!(AnomalyKind::SuddenSpeedIncrease.severity(), Severity::Medium);
        assert_eq!(AnomalyKind::HighSpeed.severity(), Severity::High);
        assert_eq!(AnomalyKind::RapidDescent.severity(), Severity::Critical);
    }

    #[test]
    fn test_event_json_shape() {
        let snap = StateSnapshot::new("a1b2c3", 1_700_000_000);
        let event = AnomalyEvent::new(
            AnomalyKind::EmergencySquawk(EmergencySquawk::Emergency),
            "squawk 7700".into(),
            &snap,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "emergency_squawk");
        assert_eq!(json["kind"]["squawk"], "emergency");
        assert_eq!(json["severity"], "CRITICAL");

        let back: AnomalyEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_suppressible_kinds() {
        assert!(AnomalyKind::HighSpeed.suppressible());
        assert!(AnomalyKind::MultipleLaunch.suppressible());
        assert!(AnomalyKind::SuddenSpeedIncrease.suppressible());
        assert!(!AnomalyKind::RapidClimb.suppressible());
        assert!(!AnomalyKind::HoveringHighAltitude.suppressible());
        assert!(!AnomalyKind::EmergencySquawk(EmergencySquawk::Hijack).suppressible());
    }
}
