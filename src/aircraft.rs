//! Aircraft identity and observation types
//!
//!  `TrackedAircraft` comes from the fleet registry and never changes once
//!  loaded. `StateSnapshot` is one polled observation of one transponder.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Feet per meter
pub const FEET_PER_METER: f64 = 3.28084;
/// Knots per m/s
pub const KNOTS_PER_MS: f64 = 1.94384;
/// ft/min per m/s
pub const FPM_PER_MS: f64 = 196.85;

/// Fleet the aircraft belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Ems,
    LawEnforcement,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Ems => write!(f, "EMS"),
            Category::LawEnforcement => write!(f, "LAW_ENFORCEMENT"),
        }
    }
}

/// How sure the registry filter was that the aircraft belongs to the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Confidence::Low),
            "medium" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }
}

/// Registry record of a monitored aircraft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedAircraft {
    /// ICAO 24-bit address as 6 uppercase hex digits
    pub icao24: String,
    /// Registration (N-number)
    pub tail_number: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub owner: Option<String>,
    /// Two-letter state code of the registered owner
    pub owner_state: Option<String>,
    pub category: Category,
    pub confidence: Confidence,
}

impl TrackedAircraft {
    /// Minimal record, mostly useful for tests and ad-hoc lookups
    pub fn new(icao24: &str, category: Category) -> Self {
        Self {
            icao24: icao24.to_ascii_uppercase(),
            tail_number: None,
            model: None,
            manufacturer: None,
            owner: None,
            owner_state: None,
            category,
            confidence: Confidence::High,
        }
    }

    /// FlightAware tracking link derived from the tail number
    pub fn flightaware_url(&self) -> Option<String> {
        let tail = self.tail_number.as_deref()?.trim().to_ascii_uppercase();
        if tail.is_empty() || tail == "N/A" {
            return None;
        }
        let tail = if tail.starts_with('N') { tail } else { format!("N{}", tail) };
        Some(format!("https://www.flightaware.com/live/flight/{}", tail))
    }
}

/// Normalize a transponder code; `None` unless it is exactly 6 hex digits
pub fn normalize_icao24(code: &str) -> Option<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(code)
    } else {
        None
    }
}

/// One observation of an aircraft, in feet / knots / ft-per-minute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub icao24: String,
    /// Unix seconds of the observation
    pub timestamp: i64,
    pub callsign: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Altitude in feet
    pub altitude: Option<f64>,
    /// Ground speed in knots
    pub ground_speed: Option<f64>,
    /// True track in degrees
    pub heading: Option<f64>,
    /// Vertical rate in ft/min, negative when descending
    pub vertical_rate: Option<f64>,
    pub squawk: Option<String>,
    pub on_ground: bool,
}

impl StateSnapshot {
    /// Snapshot with no kinematics, fields are filled in by the caller
    pub fn new(icao24: &str, timestamp: i64) -> Self {
        Self {
            icao24: icao24.to_ascii_uppercase(),
            timestamp,
            callsign: None,
            latitude: None,
            longitude: None,
            altitude: None,
            ground_speed: None,
            heading: None,
            vertical_rate: None,
            squawk: None,
            on_ground: false,
        }
    }

    /// Position if both coordinates are known
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn emergency(&self) -> Option<EmergencySquawk> {
        self.squawk.as_deref().and_then(EmergencySquawk::from_code)
    }
}

/// Reserved transponder codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencySquawk {
    /// 7500
    Hijack,
    /// 7600
    RadioFailure,
    /// 7700
    Emergency,
}

impl EmergencySquawk {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "7500" => Some(EmergencySquawk::Hijack),
            "7600" => Some(EmergencySquawk::RadioFailure),
            "7700" => Some(EmergencySquawk::Emergency),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EmergencySquawk::Hijack => "7500",
            EmergencySquawk::RadioFailure => "7600",
            EmergencySquawk::Emergency => "7700",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EmergencySquawk::Hijack => "HIJACK",
            EmergencySquawk::RadioFailure => "RADIO FAILURE",
            EmergencySquawk::Emergency => "EMERGENCY",
        }
    }
}
