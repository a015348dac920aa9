//! Fleet registry collaborator
//!
//!  Loads the generated fleet database (JSON) once and answers which
//!  aircraft the monitor should poll, after confidence and region filters.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::aircraft::{Category, Confidence, TrackedAircraft, normalize_icao24};
use crate::config::RegistryConfig;
use crate::errors::RegistryError;
use crate::geo::BoundingBox;

/// US census regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Northeast,
    Midwest,
    South,
    West,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Northeast, Region::Midwest, Region::South, Region::West];

    pub fn parse(name: &str) -> Option<Region> {
        match name.trim().to_ascii_lowercase().as_str() {
            "northeast" => Some(Region::Northeast),
            "midwest" => Some(Region::Midwest),
            "south" => Some(Region::South),
            "west" => Some(Region::West),
            _ => None,
        }
    }

    pub fn states(&self) -> &'static [&'static str] {
        match self {
            Region::Northeast => &["ME", "NH", "VT", "MA", "RI", "CT", "NY", "NJ", "PA"],
            Region::Midwest => &["OH", "MI", "IN", "IL", "WI", "MN", "IA", "MO", "ND", "SD", "NE", "KS"],
            Region::South => &[
                "DE", "MD", "DC", "VA", "WV", "KY", "TN", "NC", "SC", "GA", "FL", "AL", "MS", "AR",
                "LA", "OK", "TX",
            ],
            Region::West => &["MT", "ID", "WY", "CO", "NM", "AZ", "UT", "NV", "CA", "OR", "WA", "AK", "HI"],
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        match self {
            Region::Northeast => BoundingBox::new(39.0, -80.0, 48.0, -66.0),
            Region::Midwest => BoundingBox::new(36.0, -104.0, 50.0, -80.0),
            Region::South => BoundingBox::new(24.0, -110.0, 40.0, -75.0),
            Region::West => BoundingBox::new(24.0, -125.0, 72.0, -102.0),
        }
    }

    pub fn containing(state: &str) -> Option<Region> {
        Region::ALL
            .into_iter()
            .find(|r| r.states().iter().any(|s| *s == state))
    }
}

/// Source of the aircraft to monitor
pub trait Registry: Send + Sync {
    fn active_aircraft(&self) -> Vec<TrackedAircraft>;

    /// Area the selection covers, if restricted
    fn bounding_box(&self) -> Option<BoundingBox>;
}

#[derive(Debug, Deserialize)]
struct RegistryRecord {
    #[serde(alias = "icao24")]
    mode_s_hex: Option<String>,
    n_number: Option<String>,
    model_name: Option<String>,
    manufacturer: Option<String>,
    owner_name: Option<String>,
    owner_city: Option<String>,
    owner_state: Option<String>,
    confidence: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryFile {
    List(Vec<RegistryRecord>),
    Wrapped { aircraft: Vec<RegistryRecord> },
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Registry backed by the generated JSON database
pub struct JsonRegistry {
    aircraft: Vec<TrackedAircraft>,
    bbox: Option<BoundingBox>,
}

impl JsonRegistry {
    pub fn load(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let selection = StateSelection::from_config(config)?;
        let records = read_records(&config.path)?;
        let total = records.len();
        let aircraft = filter_records(records, config.category, config.min_confidence, &selection);
        info!(
            "Registry {}: {} of {} aircraft selected (category {}, min confidence {:?})",
            config.path.display(),
            aircraft.len(),
            total,
            config.category,
            config.min_confidence
        );
        if aircraft.is_empty() {
            warn!("No aircraft match the registry filters");
        }
        Ok(Self {
            aircraft,
            bbox: selection.bbox,
        })
    }

    #[cfg(test)]
    pub fn from_aircraft(aircraft: Vec<TrackedAircraft>, bbox: Option<BoundingBox>) -> Self {
        Self { aircraft, bbox }
    }
}

impl Registry for JsonRegistry {
    fn active_aircraft(&self) -> Vec<TrackedAircraft> {
        self.aircraft.clone()
    }

    fn bounding_box(&self) -> Option<BoundingBox> {
        self.bbox
    }
}

/// Owner states to keep, plus the box covering them
#[derive(Debug, Default)]
struct StateSelection {
    states: Option<HashSet<String>>,
    bbox: Option<BoundingBox>,
}

impl StateSelection {
    fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        if let Some(states) = &config.states {
            let states: BTreeSet<String> = states
                .iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            let invalid: Vec<&str> = states
                .iter()
                .filter(|s| Region::containing(s).is_none())
                .map(String::as_str)
                .collect();
            if !invalid.is_empty() {
                return Err(RegistryError::InvalidStates(invalid.join(", ")));
            }
            if !states.is_empty() {
                let bbox = states
                    .iter()
                    .filter_map(|s| Region::containing(s))
                    .map(|r| r.bbox())
                    .reduce(|a, b| a.union(&b));
                return Ok(Self {
                    states: Some(states.into_iter().collect()),
                    bbox,
                });
            }
        }

        match config.region.as_deref().map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(name) if name.eq_ignore_ascii_case("all") => Ok(Self::default()),
            Some(name) => {
                let region =
                    Region::parse(name).ok_or_else(|| RegistryError::UnknownRegion(name.to_string()))?;
                Ok(Self {
                    states: Some(region.states().iter().map(|s| s.to_string()).collect()),
                    bbox: Some(region.bbox()),
                })
            }
        }
    }

    fn accepts(&self, owner_state: Option<&str>) -> bool {
        match &self.states {
            None => true,
            Some(states) => owner_state.is_some_and(|s| states.contains(s)),
        }
    }
}

fn read_records(path: &Path) -> Result<Vec<RegistryRecord>, RegistryError> {
    if !path.exists() {
        return Err(RegistryError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let file: RegistryFile = serde_json::from_str(&text).map_err(|e| {
        RegistryError::Format(format!(
            "{}: expected a list or {{\"aircraft\": [...]}} ({})",
            path.display(),
            e
        ))
    })?;
    Ok(match file {
        RegistryFile::List(records) => records,
        RegistryFile::Wrapped { aircraft } => aircraft,
    })
}

fn filter_records(
    records: Vec<RegistryRecord>,
    category: Category,
    min_confidence: Confidence,
    selection: &StateSelection,
) -> Vec<TrackedAircraft> {
    let mut seen = HashSet::new();
    let mut invalid = 0usize;
    let mut aircraft = Vec::new();

    for record in records {
        let Some(icao24) = record.mode_s_hex.as_deref().and_then(normalize_icao24) else {
            invalid += 1;
            continue;
        };
        let confidence = record
            .confidence
            .as_deref()
            .and_then(Confidence::parse)
            .unwrap_or(Confidence::Low);
        if confidence < min_confidence {
            continue;
        }
        let owner_state = non_empty(record.owner_state).map(|s| s.to_ascii_uppercase());
        if !selection.accepts(owner_state.as_deref()) {
            continue;
        }
        if !seen.insert(icao24.clone()) {
            continue;
        }

        let owner = match (non_empty(record.owner_name), non_empty(record.owner_city)) {
            (Some(name), Some(city)) => Some(format!("{} ({})", name, city)),
            (name, _) => name,
        };
        aircraft.push(TrackedAircraft {
            icao24,
            tail_number: non_empty(record.n_number),
            model: non_empty(record.model_name),
            manufacturer: non_empty(record.manufacturer),
            owner,
            owner_state,
            category,
            confidence,
        });
    }
    if invalid > 0 {
        warn!("Dropped {} registry record(s) without a valid transponder code", invalid);
    }
    aircraft
}
