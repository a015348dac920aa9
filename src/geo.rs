//! Ground reference points: airports and hospitals
//!
//!  Each category is bucketed into a 1°x1° lat/lon grid so a radius query
//!  only scans the handful of cells that can contain a match. The point sets
//!  are built once at startup and never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::GeoConfig;
use crate::errors::GeoError;

const EARTH_RADIUS_KM: f64 = 6371.0;
/// Lower bound on the length of one degree of latitude
const KM_PER_DEG_LAT: f64 = 111.0;

/// Great-circle distance in kilometers
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

/// Axis aligned lat/lon box, used to restrict polling to a region
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self { min_lat, min_lon, max_lat, max_lon }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lat: self.min_lat.min(other.min_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lat: self.max_lat.max(other.max_lat),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facility {
    Airport,
    Hospital,
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facility::Airport => write!(f, "airport"),
            Facility::Hospital => write!(f, "hospital"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub category: Facility,
}

type Cell = (i32, i32);

fn lat_cell(lat: f64) -> i32 {
    ((lat.floor() as i32) + 90).clamp(0, 179)
}

fn lon_cell(lon: f64) -> i32 {
    ((lon.floor() as i32) + 180).rem_euclid(360)
}

#[derive(Default)]
struct Grid {
    cells: HashMap<Cell, Vec<GeoPoint>>,
    len: usize,
}

impl Grid {
    fn from_points(points: Vec<GeoPoint>) -> Self {
        let mut grid = Grid::default();
        for point in points {
            let key = (lat_cell(point.lat), lon_cell(point.lon));
            grid.cells.entry(key).or_default().push(point);
            grid.len += 1;
        }
        grid
    }

    fn nearest(&self, lat: f64, lon: f64, radius_km: f64) -> Option<(&GeoPoint, f64)> {
        if self.len == 0 || radius_km < 0.0 || !lat.is_finite() || !lon.is_finite() {
            return None;
        }

        let d_lat = radius_km / KM_PER_DEG_LAT;
        let lat_lo = lat_cell(lat - d_lat);
        let lat_hi = lat_cell(lat + d_lat);

        // Longitude degrees shrink toward the poles; size the window for the
        // highest latitude the query band reaches, plus one cell of slack
        let max_abs_lat = (lat.abs() + d_lat).min(90.0);
        let cos_lat = max_abs_lat.to_radians().cos();
        let lon_cells: Vec<i32> = if cos_lat < 0.02 {
            (0..360).collect()
        } else {
            let d_lon = d_lat / cos_lat;
            let span = (d_lon.ceil() as i32) + 1;
            if span * 2 + 1 >= 360 {
                (0..360).collect()
            } else {
                let base = lon_cell(lon);
                (-span..=span).map(|d| (base + d).rem_euclid(360)).collect()
            }
        };

        let mut best: Option<(&GeoPoint, f64)> = None;
        for lat_idx in lat_lo..=lat_hi {
            for &lon_idx in &lon_cells {
                let Some(points) = self.cells.get(&(lat_idx, lon_idx)) else {
                    continue;
                };
                for point in points {
                    let distance = haversine_km(lat, lon, point.lat, point.lon);
                    if distance <= radius_km && best.is_none_or(|(_, d)| distance < d) {
                        best = Some((point, distance));
                    }
                }
            }
        }
        best
    }
}

/// Read-only spatial index of airports and hospitals
#[derive(Default)]
pub struct GeoIndex {
    airports: Grid,
    hospitals: Grid,
}

impl GeoIndex {
    pub fn new(airports: Vec<GeoPoint>, hospitals: Vec<GeoPoint>) -> Self {
        Self {
            airports: Grid::from_points(airports),
            hospitals: Grid::from_points(hospitals),
        }
    }

    /// Load both reference sets. A missing or unreadable file leaves that
    /// category empty (with a warning) rather than failing startup.
    pub fn load(config: &GeoConfig) -> Self {
        let airports = load_or_warn(&config.airports_csv, Facility::Airport);
        let hospitals = load_or_warn(&config.hospitals_csv, Facility::Hospital);
        info!(
            "Geo index loaded: {} airports, {} hospitals",
            airports.len(),
            hospitals.len()
        );
        Self::new(airports, hospitals)
    }

    /// Nearest point of `category` within `radius_km`, with its distance
    pub fn nearest(
        &self,
        category: Facility,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Option<(&GeoPoint, f64)> {
        self.grid(category).nearest(lat, lon, radius_km)
    }

    pub fn len(&self, category: Facility) -> usize {
        self.grid(category).len
    }

    pub fn is_empty(&self, category: Facility) -> bool {
        self.len(category) == 0
    }

    fn grid(&self, category: Facility) -> &Grid {
        match category {
            Facility::Airport => &self.airports,
            Facility::Hospital => &self.hospitals,
        }
    }
}

fn load_or_warn(path: &Path, category: Facility) -> Vec<GeoPoint> {
    match load_points(path, category) {
        Ok(points) => points,
        Err(e) => {
            warn!("No {} reference data ({}), {} lookups disabled", category, e, category);
            Vec::new()
        }
    }
}

/// Read lat/lon/name rows from a CSV; header names are matched without case
/// and rows with missing or out-of-range coordinates are skipped
pub fn load_points(path: &Path, category: Facility) -> Result<Vec<GeoPoint>, GeoError> {
    if !path.exists() {
        return Err(GeoError::NotFound(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };
    let lat_col = column(&["latitude_deg", "latitude"]).ok_or(GeoError::MissingColumn("latitude"))?;
    let lon_col =
        column(&["longitude_deg", "longitude"]).ok_or(GeoError::MissingColumn("longitude"))?;
    let name_col = column(&["name"]);

    let mut points = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        let lat = record.get(lat_col).and_then(|s| s.trim().parse::<f64>().ok());
        let lon = record.get(lon_col).and_then(|s| s.trim().parse::<f64>().ok());
        let (Some(lat), Some(lon)) = (lat, lon) else {
            skipped += 1;
            continue;
        };
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            skipped += 1;
            continue;
        }
        let name = name_col
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string();
        points.push(GeoPoint { name, lat, lon, category });
    }
    if skipped > 0 {
        warn!("Skipped {} invalid rows in {}", skipped, path.display());
    }
    Ok(points)
}
