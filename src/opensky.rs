//! Decoding of OpenSky-style `states/all` responses
//!
//!  The API sends `{"time": <unix>, "states": [[...], ...] | null}` where each
//!  state vector is a positional array:
//!
//!  | idx | field           | unit |
//!  |-----|-----------------|------|
//!  | 0   | icao24          |      |
//!  | 1   | callsign        |      |
//!  | 3   | time_position   | s    |
//!  | 4   | last_contact    | s    |
//!  | 5   | longitude       | deg  |
//!  | 6   | latitude        | deg  |
//!  | 7   | baro_altitude   | m    |
//!  | 8   | on_ground       |      |
//!  | 9   | velocity        | m/s  |
//!  | 10  | true_track      | deg  |
//!  | 11  | vertical_rate   | m/s  |
//!  | 13  | geo_altitude    | m    |
//!  | 14  | squawk          |      |

use serde_json::Value;
use tracing::warn;

use crate::aircraft::{FEET_PER_METER, FPM_PER_MS, KNOTS_PER_MS, StateSnapshot, normalize_icao24};
use crate::errors::ClientError;
use crate::geo::BoundingBox;

const IDX_ICAO24: usize = 0;
const IDX_CALLSIGN: usize = 1;
const IDX_TIME_POSITION: usize = 3;
const IDX_LAST_CONTACT: usize = 4;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_BARO_ALTITUDE: usize = 7;
const IDX_ON_GROUND: usize = 8;
const IDX_VELOCITY: usize = 9;
const IDX_TRUE_TRACK: usize = 10;
const IDX_VERTICAL_RATE: usize = 11;
const IDX_GEO_ALTITUDE: usize = 13;
const IDX_SQUAWK: usize = 14;

/// Decode a response body into snapshots, dropping positioned aircraft that
/// fall outside `bbox`. A body that is not a JSON object is `Malformed`;
/// individual rows that cannot be read are skipped with a warning.
pub fn parse_states(body: &[u8], bbox: Option<&BoundingBox>) -> Result<Vec<StateSnapshot>, ClientError> {
    let root: Value =
        serde_json::from_slice(body).map_err(|e| ClientError::Malformed(e.to_string()))?;
    let Some(obj) = root.as_object() else {
        return Err(ClientError::Malformed("response is not a JSON object".into()));
    };
    let response_time = obj.get("time").and_then(Value::as_i64);

    let rows = match obj.get("states") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(rows)) => rows,
        Some(other) => {
            return Err(ClientError::Malformed(format!(
                "unexpected 'states' value: {}",
                other
            )));
        }
    };

    let mut snapshots = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for row in rows {
        match parse_row(row, response_time) {
            Some(snapshot) => {
                if let (Some(bbox), Some((lat, lon))) = (bbox, snapshot.position()) {
                    if !bbox.contains(lat, lon) {
                        continue;
                    }
                }
                snapshots.push(snapshot);
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} unreadable state vector(s)", skipped);
    }
    Ok(snapshots)
}

fn parse_row(row: &Value, response_time: Option<i64>) -> Option<StateSnapshot> {
    let fields = row.as_array()?;
    let icao24 = normalize_icao24(fields.get(IDX_ICAO24)?.as_str()?)?;

    let f64_at = |idx: usize| fields.get(idx).and_then(Value::as_f64);
    let i64_at = |idx: usize| {
        fields
            .get(idx)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .filter(|&t| t > 0)
    };

    let timestamp = i64_at(IDX_LAST_CONTACT)
        .or_else(|| i64_at(IDX_TIME_POSITION))
        .or(response_time)?;

    let mut snapshot = StateSnapshot::new(&icao24, timestamp);
    snapshot.callsign = fields
        .get(IDX_CALLSIGN)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    snapshot.latitude = f64_at(IDX_LATITUDE);
    snapshot.longitude = f64_at(IDX_LONGITUDE);
    snapshot.altitude = f64_at(IDX_BARO_ALTITUDE)
        .or_else(|| f64_at(IDX_GEO_ALTITUDE))
        .map(|m| m * FEET_PER_METER);
    snapshot.on_ground = fields
        .get(IDX_ON_GROUND)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    snapshot.ground_speed = f64_at(IDX_VELOCITY).map(|v| v * KNOTS_PER_MS);
    snapshot.heading = f64_at(IDX_TRUE_TRACK);
    snapshot.vertical_rate = f64_at(IDX_VERTICAL_RATE).map(|v| v * FPM_PER_MS);
    snapshot.squawk = fields
        .get(IDX_SQUAWK)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    Some(snapshot)
}
