//! Alert delivery
//!
//!  The monitor hands every actionable event to a [`Notifier`] exactly once.
//!  Sinks report failures as errors; the caller logs them and carries on.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::aircraft::TrackedAircraft;
use crate::anomaly::{AnomalyEvent, Severity};
use crate::errors::NotifyError;

/// An event together with the registry record of the aircraft
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub aircraft: TrackedAircraft,
    pub event: AnomalyEvent,
}

impl Alert {
    pub fn new(aircraft: TrackedAircraft, event: AnomalyEvent) -> Self {
        Self { aircraft, event }
    }

    /// One-line human readable rendering
    pub fn summary(&self) -> String {
        let ac = &self.aircraft;
        let mut line = format!(
            "[{}] {} {}: {}",
            self.event.severity,
            self.event.kind,
            ac.tail_number.as_deref().unwrap_or(&ac.icao24),
            self.event.description
        );
        if let Some(model) = &ac.model {
            line.push_str(&format!(" | {}", model));
        }
        if let Some(owner) = &ac.owner {
            line.push_str(&format!(" | {}", owner));
        }
        if let Some(hospital) = &self.event.nearest_hospital {
            line.push_str(&format!(
                " | {:.1} km from {}",
                hospital.distance_km, hospital.name
            ));
        }
        if let Some(url) = ac.flightaware_url() {
            line.push_str(&format!(" | {}", url));
        }
        line
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the tracing log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let icao24 = &alert.event.icao24;
        match alert.event.severity {
            Severity::Critical => error!(icao24 = %icao24, "ALERT {}", alert.summary()),
            Severity::High => warn!(icao24 = %icao24, "ALERT {}", alert.summary()),
            Severity::Medium | Severity::Low => info!(icao24 = %icao24, "ALERT {}", alert.summary()),
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonlRecord<'a> {
    logged_at: String,
    #[serde(flatten)]
    event: &'a AnomalyEvent,
    aircraft: &'a TrackedAircraft,
    flightaware_url: Option<String>,
}

/// Appends one JSON object per line to a file
pub struct JsonlNotifier {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlNotifier {
    pub fn open(path: &Path) -> Result<Self, NotifyError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Notifier for JsonlNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let record = JsonlRecord {
            logged_at: chrono::Utc::now().to_rfc3339(),
            event: &alert.event,
            aircraft: &alert.aircraft,
            flightaware_url: alert.aircraft.flightaware_url(),
        };
        let line = serde_json::to_string(&record)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Forwards alerts into a channel for an out-of-band consumer
pub struct ChannelNotifier {
    tx: Sender<Alert>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Alert>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.tx.try_send(alert.clone()).map_err(|e| match e {
            TrySendError::Full(_) => NotifyError::Full,
            TrySendError::Disconnected(_) => NotifyError::Closed,
        })
    }
}

/// Delivers to every sink; a failing sink does not stop the others and the
/// first error is reported
pub struct FanoutNotifier {
    sinks: Vec<Box<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(alert) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
