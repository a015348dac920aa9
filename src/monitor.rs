//! Poll / evaluate / sleep orchestration
//!
//!  Each cycle: ask the registry for the active aircraft, fetch their state,
//!  then run every returned snapshot through store and evaluator and forward
//!  actionable events to the notifier. Cancellation is honoured while
//!  polling and while sleeping; evaluation of a fetched batch always runs to
//!  completion so a cycle is applied entirely or not at all. A paused loop
//!  finishes its current cycle and then waits for resume before polling
//!  again.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aircraft::TrackedAircraft;
use crate::client::{StateMap, StateSource};
use crate::config::MonitorConfig;
use crate::errors::{ClientError, MonitorError, StoreError};
use crate::evaluator::AnomalyEvaluator;
use crate::geo::GeoIndex;
use crate::notifier::{Alert, Notifier};
use crate::registry::Registry;
use crate::store::AircraftStateStore;

/// Alerts kept for the status endpoint
pub const RECENT_ALERTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Polling,
    Evaluating,
    Sleeping,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    /// Codes asked for
    pub requested: usize,
    /// Codes that came back with a snapshot
    pub observed: usize,
    pub evaluated: usize,
    pub emitted: usize,
    pub suppressed: usize,
    /// Snapshots not newer than the stored state
    pub skipped_stale: usize,
}

/// Shared view of the loop for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub phase: Phase,
    pub cycle: u64,
    pub tracked: usize,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
    /// Newest first
    pub recent_alerts: VecDeque<Alert>,
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            cycle: 0,
            tracked: 0,
            last_report: None,
            last_error: None,
            recent_alerts: VecDeque::with_capacity(RECENT_ALERTS),
        }
    }
}

pub type SharedStatus = Arc<RwLock<MonitorStatus>>;

/// Pause switch shared between the loop and its controllers
#[derive(Clone)]
pub struct PauseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for PauseHandle {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl PauseHandle {
    /// Returns false if the loop was already paused
    pub fn pause(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Returns false if the loop was not paused
    pub fn resume(&self) -> bool {
        self.tx.send_replace(false)
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    async fn resumed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only ends on resume
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

/// Registry selection for one cycle together with the fetched states
struct Poll {
    aircraft: HashMap<String, TrackedAircraft>,
    states: StateMap,
}

pub struct MonitorLoop<S: StateSource, R: Registry> {
    config: MonitorConfig,
    source: S,
    registry: R,
    store: Arc<AircraftStateStore>,
    evaluator: AnomalyEvaluator,
    geo: Option<Arc<GeoIndex>>,
    notifier: Box<dyn Notifier>,
    status: SharedStatus,
    pause: PauseHandle,
    cycle: u64,
}

impl<S: StateSource, R: Registry> MonitorLoop<S, R> {
    pub fn new(
        config: MonitorConfig,
        source: S,
        registry: R,
        store: Arc<AircraftStateStore>,
        evaluator: AnomalyEvaluator,
        geo: Option<Arc<GeoIndex>>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            source,
            registry,
            store,
            evaluator,
            geo,
            notifier,
            status: Arc::new(RwLock::new(MonitorStatus::default())),
            pause: PauseHandle::default(),
            cycle: 0,
        }
    }

    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    fn set_phase(&self, phase: Phase) {
        self.status.write().phase = phase;
    }

    /// One full poll and evaluation, without cancellation
    pub async fn run_cycle(&mut self) -> Result<CycleReport, MonitorError> {
        self.cycle += 1;
        self.set_phase(Phase::Polling);
        let poll = self.poll().await?;
        self.set_phase(Phase::Evaluating);
        Ok(self.apply(poll)?)
    }

    /// Run until cancelled. Returns an error only for authentication or
    /// storage failures; every other failure skips the cycle.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), MonitorError> {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Monitor loop starting"
        );

        loop {
            if self.pause.is_paused() {
                self.set_phase(Phase::Paused);
                info!("Monitor paused");
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    _ = self.pause.resumed() => info!("Monitor resumed"),
                }
            }

            self.cycle += 1;
            self.set_phase(Phase::Polling);

            let polled = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Cancelled while polling, cycle {} discarded", self.cycle);
                    break;
                }
                polled = self.poll() => polled,
            };

            match polled {
                Ok(poll) => {
                    self.set_phase(Phase::Evaluating);
                    if let Err(e) = self.apply(poll) {
                        error!("State store failure, stopping: {}", e);
                        self.stop_with(&e.to_string());
                        return Err(e.into());
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("Authentication failure, stopping: {}", e);
                    self.stop_with(&e.to_string());
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("Poll failed, skipping cycle {}: {}", self.cycle, e);
                    self.status.write().last_error = Some(e.to_string());
                }
            }

            self.set_phase(Phase::Sleeping);
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        self.set_phase(Phase::Stopped);
        info!("Monitor loop stopped after {} cycle(s)", self.cycle);
        Ok(())
    }

    fn stop_with(&self, reason: &str) {
        let mut status = self.status.write();
        status.phase = Phase::Stopped;
        status.last_error = Some(reason.to_string());
    }

    async fn poll(&self) -> Result<Poll, ClientError> {
        let aircraft: HashMap<String, TrackedAircraft> = self
            .registry
            .active_aircraft()
            .into_iter()
            .map(|a| (a.icao24.clone(), a))
            .collect();
        let codes: BTreeSet<String> = aircraft.keys().cloned().collect();
        let bbox = self.registry.bounding_box();

        debug!("Polling {} aircraft", codes.len());
        let states = self.source.fetch_states(&codes, bbox.as_ref()).await?;
        Ok(Poll { aircraft, states })
    }

    fn apply(&self, poll: Poll) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport {
            cycle: self.cycle,
            requested: poll.states.len(),
            ..CycleReport::default()
        };
        let geo = self.geo.as_deref();
        if geo.is_none() {
            warn!("Geo reference data unavailable, suppression and enrichment disabled this cycle");
        }

        let observed: BTreeMap<String, _> = poll
            .states
            .into_iter()
            .filter_map(|(code, snap)| snap.map(|s| (code, s)))
            .collect();
        report.observed = observed.len();

        for (code, snapshot) in observed {
            let Some(aircraft) = poll.aircraft.get(&code) else {
                debug!(icao24 = %code, "Snapshot for an aircraft no longer in the registry");
                continue;
            };

            let lock = self.store.aircraft_lock(&code);
            let _guard = lock.lock();

            let previous = self.store.get_previous(&code)?;
            if previous.as_ref().is_some_and(|p| p.timestamp >= snapshot.timestamp) {
                debug!(icao24 = %code, "No new observation since last cycle");
                report.skipped_stale += 1;
                continue;
            }

            let events =
                self.evaluator
                    .evaluate(aircraft, previous.as_ref(), &snapshot, geo, &self.store)?;
            self.store.update(&code, &snapshot)?;
            report.evaluated += 1;

            for event in events {
                self.store.record_event(&event)?;
                if event.suppressed {
                    report.suppressed += 1;
                    info!(
                        icao24 = %code,
                        kind = %event.kind,
                        "Suppressed: {} ({})",
                        event.description,
                        event.suppression_reason.as_deref().unwrap_or("")
                    );
                    continue;
                }

                report.emitted += 1;
                let alert = Alert::new(aircraft.clone(), event);
                if let Err(e) = self.notifier.notify(&alert) {
                    warn!(icao24 = %code, "Notification delivery failed: {}", e);
                }
                let mut status = self.status.write();
                status.recent_alerts.push_front(alert);
                status.recent_alerts.truncate(RECENT_ALERTS);
            }
        }

        self.store
            .evict_stale(self.config.evict_after, chrono::Utc::now().timestamp())?;
        let tracked = self.store.tracked_count()?;

        info!(
            cycle = report.cycle,
            requested = report.requested,
            observed = report.observed,
            evaluated = report.evaluated,
            emitted = report.emitted,
            suppressed = report.suppressed,
            skipped_stale = report.skipped_stale,
            tracked,
            "Cycle complete"
        );

        let mut status = self.status.write();
        status.cycle = self.cycle;
        status.tracked = tracked;
        status.last_report = Some(report.clone());
        status.last_error = None;
        Ok(report)
    }
}
