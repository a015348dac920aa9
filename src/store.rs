//! Persistent per-aircraft tracking state
//!
//!  Backed by SQLite so that history survives restarts: the previous
//!  snapshot of every aircraft, its recent takeoffs, last-alert times per
//!  anomaly kind and an audit log of every evaluated event.
//!
//!  Each statement runs under the connection mutex, and multi-statement
//!  writes use a transaction, so every operation is atomic. Callers that
//!  need read-evaluate-write atomicity for one aircraft hold the guard
//!  returned by [`AircraftStateStore::aircraft_lock`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::aircraft::StateSnapshot;
use crate::anomaly::{AnomalyEvent, AnomalyKind};
use crate::config::StoreConfig;
use crate::errors::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Snapshots kept per aircraft for the lookback rules
pub const HISTORY_LEN: usize = 5;

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

pub struct AircraftStateStore {
    conn: Arc<Mutex<Connection>>,
    takeoff_window: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AircraftStateStore {
    /// Open (or create) the database file
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&config.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;
        info!("State store opened at {}", config.path.display());
        Self::with_connection(conn, config.takeoff_window)
    }

    pub fn in_memory(takeoff_window: Duration) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, takeoff_window)
    }

    fn with_connection(conn: Connection, takeoff_window: Duration) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            takeoff_window,
            locks: DashMap::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tracked_state (
                icao24 TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                last_seen INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS takeoffs (
                icao24 TEXT NOT NULL,
                ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_takeoffs_icao ON takeoffs(icao24, ts);
            CREATE TABLE IF NOT EXISTS snapshot_history (
                icao24 TEXT NOT NULL,
                ts INTEGER NOT NULL,
                snapshot TEXT NOT NULL,
                PRIMARY KEY (icao24, ts)
            );
            CREATE TABLE IF NOT EXISTS alert_log (
                icao24 TEXT NOT NULL,
                kind TEXT NOT NULL,
                last_alert INTEGER NOT NULL,
                PRIMARY KEY (icao24, kind)
            );
            CREATE TABLE IF NOT EXISTS anomaly_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                icao24 TEXT NOT NULL,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                ts INTEGER NOT NULL,
                suppressed INTEGER NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_anomaly_ts ON anomaly_log(ts);",
        )?;
        Ok(())
    }

    /// Per-aircraft guard for read-evaluate-write sequences
    pub fn aircraft_lock(&self, icao24: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(icao24.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn get_previous(&self, icao24: &str) -> Result<Option<StateSnapshot>> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM tracked_state WHERE icao24 = ?1",
                params![icao24],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Store `snapshot` as the latest observation, append it to the bounded
    /// history and purge takeoffs that fell out of the lookback window. Returns false (and changes nothing)
    /// when the snapshot is not newer than the stored one.
    pub fn update(&self, icao24: &str, snapshot: &StateSnapshot) -> Result<bool> {
        let json = serde_json::to_string(snapshot)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let last_seen: Option<i64> = tx
            .query_row(
                "SELECT last_seen FROM tracked_state WHERE icao24 = ?1",
                params![icao24],
                |row| row.get(0),
            )
            .optional()?;
        if last_seen.is_some_and(|ts| ts >= snapshot.timestamp) {
            debug!(icao24 = %icao24, "Ignoring snapshot that is not newer than stored state");
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO tracked_state (icao24, snapshot, last_seen) VALUES (?1, ?2, ?3)
             ON CONFLICT(icao24) DO UPDATE SET snapshot = excluded.snapshot,
                                               last_seen = excluded.last_seen",
            params![icao24, json, snapshot.timestamp],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshot_history (icao24, ts, snapshot) VALUES (?1, ?2, ?3)",
            params![icao24, snapshot.timestamp, json],
        )?;
        tx.execute(
            "DELETE FROM snapshot_history WHERE icao24 = ?1 AND ts NOT IN (
                SELECT ts FROM snapshot_history WHERE icao24 = ?1 ORDER BY ts DESC LIMIT ?2
             )",
            params![icao24, HISTORY_LEN as i64],
        )?;
        tx.execute(
            "DELETE FROM takeoffs WHERE icao24 = ?1 AND ts < ?2",
            params![icao24, snapshot.timestamp - secs(self.takeoff_window)],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Up to `limit` most recent stored snapshots, oldest first
    pub fn recent_history(&self, icao24: &str, limit: usize) -> Result<Vec<StateSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT snapshot FROM snapshot_history WHERE icao24 = ?1 ORDER BY ts DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![icao24, limit], |row| row.get::<_, String>(0))?;

        let mut history = Vec::new();
        for json in rows {
            history.push(serde_json::from_str(&json?)?);
        }
        history.reverse();
        Ok(history)
    }

    pub fn record_takeoff(&self, icao24: &str, timestamp: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO takeoffs (icao24, ts) VALUES (?1, ?2)",
            params![icao24, timestamp],
        )?;
        Ok(())
    }

    /// Takeoffs in `[now - window, now]`
    pub fn recent_takeoff_count(&self, icao24: &str, window: Duration, now: i64) -> Result<u32> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM takeoffs WHERE icao24 = ?1 AND ts >= ?2 AND ts <= ?3",
            params![icao24, now - secs(window), now],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// De-duplication gate: true (and records `now` as the last alert)
    /// unless an alert of the same kind fired for this aircraft within
    /// `cooldown` before `now`
    pub fn should_alert(
        &self,
        icao24: &str,
        kind: AnomalyKind,
        cooldown: Duration,
        now: i64,
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let last: Option<i64> = tx
            .query_row(
                "SELECT last_alert FROM alert_log WHERE icao24 = ?1 AND kind = ?2",
                params![icao24, kind.key()],
                |row| row.get(0),
            )
            .optional()?;
        if last.is_some_and(|last| now - last < secs(cooldown)) {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO alert_log (icao24, kind, last_alert) VALUES (?1, ?2, ?3)
             ON CONFLICT(icao24, kind) DO UPDATE SET last_alert = excluded.last_alert",
            params![icao24, kind.key(), now],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Audit log of evaluated events, suppressed ones included
    pub fn record_event(&self, event: &AnomalyEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO anomaly_log (icao24, kind, severity, ts, suppressed, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.icao24,
                event.kind.key(),
                event.severity.to_string(),
                event.snapshot.timestamp,
                event.suppressed,
                payload
            ],
        )?;
        Ok(())
    }

    /// Most recent logged events, newest first
    pub fn recent_events(&self, limit: usize) -> Result<Vec<AnomalyEvent>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT payload FROM anomaly_log ORDER BY ts DESC, id DESC LIMIT ?1")?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| row.get::<_, String>(0))?;

        let mut events = Vec::new();
        for payload in rows {
            events.push(serde_json::from_str(&payload?)?);
        }
        Ok(events)
    }

    /// Forget aircraft not seen for `max_age`; returns how many were removed
    pub fn evict_stale(&self, max_age: Duration, now: i64) -> Result<usize> {
        let cutoff = now - secs(max_age);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let stale: Vec<String> = {
            let mut stmt = tx.prepare("SELECT icao24 FROM tracked_state WHERE last_seen < ?1")?;
            let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };
        for icao24 in &stale {
            tx.execute("DELETE FROM tracked_state WHERE icao24 = ?1", params![icao24])?;
            tx.execute("DELETE FROM takeoffs WHERE icao24 = ?1", params![icao24])?;
            tx.execute("DELETE FROM snapshot_history WHERE icao24 = ?1", params![icao24])?;
            tx.execute("DELETE FROM alert_log WHERE icao24 = ?1", params![icao24])?;
        }
        tx.commit()?;

        for icao24 in &stale {
            self.locks.remove(icao24);
        }
        if !stale.is_empty() {
            info!("Evicted {} aircraft not seen for {:?}", stale.len(), max_age);
        }
        Ok(stale.len())
    }

    pub fn tracked_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracked_state", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
