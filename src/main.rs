//!   medtrack:   anomaly monitor for EMS and law enforcement aircraft
//!
//!  Polls OpenSky for the registered fleet and flags unusual flight
//!  behaviour away from airports.

mod aircraft;
mod anomaly;
mod cache;
mod client;
mod config;
mod errors;
mod evaluator;
mod geo;
mod monitor;
mod network;
mod notifier;
mod opensky;
mod rate_limit;
mod registry;
mod store;
mod transport;

use std::sync::Arc;

use crossbeam_channel::bounded;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::client::RemoteStateClient;
use crate::config::Config;
use crate::errors::ClientError;
use crate::evaluator::AnomalyEvaluator;
use crate::geo::{Facility, GeoIndex};
use crate::monitor::MonitorLoop;
use crate::notifier::{Alert, ChannelNotifier, FanoutNotifier, JsonlNotifier, LogNotifier, Notifier};
use crate::registry::{JsonRegistry, Registry};
use crate::store::AircraftStateStore;

/// Alerts buffered for the anomaly log writer
const ALERT_QUEUE: usize = 1024;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_args();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    info!("medtrack starting...");
    info!(
        "Configuration: database={:?} region={:?} states={:?} interval={}s",
        config.database, config.region, config.states, config.interval_secs
    );

    let registry = JsonRegistry::load(&config.registry_config()?)?;
    let active = registry.active_aircraft().len();
    if active == 0 {
        warn!("Registry selection is empty, nothing to monitor");
    }
    info!("Monitoring {} {:?} aircraft", active, config.database);

    let store = Arc::new(AircraftStateStore::open(&config.store_config())?);
    if let Some(last) = store.recent_events(1)?.first() {
        info!(
            "Last logged anomaly: {} {} at {}",
            last.icao24, last.kind, last.snapshot.timestamp
        );
    }

    let geo = GeoIndex::load(&config.geo_config());
    let geo = if geo.is_empty(Facility::Airport) && geo.is_empty(Facility::Hospital) {
        warn!("No airport or hospital data loaded, suppression and enrichment disabled");
        None
    } else {
        info!(
            "Geo index: {} airports, {} hospitals",
            geo.len(Facility::Airport),
            geo.len(Facility::Hospital)
        );
        Some(Arc::new(geo))
    };

    let evaluator = AnomalyEvaluator::new(config.evaluator_config());
    info!("Evaluator thresholds: {:?}", evaluator.config());

    // File I/O for the anomaly log stays off the runtime
    let jsonl = JsonlNotifier::open(&config.anomaly_log)?;
    info!("Anomaly log: {}", jsonl.path().display());
    let (alert_tx, alert_rx) = bounded::<Alert>(ALERT_QUEUE);
    let writer_handle = std::thread::spawn(move || {
        while let Ok(alert) = alert_rx.recv() {
            if let Err(e) = jsonl.notify(&alert) {
                error!("Anomaly log write failed: {}", e);
            }
        }
    });
    let notifier = FanoutNotifier::new(vec![
        Box::new(LogNotifier),
        Box::new(ChannelNotifier::new(alert_tx)),
    ]);

    let client_config = config.client_config()?;
    if client_config.credentials.is_anonymous() {
        warn!("No OpenSky credentials configured, using the anonymous rate limit");
    }
    let client = RemoteStateClient::from_config(client_config)?;

    // Start the runtime
    let rt = tokio::runtime::Runtime::new()?;

    let result: Result<(), Box<dyn std::error::Error>> = rt.block_on(async {
        match client.authenticate().await {
            Ok(()) => {}
            Err(e @ ClientError::Auth(_)) => return Err(e.into()),
            Err(e) => warn!("Could not verify credentials at startup: {}", e),
        }

        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Ctrl+C received, shutting down");
                        cancel.cancel();
                    }
                    Err(e) => warn!("Could not listen for Ctrl+C: {}", e),
                }
            });
        }

        let mut monitor = MonitorLoop::new(
            config.monitor_config(),
            client,
            registry,
            store,
            evaluator,
            geo,
            Box::new(notifier),
        );

        let status_handle = config.status_port.map(|port| {
            let status = monitor.status();
            let pause = monitor.pause_handle();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = network::run_status_server(port, status, pause, cancel).await {
                    error!("Status server error: {}", e);
                }
            })
        });

        let outcome = monitor.run(cancel.clone()).await;
        cancel.cancel();
        if let Some(h) = status_handle {
            h.await.ok();
        }
        outcome.map_err(Into::into)
    });

    // Monitor (and with it the alert sender) is gone; drain the log writer
    writer_handle.join().ok();
    if let Err(e) = &result {
        error!("Stopped: {}", e);
    }
    result
}
