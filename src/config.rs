//! Configuration and command-line argument parsing
//!
//!  Every threshold and tunable is a recognized option with a documented
//!  default, settable by flag or environment variable (a `.env` file is
//!  honoured). The parsed `Config` is split into per-component configs that
//!  are handed to constructors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::aircraft::{Category, Confidence};
use crate::errors::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://opensky-network.org/api";
pub const DEFAULT_TOKEN_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";

pub const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 10;
pub const DEFAULT_RATE_LIMIT_REFILL_MS: u64 = 100;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_CODES_PER_REQUEST: usize = 1000;

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SPEED_THRESHOLD_KT: f64 = 150.0;
pub const DEFAULT_VERTICAL_RATE_FPM: f64 = 2000.0;
pub const DEFAULT_ALTITUDE_DELTA_FT: f64 = 1000.0;
pub const DEFAULT_ALTITUDE_DELTA_WINDOW_SECS: u64 = 30;
pub const DEFAULT_HEADING_DELTA_DEG: f64 = 90.0;
pub const DEFAULT_GROUND_ALTITUDE_FT: f64 = 100.0;
pub const DEFAULT_MULTI_LAUNCH_COUNT: u32 = 3;
pub const DEFAULT_MULTI_LAUNCH_WINDOW_SECS: u64 = 300;
pub const DEFAULT_SUPPRESSION_RADIUS_KM: f64 = 5.0;
pub const DEFAULT_ENRICHMENT_RADIUS_KM: f64 = 10.0;
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;
pub const DEFAULT_SPEED_INCREASE_PCT: f64 = 60.0;
pub const DEFAULT_SPEED_INCREASE_KT: f64 = 20.0;
pub const DEFAULT_SPEED_INCREASE_MIN_KT: f64 = 30.0;
pub const DEFAULT_HOVER_ALTITUDE_FT: f64 = 5000.0;
pub const DEFAULT_HOVER_SPEED_KT: f64 = 30.0;
pub const DEFAULT_EVICT_AFTER_SECS: u64 = 86_400;

/// Which fleet database to monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatabaseKind {
    Ems,
    Police,
}

impl DatabaseKind {
    pub fn category(&self) -> Category {
        match self {
            DatabaseKind::Ems => Category::Ems,
            DatabaseKind::Police => Category::LawEnforcement,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "medtrack", version, about = "EMS / law-enforcement aircraft anomaly monitor")]
pub struct Config {
    // Registry
    /// Fleet database to monitor
    #[arg(long, env = "MONITOR_DATABASE", value_enum, default_value_t = DatabaseKind::Ems)]
    pub database: DatabaseKind,
    /// Generated fleet database (JSON)
    #[arg(long, env = "REGISTRY_FILE", default_value = "data/ems_aircraft.json")]
    pub registry_file: PathBuf,
    /// Minimum registry confidence (low, medium, high)
    #[arg(long, env = "MIN_CONFIDENCE_LEVEL", default_value = "low")]
    pub min_confidence: String,
    /// Census region (northeast, midwest, south, west, all)
    #[arg(long, env = "MONITOR_REGION")]
    pub region: Option<String>,
    /// Comma separated state codes, takes precedence over --region
    #[arg(long, env = "MONITOR_STATE", value_delimiter = ',')]
    pub states: Option<Vec<String>>,

    // Files
    #[arg(long, env = "MONITOR_STATE_DB", default_value = "data/monitor_state.db")]
    pub state_db: PathBuf,
    #[arg(long, env = "AIRPORTS_CSV", default_value = "data/airports.csv")]
    pub airports_csv: PathBuf,
    #[arg(long, env = "HOSPITALS_CSV", default_value = "data/hospitals.csv")]
    pub hospitals_csv: PathBuf,
    #[arg(long, env = "ANOMALY_LOG_FILE", default_value = "data/anomalies.jsonl")]
    pub anomaly_log: PathBuf,

    // Remote API
    #[arg(long, env = "OPENSKY_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
    #[arg(long, env = "OPENSKY_TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,
    #[arg(long, env = "OPENSKY_USERNAME")]
    pub username: Option<String>,
    #[arg(long, env = "OPENSKY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(long, env = "OPENSKY_CLIENT_ID")]
    pub client_id: Option<String>,
    #[arg(long, env = "OPENSKY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
    /// JSON file with client_id/client_secret or username/password
    #[arg(long, env = "OPENSKY_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,
    #[arg(long, env = "OPENSKY_RATE_LIMIT_CALLS", default_value_t = DEFAULT_RATE_LIMIT_CAPACITY)]
    pub rate_limit_capacity: u32,
    /// Milliseconds to refill one request token
    #[arg(long, env = "OPENSKY_RATE_LIMIT_REFILL_MS", default_value_t = DEFAULT_RATE_LIMIT_REFILL_MS)]
    pub rate_limit_refill_ms: u64,
    #[arg(long, env = "CACHE_MAX_AGE_SECONDS", default_value_t = DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,
    /// Persist cached responses here (advisory, safe to delete)
    #[arg(long, env = "CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
    #[arg(long, env = "OPENSKY_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    #[arg(long, env = "OPENSKY_RETRY_BACKOFF_MS", default_value_t = DEFAULT_RETRY_BACKOFF_MS)]
    pub retry_backoff_ms: u64,
    #[arg(long, env = "OPENSKY_TIMEOUT_SECONDS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
    #[arg(long, default_value_t = DEFAULT_MAX_CODES_PER_REQUEST)]
    pub max_codes_per_request: usize,

    // Loop
    #[arg(long, env = "MONITOR_INTERVAL_SECONDS", default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval_secs: u64,
    /// Forget aircraft not seen for this long
    #[arg(long, default_value_t = DEFAULT_EVICT_AFTER_SECS)]
    pub evict_after_secs: u64,

    // Anomaly thresholds
    #[arg(long, env = "ANOMALY_SPEED_THRESHOLD_KNOTS", default_value_t = DEFAULT_SPEED_THRESHOLD_KT)]
    pub speed_threshold_kt: f64,
    #[arg(long, env = "ANOMALY_RAPID_CLIMB_RATE_FT_MIN", default_value_t = DEFAULT_VERTICAL_RATE_FPM)]
    pub vertical_rate_fpm: f64,
    #[arg(long, env = "ANOMALY_RAPID_DESCENT_FT", default_value_t = DEFAULT_ALTITUDE_DELTA_FT)]
    pub altitude_delta_ft: f64,
    #[arg(long, env = "ANOMALY_RAPID_DESCENT_WINDOW_SECONDS", default_value_t = DEFAULT_ALTITUDE_DELTA_WINDOW_SECS)]
    pub altitude_delta_window_secs: u64,
    #[arg(long, env = "ANOMALY_HEADING_DELTA_DEG", default_value_t = DEFAULT_HEADING_DELTA_DEG)]
    pub heading_delta_deg: f64,
    /// Altitude below which an aircraft counts as on the ground for launch detection
    #[arg(long, default_value_t = DEFAULT_GROUND_ALTITUDE_FT)]
    pub ground_altitude_ft: f64,
    #[arg(long, env = "ANOMALY_MULTI_LAUNCH_COUNT", default_value_t = DEFAULT_MULTI_LAUNCH_COUNT)]
    pub multi_launch_count: u32,
    #[arg(long, env = "ANOMALY_MULTI_LAUNCH_WINDOW_SECONDS", default_value_t = DEFAULT_MULTI_LAUNCH_WINDOW_SECS)]
    pub multi_launch_window_secs: u64,
    #[arg(long, env = "GEO_NEAR_AIRPORT_KM", default_value_t = DEFAULT_SUPPRESSION_RADIUS_KM)]
    pub suppression_radius_km: f64,
    #[arg(long, env = "GEO_NEAR_HOSPITAL_KM", default_value_t = DEFAULT_ENRICHMENT_RADIUS_KM)]
    pub enrichment_radius_km: f64,
    #[arg(long, env = "ANOMALY_COOLDOWN_SECONDS", default_value_t = DEFAULT_COOLDOWN_SECS)]
    pub cooldown_secs: u64,
    /// Rise over the recent average speed, in percent
    #[arg(long, env = "ANOMALY_SPEED_INCREASE_PERCENT", default_value_t = DEFAULT_SPEED_INCREASE_PCT)]
    pub speed_increase_pct: f64,
    #[arg(long, env = "ANOMALY_SPEED_INCREASE_KNOTS", default_value_t = DEFAULT_SPEED_INCREASE_KT)]
    pub speed_increase_kt: f64,
    #[arg(long, default_value_t = DEFAULT_SPEED_INCREASE_MIN_KT)]
    pub speed_increase_min_kt: f64,
    #[arg(long, env = "ANOMALY_HOVER_ALTITUDE_FT", default_value_t = DEFAULT_HOVER_ALTITUDE_FT)]
    pub hover_altitude_ft: f64,
    #[arg(long, env = "ANOMALY_HOVER_SPEED_KNOTS", default_value_t = DEFAULT_HOVER_SPEED_KT)]
    pub hover_speed_kt: f64,

    // Output
    /// Serve /status.json on this port
    #[arg(long, env = "STATUS_PORT")]
    pub status_port: Option<u16>,
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseKind::Ems,
            registry_file: PathBuf::from("data/ems_aircraft.json"),
            min_confidence: "low".to_string(),
            region: None,
            states: None,
            state_db: PathBuf::from("data/monitor_state.db"),
            airports_csv: PathBuf::from("data/airports.csv"),
            hospitals_csv: PathBuf::from("data/hospitals.csv"),
            anomaly_log: PathBuf::from("data/anomalies.jsonl"),
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            username: None,
            password: None,
            client_id: None,
            client_secret: None,
            credentials_file: None,
            rate_limit_capacity: DEFAULT_RATE_LIMIT_CAPACITY,
            rate_limit_refill_ms: DEFAULT_RATE_LIMIT_REFILL_MS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_dir: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_codes_per_request: DEFAULT_MAX_CODES_PER_REQUEST,
            interval_secs: DEFAULT_INTERVAL_SECS,
            evict_after_secs: DEFAULT_EVICT_AFTER_SECS,
            speed_threshold_kt: DEFAULT_SPEED_THRESHOLD_KT,
            vertical_rate_fpm: DEFAULT_VERTICAL_RATE_FPM,
            altitude_delta_ft: DEFAULT_ALTITUDE_DELTA_FT,
            altitude_delta_window_secs: DEFAULT_ALTITUDE_DELTA_WINDOW_SECS,
            heading_delta_deg: DEFAULT_HEADING_DELTA_DEG,
            ground_altitude_ft: DEFAULT_GROUND_ALTITUDE_FT,
            multi_launch_count: DEFAULT_MULTI_LAUNCH_COUNT,
            multi_launch_window_secs: DEFAULT_MULTI_LAUNCH_WINDOW_SECS,
            suppression_radius_km: DEFAULT_SUPPRESSION_RADIUS_KM,
            enrichment_radius_km: DEFAULT_ENRICHMENT_RADIUS_KM,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            speed_increase_pct: DEFAULT_SPEED_INCREASE_PCT,
            speed_increase_kt: DEFAULT_SPEED_INCREASE_KT,
            speed_increase_min_kt: DEFAULT_SPEED_INCREASE_MIN_KT,
            hover_altitude_ft: DEFAULT_HOVER_ALTITUDE_FT,
            hover_speed_kt: DEFAULT_HOVER_SPEED_KT,
            status_port: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse flags and environment (after loading `.env` if present)
    pub fn from_args() -> Self {
        dotenvy::dotenv().ok();
        Config::parse()
    }

    /// Credentials in order of preference: client credentials, then
    /// username/password, then the credentials file, else anonymous
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) {
            return Ok(Credentials::ClientCredentials {
                client_id: id.trim().to_string(),
                client_secret: secret.trim().to_string(),
            });
        }
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            return Ok(Credentials::Basic {
                username: user.trim().to_string(),
                password: pass.trim().to_string(),
            });
        }
        match &self.credentials_file {
            Some(path) => Credentials::from_file(path),
            None => Ok(Credentials::Anonymous),
        }
    }

    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        Ok(ClientConfig {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            token_url: self.token_url.clone(),
            credentials: self.credentials()?,
            rate_limit_capacity: self.rate_limit_capacity.max(1),
            rate_limit_refill: Duration::from_millis(self.rate_limit_refill_ms),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_dir: self.cache_dir.clone(),
            max_attempts: self.max_attempts.max(1),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_codes_per_request: self.max_codes_per_request.max(1),
        })
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            speed_threshold_kt: self.speed_threshold_kt,
            vertical_rate_fpm: self.vertical_rate_fpm,
            altitude_delta_ft: self.altitude_delta_ft,
            altitude_delta_window: Duration::from_secs(self.altitude_delta_window_secs.max(1)),
            heading_delta_deg: self.heading_delta_deg,
            poll_interval: Duration::from_secs(self.interval_secs.max(1)),
            ground_altitude_ft: self.ground_altitude_ft,
            multi_launch_count: self.multi_launch_count.max(1),
            multi_launch_window: Duration::from_secs(self.multi_launch_window_secs),
            suppression_radius_km: self.suppression_radius_km,
            enrichment_radius_km: self.enrichment_radius_km,
            cooldown: Duration::from_secs(self.cooldown_secs),
            speed_increase_pct: self.speed_increase_pct,
            speed_increase_kt: self.speed_increase_kt,
            speed_increase_min_kt: self.speed_increase_min_kt,
            hover_altitude_ft: self.hover_altitude_ft,
            hover_speed_kt: self.hover_speed_kt,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.state_db.clone(),
            takeoff_window: Duration::from_secs(self.multi_launch_window_secs),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            evict_after: Duration::from_secs(self.evict_after_secs),
        }
    }

    pub fn geo_config(&self) -> GeoConfig {
        GeoConfig {
            airports_csv: self.airports_csv.clone(),
            hospitals_csv: self.hospitals_csv.clone(),
        }
    }

    pub fn registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        let min_confidence = Confidence::parse(&self.min_confidence)
            .ok_or_else(|| ConfigError::InvalidConfidence(self.min_confidence.clone()))?;
        Ok(RegistryConfig {
            path: self.registry_file.clone(),
            category: self.database.category(),
            min_confidence,
            region: self.region.clone(),
            states: self.states.clone(),
        })
    }
}

/// How the client identifies itself to the remote API
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Basic { username: String, password: String },
    ClientCredentials { client_id: String, client_secret: String },
}

// Secrets stay out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Anonymous => write!(f, "Anonymous"),
            Credentials::Basic { username, .. } => write!(f, "Basic({})", username),
            Credentials::ClientCredentials { client_id, .. } => {
                write!(f, "ClientCredentials({})", client_id)
            }
        }
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    client_id: Option<String>,
    client_secret: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl Credentials {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::CredentialsIo {
                path: path.to_path_buf(),
                source,
            })?;
        let file: CredentialsFile = serde_json::from_str(&text)
            .map_err(|source| ConfigError::CredentialsFormat {
                path: path.to_path_buf(),
                source,
            })?;
        match file {
            CredentialsFile { client_id: Some(id), client_secret: Some(secret), .. } => {
                Ok(Credentials::ClientCredentials {
                    client_id: id.trim().to_string(),
                    client_secret: secret.trim().to_string(),
                })
            }
            CredentialsFile { username: Some(user), password: Some(pass), .. } => {
                Ok(Credentials::Basic {
                    username: user.trim().to_string(),
                    password: pass.trim().to_string(),
                })
            }
            _ => Err(ConfigError::IncompleteCredentials(path.to_path_buf())),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credentials::Anonymous)
    }
}

/// Remote state client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token_url: String,
    pub credentials: Credentials,
    /// Bucket size: requests that may be issued back to back
    pub rate_limit_capacity: u32,
    /// Time to refill a single token
    pub rate_limit_refill: Duration,
    pub cache_ttl: Duration,
    pub cache_dir: Option<PathBuf>,
    pub max_attempts: u32,
    /// First retry delay, doubled on every further attempt
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
    pub max_codes_per_request: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            credentials: Credentials::Anonymous,
            rate_limit_capacity: DEFAULT_RATE_LIMIT_CAPACITY,
            rate_limit_refill: Duration::from_millis(DEFAULT_RATE_LIMIT_REFILL_MS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_dir: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_codes_per_request: DEFAULT_MAX_CODES_PER_REQUEST,
        }
    }
}

/// Anomaly rule thresholds
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub speed_threshold_kt: f64,
    pub vertical_rate_fpm: f64,
    pub altitude_delta_ft: f64,
    pub altitude_delta_window: Duration,
    /// Maximum heading change per poll interval
    pub heading_delta_deg: f64,
    pub poll_interval: Duration,
    pub ground_altitude_ft: f64,
    pub multi_launch_count: u32,
    pub multi_launch_window: Duration,
    pub suppression_radius_km: f64,
    pub enrichment_radius_km: f64,
    pub cooldown: Duration,
    pub speed_increase_pct: f64,
    pub speed_increase_kt: f64,
    /// Current speed below this never counts as a sudden increase
    pub speed_increase_min_kt: f64,
    pub hover_altitude_ft: f64,
    pub hover_speed_kt: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Config::default().evaluator_config()
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Takeoffs older than this are purged on every update
    pub takeoff_window: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Config::default().store_config()
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub evict_after: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Config::default().monitor_config()
    }
}

#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub airports_csv: PathBuf,
    pub hospitals_csv: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub path: PathBuf,
    pub category: Category,
    pub min_confidence: Confidence,
    pub region: Option<String>,
    pub states: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = Config::parse_from(["medtrack"]);
        assert_eq!(config.interval_secs, DEFAULT_INTERVAL_SECS);
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.multi_launch_count, 3);
        assert_eq!(config.database, DatabaseKind::Ems);
    }

    #[test]
    fn test_parse_overrides() {
        let config = Config::parse_from([
            "medtrack",
            "--database",
            "police",
            "--states",
            "NJ,DE",
            "--speed-threshold-kt",
            "120",
            "--rate-limit-capacity",
            "2",
        ]);
        assert_eq!(config.database, DatabaseKind::Police);
        assert_eq!(config.states, Some(vec!["NJ".to_string(), "DE".to_string()]));
        assert_eq!(config.evaluator_config().speed_threshold_kt, 120.0);
        assert_eq!(config.registry_config().unwrap().category, Category::LawEnforcement);
    }

    #[test]
    fn test_credentials_precedence() {
        let mut config = Config::default();
        assert_eq!(config.credentials().unwrap(), Credentials::Anonymous);

        config.username = Some("user".into());
        config.password = Some("pass".into());
        assert!(matches!(config.credentials().unwrap(), Credentials::Basic { .. }));

        config.client_id = Some("id".into());
        config.client_secret = Some("secret".into());
        assert!(matches!(
            config.credentials().unwrap(),
            Credentials::ClientCredentials { .. }
        ));
    }

    #[test]
    fn test_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"client_id": " abc ", "client_secret": "xyz"}"#).unwrap();
        assert_eq!(
            Credentials::from_file(&path).unwrap(),
            Credentials::ClientCredentials {
                client_id: "abc".into(),
                client_secret: "xyz".into()
            }
        );

        std::fs::write(&path, r#"{"something": "else"}"#).unwrap();
        assert!(matches!(
            Credentials::from_file(&path),
            Err(ConfigError::IncompleteCredentials(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Credentials::from_file(&path),
            Err(ConfigError::CredentialsFormat { .. })
        ));
        assert!(matches!(
            Credentials::from_file(&dir.path().join("missing.json")),
            Err(ConfigError::CredentialsIo { .. })
        ));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::Basic {
            username: "pilot".into(),
            password: "hunter2".into(),
        };
        let text = format!("{:?}", creds);
        assert!(text.contains("pilot"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_invalid_confidence() {
        let config = Config {
            min_confidence: "certain".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.registry_config(),
            Err(ConfigError::InvalidConfidence(level)) if level == "certain"
        ));
    }
}
