//! Error types for the monitoring service
//!
//!  Only authentication and storage failures are fatal, everything else is
//!  absorbed by the component that hit it and logged.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the remote state client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credentials were rejected, even after one re-authentication
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network error or 5xx response that survived every retry
    #[error("transient failure after {attempts} attempt(s): {reason}")]
    Transient { attempts: u32, reason: String },

    /// Non-retryable 4xx response
    #[error("request rejected with HTTP {status}")]
    Http { status: u16 },

    /// Response body could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Only auth failures stop the service
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Auth(_) | ClientError::Config(_))
    }
}

/// Low level transport failure (connection refused, timeout, ...)
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError(err.to_string())
    }
}

/// Persistent state store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reference point loading failures
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("reference file not found: {0}")]
    NotFound(PathBuf),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry collaborator failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry database not found at {0}")]
    NotFound(PathBuf),

    #[error("unexpected registry format: {0}")]
    Format(String),

    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("invalid state code(s): {0}")]
    InvalidStates(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid confidence level '{0}'")]
    InvalidConfidence(String),

    #[error("cannot read credentials file {path}: {source}")]
    CredentialsIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid credentials file {path}: {source}")]
    CredentialsFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("credentials file {0} has neither client_id/client_secret nor username/password")]
    IncompleteCredentials(PathBuf),
}

/// Notification delivery failures
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("notification sink closed")]
    Closed,

    #[error("notification queue full")]
    Full,
}

/// Fatal errors that terminate the monitor loop
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
