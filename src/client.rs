//! Remote state client
//!
//!  Batch queries of aircraft state by transponder code with:
//!  - anonymous, HTTP Basic or OAuth2 client-credentials authentication,
//!    re-authenticating once on a 401
//!  - a blocking token bucket in front of every network request
//!  - a response cache keyed by request signature (hits skip the bucket)
//!  - exponential backoff on network errors, 429 and 5xx

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aircraft::{StateSnapshot, normalize_icao24};
use crate::cache::{ResponseCache, request_signature};
use crate::config::{ClientConfig, Credentials};
use crate::errors::ClientError;
use crate::geo::BoundingBox;
use crate::opensky::parse_states;
use crate::rate_limit::RateLimiter;
use crate::transport::{AuthHeader, HttpTransport, ReqwestTransport};

/// Upper bound for a single retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 1800;

/// Per-code result of a batch fetch; `None` means no data for that code
pub type StateMap = HashMap<String, Option<StateSnapshot>>;

/// Anything that can answer "current state of these aircraft"
pub trait StateSource: Send + Sync {
    fn fetch_states(
        &self,
        codes: &BTreeSet<String>,
        bbox: Option<&BoundingBox>,
    ) -> impl Future<Output = Result<StateMap, ClientError>> + Send;
}

/// `base * 2^(attempt - 1)`, capped at [`MAX_BACKOFF`]
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2_u32
        .checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct BearerToken {
    value: String,
    refresh_at: Instant,
}

pub struct RemoteStateClient<T: HttpTransport = ReqwestTransport> {
    config: ClientConfig,
    transport: T,
    limiter: RateLimiter,
    cache: ResponseCache,
    token: Mutex<Option<BearerToken>>,
}

impl RemoteStateClient<ReqwestTransport> {
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(config.request_timeout)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self::new(config, transport))
    }
}

impl<T: HttpTransport> RemoteStateClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_capacity, config.rate_limit_refill);
        let cache = ResponseCache::new(config.cache_ttl, config.cache_dir.clone());
        Self {
            config,
            transport,
            limiter,
            cache,
            token: Mutex::new(None),
        }
    }

    fn states_url(&self) -> String {
        format!("{}/states/all", self.config.base_url)
    }

    /// Negotiate credentials once at startup. An `Auth` error means the
    /// credentials were rejected and the service should not start.
    pub async fn authenticate(&self) -> Result<(), ClientError> {
        match &self.config.credentials {
            Credentials::Anonymous => {
                warn!("No OpenSky credentials configured, running anonymously with reduced limits");
                Ok(())
            }
            Credentials::ClientCredentials { client_id, .. } => {
                self.refresh_token().await?;
                info!("Authenticated with client credentials ({})", client_id);
                Ok(())
            }
            Credentials::Basic { username, password } => {
                self.limiter.acquire().await;
                let auth = AuthHeader::Basic {
                    username: username.clone(),
                    password: password.clone(),
                };
                let query = [("time".to_string(), "0".to_string())];
                let reply = self
                    .transport
                    .get(&self.states_url(), &query, &auth)
                    .await
                    .map_err(|e| ClientError::Transient {
                        attempts: 1,
                        reason: e.to_string(),
                    })?;
                match reply.status {
                    200..=299 => {
                        info!("Authenticated as {}", username);
                        Ok(())
                    }
                    401 | 403 => Err(ClientError::Auth(format!(
                        "credentials for {} rejected (HTTP {})",
                        username, reply.status
                    ))),
                    status => Err(ClientError::Transient {
                        attempts: 1,
                        reason: format!("credential check returned HTTP {}", status),
                    }),
                }
            }
        }
    }

    async fn refresh_token(&self) -> Result<String, ClientError> {
        let Credentials::ClientCredentials { client_id, client_secret } = &self.config.credentials
        else {
            return Err(ClientError::Config("no client credentials configured".into()));
        };

        let form = [
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), client_id.clone()),
            ("client_secret".to_string(), client_secret.clone()),
        ];
        let reply = self
            .transport
            .post_form(&self.config.token_url, &form)
            .await
            .map_err(|e| ClientError::Transient {
                attempts: 1,
                reason: format!("token request failed: {}", e),
            })?;

        if reply.status >= 500 {
            return Err(ClientError::Transient {
                attempts: 1,
                reason: format!("token endpoint returned HTTP {}", reply.status),
            });
        }
        if !reply.is_success() {
            return Err(ClientError::Auth(format!(
                "token endpoint rejected client {} (HTTP {})",
                client_id, reply.status
            )));
        }
        let token: TokenResponse = serde_json::from_slice(&reply.body)
            .map_err(|e| ClientError::Auth(format!("unreadable token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        let refresh_in = lifetime.saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!("Obtained access token valid for {:?}", lifetime);
        *self.token.lock() = Some(BearerToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + refresh_in,
        });
        Ok(token.access_token)
    }

    async fn auth_header(&self) -> Result<AuthHeader, ClientError> {
        match &self.config.credentials {
            Credentials::Anonymous => Ok(AuthHeader::None),
            Credentials::Basic { username, password } => Ok(AuthHeader::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            Credentials::ClientCredentials { .. } => {
                let cached = {
                    let token = self.token.lock();
                    token
                        .as_ref()
                        .filter(|t| Instant::now() < t.refresh_at)
                        .map(|t| t.value.clone())
                };
                let value = match cached {
                    Some(value) => value,
                    None => self.refresh_token().await?,
                };
                Ok(AuthHeader::Bearer(value))
            }
        }
    }

    /// One network round trip (with retries) for a batch of codes
    async fn request_states(&self, codes: &[String]) -> Result<Bytes, ClientError> {
        let url = self.states_url();
        let query: Vec<(String, String)> = codes
            .iter()
            .map(|c| ("icao24".to_string(), c.to_ascii_lowercase()))
            .collect();

        let mut reauthenticated = false;
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire().await;
            let auth = self.auth_header().await?;

            let reason = match self.transport.get(&url, &query, &auth).await {
                Ok(reply) if reply.is_success() => return Ok(reply.body),
                Ok(reply) if reply.status == 401 => {
                    if reauthenticated {
                        return Err(ClientError::Auth(
                            "request still unauthorized after re-authentication".into(),
                        ));
                    }
                    warn!("Request unauthorized, re-authenticating");
                    reauthenticated = true;
                    *self.token.lock() = None;
                    self.authenticate().await?;
                    continue;
                }
                Ok(reply) if reply.status == 429 || reply.status >= 500 => {
                    format!("HTTP {}", reply.status)
                }
                Ok(reply) => return Err(ClientError::Http { status: reply.status }),
                Err(e) => e.to_string(),
            };

            attempt += 1;
            if attempt >= self.config.max_attempts {
                return Err(ClientError::Transient { attempts: attempt, reason });
            }
            let delay = backoff_delay(self.config.retry_backoff, attempt);
            warn!(
                "State request attempt {} failed ({}), retrying in {:?}",
                attempt, reason, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch one batch, going to the network only on a cache miss. Bodies
    /// are cached only once they decode.
    async fn fetch_batch(
        &self,
        codes: &[String],
        bbox: Option<&BoundingBox>,
    ) -> Result<Vec<StateSnapshot>, ClientError> {
        let signature = request_signature(codes, bbox);
        if let Some(body) = self.cache.get(&signature) {
            debug!("Cache hit for {} code(s)", codes.len());
            return parse_states(&body, bbox);
        }

        let body = self.request_states(codes).await?;
        let snapshots = parse_states(&body, bbox)?;
        self.cache.put(&signature, body);
        debug!("{} response(s) cached", self.cache.entry_count());
        Ok(snapshots)
    }
}

impl<T: HttpTransport> StateSource for RemoteStateClient<T> {
    async fn fetch_states(
        &self,
        codes: &BTreeSet<String>,
        bbox: Option<&BoundingBox>,
    ) -> Result<StateMap, ClientError> {
        let requested: BTreeSet<String> = codes
            .iter()
            .filter_map(|c| {
                let normalized = normalize_icao24(c);
                if normalized.is_none() {
                    warn!("Ignoring invalid transponder code '{}'", c);
                }
                normalized
            })
            .collect();

        let mut result: StateMap = requested.iter().map(|c| (c.clone(), None)).collect();
        if requested.is_empty() {
            return Ok(result);
        }

        let requested: Vec<String> = requested.into_iter().collect();
        let batches: Vec<&[String]> = requested.chunks(self.config.max_codes_per_request).collect();
        let mut failed = 0usize;
        let mut last_error = None;

        for (i, batch) in batches.iter().enumerate() {
            match self.fetch_batch(batch, bbox).await {
                Ok(snapshots) => {
                    for snapshot in snapshots {
                        if batch.binary_search(&snapshot.icao24).is_err() {
                            continue;
                        }
                        let Some(slot) = result.get_mut(&snapshot.icao24) else {
                            continue;
                        };
                        if slot.as_ref().is_none_or(|s| s.timestamp < snapshot.timestamp) {
                            *slot = Some(snapshot);
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(ClientError::Malformed(reason)) => {
                    warn!(
                        "Malformed response for batch {}/{} ({} codes): {}",
                        i + 1,
                        batches.len(),
                        batch.len(),
                        reason
                    );
                }
                Err(e) => {
                    warn!("Batch {}/{} failed: {}", i + 1, batches.len(), e);
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failed == batches.len() => Err(e),
            _ => Ok(result),
        }
    }
}
