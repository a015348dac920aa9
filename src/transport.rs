//! HTTP transport seam for the remote state client
//!
//!  The client only needs two request shapes: an authenticated GET with a
//!  query string and a form POST for the token endpoint. Putting them behind
//!  a trait keeps the retry/auth/cache logic testable without a network.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::errors::TransportError;

/// Authentication attached to a request
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeader {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

impl std::fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthHeader::None => write!(f, "None"),
            AuthHeader::Basic { username, .. } => write!(f, "Basic({})", username),
            AuthHeader::Bearer(_) => write!(f, "Bearer(..)"),
        }
    }
}

/// Status code and raw body of a completed request
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Bytes,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal async HTTP client
pub trait HttpTransport: Send + Sync {
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        auth: &AuthHeader,
    ) -> impl Future<Output = Result<HttpReply, TransportError>> + Send;

    fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> impl Future<Output = Result<HttpReply, TransportError>> + Send;
}

/// reqwest backed transport
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("medtrack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        auth: &AuthHeader,
    ) -> Result<HttpReply, TransportError> {
        let mut request = self.client.get(url).query(query);
        request = match auth {
            AuthHeader::None => request,
            AuthHeader::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthHeader::Bearer(token) => request.bearer_auth(token),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpReply { status, body })
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpReply, TransportError> {
        let response = self.client.post(url).form(form).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted transport for client tests

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// One recorded GET
    #[derive(Debug, Clone)]
    pub struct RecordedGet {
        pub url: String,
        pub query: Vec<(String, String)>,
        pub auth: AuthHeader,
        pub at: tokio::time::Instant,
    }

    /// Replies are served in order; once the script runs dry the fallback
    /// reply (if any) is repeated
    #[derive(Default)]
    pub struct ScriptedTransport {
        gets: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
        posts: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
        fallback: Mutex<Option<HttpReply>>,
        pub get_log: Mutex<Vec<RecordedGet>>,
        pub post_count: AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_get(&self, status: u16, body: &str) {
            self.gets.lock().push_back(Ok(HttpReply {
                status,
                body: Bytes::from(body.to_string()),
            }));
        }

        pub fn push_get_error(&self, reason: &str) {
            self.gets.lock().push_back(Err(TransportError(reason.to_string())));
        }

        pub fn push_post(&self, status: u16, body: &str) {
            self.posts.lock().push_back(Ok(HttpReply {
                status,
                body: Bytes::from(body.to_string()),
            }));
        }

        pub fn set_fallback(&self, status: u16, body: &str) {
            *self.fallback.lock() = Some(HttpReply {
                status,
                body: Bytes::from(body.to_string()),
            });
        }

        pub fn get_count(&self) -> usize {
            self.get_log.lock().len()
        }

        pub fn gets(&self) -> Vec<RecordedGet> {
            self.get_log.lock().clone()
        }
    }

    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            url: &str,
            query: &[(String, String)],
            auth: &AuthHeader,
        ) -> Result<HttpReply, TransportError> {
            self.get_log.lock().push(RecordedGet {
                url: url.to_string(),
                query: query.to_vec(),
                auth: auth.clone(),
                at: tokio::time::Instant::now(),
            });
            let next = self.gets.lock().pop_front();
            match next {
                Some(reply) => reply,
                None => self
                    .fallback
                    .lock()
                    .clone()
                    .ok_or_else(|| TransportError("script exhausted".into())),
            }
        }

        async fn post_form(
            &self,
            _url: &str,
            _form: &[(String, String)],
        ) -> Result<HttpReply, TransportError> {
            self.post_count.fetch_add(1, Ordering::SeqCst);
            self.posts
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("no token reply scripted".into())))
        }
    }
}
