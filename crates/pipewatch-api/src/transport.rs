// Shared HTTP transport.
//
// One `reqwest::Client`, one base URL, and the bearer-token injector.
// Every request goes through `Transport::send`, which turns whatever
// happened on the wire into either a decoded JSON body or a classified
// `Error`. Timeouts and retries are *not* handled here -- that is the
// orchestrator's job, per endpoint.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use reqwest::Method;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{self, Error, Failure};
use crate::models::UserProfile;
use crate::token::{StoredSession, TokenStore};

const USER_AGENT: &str = concat!("pipewatch/", env!("CARGO_PKG_VERSION"));

// ── TransportConfig ──────────────────────────────────────────────────

/// Settings for building the underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP/TLS connect timeout. Per-request deadlines come from the
    /// orchestrator and are usually longer.
    pub connect_timeout: Duration,
    /// Extra headers sent on every request.
    pub default_headers: HeaderMap,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            default_headers: HeaderMap::new(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT)
            .default_headers(self.default_headers.clone())
            .build()
            .map_err(|e| Error::Unknown {
                status: None,
                detail: format!("failed to build HTTP client: {e}"),
            })
    }
}

// ── ApiRequest ───────────────────────────────────────────────────────

/// What a successful response must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// A non-empty JSON body. Empty bodies classify as `EmptyResponse`.
    Body,
    /// Anything, including no body at all (deletes, actions).
    Any,
}

/// A single HTTP call, independent of how often it is attempted.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub expect: Expect,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            expect: Expect::Body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path).expect_any()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn query_pairs(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn expect_any(mut self) -> Self {
        self.expect = Expect::Any;
        self
    }
}

// ── ApiResponse ──────────────────────────────────────────────────────

/// Decoded JSON body plus the status it came with.
///
/// Cheap to clone; deduplicated callers each receive a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Arc<serde_json::Value>,
}

impl ApiResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: Arc::new(body),
        }
    }

    /// Deserialize the body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        T::deserialize(self.body.as_ref())
            .map_err(|e| Error::decode(self.status, &e, &self.body.to_string()))
    }
}

// ── Transport ────────────────────────────────────────────────────────

/// The single configured HTTP client for one backend.
///
/// Holds the current session in an `ArcSwapOption` so the token can be
/// attached to every request without locking; the `TokenStore` is only
/// touched on login, logout and auth failure.
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
    session: ArcSwapOption<StoredSession>,
}

impl Transport {
    /// Build a transport, restoring any session persisted in `tokens`.
    pub fn new(
        base_url: &Url,
        config: &TransportConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self::with_client(http, base_url, tokens))
    }

    /// Wrap a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: &Url, tokens: Arc<dyn TokenStore>) -> Self {
        let session = ArcSwapOption::new(tokens.load().map(Arc::new));
        Self {
            http,
            base_url: normalize_base_url(base_url),
            tokens,
            session,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Persist and start using `session`.
    pub fn set_session(&self, session: StoredSession) {
        self.tokens.save(&session);
        self.session.store(Some(Arc::new(session)));
    }

    /// Drop the token and the cached profile, in memory and in the store.
    pub fn clear_session(&self) {
        self.session.store(None);
        self.tokens.clear();
    }

    pub fn token(&self) -> Option<SecretString> {
        self.session.load().as_ref().map(|s| s.token.clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.session.load().as_ref().and_then(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.load().is_some()
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Resolve a path against the base URL, keeping any base path prefix.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Unknown {
                status: None,
                detail: format!("invalid request path {path:?}: {e}"),
            })
    }

    /// Perform one attempt of `request`.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let url = self.url(&request.path)?;
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .query(&request.query);

        if let Some(session) = self.session.load().as_ref() {
            builder = builder.bearer_auth(session.token.expose_secret());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| error::classify(&Failure::from_reqwest(&e)))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| Error::Unknown {
            status: Some(status),
            detail: format!("response body could not be read: {e}"),
        })?;

        debug!(status, bytes = body.len(), "response received");

        if !(200..300).contains(&status) {
            return Err(error::classify(&Failure::Response { status, body }));
        }

        match request.expect {
            Expect::Body if error::is_empty_body(&body) => {
                Err(error::classify(&Failure::Response { status, body }))
            }
            Expect::Any if body.trim().is_empty() => {
                Ok(ApiResponse::new(status, serde_json::Value::Null))
            }
            _ => serde_json::from_str(&body)
                .map(|value| ApiResponse::new(status, value))
                .map_err(|e| Error::decode(status, &e, &body)),
        }
    }
}

/// Ensure the base URL path ends with `/` so relative joins append.
fn normalize_base_url(raw: &Url) -> Url {
    let mut url = raw.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
