// ── Classified request errors ──
//
// Every failure the request layer surfaces is one of a fixed set of kinds.
// The classifier is a two-level decision: first "did a response arrive at
// all", then the status/marker rules inside each branch. Status-bearing
// outcomes are always decided before any no-response heuristic runs.

use std::time::Duration;

use serde::Deserialize;
use strum::Display;
use thiserror::Error;

/// Troubleshooting text appended to server errors that look like a
/// database listener / service-name failure on the source side.
const LISTENER_CHECKLIST: &str = "Troubleshooting checklist:\n  \
    1. Confirm the database listener is running on the source host.\n  \
    2. Verify the service name (or SID) matches a service registered with the listener.\n  \
    3. Check that the host and port are reachable from the replication server (firewall, VPN).\n  \
    4. Re-run the connection test once the listener reports the service as ready.";

/// Substrings (lowercase) that identify vendor listener failures in a 5xx payload.
const VENDOR_PATTERNS: &[&str] = &[
    "listener",
    "service name",
    "service_name",
    "tns:",
    "ora-12514",
    "ora-12541",
    "ora-12505",
];

/// Substrings (lowercase) that mark a no-response failure as a timeout.
const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout", "deadline has elapsed", "aborted"];

/// Substrings (lowercase) that mark a no-response failure as unreachable.
const UNREACHABLE_MARKERS: &[&str] = &[
    "connection refused",
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "network is unreachable",
    "no route to host",
    "host is unreachable",
    "offline",
];

const BODY_PREVIEW_LEN: usize = 300;

// ── Error ────────────────────────────────────────────────────────────

/// Top-level error type for the `pipewatch-api` crate.
///
/// The taxonomy is closed: callers can match exhaustively and decide
/// between "tell the user", "send them to login" and "wait and poll".
/// [`response_received`](Self::response_received) is preserved for every
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No response arrived before the deadline, or the attempt was aborted.
    #[error("{detail}")]
    Timeout { detail: String },

    /// The request never reached the server (refused, DNS, offline).
    #[error("Network unreachable: {detail}")]
    NetworkUnreachable { detail: String },

    /// 4xx other than 422.
    #[error("Request rejected (HTTP {status}): {detail}")]
    Client { status: u16, detail: String },

    /// 5xx. `detail` may carry an appended troubleshooting checklist.
    #[error("Server error (HTTP {status}): {detail}")]
    Server { status: u16, detail: String },

    /// 422 with per-field problems joined into `detail`.
    #[error("{detail}")]
    Validation {
        detail: String,
        fields: Vec<FieldError>,
    },

    /// A response arrived but carried no body (or `{}`).
    #[error("Server returned an empty response (HTTP {status}); the backend may be degraded")]
    EmptyResponse { status: u16 },

    /// Anything the rules above do not cover.
    #[error("Unexpected failure: {detail}")]
    Unknown { status: Option<u16>, detail: String },
}

/// Discriminant of [`Error`], for logging and exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    NetworkUnreachable,
    Client,
    Server,
    Validation,
    EmptyResponse,
    Unknown,
}

/// One entry of a 422 `detail` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted location, e.g. `body.limit`.
    pub location: String,
    pub message: String,
}

impl Error {
    /// Timeout raised by the request layer itself after `after` elapsed.
    pub fn timeout_after(after: Duration) -> Self {
        Self::Timeout {
            detail: timeout_detail(Some(after)),
        }
    }

    /// A 2xx body that could not be decoded into the expected shape.
    pub fn decode(status: u16, err: &serde_json::Error, body: &str) -> Self {
        Self::Unknown {
            status: Some(status),
            detail: format!(
                "could not decode response ({err}); body preview: {:?}",
                preview(body)
            ),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NetworkUnreachable { .. } => ErrorKind::NetworkUnreachable,
            Self::Client { .. } => ErrorKind::Client,
            Self::Server { .. } => ErrorKind::Server,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::EmptyResponse { .. } => ErrorKind::EmptyResponse,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Returns `true` if an HTTP response (any status) was received.
    pub fn response_received(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::NetworkUnreachable { .. } => false,
            Self::Client { .. }
            | Self::Server { .. }
            | Self::Validation { .. }
            | Self::EmptyResponse { .. } => true,
            Self::Unknown { status, .. } => status.is_some(),
        }
    }

    /// HTTP status code, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. }
            | Self::Server { status, .. }
            | Self::EmptyResponse { status } => Some(*status),
            Self::Validation { .. } => Some(422),
            Self::Unknown { status, .. } => *status,
            Self::Timeout { .. } | Self::NetworkUnreachable { .. } => None,
        }
    }

    /// Human-readable detail without the kind prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Timeout { detail }
            | Self::NetworkUnreachable { detail }
            | Self::Client { detail, .. }
            | Self::Server { detail, .. }
            | Self::Validation { detail, .. }
            | Self::Unknown { detail, .. } => detail.clone(),
            Self::EmptyResponse { .. } => self.to_string(),
        }
    }

    /// Only network-class failures are safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnreachable { .. })
    }

    /// 401 / 403: the stored session is no longer valid.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Client { status: 401 | 403, .. })
    }
}

// ── Push channel errors ──────────────────────────────────────────────

/// Failures of the push channel. Never fatal to REST traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("push channel connection failed: {0}")]
    Connect(String),

    #[error("push channel unavailable for this session")]
    Unavailable,

    #[error("invalid push channel URL: {0}")]
    InvalidUrl(String),
}

// ── Raw failures ─────────────────────────────────────────────────────

/// What the transport observed, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// A response arrived. Non-2xx, or 2xx with an unusable body.
    Response { status: u16, body: String },
    /// Nothing arrived.
    NoResponse(NoResponse),
}

/// Markers collected from a failure that produced no response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoResponse {
    pub timed_out: bool,
    pub aborted: bool,
    pub connect: bool,
    /// Full error chain, used for marker matching.
    pub message: String,
}

impl Failure {
    /// Extract markers from a `reqwest` error raised before a response arrived.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        Self::NoResponse(NoResponse {
            timed_out: err.is_timeout(),
            aborted: false,
            connect: err.is_connect(),
            message: error_chain(err),
        })
    }
}

/// Render an error and all of its sources on one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

// ── Classifier ───────────────────────────────────────────────────────

/// Map a raw failure onto exactly one [`Error`].
pub fn classify(failure: &Failure) -> Error {
    match failure {
        Failure::Response { status, body } => classify_response(*status, body),
        Failure::NoResponse(info) => classify_no_response(info),
    }
}

fn classify_response(status: u16, body: &str) -> Error {
    match status {
        422 => validation_error(body),
        400..=499 => Error::Client {
            status,
            detail: extract_detail(status, body),
        },
        500.. => Error::Server {
            status,
            detail: enrich_server_detail(extract_detail(status, body), body),
        },
        _ if is_empty_body(body) => Error::EmptyResponse { status },
        _ => Error::Unknown {
            status: Some(status),
            detail: format!("unexpected HTTP {status}: {:?}", preview(body)),
        },
    }
}

fn classify_no_response(info: &NoResponse) -> Error {
    let message = info.message.to_lowercase();

    if info.aborted || info.timed_out || contains_any(&message, TIMEOUT_MARKERS) {
        return Error::Timeout {
            detail: timeout_detail(None),
        };
    }

    if info.connect || contains_any(&message, UNREACHABLE_MARKERS) {
        return Error::NetworkUnreachable {
            detail: info.message.clone(),
        };
    }

    Error::Unknown {
        status: None,
        detail: info.message.clone(),
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn timeout_detail(after: Option<Duration>) -> String {
    let head = match after {
        Some(d) => format!("Request timed out after {:.1}s", d.as_secs_f64()),
        None => "Request timed out".to_owned(),
    };
    format!(
        "{head}. The server is slow or cannot reach the source for this connector; \
         retrying right away rarely helps. Check the connector's host, port and listener, \
         then try again."
    )
}

/// Returns `true` for an empty body or an empty JSON object.
pub(crate) fn is_empty_body(body: &str) -> bool {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return true;
    }
    matches!(
        serde_json::from_str::<serde_json::Value>(trimmed),
        Ok(serde_json::Value::Object(map)) if map.is_empty()
    )
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREVIEW_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// ── Detail extraction ────────────────────────────────────────────────

/// Common error body shapes: `{"detail": ...}` or `{"message": ...}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFieldError {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    #[serde(default)]
    msg: String,
}

fn status_reason(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map_or_else(|| format!("HTTP {status}"), str::to_owned)
}

fn extract_detail(status: u16, body: &str) -> String {
    if is_empty_body(body) {
        return status_reason(status);
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(s)),
            ..
        }) => s,
        Ok(ErrorBody {
            detail: Some(v), ..
        }) if !v.is_null() => v.to_string(),
        Ok(ErrorBody {
            message: Some(m), ..
        }) => m,
        _ => preview(body.trim()).to_owned(),
    }
}

fn validation_error(body: &str) -> Error {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);

    match detail {
        Some(serde_json::Value::Array(items)) => {
            let fields: Vec<FieldError> = items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<RawFieldError>(item).ok())
                .map(|raw| FieldError {
                    location: join_location(&raw.loc),
                    message: raw.msg,
                })
                .collect();
            let detail = if fields.is_empty() {
                "Validation failed".to_owned()
            } else {
                fields
                    .iter()
                    .map(|f| {
                        if f.location.is_empty() {
                            f.message.clone()
                        } else {
                            format!("{}: {}", f.location, f.message)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            Error::Validation { detail, fields }
        }
        Some(serde_json::Value::String(s)) => Error::Validation {
            detail: s,
            fields: Vec::new(),
        },
        _ => Error::Validation {
            detail: extract_detail(422, body),
            fields: Vec::new(),
        },
    }
}

fn join_location(loc: &[serde_json::Value]) -> String {
    loc.iter()
        .map(|part| match part {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn enrich_server_detail(detail: String, body: &str) -> String {
    let haystack = body.to_lowercase();
    if contains_any(&haystack, VENDOR_PATTERNS) {
        format!("{detail}\n\n{LISTENER_CHECKLIST}")
    } else {
        detail
    }
}

// ── Tests ────────────────────────────────────────────────────────────
