// ── Core error types ──
//
// Errors surfaced by the dashboard service. Request failures keep their
// classified `pipewatch_api::Error` so callers can still tell a timeout
// from a validation problem; only the session-expiry case is lifted into
// its own variant because it changes what the UI should do next.

use pipewatch_api::ChannelError;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Request errors ───────────────────────────────────────────────
    #[error(transparent)]
    Api(pipewatch_api::Error),

    #[error("Session expired, log in again: {message}")]
    SessionExpired { message: String },

    #[error("Not logged in")]
    NotAuthenticated,

    // ── Push channel errors ──────────────────────────────────────────
    #[error(transparent)]
    Channel(#[from] ChannelError),

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Dashboard has been shut down")]
    Disconnected,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// The classified request error, when this came from a REST call.
    pub fn api_error(&self) -> Option<&pipewatch_api::Error> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

// ── Conversion from request-layer errors ─────────────────────────────

impl From<pipewatch_api::Error> for CoreError {
    fn from(err: pipewatch_api::Error) -> Self {
        if err.is_auth_failure() {
            CoreError::SessionExpired {
                message: err.detail(),
            }
        } else {
            CoreError::Api(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_become_session_expired() {
        let err: CoreError = pipewatch_api::Error::Client {
            status: 403,
            detail: "forbidden".into(),
        }
        .into();
        assert!(matches!(err, CoreError::SessionExpired { .. }));
        assert!(err.api_error().is_none());
    }

    #[test]
    fn other_request_errors_stay_classified() {
        let err: CoreError = pipewatch_api::Error::EmptyResponse { status: 200 }.into();
        assert_eq!(
            err.api_error(),
            Some(&pipewatch_api::Error::EmptyResponse { status: 200 })
        );
    }
}
