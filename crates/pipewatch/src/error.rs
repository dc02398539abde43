//! CLI error types with miette diagnostics.
//!
//! Maps classified request errors and `CoreError` into user-facing errors
//! with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use pipewatch_api::ChannelError;
use pipewatch_config::ConfigError;
use pipewatch_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const SERVER: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the dashboard API")]
    #[diagnostic(
        code(pipewatch::unreachable),
        help(
            "{detail}\n\
             Check the base URL with: pipewatch config show"
        )
    )]
    Unreachable { detail: String },

    #[error("Request timed out")]
    #[diagnostic(code(pipewatch::timeout), help("{detail}"))]
    Timeout { detail: String },

    #[error("Live updates are unavailable")]
    #[diagnostic(
        code(pipewatch::channel),
        help("{detail}\nListings over REST still work: pipewatch events list")
    )]
    Channel { detail: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Not logged in or the session expired")]
    #[diagnostic(code(pipewatch::auth_required), help("Run: pipewatch login"))]
    AuthRequired { detail: String },

    #[error("Login rejected: {detail}")]
    #[diagnostic(code(pipewatch::login_failed), help("Check the username and password."))]
    LoginFailed { detail: String },

    // ── Request errors ───────────────────────────────────────────────
    #[error("Not found: {detail}")]
    #[diagnostic(code(pipewatch::not_found))]
    NotFound { detail: String },

    #[error("Invalid request: {detail}")]
    #[diagnostic(code(pipewatch::validation))]
    Validation { detail: String },

    #[error("Server error ({status})")]
    #[diagnostic(code(pipewatch::server), help("{detail}"))]
    Server { status: u16, detail: String },

    #[error("API error: {detail}")]
    #[diagnostic(code(pipewatch::api))]
    Api { detail: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(pipewatch::config),
        help("Inspect the configuration with: pipewatch config show")
    )]
    Config(#[from] ConfigError),

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(pipewatch::usage))]
    Usage { field: String, reason: String },

    #[error("Operation '{action}' requires confirmation")]
    #[diagnostic(
        code(pipewatch::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(pipewatch::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } | Self::Channel { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthRequired { .. } | Self::LoginFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Server { .. } => exit_code::SERVER,
            Self::Validation { .. }
            | Self::Usage { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Request error → CliError mapping ─────────────────────────────────

impl From<pipewatch_api::Error> for CliError {
    fn from(err: pipewatch_api::Error) -> Self {
        use pipewatch_api::Error as E;

        match err {
            E::Timeout { detail } => CliError::Timeout { detail },
            E::NetworkUnreachable { detail } => CliError::Unreachable { detail },
            E::Client { status: 401 | 403, detail } => CliError::AuthRequired { detail },
            E::Client { status: 404, detail } => CliError::NotFound { detail },
            E::Validation { .. } => CliError::Validation {
                detail: err.detail(),
            },
            E::Server { status, detail } => CliError::Server { status, detail },
            other => CliError::Api {
                detail: other.to_string(),
            },
        }
    }
}

impl From<ChannelError> for CliError {
    fn from(err: ChannelError) -> Self {
        CliError::Channel {
            detail: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Api(e) => e.into(),
            CoreError::SessionExpired { message } => CliError::AuthRequired { detail: message },
            CoreError::NotAuthenticated => CliError::AuthRequired {
                detail: "no stored session".into(),
            },
            CoreError::Channel(e) => e.into(),
            CoreError::Disconnected => CliError::Api {
                detail: "dashboard was shut down".into(),
            },
            CoreError::Config { message } => CliError::Usage {
                field: "config".into(),
                reason: message,
            },
        }
    }
}
