//! Shared configuration for pipewatch consumers.
//!
//! TOML file + `PIPEWATCH_*` environment loading, validation, and
//! translation to `pipewatch_core::ClientConfig`. The OS-keyring session
//! store lives in [`session`].

pub mod session;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use pipewatch_api::{Backoff, RetryPolicy, TimeoutPolicy};
use pipewatch_core::{ChannelSettings, ClientConfig, ScopeRefreshPolicy, StoreSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use session::KeyringTokenStore;

const ENV_PREFIX: &str = "PIPEWATCH_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// REST base URL. The push channel host is derived from it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Keyring entry holding the session.
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Username remembered for `login` prompts.
    #[serde(default)]
    pub username: Option<String>,

    /// TCP/TLS connect timeout for REST calls.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub timeouts: TimeoutSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub channel: ChannelSection,

    #[serde(default)]
    pub store: StoreSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            profile: default_profile(),
            username: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            timeouts: TimeoutSection::default(),
            retry: RetrySection::default(),
            channel: ChannelSection::default(),
            store: StoreSection::default(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}
fn default_profile() -> String {
    "default".into()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// `[timeouts]`: per-tier deadlines in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub quick_ms: u64,
    pub list_ms: u64,
    pub connection_test_ms: u64,
    pub mutation_ms: u64,
    pub preview_ms: u64,
    /// Connector families whose previews get `slow_source_multiplier`.
    pub slow_sources: Vec<String>,
    pub slow_source_multiplier: f64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            quick_ms: 3_000,
            list_ms: 10_000,
            connection_test_ms: 35_000,
            mutation_ms: 15_000,
            preview_ms: 30_000,
            slow_sources: vec!["oracle".into()],
            slow_source_multiplier: 2.0,
        }
    }
}

/// `[retry]`: backoff for network-class failures on reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub step_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 2,
            step_ms: 1_000,
            max_delay_ms: 5_000,
            backoff: Backoff::Linear,
        }
    }
}

/// `[channel]`: the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelSection {
    pub enabled: bool,
    pub path: String,
    pub connect_timeout_ms: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "ws".into(),
            connect_timeout_ms: 10_000,
        }
    }
}

/// How pushes are reconciled with REST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeRefreshMode {
    #[default]
    PerEvent,
    Coalesced,
}

/// `[store]`: local retention.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSection {
    pub event_cap: usize,
    pub metric_cap: usize,
    pub refresh_limit: u32,
    pub scope_refresh: ScopeRefreshMode,
    /// Burst window for `scope_refresh = "coalesced"`.
    pub coalesce_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            event_cap: 1_000,
            metric_cap: 1_000,
            refresh_limit: 100,
            scope_refresh: ScopeRefreshMode::PerEvent,
            coalesce_ms: 500,
        }
    }
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and build the runtime configuration.
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let base_url: url::Url = self.base_url.parse().map_err(|_| {
            ConfigError::invalid("base_url", format!("invalid URL: {}", self.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "base_url",
                format!("expected http or https, got '{}'", base_url.scheme()),
            ));
        }

        let channel = ChannelSettings {
            enabled: self.channel.enabled,
            path: self.channel.path.trim_matches('/').to_owned(),
            connect_timeout: millis(
                "channel.connect_timeout_ms",
                self.channel.connect_timeout_ms,
            )?,
        };

        Ok(ClientConfig {
            base_url,
            connect_timeout: millis("connect_timeout_ms", self.connect_timeout_ms)?,
            timeouts: self.timeouts.to_policy()?,
            retry: self.retry.to_policy()?,
            channel,
            store: self.store.to_settings()?,
        })
    }
}

impl TimeoutSection {
    fn to_policy(&self) -> Result<TimeoutPolicy, ConfigError> {
        if !self.slow_source_multiplier.is_finite() || self.slow_source_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "timeouts.slow_source_multiplier",
                format!("must be at least 1.0, got {}", self.slow_source_multiplier),
            ));
        }
        Ok(TimeoutPolicy {
            quick: millis("timeouts.quick_ms", self.quick_ms)?,
            list: millis("timeouts.list_ms", self.list_ms)?,
            connection_test: millis("timeouts.connection_test_ms", self.connection_test_ms)?,
            mutation: millis("timeouts.mutation_ms", self.mutation_ms)?,
            preview: millis("timeouts.preview_ms", self.preview_ms)?,
            slow_sources: self.slow_sources.clone(),
            slow_source_multiplier: self.slow_source_multiplier,
        })
    }
}

impl RetrySection {
    fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.max_delay_ms < self.step_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                format!("must not be below step_ms ({})", self.step_ms),
            ));
        }
        Ok(RetryPolicy {
            max_retries: self.max_retries,
            step: millis("retry.step_ms", self.step_ms)?,
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff: self.backoff,
        })
    }
}

impl StoreSection {
    fn to_settings(&self) -> Result<StoreSettings, ConfigError> {
        if self.event_cap == 0 {
            return Err(ConfigError::invalid("store.event_cap", "must be positive"));
        }
        if self.metric_cap == 0 {
            return Err(ConfigError::invalid("store.metric_cap", "must be positive"));
        }
        if self.refresh_limit == 0 {
            return Err(ConfigError::invalid("store.refresh_limit", "must be positive"));
        }
        let scope_refresh = match self.scope_refresh {
            ScopeRefreshMode::PerEvent => ScopeRefreshPolicy::PerEvent,
            ScopeRefreshMode::Coalesced => {
                ScopeRefreshPolicy::Coalesced(millis("store.coalesce_ms", self.coalesce_ms)?)
            }
        };
        Ok(StoreSettings {
            event_cap: self.event_cap,
            metric_cap: self.metric_cap,
            refresh_limit: self.refresh_limit,
            scope_refresh,
        })
    }
}

/// Positive millisecond duration.
fn millis(field: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be positive"));
    }
    Ok(Duration::from_millis(value))
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "pipewatch", "pipewatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pipewatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then the TOML file at `path` (if present), then
/// `PIPEWATCH_*` variables. Nested keys use `__`, e.g.
/// `PIPEWATCH_RETRY__MAX_RETRIES`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning defaults if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_translate_to_runtime_defaults() {
        let client = Config::default().to_client_config().unwrap();
        assert_eq!(client.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(client.timeouts, TimeoutPolicy::default());
        assert_eq!(client.retry, RetryPolicy::default());
        assert_eq!(client.channel, ChannelSettings::default());
        assert_eq!(client.store, StoreSettings::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
base_url = "https://pipes.example.com"

[timeouts]
preview_ms = 45000
slow_sources = ["oracle", "db2"]

[retry]
backoff = "exponential"

[store]
scope_refresh = "coalesced"
coalesce_ms = 250
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.timeouts.quick_ms, 3_000);
        let client = config.to_client_config().unwrap();
        assert_eq!(client.timeouts.preview, Duration::from_secs(45));
        assert_eq!(
            client.timeouts.preview_for(Some("DB2")),
            Duration::from_secs(90)
        );
        assert_eq!(client.retry.backoff, Backoff::Exponential);
        assert_eq!(
            client.store.scope_refresh,
            ScopeRefreshPolicy::Coalesced(Duration::from_millis(250))
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.store, StoreSection::default());
    }

    #[test]
    fn save_then_load_preserves_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            username: Some("ada".into()),
            channel: ChannelSection {
                enabled: false,
                ..ChannelSection::default()
            },
            ..Config::default()
        };

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.username.as_deref(), Some("ada"));
        assert!(!loaded.channel.enabled);
    }

    #[test]
    fn rejects_non_http_base_url() {
        let config = Config {
            base_url: "ftp://pipes".into(),
            ..Config::default()
        };
        let err = config.to_client_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "base_url"));
    }

    #[test]
    fn rejects_zero_caps_and_timeouts() {
        let mut config = Config::default();
        config.store.event_cap = 0;
        assert!(config.to_client_config().is_err());

        let mut config = Config::default();
        config.timeouts.list_ms = 0;
        let err = config.to_client_config().unwrap_err();
        assert_eq!(err.to_string(), "invalid timeouts.list_ms: must be positive");
    }

    #[test]
    fn rejects_shrinking_preview_multiplier() {
        let mut config = Config::default();
        config.timeouts.slow_source_multiplier = 0.5;
        assert!(config.to_client_config().is_err());
    }
}
