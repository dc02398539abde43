// ── Runtime client configuration ──
//
// These types describe *how* to talk to one dashboard backend: where it
// is, how long each class of request may take, how often to retry and how
// much history to keep. They never touch disk; `pipewatch-config` builds
// a `ClientConfig` and hands it in.

use std::time::Duration;

use pipewatch_api::{RetryPolicy, TimeoutPolicy};
use url::Url;

/// How a replication-event push is reconciled with REST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScopeRefreshPolicy {
    /// One scoped refresh per pushed event. Identical in-flight refreshes
    /// still collapse through request deduplication.
    #[default]
    PerEvent,
    /// Wait `window` after the first push, then refresh once for the burst.
    Coalesced(Duration),
}

/// Push channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub enabled: bool,
    /// Path below the base URL, e.g. `ws`.
    pub path: String,
    pub connect_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "ws".into(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Local retention and reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Maximum replication events kept; oldest are evicted first.
    pub event_cap: usize,
    /// Maximum metric samples kept.
    pub metric_cap: usize,
    /// Page size for scope refreshes.
    pub refresh_limit: u32,
    pub scope_refresh: ScopeRefreshPolicy,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            event_cap: 1000,
            metric_cap: 1000,
            refresh_limit: 100,
            scope_refresh: ScopeRefreshPolicy::PerEvent,
        }
    }
}

/// Everything the dashboard needs to talk to one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// REST base URL; the push channel derives its URL from it.
    pub base_url: Url,
    /// TCP/TLS connect timeout for REST calls.
    pub connect_timeout: Duration,
    pub timeouts: TimeoutPolicy,
    pub retry: RetryPolicy,
    pub channel: ChannelSettings,
    pub store: StoreSettings,
}

impl ClientConfig {
    /// Defaults for everything but the base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            connect_timeout: Duration::from_secs(10),
            timeouts: TimeoutPolicy::default(),
            retry: RetryPolicy::default(),
            channel: ChannelSettings::default(),
            store: StoreSettings::default(),
        }
    }
}
