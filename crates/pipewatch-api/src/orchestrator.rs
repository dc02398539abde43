// Request orchestration: deduplication, per-attempt timeout and
// retry-if-safe around a unit of work.
//
// Endpoints hand the orchestrator a closure that performs one attempt.
// The orchestrator decides how long that attempt may run, whether a
// failure is worth repeating, and whether an identical call is already
// in flight and can simply be joined.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::Error;
use crate::transport::{ApiResponse, Transport};

const SIGNAL_CHANNEL_SIZE: usize = 16;

type SharedResult = Shared<BoxFuture<'static, Result<ApiResponse, Error>>>;

// ── Policies ─────────────────────────────────────────────────────────

/// Growth curve between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `attempt * step`
    #[default]
    Linear,
    /// `step * 2^(attempt - 1)`
    Exponential,
}

/// Bounded retry for network-class failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one for read endpoints.
    pub max_retries: u32,
    pub step: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            step: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            Backoff::Linear => self.step.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.step.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }
}

/// Endpoint timeout classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutTier {
    Quick,
    List,
    ConnectionTest,
    Mutation,
    Preview,
}

/// Per-tier deadlines plus the slow-source scaling for previews.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutPolicy {
    pub quick: Duration,
    pub list: Duration,
    pub connection_test: Duration,
    pub mutation: Duration,
    pub preview: Duration,
    /// Source types whose previews get `slow_source_multiplier` more time.
    pub slow_sources: Vec<String>,
    pub slow_source_multiplier: f64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            quick: Duration::from_secs(3),
            list: Duration::from_secs(10),
            connection_test: Duration::from_secs(35),
            mutation: Duration::from_secs(15),
            preview: Duration::from_secs(30),
            slow_sources: vec!["oracle".into()],
            slow_source_multiplier: 2.0,
        }
    }
}

impl TimeoutPolicy {
    pub fn timeout(&self, tier: TimeoutTier) -> Duration {
        match tier {
            TimeoutTier::Quick => self.quick,
            TimeoutTier::List => self.list,
            TimeoutTier::ConnectionTest => self.connection_test,
            TimeoutTier::Mutation => self.mutation,
            TimeoutTier::Preview => self.preview,
        }
    }

    /// Preview deadline for a given connector family.
    pub fn preview_for(&self, source_type: Option<&str>) -> Duration {
        let slow = source_type.is_some_and(|source| {
            self.slow_sources
                .iter()
                .any(|s| s.eq_ignore_ascii_case(source.trim()))
        });
        if slow {
            self.preview.mul_f64(self.slow_source_multiplier.max(1.0))
        } else {
            self.preview
        }
    }
}

// ── Options & signals ────────────────────────────────────────────────

/// How a single logical call is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Deadline for each attempt.
    pub timeout: Duration,
    /// Extra attempts allowed for retryable failures.
    pub max_retries: u32,
    /// Concurrent calls sharing this key share one execution.
    pub dedup_key: Option<String>,
    /// Clear the stored session and signal `LoginRequired` on 401/403.
    pub session_guard: bool,
}

impl RequestOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            dedup_key: None,
            session_guard: true,
        }
    }

    pub fn retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn dedup(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// For credential exchanges: a 401/403 is a rejected login and leaves
    /// the current session alone.
    pub fn without_session_guard(mut self) -> Self {
        self.session_guard = false;
        self
    }
}

/// Out-of-band notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// The server rejected the session; the token has been cleared.
    LoginRequired { status: u16 },
}

// ── Orchestrator ─────────────────────────────────────────────────────

struct OrchestratorInner {
    transport: Arc<Transport>,
    retry: RetryPolicy,
    pending: DashMap<String, SharedResult>,
    signals: broadcast::Sender<SessionSignal>,
}

/// Runs units of work with timeout, retry and in-flight deduplication.
///
/// Cheaply cloneable; clones share the pending registry.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(transport: Arc<Transport>, retry: RetryPolicy) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_SIZE);
        Self {
            inner: Arc::new(OrchestratorInner {
                transport,
                retry,
                pending: DashMap::new(),
                signals,
            }),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.inner.transport
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// Subscribe to session signals (login required, ...).
    pub fn signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.inner.signals.subscribe()
    }

    /// Number of deduplicated calls currently in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Execute `work` under `options`.
    ///
    /// `work` is invoked once per attempt. With a dedup key, a concurrent
    /// call with the same key joins the in-flight execution instead of
    /// invoking its own `work`.
    pub async fn execute<F, Fut>(
        &self,
        options: RequestOptions,
        work: F,
    ) -> Result<ApiResponse, Error>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse, Error>> + Send + 'static,
    {
        let Some(key) = options.dedup_key.clone() else {
            return run_attempts(Arc::clone(&self.inner), options, work).await;
        };

        let shared = match self.inner.pending.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(key = %key, "joining in-flight request");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let inner = Arc::clone(&self.inner);
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let result = run_attempts(Arc::clone(&inner), options, work).await;
                    inner.pending.remove(&task_key);
                    result
                });
                let shared = handle
                    .map(|joined| {
                        joined.unwrap_or_else(|e| {
                            Err(Error::Unknown {
                                status: None,
                                detail: format!("request task failed: {e}"),
                            })
                        })
                    })
                    .boxed()
                    .shared();
                entry.insert(shared.clone());
                shared
            }
        };

        shared.await
    }
}

/// Attempt loop: timeout each attempt, retry only what is safe to retry.
async fn run_attempts<F, Fut>(
    inner: Arc<OrchestratorInner>,
    options: RequestOptions,
    work: F,
) -> Result<ApiResponse, Error>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApiResponse, Error>> + Send + 'static,
{
    let mut attempt: u32 = 0;
    loop {
        debug!(
            attempt,
            key = options.dedup_key.as_deref().unwrap_or("-"),
            timeout_ms = u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX),
            "request attempt"
        );

        // Dropping the attempt future on elapse cancels the HTTP call.
        let result = match tokio::time::timeout(options.timeout, work()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::timeout_after(options.timeout)),
        };

        let err = match result {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if err.is_auth_failure() {
            if options.session_guard {
                handle_auth_failure(&inner, &err);
            }
            return Err(err);
        }

        if !err.is_retryable() || attempt >= options.max_retries {
            return Err(err);
        }

        attempt += 1;
        let delay = inner.retry.delay_for(attempt);
        warn!(
            attempt,
            max_retries = options.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "network unreachable, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

fn handle_auth_failure(inner: &OrchestratorInner, err: &Error) {
    let status = err.status().unwrap_or(401);
    warn!(status, "session rejected by server, clearing stored token");
    inner.transport.clear_session();
    // Err only means nobody is listening.
    let _ = inner.signals.send(SessionSignal::LoginRequired { status });
}
