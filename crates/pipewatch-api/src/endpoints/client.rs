// Endpoint client
//
// Binds a `Transport`, an `Orchestrator` and a `TimeoutPolicy` together.
// Resource modules (connections, pipelines, events, ...) are implemented
// as inherent methods in separate files; this one only knows how to turn
// a request plus options into a decoded value.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::error::Error;
use crate::models::Listing;
use crate::orchestrator::{
    Orchestrator, RequestOptions, RetryPolicy, SessionSignal, TimeoutPolicy, TimeoutTier,
};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Typed client for the replication dashboard REST API.
///
/// Cheaply cloneable. Clones share the transport, the session and the
/// in-flight registry, so two screens asking for the same page at the
/// same moment share one round trip.
#[derive(Clone)]
pub struct ApiClient {
    orchestrator: Orchestrator,
    timeouts: Arc<TimeoutPolicy>,
}

impl ApiClient {
    pub fn new(transport: Arc<Transport>, retry: RetryPolicy, timeouts: TimeoutPolicy) -> Self {
        Self {
            orchestrator: Orchestrator::new(transport, retry),
            timeouts: Arc::new(timeouts),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        self.orchestrator.transport()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    /// Subscribe to session signals raised by any request on this client.
    pub fn session_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.orchestrator.signals()
    }

    // ── Option presets ───────────────────────────────────────────────

    /// Read call: tier deadline plus the configured retry budget.
    pub(crate) fn read_options(&self, tier: TimeoutTier) -> RequestOptions {
        RequestOptions::new(self.timeouts.timeout(tier))
            .retries(self.orchestrator.retry_policy().max_retries)
    }

    /// Mutating call: never retried, never deduplicated.
    pub(crate) fn mutation_options(&self) -> RequestOptions {
        RequestOptions::new(self.timeouts.timeout(TimeoutTier::Mutation))
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Run `request` through the orchestrator.
    pub(crate) async fn call(
        &self,
        request: ApiRequest,
        options: RequestOptions,
    ) -> Result<ApiResponse, Error> {
        let transport = Arc::clone(self.transport());
        let request = Arc::new(request);
        self.orchestrator
            .execute(options, move || {
                let transport = Arc::clone(&transport);
                let request = Arc::clone(&request);
                async move { transport.send(&request).await }
            })
            .await
    }

    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        options: RequestOptions,
    ) -> Result<T, Error> {
        self.call(request, options).await?.decode()
    }

    /// Fetch a collection, accepting bare arrays and page objects.
    pub(crate) async fn fetch_list<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        options: RequestOptions,
    ) -> Result<Vec<T>, Error> {
        let listing: Listing<T> = self.fetch(request, options).await?;
        Ok(listing.into_vec())
    }
}

/// Serialize a request body.
pub(crate) fn encode_body<B: Serialize>(body: &B) -> Result<serde_json::Value, Error> {
    serde_json::to_value(body).map_err(|e| Error::Unknown {
        status: None,
        detail: format!("request body could not be encoded: {e}"),
    })
}
