// ── Dashboard service ──
//
// Wires transport, endpoints, push channel and store together for one
// backend. Pushes are merged into the store as they arrive; each pushed
// replication event also schedules a REST refresh of the selected
// pipeline's events so the local view converges on the server's.

use std::sync::Arc;
use std::time::Duration;

use pipewatch_api::{
    ApiClient, ChannelConfig, ChannelState, EventChannel, EventQuery, PipelineAction,
    PushMessage, SessionSignal, TokenStore, Transport, TransportConfig, UserProfile,
};
use secrecy::SecretString;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ScopeRefreshPolicy};
use crate::error::CoreError;
use crate::store::DataStore;

// ── Dashboard ────────────────────────────────────────────────────────

/// The entry point for consumers.
///
/// Cheaply cloneable via `Arc<DashboardInner>`. Construct with
/// [`new`](Self::new), call [`start`](Self::start) to begin consuming
/// pushes, and [`shutdown`](Self::shutdown) to stop background tasks.
#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<DashboardInner>,
}

struct DashboardInner {
    config: ClientConfig,
    api: ApiClient,
    channel: Option<EventChannel>,
    store: Arc<DataStore>,
    selected: watch::Sender<Option<String>>,
    refresh_tx: mpsc::UnboundedSender<()>,
    refresh_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Dashboard {
    /// Build the service. Does not touch the network; a session persisted
    /// in `tokens` is restored.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, CoreError> {
        let transport_config = TransportConfig {
            connect_timeout: config.connect_timeout,
            ..TransportConfig::default()
        };
        let transport = Arc::new(Transport::new(&config.base_url, &transport_config, tokens)?);
        let api = ApiClient::new(
            Arc::clone(&transport),
            config.retry.clone(),
            config.timeouts.clone(),
        );

        let channel = if config.channel.enabled {
            let channel_config =
                ChannelConfig::from_base_url(&config.base_url, &config.channel.path)?
                    .with_connect_timeout(config.channel.connect_timeout);
            Some(EventChannel::new(channel_config, Some(transport)))
        } else {
            debug!("push channel disabled by configuration");
            None
        };

        let store = Arc::new(DataStore::from_settings(&config.store));
        let (selected, _) = watch::channel(None);
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(DashboardInner {
                config,
                api,
                channel,
                store,
                selected,
                refresh_tx,
                refresh_rx: Mutex::new(Some(refresh_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Typed REST endpoints.
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    /// The push channel, unless disabled by configuration.
    pub fn channel(&self) -> Option<&EventChannel> {
        self.inner.channel.as_ref()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.inner
            .channel
            .as_ref()
            .map_or(ChannelState::Disconnected, EventChannel::state)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the push consumer and the scope-refresh worker.
    ///
    /// Calling `start` again is a no-op. The channel itself connects
    /// lazily on the first [`watch_pipeline`](Self::watch_pipeline).
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Disconnected);
        }
        let Some(refresh_rx) = self.inner.refresh_rx.lock().await.take() else {
            debug!("dashboard already started");
            return Ok(());
        };

        let mut handles = self.inner.task_handles.lock().await;
        let cancel = self.inner.cancel.clone();

        handles.push(tokio::spawn(refresh_worker(
            self.clone(),
            refresh_rx,
            self.inner.config.store.scope_refresh,
            cancel.clone(),
        )));

        if let Some(ref channel) = self.inner.channel {
            let pushes = channel.pushes();
            handles.push(tokio::spawn(push_consumer(self.clone(), pushes, cancel)));
        }

        info!(base_url = %self.inner.config.base_url, "dashboard started");
        Ok(())
    }

    /// Stop background tasks and close the push channel.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(ref channel) = self.inner.channel {
            channel.shutdown();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("dashboard shut down");
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Log in and persist the session.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Option<UserProfile>, CoreError> {
        // A 401 here means bad credentials; the stored session is untouched.
        self.inner
            .api
            .login(username, password)
            .await
            .map_err(CoreError::Api)
    }

    pub async fn logout(&self) {
        self.inner.api.logout().await;
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.api.transport().is_authenticated()
    }

    /// Cached profile of the logged-in user.
    pub fn user(&self) -> Option<UserProfile> {
        self.inner.api.transport().user()
    }

    /// Fires when a request was rejected with 401/403 and the session
    /// was cleared.
    pub fn session_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.inner.api.session_signals()
    }

    // ── REST refresh ─────────────────────────────────────────────────

    pub async fn refresh_connections(&self) -> Result<usize, CoreError> {
        let limit = self.inner.config.store.refresh_limit;
        let connections = self.inner.api.list_connections(0, limit).await?;
        let count = connections.len();
        self.inner.store.replace_connections(connections);
        Ok(count)
    }

    pub async fn refresh_pipelines(&self) -> Result<usize, CoreError> {
        let limit = self.inner.config.store.refresh_limit;
        let pipelines = self.inner.api.list_pipelines(0, limit).await?;
        let count = pipelines.len();
        self.inner.store.replace_pipelines(pipelines);
        Ok(count)
    }

    /// Scope refresh: re-fetch events of the selected pipeline, or of all
    /// pipelines when none is selected, and replace the event log.
    pub async fn refresh_events(&self) -> Result<usize, CoreError> {
        let query = self.scope_query();
        let events = self.inner.api.list_events(&query).await?;
        let count = events.len();
        debug!(
            pipeline = query.pipeline_id.as_deref().unwrap_or("all"),
            count, "events refreshed"
        );
        self.inner.store.replace_events(events);
        Ok(count)
    }

    pub async fn refresh_metrics(&self) -> Result<usize, CoreError> {
        let query = self.scope_query();
        let metrics = self.inner.api.list_metrics(&query).await?;
        let count = metrics.len();
        self.inner.store.replace_metrics(metrics);
        Ok(count)
    }

    /// Connections, pipelines and the event scope, concurrently.
    pub async fn full_refresh(&self) -> Result<(), CoreError> {
        let (connections, pipelines, events) = tokio::join!(
            self.refresh_connections(),
            self.refresh_pipelines(),
            self.refresh_events(),
        );
        connections?;
        pipelines?;
        events?;
        Ok(())
    }

    /// Run a lifecycle action and re-read the pipeline into the store.
    pub async fn pipeline_action(&self, id: &str, action: PipelineAction) -> Result<(), CoreError> {
        self.inner.api.pipeline_action(id, action).await?;
        match self.inner.api.get_pipeline(id).await {
            Ok(pipeline) => self.inner.store.upsert_pipeline(pipeline),
            Err(e) => debug!(id, error = %e, "could not re-read pipeline after action"),
        }
        Ok(())
    }

    pub async fn delete_pipeline(&self, id: &str) -> Result<(), CoreError> {
        self.inner.api.delete_pipeline(id).await?;
        self.inner.store.remove_pipeline(id);
        Ok(())
    }

    pub async fn delete_connection(&self, id: &str) -> Result<(), CoreError> {
        self.inner.api.delete_connection(id).await?;
        self.inner.store.remove_connection(id);
        Ok(())
    }

    // ── Scope and channel ────────────────────────────────────────────

    /// Change the pipeline whose events are kept fresh, then refresh.
    pub fn select_pipeline(&self, pipeline_id: Option<String>) {
        let pipeline_id = pipeline_id.filter(|id| !id.trim().is_empty());
        let changed = self.inner.selected.send_if_modified(|current| {
            if *current == pipeline_id {
                return false;
            }
            current.clone_from(&pipeline_id);
            true
        });
        if changed {
            debug!(pipeline = ?pipeline_id, "scope changed");
            self.request_scope_refresh();
        }
    }

    pub fn selected_pipeline(&self) -> Option<String> {
        self.inner.selected.borrow().clone()
    }

    pub fn selection_changes(&self) -> watch::Receiver<Option<String>> {
        self.inner.selected.subscribe()
    }

    /// Select a pipeline and subscribe to its pushes.
    ///
    /// A channel failure is logged, not returned: the dashboard keeps
    /// working over REST.
    pub async fn watch_pipeline(&self, pipeline_id: &str) {
        self.select_pipeline(Some(pipeline_id.to_owned()));
        if let Some(ref channel) = self.inner.channel {
            if let Err(e) = channel.subscribe(pipeline_id).await {
                warn!(pipeline_id, error = %e, "push channel unavailable, continuing over REST");
            }
        }
    }

    /// Unsubscribe; clears the selection if it pointed at this pipeline.
    pub async fn unwatch_pipeline(&self, pipeline_id: &str) {
        if let Some(ref channel) = self.inner.channel {
            channel.unsubscribe(pipeline_id).await;
        }
        if self.selected_pipeline().as_deref() == Some(pipeline_id) {
            self.select_pipeline(None);
        }
    }

    /// Merge one push into the store. A replication event also schedules
    /// a scope refresh.
    pub fn handle_push(&self, push: &PushMessage) {
        let changed = self.inner.store.apply_push(push);
        debug!(pipeline = push.pipeline_id(), changed, "push applied");
        if matches!(push, PushMessage::ReplicationEvent(_)) {
            self.request_scope_refresh();
        }
    }

    /// Queue a scope refresh for the refresh worker.
    pub fn request_scope_refresh(&self) {
        if self.inner.refresh_tx.send(()).is_err() {
            debug!("refresh worker gone, dropping scope refresh");
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn scope_query(&self) -> EventQuery {
        let limit = self.inner.config.store.refresh_limit;
        match self.selected_pipeline() {
            Some(id) => EventQuery::for_pipeline(id, 0, limit),
            None => EventQuery::new(0, limit),
        }
    }

    async fn refresh_scope_logged(&self) {
        if let Err(e) = self.refresh_events().await {
            warn!(error = %e, "scope refresh failed");
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Merge pushes into the store until cancelled or the channel is dropped.
async fn push_consumer(
    dashboard: Dashboard,
    mut pushes: broadcast::Receiver<Arc<PushMessage>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = pushes.recv() => match msg {
                Ok(push) => dashboard.handle_push(&push),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push consumer lagged, refreshing scope");
                    dashboard.request_scope_refresh();
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Turn refresh requests into REST scope refreshes.
async fn refresh_worker(
    dashboard: Dashboard,
    mut requests: mpsc::UnboundedReceiver<()>,
    policy: ScopeRefreshPolicy,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            request = requests.recv() => {
                if request.is_none() {
                    break;
                }
                match policy {
                    ScopeRefreshPolicy::PerEvent => {
                        // Concurrent identical refreshes share one request.
                        let dashboard = dashboard.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => {}
                                () = dashboard.refresh_scope_logged() => {}
                            }
                        });
                    }
                    ScopeRefreshPolicy::Coalesced(window) => {
                        if !coalesce(&mut requests, window, &cancel).await {
                            break;
                        }
                        dashboard.refresh_scope_logged().await;
                    }
                }
            }
        }
    }
}

/// Wait out the window and swallow requests that arrived meanwhile.
/// Returns `false` when cancelled.
async fn coalesce(
    requests: &mut mpsc::UnboundedReceiver<()>,
    window: Duration,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return false,
        () = tokio::time::sleep(window) => {}
    }
    let mut collapsed = 0_usize;
    while requests.try_recv().is_ok() {
        collapsed += 1;
    }
    if collapsed > 0 {
        debug!(collapsed, "coalesced scope refreshes");
    }
    true
}
