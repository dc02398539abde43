// ── Central reactive data store ──
//
// Local state for one dashboard session. REST refreshes replace whole
// collections; pushes only add. Mutations are broadcast to subscribers via
// `watch` channels.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pipewatch_api::{
    Connection, MonitoringMetric, Pipeline, PipelineStatus, PushMessage, ReplicationEvent,
};
use tokio::sync::watch;

use super::bounded::BoundedLog;
use super::collection::EntityCollection;
use crate::config::StoreSettings;
use crate::stream::EntityStream;

const DEFAULT_CAP: usize = 1000;

/// Central reactive store for connections, pipelines, events and metrics.
///
/// Event and metric logs are bounded and ordered newest first. Connections
/// and pipelines are keyed by id and ordered by it.
pub struct DataStore {
    pub(crate) events: BoundedLog<ReplicationEvent>,
    pub(crate) metrics: BoundedLog<MonitoringMetric>,
    pub(crate) connections: EntityCollection<Connection>,
    pub(crate) pipelines: EntityCollection<Pipeline>,
    pub(crate) pipeline_statuses: EntityCollection<PipelineStatus>,
    pub(crate) last_refresh: watch::Sender<Option<DateTime<Utc>>>,
    pub(crate) last_push: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new(event_cap: usize, metric_cap: usize) -> Self {
        let (last_refresh, _) = watch::channel(None);
        let (last_push, _) = watch::channel(None);

        Self {
            events: BoundedLog::new(event_cap),
            metrics: BoundedLog::new(metric_cap),
            connections: EntityCollection::new(),
            pipelines: EntityCollection::new(),
            pipeline_statuses: EntityCollection::new(),
            last_refresh,
            last_push,
        }
    }

    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new(settings.event_cap, settings.metric_cap)
    }

    // ── Event and metric logs ────────────────────────────────────────

    /// Add events in arrival order. Known ids are skipped.
    ///
    /// Returns the number of events that were new.
    pub fn ingest_events(&self, events: impl IntoIterator<Item = ReplicationEvent>) -> usize {
        self.events.ingest(events)
    }

    /// Replace the event log with a REST listing (newest first).
    pub fn replace_events(&self, events: Vec<ReplicationEvent>) {
        self.events.replace(events);
        self.mark_refreshed();
    }

    /// Add metric samples. Samples with a known `{timestamp}:{pipeline}`
    /// key are skipped.
    pub fn ingest_metrics(&self, metrics: impl IntoIterator<Item = MonitoringMetric>) -> usize {
        self.metrics.ingest(metrics)
    }

    /// Replace the metric log with a REST listing (newest first).
    pub fn replace_metrics(&self, metrics: Vec<MonitoringMetric>) {
        self.metrics.replace(metrics);
        self.mark_refreshed();
    }

    /// Merge one channel push. Returns `true` if the store changed.
    pub fn apply_push(&self, push: &PushMessage) -> bool {
        let changed = match push {
            PushMessage::ReplicationEvent(event) => self.ingest_events([event.clone()]) > 0,
            PushMessage::MonitoringMetric(metric) => self.ingest_metrics([metric.clone()]) > 0,
            PushMessage::PipelineStatus(status) => {
                self.apply_pipeline_status(status.clone());
                true
            }
        };
        self.last_push.send_replace(Some(Utc::now()));
        changed
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn events_snapshot(&self) -> Arc<Vec<Arc<ReplicationEvent>>> {
        self.events.snapshot()
    }

    pub fn metrics_snapshot(&self) -> Arc<Vec<Arc<MonitoringMetric>>> {
        self.metrics.snapshot()
    }

    pub fn connections_snapshot(&self) -> Arc<Vec<Arc<Connection>>> {
        self.connections.snapshot()
    }

    pub fn pipelines_snapshot(&self) -> Arc<Vec<Arc<Pipeline>>> {
        self.pipelines.snapshot()
    }

    pub fn pipeline_statuses_snapshot(&self) -> Arc<Vec<Arc<PipelineStatus>>> {
        self.pipeline_statuses.snapshot()
    }

    /// Events of one pipeline, newest first.
    pub fn events_for(&self, pipeline_id: &str) -> Vec<Arc<ReplicationEvent>> {
        self.events
            .snapshot()
            .iter()
            .filter(|e| e.pipeline_id == pipeline_id)
            .cloned()
            .collect()
    }

    /// Metric samples of one pipeline, newest first.
    pub fn metrics_for(&self, pipeline_id: &str) -> Vec<Arc<MonitoringMetric>> {
        self.metrics
            .snapshot()
            .iter()
            .filter(|m| m.pipeline_id == pipeline_id)
            .cloned()
            .collect()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn connection_by_id(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id)
    }

    pub fn pipeline_by_id(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(id)
    }

    /// Last pushed status for a pipeline.
    pub fn pipeline_status(&self, pipeline_id: &str) -> Option<Arc<PipelineStatus>> {
        self.pipeline_statuses.get(pipeline_id)
    }

    pub fn has_event(&self, id: &str) -> bool {
        self.events.contains(id)
    }

    // ── Count accessors ──────────────────────────────────────────────

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_events(&self) -> EntityStream<ReplicationEvent> {
        EntityStream::new(self.events.subscribe())
    }

    pub fn subscribe_metrics(&self) -> EntityStream<MonitoringMetric> {
        EntityStream::new(self.metrics.subscribe())
    }

    pub fn subscribe_connections(&self) -> EntityStream<Connection> {
        EntityStream::new(self.connections.subscribe())
    }

    pub fn subscribe_pipelines(&self) -> EntityStream<Pipeline> {
        EntityStream::new(self.pipelines.subscribe())
    }

    pub fn subscribe_pipeline_statuses(&self) -> EntityStream<PipelineStatus> {
        EntityStream::new(self.pipeline_statuses.subscribe())
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    pub fn last_push(&self) -> Option<DateTime<Utc>> {
        *self.last_push.borrow()
    }

    pub fn subscribe_last_push(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_push.subscribe()
    }

    pub(crate) fn mark_refreshed(&self) {
        self.last_refresh.send_replace(Some(Utc::now()));
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAP, DEFAULT_CAP)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pipewatch_api::EventType;
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(id: &str, pipeline: &str, second: u32) -> ReplicationEvent {
        ReplicationEvent {
            id: id.into(),
            pipeline_id: pipeline.into(),
            table_name: "orders".into(),
            event_type: EventType::Insert,
            status: Some("success".into()),
            latency_ms: Some(12.0),
            error_message: None,
            timestamp: Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, second).unwrap(),
        }
    }

    fn metric(pipeline: &str, second: u32) -> MonitoringMetric {
        MonitoringMetric {
            pipeline_id: pipeline.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, second).unwrap(),
            events_per_second: Some(40.0),
            latency_ms: None,
            lag_seconds: None,
            error_count: None,
            extra: serde_json::Map::new(),
        }
    }

    fn ids(store: &DataStore) -> Vec<String> {
        store.events_snapshot().iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn same_event_twice_leaves_store_unchanged() {
        let store = DataStore::default();
        store.ingest_events([event("e1", "p1", 0)]);
        let before = store.events_snapshot();

        assert_eq!(store.ingest_events([event("e1", "p1", 0)]), 0);
        assert!(Arc::ptr_eq(&before, &store.events_snapshot()));
    }

    #[test]
    fn push_and_rest_share_identity() {
        let store = DataStore::default();
        store.replace_events(vec![event("e2", "p1", 2), event("e1", "p1", 1)]);

        let push = PushMessage::ReplicationEvent(event("e2", "p1", 2));
        assert!(!store.apply_push(&push));
        assert_eq!(ids(&store), vec!["e2", "e1"]);
        assert!(store.last_push().is_some());
        assert!(store.last_refresh().is_some());
    }

    #[test]
    fn cap_evicts_oldest_events() {
        let store = DataStore::new(2, 2);
        for (i, id) in ["e1", "e2", "e3"].into_iter().enumerate() {
            store.ingest_events([event(id, "p1", u32::try_from(i).unwrap())]);
        }
        assert_eq!(ids(&store), vec!["e3", "e2"]);
        assert!(!store.has_event("e1"));
    }

    #[test]
    fn metrics_key_on_timestamp_and_pipeline() {
        let store = DataStore::default();
        assert_eq!(
            store.ingest_metrics([metric("p1", 0), metric("p2", 0), metric("p1", 0)]),
            2
        );
        assert_eq!(store.metrics_for("p1").len(), 1);
        assert_eq!(store.metric_count(), 2);
    }

    #[test]
    fn events_for_filters_by_pipeline() {
        let store = DataStore::default();
        store.ingest_events([event("a", "p1", 0), event("b", "p2", 1), event("c", "p1", 2)]);
        let p1: Vec<_> = store.events_for("p1").iter().map(|e| e.id.clone()).collect();
        assert_eq!(p1, vec!["c", "a"]);
    }

    #[test]
    fn subscribers_see_pushed_events() {
        let store = DataStore::default();
        let mut stream = store.subscribe_events();
        assert!(stream.current().is_empty());

        store.apply_push(&PushMessage::ReplicationEvent(event("e1", "p9", 0)));
        let snap = tokio_test::assert_ready!(tokio_test::task::spawn(stream.changed()).poll());
        assert_eq!(snap.unwrap().len(), 1);
    }
}
