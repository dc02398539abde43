// Wire types shared by the REST endpoints and the push channel.
//
// REST listings and push messages deserialize into the same structs, so
// the store never has to care where an entity came from. Field aliases
// absorb the naming differences between the two origins, and every type
// keeps unknown fields in `extra`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::Display;

type Extra = serde_json::Map<String, serde_json::Value>;

// ── Identifier helpers ───────────────────────────────────────────────

/// Accept ids sent as either JSON strings or numbers.
pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Num(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Str(s) => s,
        RawId::Num(n) => n.to_string(),
    })
}

fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "id_string")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

// ── Timestamp helpers ────────────────────────────────────────────────

/// Parse RFC 3339, or a naive ISO 8601 datetime read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn opt_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "lenient_timestamp")] DateTime<Utc>);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

// ── Listings ─────────────────────────────────────────────────────────

/// A collection endpoint response: either a bare array or a page object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Items(Vec<T>),
    Page {
        #[serde(alias = "data", alias = "results")]
        items: Vec<T>,
    },
}

impl<T> Listing<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::Items(items) | Self::Page { items } => items,
        }
    }
}

// ── Auth ─────────────────────────────────────────────────────────────

/// Last-known user profile, persisted next to the bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

// ── Health ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── Connections ──────────────────────────────────────────────────────

/// A configured source or target database connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    /// Connector family, e.g. `postgresql`, `oracle`, `mysql`.
    #[serde(default, alias = "connection_type", alias = "db_type")]
    pub source_type: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "database_name")]
    pub database: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "latency", alias = "response_time_ms")]
    pub latency_ms: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// First rows of a source table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPreview {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, alias = "data")]
    pub rows: Vec<serde_json::Value>,
    #[serde(default, alias = "total")]
    pub total_rows: Option<u64>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── Pipelines ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub source_connection_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub target_connection_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Pipeline lifecycle actions exposed as `POST /pipelines/{id}/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PipelineAction {
    Trigger,
    Pause,
    Stop,
}

/// Status change pushed by the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    #[serde(deserialize_with = "id_string", alias = "id")]
    pub pipeline_id: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "opt_lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ── Replication events ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventType {
    #[serde(alias = "INSERT")]
    Insert,
    #[serde(alias = "UPDATE")]
    Update,
    #[serde(alias = "DELETE")]
    Delete,
    #[serde(other)]
    Other,
}

/// One captured change flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationEvent {
    #[serde(deserialize_with = "id_string", alias = "event_id")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub pipeline_id: String,
    #[serde(alias = "table")]
    pub table_name: String,
    #[serde(alias = "operation")]
    pub event_type: EventType,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "latency")]
    pub latency_ms: Option<f64>,
    #[serde(default, alias = "error")]
    pub error_message: Option<String>,
    #[serde(alias = "created_at", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

// ── Monitoring metrics ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringMetric {
    #[serde(deserialize_with = "id_string")]
    pub pipeline_id: String,
    #[serde(alias = "created_at", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "throughput")]
    pub events_per_second: Option<f64>,
    #[serde(default, alias = "latency")]
    pub latency_ms: Option<f64>,
    #[serde(default, alias = "lag")]
    pub lag_seconds: Option<f64>,
    #[serde(default, alias = "errors")]
    pub error_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl MonitoringMetric {
    /// Identity of a metric sample: timestamp + pipeline.
    pub fn key(&self) -> String {
        format!("{}:{}", self.timestamp.timestamp_millis(), self.pipeline_id)
    }
}

// ── Query parameters ─────────────────────────────────────────────────

/// Paging and scope for event listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub pipeline_id: Option<String>,
    pub skip: u32,
    pub limit: u32,
}

impl EventQuery {
    pub fn new(skip: u32, limit: u32) -> Self {
        Self {
            pipeline_id: None,
            skip,
            limit,
        }
    }

    pub fn for_pipeline(pipeline_id: impl Into<String>, skip: u32, limit: u32) -> Self {
        Self {
            pipeline_id: Some(pipeline_id.into()),
            skip,
            limit,
        }
    }

    /// `{prefix}-{pipeline|all}-{skip}-{limit}`
    pub(crate) fn dedup_key(&self, prefix: &str) -> String {
        format!(
            "{prefix}-{}-{}-{}",
            self.pipeline_id.as_deref().unwrap_or("all"),
            self.skip,
            self.limit
        )
    }

    pub(crate) fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("skip".to_owned(), self.skip.to_string()),
            ("limit".to_owned(), self.limit.to_string()),
        ];
        if let Some(ref id) = self.pipeline_id {
            params.push(("pipeline_id".to_owned(), id.clone()));
        }
        params
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rest_and_push_event_shapes_match() {
        let rest = json!({
            "id": 42,
            "pipeline_id": 7,
            "table_name": "orders",
            "event_type": "insert",
            "status": "applied",
            "latency_ms": 12.5,
            "timestamp": "2026-10-01T12:00:00Z"
        });
        let push = json!({
            "event_id": "42",
            "pipeline_id": "7",
            "table": "orders",
            "operation": "INSERT",
            "status": "applied",
            "latency": 12.5,
            "created_at": "2026-10-01T12:00:00Z"
        });

        let a: ReplicationEvent = serde_json::from_value(rest).unwrap();
        let b: ReplicationEvent = serde_json::from_value(push).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.event_type, EventType::Insert);
    }

    #[test]
    fn unknown_event_type_maps_to_other() {
        let evt: ReplicationEvent = serde_json::from_value(json!({
            "id": "1",
            "pipeline_id": "p",
            "table_name": "t",
            "event_type": "truncate",
            "timestamp": "2026-10-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(evt.event_type, EventType::Other);
    }

    #[test]
    fn listing_accepts_array_and_page() {
        let bare: Listing<Connection> =
            serde_json::from_value(json!([{ "id": 1, "name": "pg" }])).unwrap();
        let page: Listing<Connection> = serde_json::from_value(
            json!({ "items": [{ "id": "1", "name": "pg" }], "total": 1 }),
        )
        .unwrap();
        assert_eq!(bare.into_vec(), page.into_vec());
    }

    #[test]
    fn metric_key_is_timestamp_and_pipeline() {
        let metric: MonitoringMetric = serde_json::from_value(json!({
            "pipeline_id": "p1",
            "timestamp": "2026-10-01T12:00:00Z",
            "throughput": 10.0
        }))
        .unwrap();
        assert_eq!(metric.key(), "1790856000000:p1");
        assert_eq!(metric.events_per_second, Some(10.0));
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let events: Listing<ReplicationEvent> = serde_json::from_value(json!([{
            "id": 1,
            "pipeline_id": 7,
            "table_name": "orders",
            "event_type": "update",
            "timestamp": "2026-10-01T12:00:00.123456"
        }]))
        .unwrap();
        let event = &events.into_vec()[0];
        assert_eq!(event.timestamp.to_rfc3339(), "2026-10-01T12:00:00.123456+00:00");

        let metric: MonitoringMetric = serde_json::from_value(json!({
            "pipeline_id": "p1",
            "created_at": "2026-10-01 12:00:00"
        }))
        .unwrap();
        assert_eq!(metric.key(), "1790856000000:p1");

        let status: PipelineStatus = serde_json::from_value(json!({
            "pipeline_id": "p1",
            "status": "running",
            "timestamp": "2026-10-01T12:00:00"
        }))
        .unwrap();
        assert!(status.timestamp.is_some());
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        assert!(parse_timestamp("yesterday").is_none());
        assert_eq!(
            parse_timestamp("2026-10-01T14:00:00+02:00"),
            parse_timestamp("2026-10-01T12:00:00")
        );
    }

    #[test]
    fn event_query_dedup_key_and_params() {
        let q = EventQuery::for_pipeline("p1", 0, 50);
        assert_eq!(q.dedup_key("events"), "events-p1-0-50");
        assert_eq!(EventQuery::new(10, 20).dedup_key("events"), "events-all-10-20");
        assert!(q.params().contains(&("pipeline_id".into(), "p1".into())));
    }
}
