#![allow(clippy::unwrap_used)]
// Integration tests for `Dashboard` against a wiremock backend.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pipewatch_api::{MemoryTokenStore, RetryPolicy, StoredSession, TokenStore};
use pipewatch_core::{
    ClientConfig, CoreError, Dashboard, PushMessage, ReplicationEvent, ScopeRefreshPolicy,
};

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

fn config_for(server: &MockServer, scope_refresh: ScopeRefreshPolicy) -> ClientConfig {
    let mut config = ClientConfig::new(Url::parse(&server.uri()).unwrap());
    config.channel.enabled = false;
    config.store.scope_refresh = scope_refresh;
    config.retry = RetryPolicy {
        step: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    };
    config
}

fn logged_in() -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_session(StoredSession::new(
        SecretString::from("tok-1".to_owned()),
        None,
    )))
}

fn event_json(id: &str, pipeline: &str) -> serde_json::Value {
    json!({
        "id": id,
        "pipeline_id": pipeline,
        "table_name": "orders",
        "event_type": "update",
        "timestamp": "2026-10-01T12:00:00Z"
    })
}

fn pushed_event(id: &str, pipeline: &str) -> PushMessage {
    let event: ReplicationEvent = serde_json::from_value(event_json(id, pipeline)).unwrap();
    PushMessage::ReplicationEvent(event)
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

// ── Scope refresh ───────────────────────────────────────────────────

#[tokio::test]
async fn test_push_triggers_scope_refresh_of_selected_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param("pipeline_id", "p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            event_json("e2", "p1"),
            event_json("e1", "p1"),
        ])))
        .mount(&server)
        .await;

    let dashboard =
        Dashboard::new(config_for(&server, ScopeRefreshPolicy::PerEvent), logged_in()).unwrap();
    dashboard.start().await.unwrap();
    dashboard.watch_pipeline("p1").await;

    dashboard.handle_push(&pushed_event("e2", "p1"));
    assert!(dashboard.store().has_event("e2"));

    let store = Arc::clone(dashboard.store());
    wait_until(|| store.event_count() == 2).await;
    let ids: Vec<String> = store.events_snapshot().iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec!["e2", "e1"]);
    assert!(store.last_refresh().is_some());

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_coalesced_policy_refreshes_once_per_burst() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let policy = ScopeRefreshPolicy::Coalesced(Duration::from_millis(200));
    let dashboard = Dashboard::new(config_for(&server, policy), logged_in()).unwrap();
    dashboard.start().await.unwrap();

    for i in 0..5 {
        dashboard.handle_push(&pushed_event(&format!("e{i}"), "p1"));
    }
    // The refresh replaces the five pushed events with the empty listing.
    let store = Arc::clone(dashboard.store());
    wait_until(|| store.last_refresh().is_some()).await;
    assert_eq!(store.event_count(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    dashboard.shutdown().await;
    server.verify().await;
}

#[tokio::test]
async fn test_full_refresh_fills_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": 3, "name": "warehouse", "source_type": "oracle" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pipelines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 10, "name": "orders-sync", "status": "running" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([event_json("e1", "10")])))
        .mount(&server)
        .await;

    let dashboard =
        Dashboard::new(config_for(&server, ScopeRefreshPolicy::PerEvent), logged_in()).unwrap();
    dashboard.full_refresh().await.unwrap();

    let store = dashboard.store();
    assert_eq!(store.connection_by_id("3").unwrap().name, "warehouse");
    assert_eq!(
        store.pipeline_by_id("10").unwrap().status.as_deref(),
        Some("running")
    );
    assert_eq!(store.events_for("10").len(), 1);
}

// ── Session ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_expired_session_surfaces_as_core_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pipelines"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "expired" })))
        .mount(&server)
        .await;

    let tokens = logged_in();
    let dashboard = Dashboard::new(
        config_for(&server, ScopeRefreshPolicy::PerEvent),
        Arc::clone(&tokens) as Arc<dyn TokenStore>,
    )
    .unwrap();
    let mut signals = dashboard.session_signals();

    let err = dashboard.refresh_pipelines().await.unwrap_err();
    assert!(matches!(err, CoreError::SessionExpired { .. }), "{err:?}");
    assert!(!dashboard.is_authenticated());
    assert!(tokens.load().is_none());
    assert!(signals.try_recv().is_ok());
}

#[tokio::test]
async fn test_bad_credentials_stay_a_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    let tokens = logged_in();
    let dashboard = Dashboard::new(
        config_for(&server, ScopeRefreshPolicy::PerEvent),
        Arc::clone(&tokens) as Arc<dyn TokenStore>,
    )
    .unwrap();
    let mut signals = dashboard.session_signals();
    let err = dashboard
        .login("ada", &SecretString::from("wrong".to_owned()))
        .await
        .unwrap_err();
    let api = err.api_error().unwrap();
    assert_eq!(api.status(), Some(401));
    assert!(api.detail().contains("Invalid credentials"));

    // The session that was already stored survives a failed re-login.
    assert!(tokens.load().is_some());
    assert!(dashboard.is_authenticated());
    assert!(signals.try_recv().is_err());
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_after_shutdown_is_rejected() {
    let server = MockServer::start().await;
    let dashboard =
        Dashboard::new(config_for(&server, ScopeRefreshPolicy::PerEvent), logged_in()).unwrap();
    dashboard.start().await.unwrap();
    dashboard.start().await.unwrap();
    dashboard.shutdown().await;

    assert!(matches!(dashboard.start().await, Err(CoreError::Disconnected)));
}

#[tokio::test]
async fn test_blank_selection_clears_scope() {
    let server = MockServer::start().await;
    let dashboard =
        Dashboard::new(config_for(&server, ScopeRefreshPolicy::PerEvent), logged_in()).unwrap();

    dashboard.select_pipeline(Some("p4".into()));
    dashboard.select_pipeline(Some("  ".into()));
    assert_eq!(dashboard.selected_pipeline(), None);

    dashboard.watch_pipeline("p4").await;
    dashboard.unwatch_pipeline("p4").await;
    assert_eq!(dashboard.selected_pipeline(), None);
}
