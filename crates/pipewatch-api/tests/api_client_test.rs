#![allow(clippy::unwrap_used)]
// Integration tests for `ApiClient` using wiremock.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pipewatch_api::{
    ApiClient, Error, ErrorKind, EventQuery, MemoryTokenStore, RetryPolicy, SessionSignal,
    StoredSession, TimeoutPolicy, TokenStore, Transport,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        step: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    }
}

fn client_for(base: &str, store: Arc<MemoryTokenStore>, timeouts: TimeoutPolicy) -> ApiClient {
    let base_url = Url::parse(base).unwrap();
    let transport = Transport::with_client(reqwest::Client::new(), &base_url, store);
    ApiClient::new(Arc::new(transport), fast_retry(), timeouts)
}

async fn setup() -> (MockServer, ApiClient, Arc<MemoryTokenStore>) {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let client = client_for(&server.uri(), Arc::clone(&store), TimeoutPolicy::default());
    (server, client, store)
}

fn connection_json(id: u32, name: &str) -> serde_json::Value {
    json!({ "id": id, "name": name, "source_type": "postgresql", "host": "db", "port": 5432 })
}

// ── Deduplication ───────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_identical_listings_share_one_call() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .and(query_param("skip", "0"))
        .and(query_param("limit", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([connection_json(1, "orders-db")]))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let first = client.list_connections(0, 100);
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.list_connections(0, 100).await
    };
    let (a, b) = tokio::join!(first, second);

    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a[0].name, "orders-db");
    assert_eq!(client.orchestrator().pending_count(), 0);
}

#[tokio::test]
async fn test_different_pages_are_not_deduplicated() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "items": [connection_json(1, "a")], "total": 1 }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let (a, b) = tokio::join!(client.list_connections(0, 10), client.list_connections(10, 10));
    assert_eq!(a.unwrap().len(), 1);
    assert_eq!(b.unwrap().len(), 1);
}

// ── Classification ──────────────────────────────────────────────────

#[tokio::test]
async fn test_validation_error_lists_fields() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [{ "loc": ["body", "limit"], "msg": "must be >= 1" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.list_events(&EventQuery::new(0, 0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.to_string(), "body.limit: must be >= 1");
    let Error::Validation { fields, .. } = err else {
        panic!("expected validation error");
    };
    assert_eq!(fields[0].location, "body.limit");
}

#[tokio::test]
async fn test_server_error_mentioning_listener_gets_checklist() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/connections/c1/test"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "detail": "ORA-12541: TNS:no listener"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.test_connection("c1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.status(), Some(500));
    let detail = err.detail();
    assert!(detail.starts_with("ORA-12541: TNS:no listener"));
    assert!(detail.contains("Troubleshooting checklist"), "{detail}");
}

#[tokio::test]
async fn test_plain_server_error_has_no_checklist() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/pipelines/p1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.get_pipeline("p1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.detail(), "upstream unavailable");
}

#[tokio::test]
async fn test_empty_success_bodies_are_empty_response() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pipelines/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.health().await.unwrap_err();
    assert_eq!(err, Error::EmptyResponse { status: 200 });

    let err = client.get_pipeline("p1").await.unwrap_err();
    assert_eq!(err, Error::EmptyResponse { status: 200 });
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/connections/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "detail": "Connection not found" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client.get_connection("missing").await.unwrap_err();
    assert_eq!(
        err,
        Error::Client {
            status: 404,
            detail: "Connection not found".into()
        }
    );
}

// ── Timeouts & retries ──────────────────────────────────────────────

#[tokio::test]
async fn test_slow_listing_times_out_without_retry() {
    let server = MockServer::start().await;
    let timeouts = TimeoutPolicy {
        list: Duration::from_millis(200),
        ..TimeoutPolicy::default()
    };
    let client = client_for(&server.uri(), Arc::new(MemoryTokenStore::new()), timeouts);

    Mock::given(method("GET"))
        .and(path("/pipelines"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client.list_pipelines(0, 50).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(!err.response_received());
    assert!(err.to_string().contains("timed out after 0.2s"), "{err}");
}

#[tokio::test]
async fn test_refused_connection_is_network_unreachable() {
    // Nothing listens on the discard port.
    let client = client_for(
        "http://127.0.0.1:9",
        Arc::new(MemoryTokenStore::new()),
        TimeoutPolicy::default(),
    );

    let err = client.health().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkUnreachable);
    assert!(!err.response_received());
    assert!(err.is_retryable());
}

// ── Auth ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_stores_token_and_sends_bearer() {
    let (server, client, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok123",
            "token_type": "bearer",
            "user": { "id": 1, "username": "alice", "role": "admin" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pipelines"))
        .and(header("authorization", "Bearer tok123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 7, "name": "orders", "status": "running", "source_connection_id": 1 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let secret = SecretString::from("pw".to_owned());
    let user = client.login("alice", &secret).await.unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.id.as_deref(), Some("1"));
    assert!(store.load().is_some());

    let pipelines = client.list_pipelines(0, 100).await.unwrap();
    assert_eq!(pipelines[0].id, "7");
    assert_eq!(pipelines[0].source_connection_id.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_login_without_profile_fetches_me() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "username": "bob", "email": "b@x" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let secret = SecretString::from("pw".to_owned());
    let user = client.login("bob", &secret).await.unwrap().unwrap();
    assert_eq!(user.email.as_deref(), Some("b@x"));
    assert_eq!(client.transport().user().unwrap().username, "bob");
}

#[tokio::test]
async fn test_unauthorized_clears_session_and_signals() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::with_session(StoredSession::new(
        SecretString::from("stale".to_owned()),
        None,
    )));
    let client = client_for(&server.uri(), Arc::clone(&store), TimeoutPolicy::default());
    let mut signals = client.session_signals();

    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Not authenticated" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client.list_connections(0, 100).await.unwrap_err();

    assert!(err.is_auth_failure());
    assert!(store.load().is_none());
    assert!(!client.transport().is_authenticated());
    assert_eq!(
        signals.recv().await.unwrap(),
        SessionSignal::LoginRequired { status: 401 }
    );
}

#[tokio::test]
async fn test_logout_clears_even_when_server_fails() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::with_session(StoredSession::new(
        SecretString::from("tok".to_owned()),
        None,
    )));
    let client = client_for(&server.uri(), Arc::clone(&store), TimeoutPolicy::default());

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    client.logout().await;
    assert!(store.load().is_none());
}

// ── Resources ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_events_for_pipeline() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param("pipeline_id", "p1"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 2,
                "pipeline_id": "p1",
                "table_name": "orders",
                "event_type": "insert",
                "status": "applied",
                "latency_ms": 4.0,
                "timestamp": "2026-10-01T12:00:01Z"
            },
            {
                "id": 1,
                "pipeline_id": "p1",
                "table_name": "orders",
                "event_type": "delete",
                "status": "failed",
                "error_message": "constraint violation",
                "timestamp": "2026-10-01T12:00:00Z"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let events = client
        .list_events(&EventQuery::for_pipeline("p1", 0, 50))
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].error_message.as_deref(), Some("constraint violation"));
}

#[tokio::test]
async fn test_pipeline_action_accepts_no_content() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/pipelines/p1/pause"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.pause_pipeline("p1").await.unwrap();
}

#[tokio::test]
async fn test_list_tables_accepts_names_and_objects() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/connections/c1/tables"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!(["orders", { "table_name": "items" }])),
        )
        .mount(&server)
        .await;

    let tables = client.list_tables("c1").await.unwrap();
    assert_eq!(tables, vec!["orders".to_owned(), "items".to_owned()]);
}

#[tokio::test]
async fn test_preview_fires_health_check() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/connections/c1/preview"))
        .and(query_param("table", "orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": ["id", "total"],
            "rows": [[1, 9.5]],
            "total_rows": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let preview = client
        .preview_table("c1", "orders", Some("oracle"), 10)
        .await
        .unwrap();
    assert_eq!(preview.columns, vec!["id".to_owned(), "total".to_owned()]);

    // The check runs detached; give it a moment to land.
    let mut checked = false;
    for _ in 0..50 {
        let requests = server.received_requests().await.unwrap();
        if requests.iter().any(|r| r.url.path() == "/health") {
            checked = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(checked, "health check never reached the server");
}

#[tokio::test]
async fn test_preview_succeeds_when_health_check_fails() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/connections/c1/preview"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "columns": ["id"], "rows": [] })),
        )
        .mount(&server)
        .await;

    let preview = client.preview_table("c1", "t", None, 5).await.unwrap();
    assert!(preview.rows.is_empty());
}
