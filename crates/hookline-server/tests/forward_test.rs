//! Forwarding and replay scenarios against a live target server.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Request as AxumRequest, State};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use hookline_relay_db::entities::{endpoint, forward_attempt, forwarding_rule, replay, transformation};
use hookline_server::config::Config;
use hookline_server::{build_router, AppState};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Hit {
    at: Instant,
    method: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

#[derive(Clone)]
struct TargetState {
    statuses: Arc<Mutex<VecDeque<u16>>>,
    hits: Arc<Mutex<Vec<Hit>>>,
}

async fn target_handler(State(state): State<TargetState>, request: AxumRequest) -> StatusCode {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    state.hits.lock().unwrap().push(Hit {
        at: Instant::now(),
        method: parts.method.to_string(),
        headers,
        body: body.to_vec(),
    });

    let status = state.statuses.lock().unwrap().pop_front().unwrap_or(200);
    StatusCode::from_u16(status).unwrap_or(StatusCode::OK)
}

/// Spawn a scripted downstream server on an ephemeral port. Each request
/// consumes the next status; the script exhausted means 200.
async fn spawn_target(statuses: &[u16]) -> (String, TargetState) {
    let state = TargetState {
        statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())),
        hits: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .fallback(target_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind target");
    let addr = listener.local_addr().expect("target addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}/hook"), state)
}

async fn test_app() -> (Arc<AppState>, Router) {
    let db = hookline_relay_db::connect("sqlite::memory:")
        .await
        .expect("connect");
    hookline_relay_db::migrate(&db).await.expect("migrate");

    let state = Arc::new(AppState::new(db, Config::from_env()));
    let router = build_router(Arc::clone(&state));
    (state, router)
}

async fn insert_endpoint(state: &AppState, slug: &str) -> Uuid {
    let id = Uuid::new_v4();
    endpoint::ActiveModel {
        id: Set(id),
        slug: Set(slug.to_string()),
        name: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .expect("insert endpoint");
    id
}

#[allow(clippy::too_many_arguments)]
async fn insert_rule(
    state: &AppState,
    endpoint_id: Uuid,
    target_url: &str,
    method: Option<&str>,
    headers: Value,
    enabled: bool,
    max_retries: i32,
    condition: Option<(&str, Value)>,
) -> Uuid {
    let id = Uuid::new_v4();
    let (condition_type, condition_config) = match condition {
        Some((kind, config)) => (Some(kind.to_string()), Some(config)),
        None => (None, None),
    };
    forwarding_rule::ActiveModel {
        id: Set(id),
        endpoint_id: Set(endpoint_id),
        target_url: Set(target_url.to_string()),
        method: Set(method.map(str::to_string)),
        headers: Set(headers),
        enabled: Set(enabled),
        max_retries: Set(max_retries),
        backoff_config: Set(json!({"type": "linear", "min_ms": 10, "max_ms": 100})),
        condition_type: Set(condition_type),
        condition_config: Set(condition_config),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .expect("insert rule");
    id
}

fn capture_request(slug: &str, body: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(format!("/e/{slug}"))
        .header("content-type", "application/json")
        .header("x-event", "push")
        .body(Body::from(body.to_string()))
        .expect("request");
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4321))));
    request
}

async fn capture(router: &Router, slug: &str, body: &str) {
    let response = router
        .clone()
        .oneshot(capture_request(slug, body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

async fn attempts_for(state: &AppState, rule_id: Uuid) -> Vec<forward_attempt::Model> {
    forward_attempt::Entity::find()
        .filter(forward_attempt::Column::ForwardingRuleId.eq(rule_id))
        .order_by_asc(forward_attempt::Column::AttemptNumber)
        .all(&state.db)
        .await
        .expect("query attempts")
}

/// Poll until the predicate yields a value or five seconds elapse.
async fn wait_for<T, F, Fut>(mut probe: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for _ in 0..100 {
        if let Some(value) = probe().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within timeout");
}

#[tokio::test]
async fn test_forwarding_retries_until_success() {
    let (state, router) = test_app().await;
    let (target_url, target) = spawn_target(&[500, 500, 200]).await;

    let endpoint_id = insert_endpoint(&state, "fh_retry001").await;
    let rule_id = insert_rule(&state, endpoint_id, &target_url, None, json!({}), true, 3, None).await;

    capture(&router, "fh_retry001", r#"{"v":1}"#).await;

    let attempts = wait_for(|| async {
        let attempts = attempts_for(&state, rule_id).await;
        (attempts.len() == 3).then_some(attempts)
    })
    .await;

    let numbers: Vec<i32> = attempts.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let statuses: Vec<&str> = attempts.iter().map(|a| a.status.as_str()).collect();
    assert_eq!(statuses, vec!["failed", "failed", "success"]);
    let response_statuses: Vec<Option<i32>> =
        attempts.iter().map(|a| a.response_status).collect();
    assert_eq!(response_statuses, vec![Some(500), Some(500), Some(200)]);

    // Linear backoff with min_ms=10: the gaps are at least 10ms and 20ms.
    let hits = target.hits.lock().unwrap().clone();
    assert_eq!(hits.len(), 3);
    assert!(hits[1].at.duration_since(hits[0].at) >= Duration::from_millis(10));
    assert!(hits[2].at.duration_since(hits[1].at) >= Duration::from_millis(20));

    // Settled: no further attempts after success.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(attempts_for(&state, rule_id).await.len(), 3);
}

#[tokio::test]
async fn test_retries_exhaust_and_stop() {
    let (state, router) = test_app().await;
    let (target_url, target) = spawn_target(&[500, 500, 500]).await;

    let endpoint_id = insert_endpoint(&state, "fh_retry002").await;
    let rule_id = insert_rule(&state, endpoint_id, &target_url, None, json!({}), true, 2, None).await;

    capture(&router, "fh_retry002", "{}").await;

    let attempts = wait_for(|| async {
        let attempts = attempts_for(&state, rule_id).await;
        (attempts.len() == 2).then_some(attempts)
    })
    .await;

    assert_eq!(attempts.last().unwrap().status, "failed");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(attempts_for(&state, rule_id).await.len(), 2);
    assert_eq!(target.hits.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_max_retries_one_means_single_attempt() {
    let (state, router) = test_app().await;
    let (target_url, target) = spawn_target(&[500]).await;

    let endpoint_id = insert_endpoint(&state, "fh_retry003").await;
    let rule_id = insert_rule(&state, endpoint_id, &target_url, None, json!({}), true, 1, None).await;

    capture(&router, "fh_retry003", "{}").await;

    let attempts = wait_for(|| async {
        let attempts = attempts_for(&state, rule_id).await;
        (!attempts.is_empty()).then_some(attempts)
    })
    .await;
    assert_eq!(attempts.len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(attempts_for(&state, rule_id).await.len(), 1);
    assert_eq!(target.hits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_conditions_select_rules() {
    let (state, router) = test_app().await;
    let (matching_url, matching_target) = spawn_target(&[200]).await;
    let (other_url, other_target) = spawn_target(&[200]).await;

    let endpoint_id = insert_endpoint(&state, "fh_conds001").await;
    let matching_rule = insert_rule(
        &state,
        endpoint_id,
        &matching_url,
        None,
        json!({}),
        true,
        1,
        Some(("header_match", json!({"header": "x-event", "value": "push"}))),
    )
    .await;
    insert_rule(
        &state,
        endpoint_id,
        &other_url,
        None,
        json!({}),
        true,
        1,
        Some(("header_match", json!({"header": "x-event", "value": "release"}))),
    )
    .await;
    insert_rule(
        &state,
        endpoint_id,
        &other_url,
        None,
        json!({}),
        false,
        1,
        None,
    )
    .await;

    capture(&router, "fh_conds001", r#"{"v":1}"#).await;

    wait_for(|| async {
        let attempts = attempts_for(&state, matching_rule).await;
        (!attempts.is_empty()).then_some(())
    })
    .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(matching_target.hits.lock().unwrap().len(), 1);
    // Non-matching condition and disabled rule both stay quiet.
    assert!(other_target.hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_body_match_condition() {
    let (state, router) = test_app().await;
    let (target_url, target) = spawn_target(&[200]).await;

    let endpoint_id = insert_endpoint(&state, "fh_conds002").await;
    let rule_id = insert_rule(
        &state,
        endpoint_id,
        &target_url,
        None,
        json!({}),
        true,
        1,
        Some(("body_match", json!({"pattern": "\"type\":\"order\""}))),
    )
    .await;

    // Non-matching body: nothing fires.
    capture(&router, "fh_conds002", r#"{"type":"refund"}"#).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(attempts_for(&state, rule_id).await.is_empty());

    // Matching body: one delivery.
    capture(&router, "fh_conds002", r#"{"type":"order","id":9}"#).await;
    wait_for(|| async {
        (!attempts_for(&state, rule_id).await.is_empty()).then_some(())
    })
    .await;
    assert_eq!(target.hits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transformations_and_rule_headers_shape_the_outbound_request() {
    let (state, router) = test_app().await;
    let (target_url, target) = spawn_target(&[200]).await;

    let endpoint_id = insert_endpoint(&state, "fh_xform001").await;
    transformation::ActiveModel {
        id: Set(Uuid::new_v4()),
        endpoint_id: Set(endpoint_id),
        name: Set("wrap".to_string()),
        dialect: Set("script".to_string()),
        script: Set("#{wrapped: input}".to_string()),
        apply_to: Set("request".to_string()),
        enabled: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .expect("insert transformation");

    insert_rule(
        &state,
        endpoint_id,
        &target_url,
        Some("PUT"),
        json!({"x-relay": "hookline"}),
        true,
        1,
        None,
    )
    .await;

    capture(&router, "fh_xform001", r#"{"v":1}"#).await;

    let hit = wait_for(|| async {
        target.hits.lock().unwrap().first().cloned()
    })
    .await;

    // Method override, transformed body, rule header overlay.
    assert_eq!(hit.method, "PUT");
    let body: Value = serde_json::from_slice(&hit.body).expect("json body");
    assert_eq!(body, json!({"wrapped": {"v": 1}}));
    assert!(hit
        .headers
        .iter()
        .any(|(name, value)| name == "x-relay" && value == "hookline"));
}

#[tokio::test]
async fn test_replay_with_method_override() {
    let (state, router) = test_app().await;
    let (target_url, target) = spawn_target(&[204]).await;

    insert_endpoint(&state, "fh_replay02").await;
    capture(&router, "fh_replay02", r#"{"v":1}"#).await;

    let request_row = hookline_relay_db::entities::request::Entity::find()
        .one(&state.db)
        .await
        .expect("query")
        .expect("request row");
    assert_eq!(request_row.method, "POST");

    let replay_body = json!({"target_url": target_url, "method": "PUT"}).to_string();
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/requests/{}/replay", request_row.id))
                .header("content-type", "application/json")
                .body(Body::from(replay_body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let created: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(created["status"], json!("pending"));
    let replay_id: Uuid = created["replay_id"]
        .as_str()
        .expect("replay id")
        .parse()
        .expect("uuid");

    let row = wait_for(|| async {
        replay::Entity::find_by_id(replay_id)
            .one(&state.db)
            .await
            .expect("query")
            .filter(|r| r.status != "pending")
    })
    .await;

    assert_eq!(row.status, "success");
    assert_eq!(row.attempts, 1);
    assert_eq!(row.response_status, Some(204));
    assert!(row.last_attempt_at.is_some());

    let hits = target.hits.lock().unwrap().clone();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].method, "PUT");
}

#[tokio::test]
async fn test_replay_failure_is_terminal_failed() {
    let (state, router) = test_app().await;
    let (target_url, _target) = spawn_target(&[500]).await;

    insert_endpoint(&state, "fh_replay03").await;
    capture(&router, "fh_replay03", "{}").await;

    let request_row = hookline_relay_db::entities::request::Entity::find()
        .one(&state.db)
        .await
        .expect("query")
        .expect("request row");

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/requests/{}/replay", request_row.id))
                .header("content-type", "application/json")
                .body(Body::from(json!({"target_url": target_url}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let row = wait_for(|| async {
        replay::Entity::find()
            .filter(replay::Column::RequestId.eq(request_row.id))
            .one(&state.db)
            .await
            .expect("query")
            .filter(|r| r.status != "pending")
    })
    .await;

    assert_eq!(row.status, "failed");
    assert_eq!(row.response_status, Some(500));
    assert_eq!(row.attempts, 1);
}
