//! End-to-end capture scenarios against the real router with an
//! in-memory database.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use hmac::{Hmac, Mac};
use hookline_relay_db::entities::{endpoint, endpoint_settings, request};
use hookline_server::config::Config;
use hookline_server::{build_router, AppState};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

async fn test_app(max_body_size: usize) -> (Arc<AppState>, Router) {
    let db = hookline_relay_db::connect("sqlite::memory:")
        .await
        .expect("connect");
    hookline_relay_db::migrate(&db).await.expect("migrate");

    let mut config = Config::from_env();
    config.max_body_size = max_body_size;
    config.base_url = "http://localhost:8080".to_string();

    let state = Arc::new(AppState::new(db, config));
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

fn capture_request(slug: &str, body: impl Into<Body>) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(format!("/e/{slug}"))
        .header("content-type", "application/json")
        .body(body.into())
        .expect("request");
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4321))));
    request
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, body.to_vec())
}

#[tokio::test]
async fn test_basic_capture_persists_the_request() {
    let (state, router) = test_app(1024).await;
    let endpoint_id = insert_endpoint(&state, "fh_abc12345").await;

    let mut subscriber = state.events.subscribe("fh_abc12345");

    let (status, body) = send(&router, capture_request("fh_abc12345", r#"{"v":1}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.endpoint_id, endpoint_id);
    assert_eq!(row.method, "POST");
    assert_eq!(row.path.as_deref(), Some("/e/fh_abc12345"));
    assert_eq!(row.body.as_deref(), Some(r#"{"v":1}"#));
    assert_eq!(row.body_size, 7);
    assert_eq!(row.content_type.as_deref(), Some("application/json"));
    assert_eq!(row.ip.as_deref(), Some("127.0.0.1"));

    // The publish happens after the commit; the subscriber sees the row's id.
    let event = tokio::time::timeout(std::time::Duration::from_secs(1), subscriber.recv())
        .await
        .expect("event within a second")
        .expect("event");
    assert_eq!(event.id, row.id);
    assert_eq!(event.method, "POST");
}

#[tokio::test]
async fn test_unknown_slug_is_not_found() {
    let (state, router) = test_app(1024).await;

    let (status, _) = send(&router, capture_request("fh_missing0", "x")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_body_size_boundary() {
    let (state, router) = test_app(16).await;
    insert_endpoint(&state, "fh_sizebnd1").await;

    // Exactly at the ceiling: admitted.
    let (status, _) = send(&router, capture_request("fh_sizebnd1", vec![b'a'; 16])).await;
    assert_eq!(status, StatusCode::OK);

    // One byte over: rejected, no row.
    let (status, _) = send(&router, capture_request("fh_sizebnd1", vec![b'a'; 17])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].body_size, 16);
}

#[tokio::test]
async fn test_rate_limit_breach_returns_429() {
    let (state, router) = test_app(1024).await;
    let endpoint_id = insert_endpoint(&state, "fh_ratelim1").await;
    endpoint_settings::ActiveModel {
        endpoint_id: Set(endpoint_id),
        hmac_secret: Set(None),
        hmac_algorithm: Set("sha256".to_string()),
        rate_limit_per_minute: Set(Some(3)),
        rate_limit_per_hour: Set(None),
        rate_limit_per_day: Set(None),
        updated_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .expect("insert settings");

    for _ in 0..3 {
        let (status, _) = send(&router, capture_request("fh_ratelim1", "{}")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&router, capture_request("fh_ratelim1", "{}")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_hmac_signature_verification() {
    let (state, router) = test_app(1024).await;
    let endpoint_id = insert_endpoint(&state, "fh_signed01").await;
    endpoint_settings::ActiveModel {
        endpoint_id: Set(endpoint_id),
        hmac_secret: Set(Some("s3cr".to_string())),
        hmac_algorithm: Set("sha256".to_string()),
        rate_limit_per_minute: Set(None),
        rate_limit_per_hour: Set(None),
        rate_limit_per_day: Set(None),
        updated_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .expect("insert settings");

    let body = r#"{"v":1}"#;
    let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cr").expect("mac");
    mac.update(body.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());

    // Happy path.
    let mut request = capture_request("fh_signed01", body);
    request
        .headers_mut()
        .insert("x-signature", format!("sha256={digest}").parse().unwrap());
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    // Tampered body with the same signature: rejected, nothing persisted.
    let mut request = capture_request("fh_signed01", r#"{"v":2}"#);
    request
        .headers_mut()
        .insert("x-signature", format!("sha256={digest}").parse().unwrap());
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Missing signature header: also rejected.
    let (status, _) = send(&router, capture_request("fh_signed01", body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].body.as_deref(), Some(body));
}

#[tokio::test]
async fn test_binary_body_is_stored_base64_marked() {
    let (state, router) = test_app(1024).await;
    insert_endpoint(&state, "fh_binary02").await;

    let payload = vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x9c];
    let (status, _) = send(&router, capture_request("fh_binary02", payload.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    let stored = rows[0].body.as_deref().expect("body stored");
    assert!(hookline_relay_db::body::is_binary(stored));
    assert_eq!(hookline_relay_db::body::decode_body(stored), payload);
    assert_eq!(rows[0].body_size, payload.len() as i64);
}

#[tokio::test]
async fn test_headers_and_query_params_are_structured() {
    let (state, router) = test_app(1024).await;
    insert_endpoint(&state, "fh_shape001").await;

    let mut request = Request::builder()
        .method("PUT")
        .uri("/e/fh_shape001?tag=a&tag=b&source=ci")
        .header("content-type", "application/json")
        .header("x-custom", "custom-value")
        .body(Body::from("{}"))
        .expect("request");
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4321))));

    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    let row = &rows[0];
    assert_eq!(row.method, "PUT");
    assert_eq!(row.query_params, json!({"tag": ["a", "b"], "source": "ci"}));
    assert_eq!(
        row.headers.get("x-custom"),
        Some(&Value::String("custom-value".to_string()))
    );
}

#[tokio::test]
async fn test_forwarded_for_header_sets_source_ip() {
    let (state, router) = test_app(1024).await;
    insert_endpoint(&state, "fh_fwdfor01").await;

    let mut request = capture_request("fh_fwdfor01", "{}");
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    assert_eq!(rows[0].ip.as_deref(), Some("203.0.113.7"));
}

#[tokio::test]
async fn test_settings_secret_is_masked_on_read() {
    let (state, router) = test_app(1024).await;
    let endpoint_id = insert_endpoint(&state, "fh_masked01").await;

    let request = Request::builder()
        .method("PUT")
        .uri("/api/v1/endpoints/fh_masked01/settings")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"hmac_secret":"s3cr","hmac_algorithm":"sha256"}"#,
        ))
        .expect("request");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    // Neither the update echo nor a later read ever carries the secret.
    let updated: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(updated["hmac_secret"], json!("***"));

    let request = Request::builder()
        .uri("/api/v1/endpoints/fh_masked01/settings")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(fetched["hmac_secret"], json!("***"));

    // The stored row keeps the real value; signed captures verify against it.
    let stored = endpoint_settings::Entity::find_by_id(endpoint_id)
        .one(&state.db)
        .await
        .expect("query")
        .expect("settings row");
    assert_eq!(stored.hmac_secret.as_deref(), Some("s3cr"));

    let payload = r#"{"v":1}"#;
    let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cr").expect("mac");
    mac.update(payload.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());

    let mut request = capture_request("fh_masked01", payload);
    request
        .headers_mut()
        .insert("x-signature", format!("sha256={digest}").parse().unwrap());
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_endpoint_lifecycle() {
    let (state, router) = test_app(1024).await;

    // Create through the admin API.
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/endpoints")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"name":"orders"}"#))
        .expect("request");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    let created: Value = serde_json::from_slice(&body).expect("json");
    let slug = created["slug"].as_str().expect("slug").to_string();
    assert!(slug.starts_with("fh_"));
    assert_eq!(slug.len(), 11);
    assert_eq!(
        created["url"].as_str().expect("url"),
        format!("http://localhost:8080/e/{slug}")
    );

    // Capture against it, then list through the admin API.
    let (status, _) = send(&router, capture_request(&slug, r#"{"n":1}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri(format!("/api/v1/endpoints/{slug}/requests"))
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    let list: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(list["total"], json!(1));
    assert_eq!(list["requests"][0]["body"], json!(r#"{"n":1}"#));

    // Delete cascades.
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/endpoints/{slug}"))
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let rows = request::Entity::find().all(&state.db).await.expect("query");
    assert!(rows.is_empty());
}
