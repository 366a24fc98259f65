//! hookline: webhook capture, transformation and forwarding service.
//!
//! The capture surface (`ANY /e/{slug}`) persists every admitted request,
//! publishes it to SSE subscribers and fans it out to matching forwarding
//! rules on background tasks. The admin API under `/api/v1` manages
//! endpoints, rules, transformations, settings and retention, and exposes
//! captured traffic, attempts and replays.

pub mod config;
pub mod events;
pub mod forward;
pub mod handlers;
pub mod headers;
pub mod models;
pub mod rate_limit;
pub mod retention;
pub mod signature;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use sea_orm::DatabaseConnection;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

use crate::config::Config;
use crate::events::EventBus;
use crate::rate_limit::RateLimiter;

/// Application state shared across handlers
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub rate_limiter: RateLimiter,
    pub events: EventBus,
    /// Shared outbound client; timeouts are applied per request
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        Self {
            db,
            config,
            rate_limiter: RateLimiter::new(),
            events: EventBus::new(),
            http: reqwest::Client::new(),
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "hookline API",
        version = "0.1.0",
        description = "Webhook capture, transformation and forwarding"
    ),
    paths(
        handlers::endpoints::create_endpoint,
        handlers::endpoints::list_endpoints,
        handlers::endpoints::get_endpoint,
        handlers::endpoints::delete_endpoint,
        handlers::requests::list_requests,
        handlers::requests::get_request,
        handlers::requests::list_forward_attempts,
        handlers::requests::list_replays,
        handlers::replay::replay_request,
        handlers::rules::create_rule,
        handlers::rules::list_rules,
        handlers::rules::update_rule,
        handlers::rules::delete_rule,
        handlers::transformations::create_transformation,
        handlers::transformations::list_transformations,
        handlers::transformations::update_transformation,
        handlers::transformations::delete_transformation,
        handlers::transformations::test_transformation,
        handlers::settings::get_settings,
        handlers::settings::update_settings,
        handlers::retention::get_retention,
        handlers::retention::update_retention,
        handlers::health::health_check,
        handlers::health::ready_check,
    ),
    components(
        schemas(
            models::ErrorResponse,
            models::CreateEndpointRequest,
            models::Endpoint,
            models::CapturedRequest,
            models::RequestList,
            models::ForwardingRule,
            models::CreateForwardingRuleRequest,
            models::UpdateForwardingRuleRequest,
            models::ForwardAttempt,
            models::Transformation,
            models::CreateTransformationRequest,
            models::UpdateTransformationRequest,
            models::TestTransformationRequest,
            models::TestTransformationResponse,
            models::EndpointSettings,
            models::UpdateEndpointSettingsRequest,
            models::RetentionPolicy,
            models::UpdateRetentionPolicyRequest,
            models::CreateReplayRequest,
            models::CreateReplayResponse,
            models::Replay,
            models::HealthResponse,
            models::ReadyResponse,
        )
    ),
    tags(
        (name = "endpoints", description = "Capture endpoint management"),
        (name = "traffic", description = "Captured traffic inspection and replay"),
        (name = "forwarding", description = "Forwarding rule management"),
        (name = "transformations", description = "Transformation management"),
        (name = "settings", description = "Endpoint admission settings"),
        (name = "retention", description = "Request retention policies"),
        (name = "system", description = "Health and readiness")
    )
)]
struct ApiDoc;

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    let allowed_origins = state.config.allowed_origins.clone();
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|origin| config::origin_allowed(origin, &allowed_origins))
                .unwrap_or(false)
        }));

    Router::new()
        // Webhook capture
        .route("/e/{slug}", any(handlers::capture::capture))
        // System
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::ready_check))
        .route("/api/v1/openapi.json", get(openapi_spec))
        // Admin API
        .route(
            "/api/v1/endpoints",
            post(handlers::endpoints::create_endpoint).get(handlers::endpoints::list_endpoints),
        )
        .route(
            "/api/v1/endpoints/{slug}",
            get(handlers::endpoints::get_endpoint).delete(handlers::endpoints::delete_endpoint),
        )
        .route(
            "/api/v1/endpoints/{slug}/requests",
            get(handlers::requests::list_requests),
        )
        .route(
            "/api/v1/endpoints/{slug}/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
        .route(
            "/api/v1/endpoints/{slug}/retention",
            get(handlers::retention::get_retention).put(handlers::retention::update_retention),
        )
        .route(
            "/api/v1/endpoints/{slug}/forwarding-rules",
            post(handlers::rules::create_rule).get(handlers::rules::list_rules),
        )
        .route(
            "/api/v1/endpoints/{slug}/transformations",
            post(handlers::transformations::create_transformation)
                .get(handlers::transformations::list_transformations),
        )
        .route(
            "/api/v1/forwarding-rules/{id}",
            put(handlers::rules::update_rule).delete(handlers::rules::delete_rule),
        )
        .route(
            "/api/v1/transformations/{id}",
            put(handlers::transformations::update_transformation)
                .delete(handlers::transformations::delete_transformation),
        )
        .route(
            "/api/v1/transformations/{id}/test",
            post(handlers::transformations::test_transformation),
        )
        .route("/api/v1/requests/{id}", get(handlers::requests::get_request))
        .route(
            "/api/v1/requests/{id}/forward-attempts",
            get(handlers::requests::list_forward_attempts),
        )
        .route(
            "/api/v1/requests/{id}/replay",
            post(handlers::replay::replay_request),
        )
        .route(
            "/api/v1/requests/{id}/replays",
            get(handlers::requests::list_replays),
        )
        .route("/api/v1/realtime", get(handlers::realtime::realtime))
        // The router's built-in limit would shadow the configured ceiling.
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Connect, migrate, and serve until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let db = hookline_relay_db::connect(&config.database_url).await?;
    hookline_relay_db::migrate(&db).await?;

    retention::spawn_sweeper(db.clone(), config.cleanup_interval_minutes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState::new(db, config));
    let router = build_router(state);

    info!("hookline listening on http://{addr}");
    info!("OpenAPI spec: http://{addr}/api/v1/openapi.json");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining");
}
