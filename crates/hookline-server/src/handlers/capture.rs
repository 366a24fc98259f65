//! Webhook capture: `ANY /e/{slug}`.
//!
//! Admission order is fixed: slug resolution, bounded body read, rate
//! limiting, signature verification. Only then is the row persisted; the
//! event publish and the forwarding fan-out happen strictly after the
//! commit, and the caller never waits on forwarding.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sea_orm::DbErr;
use serde_json::{Map, Value};
use uuid::Uuid;

use hookline_relay_db::body as body_codec;
use hookline_relay_db::store::{self, NewRequest};

use crate::events::CaptureEvent;
use crate::forward;
use crate::headers::header_map_to_json;
use crate::rate_limit::RateLimits;
use crate::signature::verify_signature;
use crate::AppState;

enum CaptureError {
    NotFound,
    PayloadTooLarge,
    RateLimited,
    InvalidSignature,
    BodyRead,
    Db(DbErr),
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "Endpoint not found").into_response(),
            Self::PayloadTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
            }
            Self::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
            }
            Self::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, "Invalid signature").into_response()
            }
            Self::BodyRead => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read request body",
            )
                .into_response(),
            Self::Db(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {err}"),
            )
                .into_response(),
        }
    }
}

pub async fn capture(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    request: Request,
) -> Response {
    match handle_capture(&state, &slug, request).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_capture(
    state: &Arc<AppState>,
    slug: &str,
    request: Request,
) -> Result<(), CaptureError> {
    let endpoint_id = store::endpoint_id_by_slug(&state.db, slug)
        .await
        .map_err(CaptureError::Db)?
        .ok_or(CaptureError::NotFound)?;

    let (parts, body) = request.into_parts();

    let max_body_size = state.config.max_body_size;
    let body = match axum::body::to_bytes(body, max_body_size).await {
        Ok(body) => body,
        Err(err) => {
            return Err(if is_length_limit(&err) {
                CaptureError::PayloadTooLarge
            } else {
                CaptureError::BodyRead
            })
        }
    };

    let settings = store::settings_for(&state.db, endpoint_id)
        .await
        .map_err(CaptureError::Db)?;

    if let Some(settings) = &settings {
        let limits = RateLimits::from_settings(settings);
        if !state.rate_limiter.check(endpoint_id, &limits) {
            return Err(CaptureError::RateLimited);
        }

        verify_signature(settings, &parts.headers, &body)
            .map_err(|_| CaptureError::InvalidSignature)?;
    }

    let remote = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let source_ip = source_ip(&parts.headers, remote);

    let headers_json = header_map_to_json(&parts.headers);
    let query_json = query_to_json(parts.uri.query());
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request_id = Uuid::new_v4();
    let record = store::insert_request(
        &state.db,
        NewRequest {
            id: request_id,
            endpoint_id,
            method: parts.method.to_string(),
            path: Some(parts.uri.path().to_string()),
            headers: headers_json.clone(),
            query_params: query_json,
            ip: source_ip.map(|ip| ip.to_string()),
            body: body_codec::encode_body(&body),
            body_size: body.len() as i64,
            content_type,
        },
    )
    .await
    .map_err(CaptureError::Db)?;

    state.events.publish(
        slug,
        &CaptureEvent {
            id: record.id,
            endpoint_id,
            method: record.method.clone(),
            path: record.path.clone(),
            received_at: record.received_at,
        },
    );

    // Fire-and-forget; the capture response never waits on delivery.
    tokio::spawn(forward::trigger_forwarding(
        Arc::clone(state),
        endpoint_id,
        request_id,
        record.method,
        headers_json,
        body,
    ));

    Ok(())
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(err) = source {
        if err.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}

/// Prefer the first `X-Forwarded-For` entry over the raw remote address.
fn source_ip(headers: &axum::http::HeaderMap, remote: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        if let Some(ip) = clean_ip(forwarded) {
            return Some(ip);
        }
    }
    remote.map(|addr| addr.ip())
}

/// Extract a bare IP from `host`, `host:port`, `[v6]` or `[v6]:port`.
fn clean_ip(raw: &str) -> Option<IpAddr> {
    let trimmed = raw.trim();
    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    trimmed
        .trim_matches(|c| c == '[' || c == ']')
        .parse::<IpAddr>()
        .ok()
}

/// Query string to the stored JSON shape (string, or ordered array for
/// repeated parameters).
fn query_to_json(query: Option<&str>) -> Value {
    let mut map = Map::new();
    let Some(query) = query else {
        return Value::Object(map);
    };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.entry(key.into_owned()) {
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            serde_json::map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }

    Value::Object(map)
}
