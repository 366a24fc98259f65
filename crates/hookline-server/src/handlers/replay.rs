//! Operator-initiated replay of a captured request.
//!
//! Unlike the forwarder this performs exactly one attempt; retrying a
//! replay is the operator's call.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use hookline_relay_db::body as body_codec;
use hookline_relay_db::store::{self, ReplayOutcome};

use crate::forward::{read_capped, RESPONSE_CAPTURE_LIMIT};
use crate::headers::{apply_json_headers, header_map_to_json};
use crate::models::{CreateReplayRequest, CreateReplayResponse, ErrorResponse};
use crate::AppState;

use super::{bad_request, db_error, not_found, ApiResult};

const REPLAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Replay a captured request to an arbitrary target
#[utoipa::path(
    post,
    path = "/api/v1/requests/{id}/replay",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = CreateReplayRequest,
    responses(
        (status = 200, description = "Replay created", body = CreateReplayResponse),
        (status = 400, description = "Invalid replay request", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse)
    ),
    tag = "traffic"
)]
pub async fn replay_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateReplayRequest>,
) -> ApiResult<CreateReplayResponse> {
    if req.target_url.is_empty() {
        return Err(bad_request("target_url is required"));
    }

    let original = store::request_by_id(&state.db, id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("Request '{id}' not found")))?;

    // Overrides win; otherwise replay what was captured.
    let method = req
        .method
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| original.method.clone());
    let headers = match req.headers {
        Some(headers) if headers.as_object().is_some_and(|h| !h.is_empty()) => headers,
        _ => original.headers.clone(),
    };
    let replay_body = req.body.or_else(|| original.body.clone());

    let body_data = match replay_body.as_deref() {
        None | Some("") => Value::Null,
        Some(text) => serde_json::from_str(text)
            .unwrap_or_else(|_| Value::String(text.to_string())),
    };

    let (headers, transformed_body) = match hookline_transform::apply_request_transformations(
        &state.db,
        original.endpoint_id,
        headers.clone(),
        body_data.clone(),
    )
    .await
    {
        Ok(pair) => pair,
        Err(err) => {
            warn!(request_id = %id, error = %err, "transformations unavailable, replaying original payload");
            (headers, body_data)
        }
    };

    let final_body = match transformed_body {
        Value::Null => replay_body,
        Value::String(s) => Some(s),
        other => serde_json::to_string(&other).ok().or(replay_body),
    };

    let replay = store::insert_replay(
        &state.db,
        id,
        req.target_url.clone(),
        method.clone(),
        headers.clone(),
        final_body.clone(),
    )
    .await
    .map_err(db_error)?;

    info!(replay_id = %replay.id, request_id = %id, target = %req.target_url, "replay created");

    tokio::spawn(execute_replay(
        Arc::clone(&state),
        replay.id,
        req.target_url,
        method,
        headers,
        final_body,
    ));

    Ok(Json(CreateReplayResponse {
        replay_id: replay.id,
        status: "pending".to_string(),
    }))
}

/// The replay's single attempt; stamps the row with its terminal status.
async fn execute_replay(
    state: Arc<AppState>,
    replay_id: Uuid,
    target_url: String,
    method: String,
    headers: Value,
    body: Option<String>,
) {
    let outcome = perform_replay(&state, &target_url, &method, &headers, body).await;
    if let Err(err) = store::finish_replay(&state.db, replay_id, outcome).await {
        error!(%replay_id, error = %err, "failed to update replay status");
    }
}

async fn perform_replay(
    state: &AppState,
    target_url: &str,
    method: &str,
    headers: &Value,
    body: Option<String>,
) -> ReplayOutcome {
    let failed = |message: String| ReplayOutcome {
        status: "failed".to_string(),
        response_status: None,
        response_headers: None,
        response_body: None,
        error_message: Some(message),
    };

    let method = match reqwest::Method::from_bytes(method.as_bytes()) {
        Ok(method) => method,
        Err(err) => return failed(format!("invalid method: {err}")),
    };

    let mut request = state
        .http
        .request(method, target_url)
        .timeout(REPLAY_TIMEOUT);
    if let Some(map) = headers.as_object() {
        request = apply_json_headers(request, map);
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    match request.send().await {
        Err(err) => failed(err.to_string()),
        Ok(response) => {
            let status_code = response.status().as_u16();
            let response_headers = header_map_to_json(response.headers());
            let captured = read_capped(response, RESPONSE_CAPTURE_LIMIT).await;

            let status = if status_code < 400 { "success" } else { "failed" };
            ReplayOutcome {
                status: status.to_string(),
                response_status: Some(status_code as i32),
                response_headers: Some(response_headers),
                response_body: body_codec::encode_body(&captured),
                error_message: None,
            }
        }
    }
}
