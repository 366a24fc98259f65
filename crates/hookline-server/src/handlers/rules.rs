//! Forwarding rule CRUD.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde_json::{json, Value};
use uuid::Uuid;

use hookline_relay_db::entities::forwarding_rule;

use crate::forward::validate_condition;
use crate::models::{
    CreateForwardingRuleRequest, ErrorResponse, ForwardingRule, UpdateForwardingRuleRequest,
};
use crate::AppState;

use super::{bad_request, db_error, not_found, resolve_endpoint, ApiError, ApiResult};

const DEFAULT_MAX_RETRIES: i32 = 3;

/// Caller-provided backoff fields are merged over the defaults.
fn merged_backoff(overrides: Option<&Value>) -> Value {
    let mut config = json!({
        "type": "exponential",
        "base": 2,
        "min_ms": 1000,
        "max_ms": 30000,
    });
    if let (Some(base), Some(overrides)) =
        (config.as_object_mut(), overrides.and_then(Value::as_object))
    {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }
    config
}

/// Create a forwarding rule
#[utoipa::path(
    post,
    path = "/api/v1/endpoints/{slug}/forwarding-rules",
    params(("slug" = String, Path, description = "Endpoint slug")),
    request_body = CreateForwardingRuleRequest,
    responses(
        (status = 200, description = "Rule created", body = ForwardingRule),
        (status = 400, description = "Invalid rule", body = ErrorResponse),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "forwarding"
)]
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<CreateForwardingRuleRequest>,
) -> ApiResult<ForwardingRule> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    if req.target_url.is_empty() {
        return Err(bad_request("target_url is required"));
    }
    validate_condition(req.condition_type.as_deref(), req.condition_config.as_ref())
        .map_err(bad_request)?;

    let model = forwarding_rule::ActiveModel {
        id: Set(Uuid::new_v4()),
        endpoint_id: Set(endpoint_id),
        target_url: Set(req.target_url),
        method: Set(req.method),
        headers: Set(req.headers.unwrap_or_else(|| json!({}))),
        enabled: Set(true),
        max_retries: Set(req.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)),
        backoff_config: Set(merged_backoff(req.backoff_config.as_ref())),
        condition_type: Set(req.condition_type),
        condition_config: Set(req.condition_config),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(ForwardingRule::from(model)))
}

/// List an endpoint's forwarding rules
#[utoipa::path(
    get,
    path = "/api/v1/endpoints/{slug}/forwarding-rules",
    params(("slug" = String, Path, description = "Endpoint slug")),
    responses(
        (status = 200, description = "Rules, newest first", body = [ForwardingRule]),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "forwarding"
)]
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Vec<ForwardingRule>> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    let rules = forwarding_rule::Entity::find()
        .filter(forwarding_rule::Column::EndpointId.eq(endpoint_id))
        .order_by_desc(forwarding_rule::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    Ok(Json(rules.into_iter().map(ForwardingRule::from).collect()))
}

/// Update a forwarding rule
#[utoipa::path(
    put,
    path = "/api/v1/forwarding-rules/{id}",
    params(("id" = Uuid, Path, description = "Rule ID")),
    request_body = UpdateForwardingRuleRequest,
    responses(
        (status = 200, description = "Rule updated", body = ForwardingRule),
        (status = 400, description = "Invalid rule", body = ErrorResponse),
        (status = 404, description = "Rule not found", body = ErrorResponse)
    ),
    tag = "forwarding"
)]
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateForwardingRuleRequest>,
) -> ApiResult<ForwardingRule> {
    let existing = forwarding_rule::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("Forwarding rule '{id}' not found")))?;

    // The condition must stay well-formed across partial updates.
    let effective_type = req
        .condition_type
        .as_deref()
        .or(existing.condition_type.as_deref());
    let effective_config = req
        .condition_config
        .as_ref()
        .or(existing.condition_config.as_ref());
    validate_condition(effective_type, effective_config).map_err(bad_request)?;

    let mut active = existing.into_active_model();
    if let Some(target_url) = req.target_url {
        active.target_url = Set(target_url);
    }
    if let Some(method) = req.method {
        active.method = Set(Some(method));
    }
    if let Some(headers) = req.headers {
        active.headers = Set(headers);
    }
    if let Some(enabled) = req.enabled {
        active.enabled = Set(enabled);
    }
    if let Some(max_retries) = req.max_retries {
        active.max_retries = Set(max_retries);
    }
    if let Some(backoff_config) = req.backoff_config {
        active.backoff_config = Set(backoff_config);
    }
    if let Some(condition_type) = req.condition_type {
        active.condition_type = Set(Some(condition_type));
    }
    if let Some(condition_config) = req.condition_config {
        active.condition_config = Set(Some(condition_config));
    }
    active.updated_at = Set(Utc::now());

    let model = active.update(&state.db).await.map_err(db_error)?;
    Ok(Json(ForwardingRule::from(model)))
}

/// Delete a forwarding rule
#[utoipa::path(
    delete,
    path = "/api/v1/forwarding-rules/{id}",
    params(("id" = Uuid, Path, description = "Rule ID")),
    responses((status = 204, description = "Rule deleted")),
    tag = "forwarding"
)]
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    forwarding_rule::Entity::delete_by_id(id)
        .exec(&state.db)
        .await
        .map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}
