//! Captured request retrieval.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use hookline_relay_db::entities::{forward_attempt, replay, request};

use crate::models::{
    CapturedRequest, ErrorResponse, ForwardAttempt, Replay, RequestList, RequestQuery,
};
use crate::AppState;

use super::{db_error, not_found, resolve_endpoint, ApiResult};

const DEFAULT_LIMIT: u64 = 25;
const MAX_LIMIT: u64 = 100;

/// List an endpoint's captured requests
#[utoipa::path(
    get,
    path = "/api/v1/endpoints/{slug}/requests",
    params(
        ("slug" = String, Path, description = "Endpoint slug"),
        ("limit" = Option<u64>, Query, description = "Page size (default 25, max 100)"),
        ("offset" = Option<u64>, Query, description = "Pagination offset"),
        ("method" = Option<String>, Query, description = "Filter by HTTP method"),
        ("search" = Option<String>, Query, description = "Substring search over path and header text"),
        ("from" = Option<String>, Query, description = "Only requests received at or after this RFC 3339 instant"),
        ("to" = Option<String>, Query, description = "Only requests received at or before this RFC 3339 instant")
    ),
    responses(
        (status = 200, description = "Captured requests, newest first", body = RequestList),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "traffic"
)]
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<RequestQuery>,
) -> ApiResult<RequestList> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    let mut condition = Condition::all().add(request::Column::EndpointId.eq(endpoint_id));

    if let Some(method) = &query.method {
        condition = condition.add(request::Column::Method.eq(method.to_uppercase()));
    }
    if let Some(from) = query.from {
        condition = condition.add(request::Column::ReceivedAt.gte(from));
    }
    if let Some(to) = query.to {
        condition = condition.add(request::Column::ReceivedAt.lte(to));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        condition = condition.add(
            Condition::any()
                .add(Expr::cust_with_values("LOWER(path) LIKE ?", [pattern.clone()]))
                .add(Expr::cust_with_values(
                    "LOWER(CAST(headers AS TEXT)) LIKE ?",
                    [pattern],
                )),
        );
    }

    let base = request::Entity::find()
        .filter(condition)
        .order_by_desc(request::Column::ReceivedAt);

    let total = base.clone().count(&state.db).await.map_err(db_error)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let requests = base
        .offset(offset)
        .limit(limit)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    Ok(Json(RequestList {
        requests: requests.into_iter().map(CapturedRequest::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Get a captured request
#[utoipa::path(
    get,
    path = "/api/v1/requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Captured request", body = CapturedRequest),
        (status = 404, description = "Request not found", body = ErrorResponse)
    ),
    tag = "traffic"
)]
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<CapturedRequest> {
    let model = request::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("Request '{id}' not found")))?;

    Ok(Json(CapturedRequest::from(model)))
}

/// List a request's forward attempts
#[utoipa::path(
    get,
    path = "/api/v1/requests/{id}/forward-attempts",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Forward attempts, newest first", body = [ForwardAttempt])
    ),
    tag = "traffic"
)]
pub async fn list_forward_attempts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<ForwardAttempt>> {
    let attempts = forward_attempt::Entity::find()
        .filter(forward_attempt::Column::RequestId.eq(id))
        .order_by_desc(forward_attempt::Column::AttemptedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    Ok(Json(attempts.into_iter().map(ForwardAttempt::from).collect()))
}

/// List a request's replays
#[utoipa::path(
    get,
    path = "/api/v1/requests/{id}/replays",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Replays, newest first", body = [Replay])
    ),
    tag = "traffic"
)]
pub async fn list_replays(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Replay>> {
    let replays = replay::Entity::find()
        .filter(replay::Column::RequestId.eq(id))
        .order_by_desc(replay::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    Ok(Json(replays.into_iter().map(Replay::from).collect()))
}
