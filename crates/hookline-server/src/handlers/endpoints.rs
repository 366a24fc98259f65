//! Endpoint CRUD.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, ModelTrait, QueryOrder, Set};
use tracing::info;
use uuid::Uuid;

use hookline_relay_db::entities::endpoint;

use crate::models::{CreateEndpointRequest, Endpoint, ErrorResponse};
use crate::AppState;

use super::{db_error, not_found, ApiError, ApiResult};

/// Slugs are `fh_` plus 8 hex characters, immutable once issued.
fn generate_slug() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("fh_{}", &id[..8])
}

/// Create an endpoint
#[utoipa::path(
    post,
    path = "/api/v1/endpoints",
    request_body = CreateEndpointRequest,
    responses(
        (status = 200, description = "Endpoint created", body = Endpoint),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "endpoints"
)]
pub async fn create_endpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEndpointRequest>,
) -> ApiResult<Endpoint> {
    let model = endpoint::ActiveModel {
        id: Set(Uuid::new_v4()),
        slug: Set(generate_slug()),
        name: Set(req.name),
        created_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .map_err(db_error)?;

    info!(slug = %model.slug, "created endpoint");
    Ok(Json(Endpoint::from_model(model, &state.config)))
}

/// List endpoints
#[utoipa::path(
    get,
    path = "/api/v1/endpoints",
    responses(
        (status = 200, description = "All endpoints", body = [Endpoint]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "endpoints"
)]
pub async fn list_endpoints(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Endpoint>> {
    let endpoints = endpoint::Entity::find()
        .order_by_desc(endpoint::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    Ok(Json(
        endpoints
            .into_iter()
            .map(|model| Endpoint::from_model(model, &state.config))
            .collect(),
    ))
}

/// Get an endpoint by slug
#[utoipa::path(
    get,
    path = "/api/v1/endpoints/{slug}",
    params(("slug" = String, Path, description = "Endpoint slug")),
    responses(
        (status = 200, description = "Endpoint", body = Endpoint),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "endpoints"
)]
pub async fn get_endpoint(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Endpoint> {
    let model = find_by_slug(&state, &slug).await?;
    Ok(Json(Endpoint::from_model(model, &state.config)))
}

/// Delete an endpoint; requests, rules, transformations, settings and
/// policies cascade with it.
#[utoipa::path(
    delete,
    path = "/api/v1/endpoints/{slug}",
    params(("slug" = String, Path, description = "Endpoint slug")),
    responses(
        (status = 204, description = "Endpoint deleted"),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "endpoints"
)]
pub async fn delete_endpoint(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    let model = find_by_slug(&state, &slug).await?;
    info!(slug = %model.slug, "deleting endpoint");
    model.delete(&state.db).await.map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn find_by_slug(state: &AppState, slug: &str) -> Result<endpoint::Model, ApiError> {
    use sea_orm::{ColumnTrait, QueryFilter};

    endpoint::Entity::find()
        .filter(endpoint::Column::Slug.eq(slug))
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("Endpoint '{slug}' not found")))
}
