//! Transformation CRUD and one-shot testing.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use hookline_relay_db::entities::transformation;
use hookline_transform::Dialect;

use crate::models::{
    CreateTransformationRequest, ErrorResponse, TestTransformationRequest,
    TestTransformationResponse, Transformation, UpdateTransformationRequest,
};
use crate::AppState;

use super::{bad_request, db_error, not_found, resolve_endpoint, ApiError, ApiResult};

const VALID_APPLY_TO: [&str; 3] = ["request", "response", "both"];

fn validate_dialect(dialect: &str) -> Result<(), ApiError> {
    dialect
        .parse::<Dialect>()
        .map(|_| ())
        .map_err(|err| bad_request(err.to_string()))
}

fn validate_apply_to(apply_to: &str) -> Result<(), ApiError> {
    if VALID_APPLY_TO.contains(&apply_to) {
        Ok(())
    } else {
        Err(bad_request(format!(
            "apply_to must be one of: {}",
            VALID_APPLY_TO.join(", ")
        )))
    }
}

/// Create a transformation
#[utoipa::path(
    post,
    path = "/api/v1/endpoints/{slug}/transformations",
    params(("slug" = String, Path, description = "Endpoint slug")),
    request_body = CreateTransformationRequest,
    responses(
        (status = 200, description = "Transformation created", body = Transformation),
        (status = 400, description = "Invalid transformation", body = ErrorResponse),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "transformations"
)]
pub async fn create_transformation(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<CreateTransformationRequest>,
) -> ApiResult<Transformation> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    validate_dialect(&req.dialect)?;
    validate_apply_to(&req.apply_to)?;

    let model = transformation::ActiveModel {
        id: Set(Uuid::new_v4()),
        endpoint_id: Set(endpoint_id),
        name: Set(req.name),
        dialect: Set(req.dialect),
        script: Set(req.script),
        apply_to: Set(req.apply_to),
        enabled: Set(req.enabled.unwrap_or(true)),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(Transformation::from(model)))
}

/// List an endpoint's transformations
#[utoipa::path(
    get,
    path = "/api/v1/endpoints/{slug}/transformations",
    params(("slug" = String, Path, description = "Endpoint slug")),
    responses(
        (status = 200, description = "Transformations in creation order", body = [Transformation]),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "transformations"
)]
pub async fn list_transformations(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Vec<Transformation>> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    let transformations = transformation::Entity::find()
        .filter(transformation::Column::EndpointId.eq(endpoint_id))
        .order_by_asc(transformation::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    Ok(Json(
        transformations.into_iter().map(Transformation::from).collect(),
    ))
}

/// Update a transformation
#[utoipa::path(
    put,
    path = "/api/v1/transformations/{id}",
    params(("id" = Uuid, Path, description = "Transformation ID")),
    request_body = UpdateTransformationRequest,
    responses(
        (status = 200, description = "Transformation updated", body = Transformation),
        (status = 400, description = "Invalid transformation", body = ErrorResponse),
        (status = 404, description = "Transformation not found", body = ErrorResponse)
    ),
    tag = "transformations"
)]
pub async fn update_transformation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTransformationRequest>,
) -> ApiResult<Transformation> {
    let existing = transformation::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("Transformation '{id}' not found")))?;

    if let Some(dialect) = &req.dialect {
        validate_dialect(dialect)?;
    }
    if let Some(apply_to) = &req.apply_to {
        validate_apply_to(apply_to)?;
    }

    let mut active = existing.into_active_model();
    if let Some(name) = req.name {
        active.name = Set(name);
    }
    if let Some(dialect) = req.dialect {
        active.dialect = Set(dialect);
    }
    if let Some(script) = req.script {
        active.script = Set(script);
    }
    if let Some(apply_to) = req.apply_to {
        active.apply_to = Set(apply_to);
    }
    if let Some(enabled) = req.enabled {
        active.enabled = Set(enabled);
    }
    active.updated_at = Set(Utc::now());

    let model = active.update(&state.db).await.map_err(db_error)?;
    Ok(Json(Transformation::from(model)))
}

/// Delete a transformation
#[utoipa::path(
    delete,
    path = "/api/v1/transformations/{id}",
    params(("id" = Uuid, Path, description = "Transformation ID")),
    responses((status = 204, description = "Transformation deleted")),
    tag = "transformations"
)]
pub async fn delete_transformation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    transformation::Entity::delete_by_id(id)
        .exec(&state.db)
        .await
        .map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Run a stored transformation against a sample input
#[utoipa::path(
    post,
    path = "/api/v1/transformations/{id}/test",
    params(("id" = Uuid, Path, description = "Transformation ID")),
    request_body = TestTransformationRequest,
    responses(
        (status = 200, description = "Transformation output", body = TestTransformationResponse),
        (status = 404, description = "Transformation not found", body = ErrorResponse),
        (status = 422, description = "Transformation failed", body = ErrorResponse)
    ),
    tag = "transformations"
)]
pub async fn test_transformation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TestTransformationRequest>,
) -> ApiResult<TestTransformationResponse> {
    let model = transformation::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("Transformation '{id}' not found")))?;

    let dialect = model
        .dialect
        .parse::<Dialect>()
        .map_err(|err| bad_request(err.to_string()))?;

    match hookline_transform::execute(dialect, &model.script, &req.input) {
        Ok(output) => Ok(Json(TestTransformationResponse { output })),
        Err(err) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: err.to_string(),
                code: Some("TRANSFORMATION_FAILED".to_string()),
            }),
        )),
    }
}
