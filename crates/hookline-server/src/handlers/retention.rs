//! Retention policy configuration.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};

use hookline_relay_db::entities::retention_policy;

use crate::models::{ErrorResponse, RetentionPolicy, UpdateRetentionPolicyRequest};
use crate::AppState;

use super::{db_error, resolve_endpoint, ApiResult};

/// Get an endpoint's retention policy; defaults when none is stored
#[utoipa::path(
    get,
    path = "/api/v1/endpoints/{slug}/retention",
    params(("slug" = String, Path, description = "Endpoint slug")),
    responses(
        (status = 200, description = "Retention policy", body = RetentionPolicy),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "retention"
)]
pub async fn get_retention(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<RetentionPolicy> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    let policy = retention_policy::Entity::find_by_id(endpoint_id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .map(RetentionPolicy::from)
        .unwrap_or_else(|| RetentionPolicy::defaults(endpoint_id));

    Ok(Json(policy))
}

/// Upsert an endpoint's retention policy
#[utoipa::path(
    put,
    path = "/api/v1/endpoints/{slug}/retention",
    params(("slug" = String, Path, description = "Endpoint slug")),
    request_body = UpdateRetentionPolicyRequest,
    responses(
        (status = 200, description = "Updated policy", body = RetentionPolicy),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "retention"
)]
pub async fn update_retention(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<UpdateRetentionPolicyRequest>,
) -> ApiResult<RetentionPolicy> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    let existing = retention_policy::Entity::find_by_id(endpoint_id)
        .one(&state.db)
        .await
        .map_err(db_error)?;

    let model = match existing {
        Some(existing) => {
            let mut active = existing.into_active_model();
            if let Some(retention_days) = req.retention_days {
                active.retention_days = Set(retention_days);
            }
            if let Some(auto_delete) = req.auto_delete {
                active.auto_delete = Set(auto_delete);
            }
            if let Some(archive_enabled) = req.archive_enabled {
                active.archive_enabled = Set(archive_enabled);
            }
            if req.archive_path.is_some() {
                active.archive_path = Set(req.archive_path);
            }
            active.updated_at = Set(Utc::now());
            active.update(&state.db).await.map_err(db_error)?
        }
        None => retention_policy::ActiveModel {
            endpoint_id: Set(endpoint_id),
            retention_days: Set(req.retention_days.unwrap_or(30)),
            auto_delete: Set(req.auto_delete.unwrap_or(false)),
            archive_enabled: Set(req.archive_enabled.unwrap_or(false)),
            archive_path: Set(req.archive_path),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&state.db)
        .await
        .map_err(db_error)?,
    };

    Ok(Json(RetentionPolicy::from(model)))
}
