//! Endpoint settings: HMAC configuration and rate limits.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};

use hookline_relay_db::entities::endpoint_settings;

use crate::models::{EndpointSettings, ErrorResponse, UpdateEndpointSettingsRequest};
use crate::AppState;

use super::{db_error, resolve_endpoint, ApiResult};

/// Get an endpoint's settings; defaults when none are stored
#[utoipa::path(
    get,
    path = "/api/v1/endpoints/{slug}/settings",
    params(("slug" = String, Path, description = "Endpoint slug")),
    responses(
        (status = 200, description = "Endpoint settings", body = EndpointSettings),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "settings"
)]
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<EndpointSettings> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    let settings = endpoint_settings::Entity::find_by_id(endpoint_id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .map(EndpointSettings::from)
        .unwrap_or_else(|| EndpointSettings::defaults(endpoint_id));

    Ok(Json(settings))
}

/// Upsert an endpoint's settings; absent fields keep their stored values
#[utoipa::path(
    put,
    path = "/api/v1/endpoints/{slug}/settings",
    params(("slug" = String, Path, description = "Endpoint slug")),
    request_body = UpdateEndpointSettingsRequest,
    responses(
        (status = 200, description = "Updated settings", body = EndpointSettings),
        (status = 404, description = "Endpoint not found", body = ErrorResponse)
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<UpdateEndpointSettingsRequest>,
) -> ApiResult<EndpointSettings> {
    let endpoint_id = resolve_endpoint(&state.db, &slug).await?;

    let existing = endpoint_settings::Entity::find_by_id(endpoint_id)
        .one(&state.db)
        .await
        .map_err(db_error)?;

    let model = match existing {
        Some(existing) => {
            let mut active = existing.into_active_model();
            if req.hmac_secret.is_some() {
                active.hmac_secret = Set(req.hmac_secret);
            }
            if let Some(algorithm) = req.hmac_algorithm {
                active.hmac_algorithm = Set(algorithm);
            }
            if req.rate_limit_per_minute.is_some() {
                active.rate_limit_per_minute = Set(req.rate_limit_per_minute);
            }
            if req.rate_limit_per_hour.is_some() {
                active.rate_limit_per_hour = Set(req.rate_limit_per_hour);
            }
            if req.rate_limit_per_day.is_some() {
                active.rate_limit_per_day = Set(req.rate_limit_per_day);
            }
            active.updated_at = Set(Utc::now());
            active.update(&state.db).await.map_err(db_error)?
        }
        None => endpoint_settings::ActiveModel {
            endpoint_id: Set(endpoint_id),
            hmac_secret: Set(req.hmac_secret),
            hmac_algorithm: Set(req.hmac_algorithm.unwrap_or_else(|| "sha256".to_string())),
            rate_limit_per_minute: Set(req.rate_limit_per_minute),
            rate_limit_per_hour: Set(req.rate_limit_per_hour),
            rate_limit_per_day: Set(req.rate_limit_per_day),
            updated_at: Set(Utc::now()),
        }
        .insert(&state.db)
        .await
        .map_err(db_error)?,
    };

    Ok(Json(EndpointSettings::from(model)))
}
