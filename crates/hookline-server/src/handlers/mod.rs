//! HTTP handlers: the capture path plus the admin API.

pub mod capture;
pub mod endpoints;
pub mod health;
pub mod realtime;
pub mod replay;
pub mod requests;
pub mod retention;
pub mod rules;
pub mod settings;
pub mod transformations;

use axum::http::StatusCode;
use axum::Json;
use sea_orm::{DatabaseConnection, DbErr};
use uuid::Uuid;

use crate::models::ErrorResponse;

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: None,
        }),
    )
}

pub(crate) fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
            code: Some("NOT_FOUND".to_string()),
        }),
    )
}

pub(crate) fn db_error(err: DbErr) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Database error: {err}"),
            code: None,
        }),
    )
}

/// Resolve a slug to its endpoint id or fail with 404.
pub(crate) async fn resolve_endpoint(
    db: &DatabaseConnection,
    slug: &str,
) -> Result<Uuid, ApiError> {
    hookline_relay_db::store::endpoint_id_by_slug(db, slug)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("Endpoint '{slug}' not found")))
}
