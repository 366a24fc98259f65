//! Typed query surface used by the capture/forward/replay pipeline.
//!
//! Administrative CRUD keeps its queries next to its handlers; the hot
//! path goes through these functions so the pipeline code reads in terms
//! of domain operations instead of query builders.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value;
use uuid::Uuid;

use crate::entities::{
    endpoint, endpoint_settings, forward_attempt, forwarding_rule, replay, request,
    retention_policy, transformation,
};

/// A capture row ready for insertion.
pub struct NewRequest {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub method: String,
    pub path: Option<String>,
    pub headers: Value,
    pub query_params: Value,
    pub ip: Option<String>,
    pub body: Option<String>,
    pub body_size: i64,
    pub content_type: Option<String>,
}

/// Outcome of a single outbound forwarding call.
pub struct AttemptOutcome {
    pub status: String,
    pub response_status: Option<i32>,
    pub response_headers: Option<Value>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
}

/// Outcome of a replay's single attempt.
pub struct ReplayOutcome {
    pub status: String,
    pub response_status: Option<i32>,
    pub response_headers: Option<Value>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
}

pub async fn endpoint_id_by_slug(
    db: &DatabaseConnection,
    slug: &str,
) -> Result<Option<Uuid>, DbErr> {
    Ok(endpoint::Entity::find()
        .filter(endpoint::Column::Slug.eq(slug))
        .one(db)
        .await?
        .map(|e| e.id))
}

pub async fn settings_for(
    db: &DatabaseConnection,
    endpoint_id: Uuid,
) -> Result<Option<endpoint_settings::Model>, DbErr> {
    endpoint_settings::Entity::find_by_id(endpoint_id).one(db).await
}

pub async fn insert_request(
    db: &DatabaseConnection,
    new: NewRequest,
) -> Result<request::Model, DbErr> {
    request::ActiveModel {
        id: Set(new.id),
        endpoint_id: Set(new.endpoint_id),
        method: Set(new.method),
        path: Set(new.path),
        headers: Set(new.headers),
        query_params: Set(new.query_params),
        ip: Set(new.ip),
        body: Set(new.body),
        body_size: Set(new.body_size),
        content_type: Set(new.content_type),
        received_at: Set(Utc::now()),
    }
    .insert(db)
    .await
}

pub async fn request_by_id(
    db: &DatabaseConnection,
    id: Uuid,
) -> Result<Option<request::Model>, DbErr> {
    request::Entity::find_by_id(id).one(db).await
}

/// Enabled forwarding rules for an endpoint. Disabled rules never fire.
pub async fn enabled_rules_for(
    db: &DatabaseConnection,
    endpoint_id: Uuid,
) -> Result<Vec<forwarding_rule::Model>, DbErr> {
    forwarding_rule::Entity::find()
        .filter(forwarding_rule::Column::EndpointId.eq(endpoint_id))
        .filter(forwarding_rule::Column::Enabled.eq(true))
        .all(db)
        .await
}

pub async fn record_forward_attempt(
    db: &DatabaseConnection,
    request_id: Uuid,
    rule_id: Uuid,
    attempt_number: i32,
    outcome: AttemptOutcome,
) -> Result<(), DbErr> {
    forward_attempt::ActiveModel {
        id: Set(Uuid::new_v4()),
        request_id: Set(request_id),
        forwarding_rule_id: Set(rule_id),
        attempt_number: Set(attempt_number),
        status: Set(outcome.status),
        response_status: Set(outcome.response_status),
        response_headers: Set(outcome.response_headers),
        response_body: Set(outcome.response_body),
        error_message: Set(outcome.error_message),
        duration_ms: Set(outcome.duration_ms),
        attempted_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Enabled transformations whose apply-to matches, in creation order.
pub async fn transformations_for(
    db: &DatabaseConnection,
    endpoint_id: Uuid,
    apply_to: &str,
) -> Result<Vec<transformation::Model>, DbErr> {
    transformation::Entity::find()
        .filter(transformation::Column::EndpointId.eq(endpoint_id))
        .filter(transformation::Column::Enabled.eq(true))
        .filter(transformation::Column::ApplyTo.is_in([apply_to, "both"]))
        .order_by_asc(transformation::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn insert_replay(
    db: &DatabaseConnection,
    request_id: Uuid,
    target_url: String,
    method: String,
    headers: Value,
    body: Option<String>,
) -> Result<replay::Model, DbErr> {
    replay::ActiveModel {
        id: Set(Uuid::new_v4()),
        request_id: Set(request_id),
        target_url: Set(target_url),
        method: Set(method),
        headers: Set(headers),
        body: Set(body),
        attempts: Set(0),
        status: Set("pending".to_string()),
        response_status: Set(None),
        response_headers: Set(None),
        response_body: Set(None),
        error_message: Set(None),
        last_attempt_at: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
}

/// Record the outcome of a replay attempt: bump the attempt counter, stamp
/// the attempt time and move the row to its terminal status.
pub async fn finish_replay(
    db: &DatabaseConnection,
    replay_id: Uuid,
    outcome: ReplayOutcome,
) -> Result<(), DbErr> {
    replay::Entity::update_many()
        .col_expr(
            replay::Column::Attempts,
            Expr::col(replay::Column::Attempts).add(1),
        )
        .col_expr(replay::Column::Status, Expr::value(outcome.status))
        .col_expr(
            replay::Column::ResponseStatus,
            Expr::value(outcome.response_status),
        )
        .col_expr(
            replay::Column::ResponseHeaders,
            Expr::value(outcome.response_headers),
        )
        .col_expr(
            replay::Column::ResponseBody,
            Expr::value(outcome.response_body),
        )
        .col_expr(
            replay::Column::ErrorMessage,
            Expr::value(outcome.error_message),
        )
        .col_expr(replay::Column::LastAttemptAt, Expr::value(Some(Utc::now())))
        .filter(replay::Column::Id.eq(replay_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Retention policies the sweeper acts on.
pub async fn auto_delete_policies(
    db: &DatabaseConnection,
) -> Result<Vec<retention_policy::Model>, DbErr> {
    retention_policy::Entity::find()
        .filter(retention_policy::Column::AutoDelete.eq(true))
        .all(db)
        .await
}

/// Delete an endpoint's requests received before the cutoff. Returns the
/// number of rows removed; attempts and replays cascade with their request.
pub async fn delete_requests_before(
    db: &DatabaseConnection,
    endpoint_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let result = request::Entity::delete_many()
        .filter(request::Column::EndpointId.eq(endpoint_id))
        .filter(request::Column::ReceivedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
