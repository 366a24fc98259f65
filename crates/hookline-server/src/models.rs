//! Admin API request/response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use hookline_relay_db::entities::{
    endpoint, endpoint_settings, forward_attempt, forwarding_rule, replay, request,
    retention_policy, transformation,
};

use crate::config::Config;

/// Error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ---------------------------------------------------------------- endpoints

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEndpointRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Endpoint {
    pub id: Uuid,
    pub slug: String,
    pub name: Option<String>,
    /// Capture URL for this endpoint
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn from_model(model: endpoint::Model, config: &Config) -> Self {
        let url = config.capture_url(&model.slug);
        Self {
            id: model.id,
            slug: model.slug,
            name: model.name,
            url,
            created_at: model.created_at,
        }
    }
}

// ----------------------------------------------------------------- requests

#[derive(Debug, Serialize, ToSchema)]
pub struct CapturedRequest {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub method: String,
    pub path: Option<String>,
    #[schema(value_type = Object)]
    pub headers: Value,
    #[schema(value_type = Object)]
    pub query_params: Value,
    pub ip: Option<String>,
    pub body: Option<String>,
    pub body_size: i64,
    pub content_type: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl From<request::Model> for CapturedRequest {
    fn from(model: request::Model) -> Self {
        Self {
            id: model.id,
            endpoint_id: model.endpoint_id,
            method: model.method,
            path: model.path,
            headers: model.headers,
            query_params: model.query_params,
            ip: model.ip,
            body: model.body,
            body_size: model.body_size,
            content_type: model.content_type,
            received_at: model.received_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestList {
    pub requests: Vec<CapturedRequest>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub method: Option<String>,
    /// Case-insensitive substring over path and header text
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

// ----------------------------------------------------------- forwarding rules

#[derive(Debug, Serialize, ToSchema)]
pub struct ForwardingRule {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub target_url: String,
    pub method: Option<String>,
    #[schema(value_type = Object)]
    pub headers: Value,
    pub enabled: bool,
    pub max_retries: i32,
    #[schema(value_type = Object)]
    pub backoff_config: Value,
    pub condition_type: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub condition_config: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<forwarding_rule::Model> for ForwardingRule {
    fn from(model: forwarding_rule::Model) -> Self {
        Self {
            id: model.id,
            endpoint_id: model.endpoint_id,
            target_url: model.target_url,
            method: model.method,
            headers: model.headers,
            enabled: model.enabled,
            max_retries: model.max_retries,
            backoff_config: model.backoff_config,
            condition_type: model.condition_type,
            condition_config: model.condition_config,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateForwardingRuleRequest {
    pub target_url: String,
    pub method: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub headers: Option<Value>,
    pub max_retries: Option<i32>,
    #[schema(value_type = Option<Object>)]
    pub backoff_config: Option<Value>,
    pub condition_type: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub condition_config: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateForwardingRuleRequest {
    pub target_url: Option<String>,
    pub method: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub headers: Option<Value>,
    pub enabled: Option<bool>,
    pub max_retries: Option<i32>,
    #[schema(value_type = Option<Object>)]
    pub backoff_config: Option<Value>,
    pub condition_type: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub condition_config: Option<Value>,
}

// ------------------------------------------------------------ forward attempts

#[derive(Debug, Serialize, ToSchema)]
pub struct ForwardAttempt {
    pub id: Uuid,
    pub request_id: Uuid,
    pub forwarding_rule_id: Uuid,
    pub attempt_number: i32,
    pub status: String,
    pub response_status: Option<i32>,
    #[schema(value_type = Option<Object>)]
    pub response_headers: Option<Value>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
    pub attempted_at: DateTime<Utc>,
}

impl From<forward_attempt::Model> for ForwardAttempt {
    fn from(model: forward_attempt::Model) -> Self {
        Self {
            id: model.id,
            request_id: model.request_id,
            forwarding_rule_id: model.forwarding_rule_id,
            attempt_number: model.attempt_number,
            status: model.status,
            response_status: model.response_status,
            response_headers: model.response_headers,
            response_body: model.response_body,
            error_message: model.error_message,
            duration_ms: model.duration_ms,
            attempted_at: model.attempted_at,
        }
    }
}

// ------------------------------------------------------------- transformations

#[derive(Debug, Serialize, ToSchema)]
pub struct Transformation {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub name: String,
    pub dialect: String,
    pub script: String,
    pub apply_to: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<transformation::Model> for Transformation {
    fn from(model: transformation::Model) -> Self {
        Self {
            id: model.id,
            endpoint_id: model.endpoint_id,
            name: model.name,
            dialect: model.dialect,
            script: model.script,
            apply_to: model.apply_to,
            enabled: model.enabled,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransformationRequest {
    pub name: String,
    /// `script` | `jsonpath` | `path`
    pub dialect: String,
    pub script: String,
    /// `request` | `response` | `both`
    pub apply_to: String,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTransformationRequest {
    pub name: Option<String>,
    pub dialect: Option<String>,
    pub script: Option<String>,
    pub apply_to: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TestTransformationRequest {
    #[schema(value_type = Object)]
    pub input: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestTransformationResponse {
    #[schema(value_type = Object)]
    pub output: Value,
}

// ----------------------------------------------------------------- settings

#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointSettings {
    pub endpoint_id: Uuid,
    /// `"***"` when a secret is configured; the stored value is never returned
    pub hmac_secret: Option<String>,
    pub hmac_algorithm: String,
    pub rate_limit_per_minute: Option<i32>,
    pub rate_limit_per_hour: Option<i32>,
    pub rate_limit_per_day: Option<i32>,
}

impl EndpointSettings {
    pub fn defaults(endpoint_id: Uuid) -> Self {
        Self {
            endpoint_id,
            hmac_secret: None,
            hmac_algorithm: "sha256".to_string(),
            rate_limit_per_minute: None,
            rate_limit_per_hour: None,
            rate_limit_per_day: None,
        }
    }
}

impl From<endpoint_settings::Model> for EndpointSettings {
    fn from(model: endpoint_settings::Model) -> Self {
        Self {
            endpoint_id: model.endpoint_id,
            hmac_secret: model
                .hmac_secret
                .filter(|secret| !secret.is_empty())
                .map(|_| "***".to_string()),
            hmac_algorithm: model.hmac_algorithm,
            rate_limit_per_minute: model.rate_limit_per_minute,
            rate_limit_per_hour: model.rate_limit_per_hour,
            rate_limit_per_day: model.rate_limit_per_day,
        }
    }
}

/// Absent fields keep their stored values.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEndpointSettingsRequest {
    pub hmac_secret: Option<String>,
    pub hmac_algorithm: Option<String>,
    pub rate_limit_per_minute: Option<i32>,
    pub rate_limit_per_hour: Option<i32>,
    pub rate_limit_per_day: Option<i32>,
}

// ---------------------------------------------------------------- retention

#[derive(Debug, Serialize, ToSchema)]
pub struct RetentionPolicy {
    pub endpoint_id: Uuid,
    pub retention_days: i32,
    pub auto_delete: bool,
    pub archive_enabled: bool,
    pub archive_path: Option<String>,
}

impl RetentionPolicy {
    pub fn defaults(endpoint_id: Uuid) -> Self {
        Self {
            endpoint_id,
            retention_days: 30,
            auto_delete: false,
            archive_enabled: false,
            archive_path: None,
        }
    }
}

impl From<retention_policy::Model> for RetentionPolicy {
    fn from(model: retention_policy::Model) -> Self {
        Self {
            endpoint_id: model.endpoint_id,
            retention_days: model.retention_days,
            auto_delete: model.auto_delete,
            archive_enabled: model.archive_enabled,
            archive_path: model.archive_path,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRetentionPolicyRequest {
    pub retention_days: Option<i32>,
    pub auto_delete: Option<bool>,
    pub archive_enabled: Option<bool>,
    pub archive_path: Option<String>,
}

// ------------------------------------------------------------------ replays

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReplayRequest {
    pub target_url: String,
    /// Defaults to the original method
    pub method: Option<String>,
    /// Replaces the original headers wholesale when provided
    #[schema(value_type = Option<Object>)]
    pub headers: Option<Value>,
    /// Defaults to the original body
    pub body: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateReplayResponse {
    pub replay_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Replay {
    pub id: Uuid,
    pub request_id: Uuid,
    pub target_url: String,
    pub method: String,
    #[schema(value_type = Object)]
    pub headers: Value,
    pub body: Option<String>,
    pub attempts: i32,
    pub status: String,
    pub response_status: Option<i32>,
    #[schema(value_type = Option<Object>)]
    pub response_headers: Option<Value>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<replay::Model> for Replay {
    fn from(model: replay::Model) -> Self {
        Self {
            id: model.id,
            request_id: model.request_id,
            target_url: model.target_url,
            method: model.method,
            headers: model.headers,
            body: model.body,
            attempts: model.attempts,
            status: model.status,
            response_status: model.response_status,
            response_headers: model.response_headers,
            response_body: model.response_body,
            error_message: model.error_message,
            last_attempt_at: model.last_attempt_at,
            created_at: model.created_at,
        }
    }
}

// ------------------------------------------------------------------- system

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    pub status: String,
}
