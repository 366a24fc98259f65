//! ForwardAttempt entity: one outbound delivery call for a (request, rule) pair

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forward_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub request_id: Uuid,

    pub forwarding_rule_id: Uuid,

    /// 1-based; attempts for a (request, rule) pair form a gapless prefix
    pub attempt_number: i32,

    /// `pending` | `success` | `failed`
    pub status: String,

    pub response_status: Option<i32>,

    pub response_headers: Option<Json>,

    /// Truncated to 1 MiB; binary captures carry the base64 marker prefix
    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,

    pub error_message: Option<String>,

    pub duration_ms: Option<i32>,

    pub attempted_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
