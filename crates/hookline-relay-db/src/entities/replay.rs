//! Replay entity: operator-initiated one-shot re-send of a captured request

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "replays")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub request_id: Uuid,

    pub target_url: String,

    pub method: String,

    pub headers: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,

    pub attempts: i32,

    /// `pending` | `success` | `failed`
    pub status: String,

    pub response_status: Option<i32>,

    pub response_headers: Option<Json>,

    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,

    pub error_message: Option<String>,

    pub last_attempt_at: Option<ChronoDateTimeUtc>,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
