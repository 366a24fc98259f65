//! CapturedRequest entity: one persisted inbound webhook delivery

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub endpoint_id: Uuid,

    pub method: String,

    pub path: Option<String>,

    /// Header name -> string or ordered array of strings
    pub headers: Json,

    /// Query parameter name -> string or ordered array of strings
    pub query_params: Json,

    /// Cleaned source IP (no port, no brackets)
    pub ip: Option<String>,

    /// Body text; binary payloads carry the base64 marker prefix
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,

    /// Raw body length in bytes, before any encoding
    pub body_size: i64,

    pub content_type: Option<String>,

    pub received_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
