//! ForwardingRule entity: where and how to relay captured requests

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forwarding_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub endpoint_id: Uuid,

    pub target_url: String,

    /// Optional method override; the original method is used when unset
    pub method: Option<String>,

    /// Static header overlay applied on top of the (transformed) request headers
    pub headers: Json,

    pub enabled: bool,

    pub max_retries: i32,

    /// `{type, base, min_ms, max_ms}`
    pub backoff_config: Json,

    /// `always` | `header_match` | `body_match`; unset means always
    pub condition_type: Option<String>,

    pub condition_config: Option<Json>,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
