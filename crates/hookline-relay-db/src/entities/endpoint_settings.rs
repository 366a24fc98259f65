//! EndpointSettings entity: per-endpoint admission configuration (1:1)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "endpoint_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub endpoint_id: Uuid,

    pub hmac_secret: Option<String>,

    /// `sha1` | `sha256` | `sha512`
    pub hmac_algorithm: String,

    pub rate_limit_per_minute: Option<i32>,

    pub rate_limit_per_hour: Option<i32>,

    pub rate_limit_per_day: Option<i32>,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
