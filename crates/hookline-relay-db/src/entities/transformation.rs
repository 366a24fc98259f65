//! Transformation entity: a user-supplied script applied before forwarding

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transformations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub endpoint_id: Uuid,

    pub name: String,

    /// `script` | `jsonpath` | `path`
    pub dialect: String,

    #[sea_orm(column_type = "Text")]
    pub script: String,

    /// `request` | `response` | `both`
    pub apply_to: String,

    pub enabled: bool,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
