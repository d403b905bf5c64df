use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Flat key/value store owned by the admin settings screens. The core only
/// reads `tax_rate_percent` and `shipping_fee` out of it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
