use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A redeemable code pointing at a discount offer. `used_count` is the
/// contended counter: it only moves inside a settlement transaction, guarded
/// by `used_count < max_usage_count` in the UPDATE itself.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub offer_id: Uuid,
    pub max_usage_count: i32,
    pub used_count: i32,
    pub max_usage_per_user: i32,
    pub is_active: bool,
    /// When set, only this customer may redeem the coupon.
    pub exclusive_customer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::discount_offer::Entity",
        from = "Column::OfferId",
        to = "super::discount_offer::Column::Id"
    )]
    DiscountOffer,
}

impl Related<super::discount_offer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscountOffer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
