//! Coupon ledger.
//!
//! Validation is two-phase: `check` is the advisory, read-only pass used
//! while quoting and drafting; `redeem` is the authoritative pass that runs
//! inside the settlement transaction and moves the contended `used_count`
//! with a single conditional UPDATE.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::coupon::{self, Entity as CouponEntity};
use crate::entities::discount_offer::{self, Entity as DiscountOfferEntity};
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::errors::{RuleViolation, ServiceError};

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Advisory validation at quote/draft time. Read-only; a passing check
    /// reserves nothing, the authoritative re-check happens at settlement.
    #[instrument(skip(self), fields(code, %customer_id, %order_amount))]
    pub async fn check(
        &self,
        code: &str,
        customer_id: Uuid,
        order_amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(coupon::Model, discount_offer::Model), ServiceError> {
        let db = &*self.db;

        let coupon = CouponEntity::find()
            .filter(coupon::Column::Code.eq(code))
            .one(db)
            .await?
            .ok_or(RuleViolation::CouponNotFound)?;

        let offer = DiscountOfferEntity::find_by_id(coupon.offer_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "coupon {} references missing offer {}",
                    coupon.code, coupon.offer_id
                ))
            })?;

        let settled = settled_uses(db, coupon.id, customer_id).await?;
        validate_coupon(&coupon, &offer, settled, customer_id, order_amount, now)?;

        Ok((coupon, offer))
    }

    /// Authoritative redemption inside the settlement transaction. The order
    /// being settled must still be DRAFT so it does not count against the
    /// customer's own limit. Returns `CouponExhausted` when the conditional
    /// increment finds the global cap already consumed.
    pub async fn redeem<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
        customer_id: Uuid,
    ) -> Result<(), ServiceError> {
        // FOR UPDATE on the coupon row serializes concurrent redemptions, so
        // the per-customer count below cannot be read stale by two
        // settlements of the same customer. SQLite omits the lock clause;
        // there the single-writer model serializes anyway.
        let coupon = CouponEntity::find_by_id(coupon_id)
            .lock_exclusive()
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("coupon {coupon_id} not found")))?;

        if !coupon.is_active {
            return Err(RuleViolation::CouponInactive.into());
        }

        let settled = settled_uses(conn, coupon_id, customer_id).await?;
        if settled >= i64::from(coupon.max_usage_per_user) {
            return Err(RuleViolation::CustomerLimitReached.into());
        }

        // The cap check lives in the UPDATE itself; two settlements racing
        // for the last unit cannot both see rows_affected == 1.
        let result = CouponEntity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::UsedCount.lt(coupon.max_usage_count))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(RuleViolation::CouponExhausted.into());
        }

        info!(%coupon_id, %customer_id, "coupon redeemed");
        Ok(())
    }
}

/// Number of settled orders (anything past DRAFT that was not cancelled) by
/// this customer referencing the coupon.
pub async fn settled_uses<C: ConnectionTrait>(
    conn: &C,
    coupon_id: Uuid,
    customer_id: Uuid,
) -> Result<i64, ServiceError> {
    let count = OrderEntity::find()
        .filter(order::Column::CouponId.eq(coupon_id))
        .filter(order::Column::CustomerId.eq(customer_id))
        .filter(order::Column::Status.is_not_in([OrderStatus::Draft, OrderStatus::Cancelled]))
        .count(conn)
        .await?;
    Ok(count as i64)
}

/// Pure validation, in the documented order: first failing check wins.
pub fn validate_coupon(
    coupon: &coupon::Model,
    offer: &discount_offer::Model,
    customer_settled_uses: i64,
    customer_id: Uuid,
    order_amount: Decimal,
    now: DateTime<Utc>,
) -> Result<(), RuleViolation> {
    if !coupon.is_active {
        return Err(RuleViolation::CouponInactive);
    }
    if let Some(exclusive) = coupon.exclusive_customer_id {
        if exclusive != customer_id {
            return Err(RuleViolation::CouponNotEligible);
        }
    }
    if !offer.is_active {
        return Err(RuleViolation::OfferInactive);
    }
    if now < offer.starts_at {
        return Err(RuleViolation::OfferNotStarted);
    }
    if now > offer.ends_at {
        return Err(RuleViolation::OfferExpired);
    }
    if order_amount < offer.min_order_amount {
        return Err(RuleViolation::BelowMinimumOrder);
    }
    if coupon.used_count >= coupon.max_usage_count {
        return Err(RuleViolation::CouponExhausted);
    }
    if customer_settled_uses >= i64::from(coupon.max_usage_per_user) {
        return Err(RuleViolation::CustomerLimitReached);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::discount_offer::DiscountType;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon_fixture() -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "WELCOME10".into(),
            offer_id: Uuid::new_v4(),
            max_usage_count: 100,
            used_count: 0,
            max_usage_per_user: 1,
            is_active: true,
            exclusive_customer_id: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn offer_fixture() -> discount_offer::Model {
        let now = Utc::now();
        discount_offer::Model {
            id: Uuid::new_v4(),
            name: "Welcome".into(),
            discount_type: DiscountType::Percentage,
            discount_value: dec!(10),
            min_order_amount: dec!(100),
            max_discount_amount: None,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            is_active: true,
            created_at: now,
            updated_at: None,
        }
    }

    #[test]
    fn valid_coupon_passes() {
        let customer = Uuid::new_v4();
        let result = validate_coupon(
            &coupon_fixture(),
            &offer_fixture(),
            0,
            customer,
            dec!(500),
            Utc::now(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn first_failing_check_wins() {
        let customer = Uuid::new_v4();
        let mut coupon = coupon_fixture();
        let mut offer = offer_fixture();

        // Both inactive flags set: the coupon check comes first.
        coupon.is_active = false;
        offer.is_active = false;
        assert_eq!(
            validate_coupon(&coupon, &offer, 0, customer, dec!(500), Utc::now()),
            Err(RuleViolation::CouponInactive)
        );

        // Offer inactive and expired: the active check comes before dates.
        let coupon = coupon_fixture();
        offer.ends_at = Utc::now() - Duration::days(2);
        assert_eq!(
            validate_coupon(&coupon, &offer, 0, customer, dec!(500), Utc::now()),
            Err(RuleViolation::OfferInactive)
        );
    }

    #[test]
    fn window_checks() {
        let customer = Uuid::new_v4();
        let coupon = coupon_fixture();
        let mut offer = offer_fixture();

        offer.starts_at = Utc::now() + Duration::days(1);
        offer.ends_at = Utc::now() + Duration::days(2);
        assert_eq!(
            validate_coupon(&coupon, &offer, 0, customer, dec!(500), Utc::now()),
            Err(RuleViolation::OfferNotStarted)
        );

        offer.starts_at = Utc::now() - Duration::days(2);
        offer.ends_at = Utc::now() - Duration::days(1);
        assert_eq!(
            validate_coupon(&coupon, &offer, 0, customer, dec!(500), Utc::now()),
            Err(RuleViolation::OfferExpired)
        );
    }

    #[test]
    fn minimum_order_enforced() {
        let customer = Uuid::new_v4();
        assert_eq!(
            validate_coupon(
                &coupon_fixture(),
                &offer_fixture(),
                0,
                customer,
                dec!(99.99),
                Utc::now()
            ),
            Err(RuleViolation::BelowMinimumOrder)
        );
    }

    #[test]
    fn usage_limits_enforced() {
        let customer = Uuid::new_v4();
        let mut coupon = coupon_fixture();
        coupon.used_count = coupon.max_usage_count;
        assert_eq!(
            validate_coupon(&coupon, &offer_fixture(), 0, customer, dec!(500), Utc::now()),
            Err(RuleViolation::CouponExhausted)
        );

        let coupon = coupon_fixture();
        assert_eq!(
            validate_coupon(&coupon, &offer_fixture(), 1, customer, dec!(500), Utc::now()),
            Err(RuleViolation::CustomerLimitReached)
        );
    }

    #[test]
    fn exclusive_coupon_rejects_other_customers() {
        let owner = Uuid::new_v4();
        let mut coupon = coupon_fixture();
        coupon.exclusive_customer_id = Some(owner);

        assert_eq!(
            validate_coupon(
                &coupon,
                &offer_fixture(),
                0,
                Uuid::new_v4(),
                dec!(500),
                Utc::now()
            ),
            Err(RuleViolation::CouponNotEligible)
        );
        assert!(validate_coupon(&coupon, &offer_fixture(), 0, owner, dec!(500), Utc::now()).is_ok());
    }
}
