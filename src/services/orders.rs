use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::coupon;
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_line::{self, Entity as OrderLineEntity};
use crate::entities::payment::{self, Entity as PaymentEntity};
use crate::entities::product::Entity as ProductEntity;
use crate::errors::{RuleViolation, ServiceError};
use crate::events::{Event, EventSender};
use crate::services::coupons::CouponService;
use crate::services::pricing::{self, CartLine, DiscountTerms, PriceQuote};
use crate::services::settings::SettingsService;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "Order must contain at least one line"))]
    pub lines: Vec<OrderLineRequest>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// A cart priced once at draft-creation time. Unit prices are catalog
/// snapshots; later catalog edits never reprice this cart.
#[derive(Debug, Clone)]
pub struct PricedCart {
    pub quote: PriceQuote,
    pub lines: Vec<PricedLine>,
    pub coupon: Option<coupon::Model>,
}

#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
    coupons: CouponService,
    settings: SettingsService,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        let coupons = CouponService::new(db.clone());
        let settings = SettingsService::new(db.clone());
        Self {
            db,
            event_sender,
            coupons,
            settings,
        }
    }

    /// Prices a cart against the current catalog, settings, and (advisory)
    /// coupon state. Shared by the quote endpoint and draft creation.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn price_cart(&self, request: &CreateOrderRequest) -> Result<PricedCart, ServiceError> {
        request.validate()?;
        for line in &request.lines {
            if line.quantity == 0 {
                return Err(ServiceError::ValidationError(
                    "line quantity must be positive".to_string(),
                ));
            }
        }

        let mut cart_lines = Vec::with_capacity(request.lines.len());
        let mut priced_lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = ProductEntity::find_by_id(line.product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("product {} not found", line.product_id))
                })?;

            let quantity = i32::try_from(line.quantity).map_err(|_| {
                ServiceError::ValidationError("line quantity out of range".to_string())
            })?;
            // Advisory only, like the coupon check: nothing is held, and the
            // authoritative decrement happens at settlement.
            if product.stock_quantity < quantity {
                return Err(RuleViolation::InsufficientStock {
                    product_id: product.id,
                    available: product.stock_quantity,
                }
                .into());
            }
            cart_lines.push(CartLine {
                unit_price: product.price,
                quantity: line.quantity,
            });
            priced_lines.push(PricedLine {
                product_id: product.id,
                quantity,
                unit_price: product.price,
                line_total: product.price * Decimal::from(quantity),
            });
        }

        let subtotal: Decimal = priced_lines.iter().map(|l| l.line_total).sum();

        let (coupon, terms) = match &request.coupon_code {
            Some(code) => {
                let (coupon, offer) = self
                    .coupons
                    .check(code, request.customer_id, subtotal, Utc::now())
                    .await?;
                let terms = DiscountTerms::from(&offer);
                (Some(coupon), Some(terms))
            }
            None => (None, None),
        };

        let settings = self.settings.pricing_settings().await?;
        let quote = pricing::quote(&cart_lines, terms.as_ref(), &settings)?;

        Ok(PricedCart {
            quote,
            lines: priced_lines,
            coupon,
        })
    }

    /// Creates a DRAFT order from a priced cart. No stock is held and no
    /// coupon usage is consumed; both happen at settlement.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_draft(
        &self,
        request: CreateOrderRequest,
    ) -> Result<(order::Model, Vec<order_line::Model>), ServiceError> {
        let cart = self.price_cart(&request).await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number(now);

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(request.customer_id),
            status: Set(OrderStatus::Draft),
            subtotal: Set(cart.quote.subtotal),
            discount: Set(cart.quote.discount),
            tax: Set(cart.quote.tax),
            shipping: Set(cart.quote.shipping),
            total: Set(cart.quote.total),
            coupon_id: Set(cart.coupon.as_ref().map(|c| c.id)),
            tracking_number: Set(None),
            unfulfilled: Set(false),
            ordered_at: Set(now),
            delivered_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(cart.lines.len());
        for priced in &cart.lines {
            let line = order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(priced.product_id),
                quantity: Set(priced.quantity),
                unit_price: Set(priced.unit_price),
                line_total: Set(priced.line_total),
            }
            .insert(&txn)
            .await?;
            lines.push(line);
        }

        txn.commit().await?;

        info!(%order_id, %order_number, customer_id = %request.customer_id, "draft order created");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderDrafted(order_id)).await {
                warn!(%order_id, error = %e, "failed to send order drafted event");
            }
        }

        Ok((order, lines))
    }

    #[instrument(skip(self), fields(%order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<(order::Model, Vec<order_line::Model>)>, ServiceError> {
        let order = match OrderEntity::find_by_id(order_id).one(&*self.db).await? {
            Some(order) => order,
            None => return Ok(None),
        };
        let lines = order.find_related(OrderLineEntity).all(&*self.db).await?;
        Ok(Some((order, lines)))
    }

    /// Lists orders newest-first with pagination.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Bulk hard delete. Only DRAFT and CANCELLED orders may be deleted;
    /// a single settled order in the batch rejects the whole request so
    /// financial history is never partially erased.
    #[instrument(skip(self), fields(count = order_ids.len()))]
    pub async fn delete_orders(&self, order_ids: Vec<Uuid>) -> Result<u64, ServiceError> {
        if order_ids.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await?;

        let orders = OrderEntity::find()
            .filter(order::Column::Id.is_in(order_ids.clone()))
            .all(&txn)
            .await?;

        if orders.len() != order_ids.len() {
            return Err(ServiceError::NotFound(
                "one or more orders not found".to_string(),
            ));
        }
        for order in &orders {
            if !order.status.is_deletable() {
                return Err(RuleViolation::NotDeletable {
                    status: order.status,
                }
                .into());
            }
        }

        PaymentEntity::delete_many()
            .filter(payment::Column::OrderId.is_in(order_ids.clone()))
            .exec(&txn)
            .await?;
        OrderLineEntity::delete_many()
            .filter(order_line::Column::OrderId.is_in(order_ids.clone()))
            .exec(&txn)
            .await?;
        let deleted = OrderEntity::delete_many()
            .filter(order::Column::Id.is_in(order_ids.clone()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(deleted = deleted.rows_affected, "orders deleted");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrdersDeleted(order_ids)).await {
                warn!(error = %e, "failed to send orders deleted event");
            }
        }

        Ok(deleted.rows_affected)
    }
}

/// Human-readable, date-prefixed, collision-free under the unique index.
fn generate_order_number(now: chrono::DateTime<Utc>) -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("SO-{}-{}", now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_are_date_prefixed_and_distinct() {
        let now = Utc::now();
        let a = generate_order_number(now);
        let b = generate_order_number(now);
        assert!(a.starts_with(&format!("SO-{}-", now.format("%Y%m%d"))));
        assert_eq!(a.len(), b.len());
        assert_ne!(a, b);
    }

    #[test]
    fn empty_cart_fails_validation() {
        let request = CreateOrderRequest {
            customer_id: Uuid::new_v4(),
            lines: vec![],
            coupon_code: None,
        };
        assert!(request.validate().is_err());
    }
}
