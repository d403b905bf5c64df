//! Order state machine for administrative transitions.
//!
//! DRAFT→CONFIRMED is deliberately absent here: that edge belongs to the
//! settlement handler, which needs the stock commit and coupon redemption in
//! the same transaction.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::errors::{RuleViolation, ServiceError};
use crate::events::{Event, EventSender};

/// Whether an admin may move an order between these two statuses.
///
/// Forward moves along the fulfillment chain are allowed, including skips;
/// backward moves are not. Any non-terminal order can be cancelled. Nothing
/// leaves a terminal status.
pub fn is_admin_transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    if from.is_terminal() || from == to {
        return false;
    }
    if to == OrderStatus::Cancelled {
        return true;
    }
    // Payment settlement is the only way into CONFIRMED.
    if to == OrderStatus::Confirmed || to == OrderStatus::Draft {
        return false;
    }
    match (from.fulfillment_rank(), to.fulfillment_rank()) {
        (Some(from_rank), Some(to_rank)) => to_rank > from_rank,
        _ => false,
    }
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Applies an administrative status transition. The write is guarded by
    /// the order's version, so a concurrent admin edit surfaces as a
    /// `Conflict` instead of silently overwriting.
    #[instrument(skip(self), fields(%order_id, %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let current = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))?;

        let old_status = current.status;
        if !is_admin_transition_allowed(old_status, new_status) {
            return Err(RuleViolation::InvalidTransition {
                from: old_status,
                to: new_status,
            }
            .into());
        }

        let now = Utc::now();
        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(current.version));

        if let Some(tracking) = tracking_number {
            update = update.col_expr(order::Column::TrackingNumber, Expr::value(tracking));
        }
        if new_status == OrderStatus::Delivered {
            update = update.col_expr(order::Column::DeliveredAt, Expr::value(now));
        }

        let result = update.exec(&txn).await?;
        if result.rows_affected == 0 {
            warn!(%order_id, "version mismatch during status update");
            return Err(ServiceError::Conflict(format!(
                "order {order_id} was modified concurrently"
            )));
        }

        let updated = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("order vanished mid-update".into()))?;

        txn.commit().await?;

        info!(%order_id, %old_status, %new_status, "order status updated");

        if let Some(sender) = &self.event_sender {
            let event = if new_status == OrderStatus::Cancelled {
                Event::OrderCancelled(order_id)
            } else {
                Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                }
            };
            if let Err(e) = sender.send(event).await {
                warn!(%order_id, error = %e, "failed to send status change event");
            }
        }

        Ok(updated)
    }

    /// Cancels a non-terminal order. Stock and coupon usage are deliberately
    /// not rolled back; see the design notes.
    #[instrument(skip(self), fields(%order_id))]
    pub async fn cancel(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.update_status(order_id, OrderStatus::Cancelled, None)
            .await
    }
}
