//! Payment settlement.
//!
//! The settlement transaction is the only path from DRAFT to CONFIRMED and
//! the only place coupon usage and stock are consumed. The gateway verify
//! call always completes before the transaction opens so no lock is held
//! across network latency.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_line::{self, Entity as OrderLineEntity};
use crate::entities::payment::{self, Entity as PaymentEntity, PaymentStatus};
use crate::errors::{amount_mismatch, RuleViolation, ServiceError};
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayPaymentStatus, GatewaySession, PaymentGateway, SessionRequest};
use crate::services::coupons::CouponService;
use crate::services::stock::{self, StockLine};

/// Result of a settlement attempt that recorded (or re-observed) a
/// completed payment.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub order: order::Model,
    pub payment: payment::Model,
    /// True when this transaction reference was already settled and the
    /// stored result is returned unchanged.
    pub replayed: bool,
}

#[derive(Clone)]
pub struct SettlementService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
    currency: String,
}

impl SettlementService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            currency,
        }
    }

    /// Opens a gateway payment session for a DRAFT order. Repeat calls open
    /// fresh sessions; abandoned ones are the gateway's problem.
    #[instrument(skip(self), fields(%order_id))]
    pub async fn create_session(&self, order_id: Uuid) -> Result<GatewaySession, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))?;

        if order.status != OrderStatus::Draft {
            return Err(ServiceError::Conflict(format!(
                "order {} is {} and cannot start a payment session",
                order.order_number, order.status
            )));
        }

        let session = self
            .gateway
            .create_session(&SessionRequest {
                order_ref: order.order_number.clone(),
                amount: order.total,
                currency: self.currency.clone(),
                customer_id: order.customer_id,
            })
            .await?;

        info!(%order_id, payment_ref = %session.payment_ref, "payment session created");
        Ok(session)
    }

    /// Settles an order against a gateway payment reference.
    ///
    /// Verification happens first, outside any transaction. The transaction
    /// then re-validates the coupon, consumes its usage, flips the order
    /// DRAFT to CONFIRMED, commits stock, and records the payment. A stock
    /// shortfall does not fail the settlement: the payment is real money, so
    /// the order confirms with `unfulfilled` set for manual handling. Any
    /// other failure rolls the whole transaction back and the order stays
    /// DRAFT.
    #[instrument(skip(self), fields(%order_id))]
    pub async fn settle(
        &self,
        order_id: Uuid,
        payment_ref: &str,
    ) -> Result<SettlementOutcome, ServiceError> {
        let verified = self.gateway.verify(payment_ref).await?;

        if verified.status != GatewayPaymentStatus::Success {
            self.record_unsuccessful(order_id, &verified.transaction_ref, &verified)
                .await?;
            return Err(RuleViolation::PaymentNotSuccessful.into());
        }

        // Replay fast path before opening the transaction.
        if let Some(outcome) = self
            .find_settled(&*self.db, order_id, &verified.transaction_ref)
            .await?
        {
            info!(%order_id, transaction_ref = %verified.transaction_ref, "settlement replayed");
            return Ok(outcome);
        }

        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))?;

        if order.status != OrderStatus::Draft {
            // Lost a race with another settlement of the same order. If it
            // was this very transaction reference, that is a replay.
            if let Some(outcome) = self
                .find_settled(&txn, order_id, &verified.transaction_ref)
                .await?
            {
                return Ok(outcome);
            }
            return Err(ServiceError::Conflict(format!(
                "order {} is already {}",
                order.order_number, order.status
            )));
        }

        if verified.amount != order.total {
            return Err(amount_mismatch(order.total, verified.amount));
        }

        // Coupon usage moves while the order is still DRAFT, so this order
        // cannot count against its own customer's limit.
        if let Some(coupon_id) = order.coupon_id {
            CouponService::redeem(&txn, coupon_id, order.customer_id).await?;
        }

        let now = Utc::now();
        let confirmed = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Confirmed))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Draft))
            .exec(&txn)
            .await?;
        if confirmed.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "order {} was settled concurrently",
                order.order_number
            )));
        }

        let lines = OrderLineEntity::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        let stock_lines: Vec<StockLine> = lines.iter().map(StockLine::from).collect();

        // The stock commit runs on a savepoint: a shortfall unwinds the
        // partial decrements but keeps the confirmation and the payment.
        let mut unfulfilled_product = None;
        let stock_txn = txn.begin().await?;
        match stock::commit(&stock_txn, &stock_lines).await {
            Ok(()) => stock_txn.commit().await?,
            Err(ServiceError::BusinessRule(RuleViolation::InsufficientStock {
                product_id,
                available,
            })) => {
                stock_txn.rollback().await?;
                warn!(%order_id, %product_id, available, "stock shortfall at settlement");
                OrderEntity::update_many()
                    .col_expr(order::Column::Unfulfilled, Expr::value(true))
                    .filter(order::Column::Id.eq(order_id))
                    .exec(&txn)
                    .await?;
                unfulfilled_product = Some(product_id);
            }
            Err(e) => return Err(e),
        }

        // An earlier verification of this reference may have left a PENDING
        // or FAILED audit row in the (order_id, transaction_ref) slot; the
        // upsert promotes it to COMPLETED instead of colliding with it. No
        // COMPLETED row can occupy the slot here: that would mean the order
        // already left DRAFT, and the conditional flip above just succeeded.
        let recorded = PaymentEntity::insert(payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            amount: Set(verified.amount),
            method: Set(verified.method.clone()),
            status: Set(PaymentStatus::Completed),
            transaction_ref: Set(verified.transaction_ref.clone()),
            created_at: Set(now),
        })
        .on_conflict(
            OnConflict::columns([payment::Column::OrderId, payment::Column::TransactionRef])
                .update_columns([
                    payment::Column::Amount,
                    payment::Column::Method,
                    payment::Column::Status,
                    payment::Column::CreatedAt,
                ])
                .to_owned(),
        )
        .exec_with_returning(&txn)
        .await?;

        txn.commit().await?;

        let settled = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::InternalError("order vanished after settlement".into()))?;

        info!(
            %order_id,
            order_number = %settled.order_number,
            transaction_ref = %verified.transaction_ref,
            unfulfilled = settled.unfulfilled,
            "order settled"
        );

        self.emit_settled(&settled, &recorded, unfulfilled_product)
            .await;

        Ok(SettlementOutcome {
            order: settled,
            payment: recorded,
            replayed: false,
        })
    }

    /// Looks up a previously recorded settlement of this transaction
    /// reference, returning the stored order and payment unchanged.
    async fn find_settled<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        transaction_ref: &str,
    ) -> Result<Option<SettlementOutcome>, ServiceError> {
        let existing = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::TransactionRef.eq(transaction_ref))
            .filter(payment::Column::Status.eq(PaymentStatus::Completed))
            .one(conn)
            .await?;

        let Some(existing) = existing else {
            return Ok(None);
        };
        let order = OrderEntity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!("payment {} has no order", existing.id))
            })?;
        Ok(Some(SettlementOutcome {
            order,
            payment: existing,
            replayed: true,
        }))
    }

    /// Keeps an audit row for gateway payments that verified as pending or
    /// failed. Idempotent: re-checking the same reference is a no-op.
    async fn record_unsuccessful(
        &self,
        order_id: Uuid,
        transaction_ref: &str,
        verified: &crate::gateway::GatewayPayment,
    ) -> Result<(), ServiceError> {
        let status = match verified.status {
            GatewayPaymentStatus::Created => PaymentStatus::Pending,
            _ => PaymentStatus::Failed,
        };
        let insert = PaymentEntity::insert(payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            amount: Set(verified.amount),
            method: Set(verified.method.clone()),
            status: Set(status),
            transaction_ref: Set(transaction_ref.to_string()),
            created_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::columns([payment::Column::OrderId, payment::Column::TransactionRef])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&*self.db)
        .await;

        match insert {
            Ok(_) | Err(sea_orm::DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn emit_settled(
        &self,
        order: &order::Model,
        recorded: &payment::Model,
        unfulfilled_product: Option<Uuid>,
    ) {
        let Some(sender) = &self.event_sender else {
            return;
        };

        let mut events = vec![
            Event::OrderConfirmed(order.id),
            Event::PaymentRecorded {
                order_id: order.id,
                transaction_ref: recorded.transaction_ref.clone(),
            },
        ];
        if let Some(coupon_id) = order.coupon_id {
            events.push(Event::CouponRedeemed {
                coupon_id,
                order_id: order.id,
            });
        }
        if let Some(product_id) = unfulfilled_product {
            events.push(Event::SettlementUnfulfilled {
                order_id: order.id,
                product_id,
            });
        }

        for event in events {
            if let Err(e) = sender.send(event).await {
                warn!(order_id = %order.id, error = %e, "failed to send settlement event");
            }
        }
    }
}
