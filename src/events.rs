use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::notify::NotificationClient;

/// Events emitted by the core after state changes commit. Consumers are
/// strictly downstream: a failed notification never rolls back a transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderDrafted(Uuid),
    OrderConfirmed(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled(Uuid),
    OrdersDeleted(Vec<Uuid>),
    PaymentRecorded {
        order_id: Uuid,
        transaction_ref: String,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
    },
    /// Payment recorded but the stock commit failed; manual reconciliation.
    SettlementUnfulfilled {
        order_id: Uuid,
        product_id: Uuid,
    },
}

impl Event {
    /// Customer-facing notification type for this event, if it has one.
    fn notification(&self) -> Option<(Uuid, &'static str)> {
        match self {
            Event::OrderConfirmed(order_id) => Some((*order_id, "confirmed")),
            Event::OrderStatusChanged {
                order_id,
                new_status: OrderStatus::Shipped,
                ..
            } => Some((*order_id, "shipped")),
            Event::OrderStatusChanged {
                order_id,
                new_status: OrderStatus::OutForDelivery,
                ..
            } => Some((*order_id, "out_for_delivery")),
            Event::OrderStatusChanged {
                order_id,
                new_status: OrderStatus::Delivered,
                ..
            } => Some((*order_id, "delivered")),
            Event::OrderCancelled(order_id) => Some((*order_id, "cancelled")),
            Event::SettlementUnfulfilled { order_id, .. } => {
                Some((*order_id, "settlement_unfulfilled"))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging every event and dispatching
/// fire-and-forget notifications for the customer-facing ones.
pub async fn process_events(
    mut receiver: mpsc::Receiver<Event>,
    notifier: Option<Arc<NotificationClient>>,
) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "processing event");

        if let (Some(notifier), Some((order_id, kind))) = (&notifier, event.notification()) {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(order_id, kind).await {
                    warn!(%order_id, kind, error = %e, "notification delivery failed");
                }
            });
        }
    }
    info!("event channel closed; event processor shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_and_fulfillment_events_notify() {
        let id = Uuid::new_v4();
        assert_eq!(
            Event::OrderConfirmed(id).notification(),
            Some((id, "confirmed"))
        );
        assert_eq!(
            Event::OrderStatusChanged {
                order_id: id,
                old_status: OrderStatus::Shipped,
                new_status: OrderStatus::Delivered,
            }
            .notification(),
            Some((id, "delivered"))
        );
        assert_eq!(Event::OrderDrafted(id).notification(), None);
        assert_eq!(
            Event::PaymentRecorded {
                order_id: id,
                transaction_ref: "tx".into()
            }
            .notification(),
            None
        );
    }
}
