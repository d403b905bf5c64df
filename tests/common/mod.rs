#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use storefront_api::entities::{coupon, discount_offer, product, system_setting};
use storefront_api::entities::discount_offer::DiscountType;
use storefront_api::errors::ServiceError;
use storefront_api::gateway::{
    GatewayPayment, GatewayPaymentStatus, GatewaySession, PaymentGateway, SessionRequest,
};
use storefront_api::services::orders::{CreateOrderRequest, OrderLineRequest, OrderService};
use storefront_api::{db, entities::order};

static TRACING: Lazy<()> = Lazy::new(|| {
    storefront_api::config::init_tracing("warn", false);
});

/// Fresh in-memory database with the full schema applied.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    Lazy::force(&TRACING);
    let conn = db::establish_connection("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    db::run_migrations(&conn).await.expect("migrations failed");
    Arc::new(conn)
}

pub async fn seed_product(
    db: &DatabaseConnection,
    name: &str,
    price: Decimal,
    stock: i32,
) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        price: Set(price),
        stock_quantity: Set(stock),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("failed to seed product")
}

/// Overwrites a product's on-hand quantity, e.g. to simulate stock consumed
/// by another channel between draft and settlement.
pub async fn set_stock(db: &DatabaseConnection, product_id: Uuid, stock: i32) {
    use sea_orm::ActiveValue;

    product::ActiveModel {
        id: ActiveValue::Unchanged(product_id),
        stock_quantity: Set(stock),
        ..Default::default()
    }
    .update(db)
    .await
    .expect("failed to update stock");
}

pub async fn seed_setting(db: &DatabaseConnection, key: &str, value: &str) {
    system_setting::ActiveModel {
        key: Set(key.to_string()),
        value: Set(value.to_string()),
    }
    .insert(db)
    .await
    .expect("failed to seed setting");
}

pub async fn seed_pricing_settings(db: &DatabaseConnection, tax_percent: &str, shipping: &str) {
    seed_setting(db, "tax_rate_percent", tax_percent).await;
    seed_setting(db, "shipping_fee", shipping).await;
}

pub struct OfferParams {
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_amount: Decimal,
    pub max_discount_amount: Option<Decimal>,
}

pub async fn seed_offer(db: &DatabaseConnection, params: OfferParams) -> discount_offer::Model {
    let now = Utc::now();
    discount_offer::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("test offer".to_string()),
        discount_type: Set(params.discount_type),
        discount_value: Set(params.value),
        min_order_amount: Set(params.min_order_amount),
        max_discount_amount: Set(params.max_discount_amount),
        starts_at: Set(now - Duration::days(1)),
        ends_at: Set(now + Duration::days(30)),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("failed to seed offer")
}

pub async fn seed_coupon(
    db: &DatabaseConnection,
    offer_id: Uuid,
    code: &str,
    max_usage_count: i32,
    max_usage_per_user: i32,
) -> coupon::Model {
    coupon::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        offer_id: Set(offer_id),
        max_usage_count: Set(max_usage_count),
        used_count: Set(0),
        max_usage_per_user: Set(max_usage_per_user),
        is_active: Set(true),
        exclusive_customer_id: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("failed to seed coupon")
}

/// Creates a DRAFT order for one product through the real order service.
pub async fn draft_order(
    db: Arc<DatabaseConnection>,
    customer_id: Uuid,
    product_id: Uuid,
    quantity: u32,
    coupon_code: Option<&str>,
) -> order::Model {
    let service = OrderService::new(db, None);
    let (order, _lines) = service
        .create_draft(CreateOrderRequest {
            customer_id,
            lines: vec![OrderLineRequest {
                product_id,
                quantity,
            }],
            coupon_code: coupon_code.map(str::to_string),
        })
        .await
        .expect("failed to create draft order");
    order
}

/// In-process gateway double. Payments are registered by reference before
/// the test calls settle.
#[derive(Default)]
pub struct MockGateway {
    payments: Mutex<HashMap<String, GatewayPayment>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, payment: GatewayPayment) {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.payment_ref.clone(), payment);
    }

    pub fn register_success(&self, payment_ref: &str, transaction_ref: &str, amount: Decimal) {
        self.register(GatewayPayment {
            payment_ref: payment_ref.to_string(),
            transaction_ref: transaction_ref.to_string(),
            status: GatewayPaymentStatus::Success,
            amount,
            method: "card".to_string(),
        });
    }

    pub fn register_pending(&self, payment_ref: &str, transaction_ref: &str, amount: Decimal) {
        self.register(GatewayPayment {
            payment_ref: payment_ref.to_string(),
            transaction_ref: transaction_ref.to_string(),
            status: GatewayPaymentStatus::Created,
            amount,
            method: "card".to_string(),
        });
    }

    pub fn register_failed(&self, payment_ref: &str, transaction_ref: &str, amount: Decimal) {
        self.register(GatewayPayment {
            payment_ref: payment_ref.to_string(),
            transaction_ref: transaction_ref.to_string(),
            status: GatewayPaymentStatus::Failed,
            amount,
            method: "card".to_string(),
        });
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let payment_ref = format!("sess_{}", request.order_ref);
        Ok(GatewaySession {
            payment_ref,
            redirect_url: Some("https://gateway.test/pay".to_string()),
        })
    }

    async fn verify(&self, payment_ref: &str) -> Result<GatewayPayment, ServiceError> {
        self.payments
            .lock()
            .unwrap()
            .get(payment_ref)
            .cloned()
            .ok_or_else(|| {
                ServiceError::NotFound(format!("gateway payment {payment_ref} not found"))
            })
    }
}
