//! Storefront order backend: cart pricing, coupon redemption, stock
//! reservation, the order state machine, and payment settlement.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod notify;
pub mod services;

use gateway::PaymentGateway;
use services::order_status::OrderStatusService;
use services::orders::OrderService;
use services::settlement::SettlementService;

/// Services wired once at startup and shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub status: OrderStatusService,
    pub settlement: SettlementService,
}

/// Shared application state handed to every handler.
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        payment_gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<events::EventSender>>,
    ) -> Self {
        let services = AppServices {
            orders: OrderService::new(db.clone(), event_sender.clone()),
            status: OrderStatusService::new(db.clone(), event_sender.clone()),
            settlement: SettlementService::new(
                db.clone(),
                payment_gateway,
                event_sender,
                config.currency.clone(),
            ),
        };
        Self {
            db,
            config,
            services,
        }
    }
}

/// Uniform JSON envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
