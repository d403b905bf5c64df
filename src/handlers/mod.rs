use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod checkout;
pub mod health;
pub mod orders;
pub mod payments;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/checkout/quote", post(checkout::quote))
        .route("/checkout/orders", post(checkout::create_order))
        .route("/orders", get(orders::list_orders))
        .route("/orders", delete(orders::delete_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", post(orders::update_status))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/payments/:order_id/session", post(payments::create_session))
        .route("/payments/settle", post(payments::settle))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
