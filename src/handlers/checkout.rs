use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::entities::{order, order_line};
use crate::errors::ServiceError;
use crate::services::orders::CreateOrderRequest;
use crate::services::pricing::PriceQuote;
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub struct OrderWithLines {
    #[serde(flatten)]
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
}

/// Prices a cart without creating anything. The quote is advisory: coupon
/// validity and stock are only guaranteed at settlement.
pub async fn quote(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<PriceQuote>>, ServiceError> {
    let cart = state.services.orders.price_cart(&request).await?;
    Ok(Json(ApiResponse::success(cart.quote)))
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, lines) = state.services.orders.create_draft(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OrderWithLines { order, lines })),
    ))
}
