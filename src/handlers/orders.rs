use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus};
use crate::errors::ServiceError;
use crate::handlers::checkout::OrderWithLines;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteOrdersRequest {
    pub order_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DeleteOrdersResponse {
    pub deleted: u64,
}

fn parse_status(status: &str) -> Result<OrderStatus, ServiceError> {
    match status.to_ascii_lowercase().as_str() {
        "draft" => Ok(OrderStatus::Draft),
        "confirmed" => Ok(OrderStatus::Confirmed),
        "processing" => Ok(OrderStatus::Processing),
        "shipped" => Ok(OrderStatus::Shipped),
        "out_for_delivery" => Ok(OrderStatus::OutForDelivery),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        "completed" => Ok(OrderStatus::Completed),
        other => Err(ServiceError::ValidationError(format!(
            "unknown order status: {other}"
        ))),
    }
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let per_page = query.per_page.clamp(1, 100);
    let (orders, total) = state
        .services
        .orders
        .list_orders(query.page.max(1), per_page)
        .await?;
    Ok(Json(ApiResponse::success(OrderListResponse {
        orders,
        total,
        page: query.page.max(1),
        per_page,
    })))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderWithLines>>, ServiceError> {
    let (order, lines) = state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {id} not found")))?;
    Ok(Json(ApiResponse::success(OrderWithLines { order, lines })))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let new_status = parse_status(&request.status)?;
    let order = state
        .services
        .status
        .update_status(id, new_status, request.tracking_number)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let order = state.services.status.cancel(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn delete_orders(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteOrdersRequest>,
) -> Result<Json<ApiResponse<DeleteOrdersResponse>>, ServiceError> {
    let deleted = state
        .services
        .orders
        .delete_orders(request.order_ids)
        .await?;
    Ok(Json(ApiResponse::success(DeleteOrdersResponse { deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(parse_status("shipped").unwrap(), OrderStatus::Shipped);
        assert_eq!(
            parse_status("OUT_FOR_DELIVERY").unwrap(),
            OrderStatus::OutForDelivery
        );
        assert_eq!(parse_status("canceled").unwrap(), OrderStatus::Cancelled);
        assert!(parse_status("refunded").is_err());
    }
}
