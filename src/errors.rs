use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Standard JSON error body returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable rule code for business-rule rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// A business rule the request ran into. Each variant is a distinct,
/// machine-readable reason; the coupon variants are ordered the way the
/// ledger checks them (first failing check wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RuleViolation {
    #[error("coupon code not found")]
    CouponNotFound,
    #[error("coupon is not active")]
    CouponInactive,
    #[error("coupon is reserved for another customer")]
    CouponNotEligible,
    #[error("offer is not active")]
    OfferInactive,
    #[error("offer has not started yet")]
    OfferNotStarted,
    #[error("offer has expired")]
    OfferExpired,
    #[error("order amount is below the offer minimum")]
    BelowMinimumOrder,
    #[error("coupon usage limit reached")]
    CouponExhausted,
    #[error("per-customer coupon usage limit reached")]
    CustomerLimitReached,
    #[error("insufficient stock for product {product_id}: {available} available")]
    InsufficientStock { product_id: Uuid, available: i32 },
    #[error("invalid order status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("payment was not successful at the gateway")]
    PaymentNotSuccessful,
    #[error("order in status {status} cannot be deleted")]
    NotDeletable { status: OrderStatus },
}

impl RuleViolation {
    /// Stable code string exposed in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CouponNotFound => "coupon_not_found",
            Self::CouponInactive => "coupon_inactive",
            Self::CouponNotEligible => "coupon_not_eligible",
            Self::OfferInactive => "offer_inactive",
            Self::OfferNotStarted => "offer_not_started",
            Self::OfferExpired => "offer_expired",
            Self::BelowMinimumOrder => "below_minimum_order",
            Self::CouponExhausted => "coupon_exhausted",
            Self::CustomerLimitReached => "customer_limit_reached",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::PaymentNotSuccessful => "payment_not_successful",
            Self::NotDeletable { .. } => "order_not_deletable",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Well-formed request that a business rule rejects; no state changed.
    #[error("{0}")]
    BusinessRule(#[from] RuleViolation),

    /// Concurrent modification detected; the caller should retry the whole
    /// operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Gateway or other external dependency unreachable; retriable, the
    /// order stays DRAFT.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// An amount mismatch between gateway and order, or a broken pricing
    /// identity. Should never occur; fail fast.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for the error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::BusinessRule(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::InvariantViolation(_)
            | Self::EventError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for HTTP responses. Internal errors stay generic so
    /// implementation details never leak.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::EventError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = match &self {
            ServiceError::BusinessRule(rule) => Some(rule.code().to_string()),
            _ => None,
        };

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// Gateway-reported payment amounts that disagree with the order total are
/// rejected before anything is written.
pub fn amount_mismatch(expected: Decimal, paid: Decimal) -> ServiceError {
    ServiceError::InvariantViolation(format!(
        "gateway amount {paid} does not match order total {expected}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rules_map_to_unprocessable_entity() {
        let err = ServiceError::BusinessRule(RuleViolation::CouponExhausted);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ServiceError::Conflict("order already settling".into());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn database_errors_do_not_leak_details() {
        let err = ServiceError::DatabaseError(sea_orm::DbErr::Custom("secret dsn".into()));
        assert_eq!(err.response_message(), "Database error");
    }

    #[test]
    fn rule_codes_are_stable() {
        assert_eq!(RuleViolation::CouponExhausted.code(), "coupon_exhausted");
        assert_eq!(
            RuleViolation::InsufficientStock {
                product_id: Uuid::nil(),
                available: 0
            }
            .code(),
            "insufficient_stock"
        );
    }
}
