use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::entities::{order, payment};
use crate::errors::ServiceError;
use crate::gateway::GatewaySession;
use crate::notify::SignatureGenerator;
use crate::{ApiResponse, AppState};

pub const TIMESTAMP_HEADER: &str = "x-gateway-timestamp";
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub order_id: Uuid,
    pub payment_ref: String,
}

#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub order: order::Model,
    pub payment: payment::Model,
    pub replayed: bool,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<GatewaySession>>, ServiceError> {
    let session = state.services.settlement.create_session(order_id).await?;
    Ok(Json(ApiResponse::success(session)))
}

/// Settlement callback from the gateway. The body is authenticated with an
/// HMAC over `timestamp.body` when a webhook secret is configured; the
/// payment itself is still verified against the gateway before any state
/// moves, so the signature is a gate, not the source of truth.
pub async fn settle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = &state.config.gateway_webhook_secret {
        verify_signature(secret, &headers, &body)?;
    }

    let request: SettleRequest = serde_json::from_str(&body)
        .map_err(|e| ServiceError::ValidationError(format!("malformed settle payload: {e}")))?;

    let outcome = state
        .services
        .settlement
        .settle(request.order_id, &request.payment_ref)
        .await?;

    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(ApiResponse::success(SettleResponse {
            order: outcome.order,
            payment: outcome.payment,
            replayed: outcome.replayed,
        })),
    ))
}

fn verify_signature(
    secret: &str,
    headers: &HeaderMap,
    body: &str,
) -> Result<(), ServiceError> {
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("missing {TIMESTAMP_HEADER} header"))
        })?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("missing {SIGNATURE_HEADER} header"))
        })?;

    let signer = SignatureGenerator::new(secret.to_string());
    if !signer.verify_payload(timestamp, body, signature) {
        warn!("settlement webhook signature mismatch");
        return Err(ServiceError::ValidationError(
            "invalid webhook signature".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn signature_gate_accepts_signed_and_rejects_unsigned() {
        let secret = "whsec";
        let body = r#"{"order_id":"00000000-0000-0000-0000-000000000000","payment_ref":"pay_1"}"#;
        let signature = SignatureGenerator::new(secret.to_string()).sign_payload("1700000000", body);

        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("1700000000"));
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
        assert!(verify_signature(secret, &headers, body).is_ok());

        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("deadbeef"));
        assert!(verify_signature(secret, &headers, body).is_err());

        let empty = HeaderMap::new();
        assert!(verify_signature(secret, &empty, body).is_err());
    }
}
