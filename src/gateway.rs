use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Payment state as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Created,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    /// Order-scoped reference the gateway echoes back on verification.
    pub order_ref: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub payment_ref: String,
    pub redirect_url: Option<String>,
}

/// Verification result for a gateway payment reference.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub payment_ref: String,
    pub transaction_ref: String,
    pub status: GatewayPaymentStatus,
    pub amount: Decimal,
    pub method: String,
}

/// The external payment gateway, seen through the two calls the core makes.
/// Network latency lives behind this trait; settlement always finishes the
/// verify call before opening its transaction.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest)
        -> Result<GatewaySession, ServiceError>;

    async fn verify(&self, payment_ref: &str) -> Result<GatewayPayment, ServiceError>;
}

/// Production gateway client over HTTP.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order_ref = %request.order_ref, amount = %request.amount))]
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let url = format!("{}/v1/sessions", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("gateway unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "gateway session creation returned {}",
                response.status()
            )));
        }

        response
            .json::<GatewaySession>()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("malformed gateway response: {e}")))
    }

    #[instrument(skip(self))]
    async fn verify(&self, payment_ref: &str) -> Result<GatewayPayment, ServiceError> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_ref);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("gateway unreachable: {e}")))?;

        if response.status() == http::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "gateway payment {payment_ref} not found"
            )));
        }
        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "gateway verification returned {}",
                response.status()
            )));
        }

        response
            .json::<GatewayPayment>()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("malformed gateway response: {e}")))
    }
}
