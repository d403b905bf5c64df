use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Signs outbound notification payloads so the receiver can authenticate us.
pub struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn sign_payload(&self, timestamp: &str, body: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of an inbound signature against the payload.
    pub fn verify_payload(&self, timestamp: &str, body: &str, signature: &str) -> bool {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    order_id: Uuid,
    event_type: &'a str,
}

/// Outbound notification sender. The transport is an HTTP webhook; delivery
/// is best-effort and the caller treats failures as log-only.
pub struct NotificationClient {
    client: reqwest::Client,
    endpoint: String,
    signature: Option<SignatureGenerator>,
}

impl NotificationClient {
    pub fn new(endpoint: String, secret: Option<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init failed: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            signature: secret.map(SignatureGenerator::new),
        })
    }

    #[instrument(skip(self), fields(%order_id, event_type))]
    pub async fn notify(&self, order_id: Uuid, event_type: &str) -> Result<(), ServiceError> {
        let payload = NotificationPayload {
            order_id,
            event_type,
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json");

        if let Some(signer) = &self.signature {
            let timestamp = chrono::Utc::now().timestamp().to_string();
            let signature = signer.sign_payload(&timestamp, &body);
            request = request
                .header("x-notify-timestamp", timestamp)
                .header("x-notify-signature", signature);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "notification endpoint returned {}",
                response.status()
            )));
        }

        debug!(%order_id, event_type, "notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_keyed() {
        let signer = SignatureGenerator::new("secret".into());
        let a = signer.sign_payload("1700000000", "{}");
        let b = signer.sign_payload("1700000000", "{}");
        assert_eq!(a, b);

        let other = SignatureGenerator::new("other-secret".into());
        assert_ne!(a, other.sign_payload("1700000000", "{}"));
    }

    #[test]
    fn verify_accepts_own_signature_and_rejects_tampering() {
        let signer = SignatureGenerator::new("secret".into());
        let sig = signer.sign_payload("1700000000", r#"{"order_id":1}"#);
        assert!(signer.verify_payload("1700000000", r#"{"order_id":1}"#, &sig));
        assert!(!signer.verify_payload("1700000001", r#"{"order_id":1}"#, &sig));
        assert!(!signer.verify_payload("1700000000", r#"{"order_id":2}"#, &sig));
        assert!(!signer.verify_payload("1700000000", r#"{"order_id":1}"#, "not-hex"));
    }
}
