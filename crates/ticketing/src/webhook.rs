//! Webhook ticket sink.
//!
//! POSTs the escalation record as JSON to a configured endpoint. When a
//! shared secret is configured, the payload is signed with HMAC-SHA256 and
//! the hex digest sent in `X-Crabdesk-Signature` so the receiver can verify
//! origin.

use async_trait::async_trait;
use crabdesk_core::error::TicketError;
use crabdesk_core::response::EscalationRecord;
use crabdesk_core::ticket::TicketSink;
use tracing::{info, warn};

/// Webhook sink configuration.
#[derive(Debug, Clone)]
pub struct WebhookTicketConfig {
    /// Endpoint escalation records are POSTed to.
    pub url: String,
    /// HMAC shared secret. None = unsigned payloads.
    pub shared_secret: Option<String>,
}

/// Delivers escalation records to an HTTP endpoint.
pub struct WebhookTicketSink {
    config: WebhookTicketConfig,
    client: reqwest::Client,
}

impl WebhookTicketSink {
    pub fn new(config: WebhookTicketConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Hex-encoded HMAC-SHA256 of the payload under the shared secret.
    pub fn sign(&self, payload: &[u8]) -> Option<String> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let secret = self.config.shared_secret.as_ref()?;
        if secret.is_empty() {
            return None;
        }

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(payload);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }
}

#[async_trait]
impl TicketSink for WebhookTicketSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn create_ticket(&self, record: &EscalationRecord) -> Result<String, TicketError> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| TicketError::DeliveryFailed(format!("serialization: {e}")))?;

        let mut request = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .body(payload.clone());

        if let Some(signature) = self.sign(&payload) {
            request = request.header("X-Crabdesk-Signature", signature);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TicketError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Ticket webhook rejected payload");
            return Err(TicketError::DeliveryFailed(format!(
                "webhook returned {status}"
            )));
        }

        info!(
            ticket = %record.ticket_number,
            priority = record.priority.as_str(),
            "Escalation delivered to ticketing webhook"
        );
        Ok(record.ticket_number.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(secret: Option<&str>) -> WebhookTicketSink {
        WebhookTicketSink::new(WebhookTicketConfig {
            url: "https://tickets.example.com/hook".into(),
            shared_secret: secret.map(String::from),
        })
    }

    #[test]
    fn no_secret_means_no_signature() {
        assert!(sink(None).sign(b"payload").is_none());
        assert!(sink(Some("")).sign(b"payload").is_none());
    }

    #[test]
    fn signature_is_stable_and_prefixed() {
        let s = sink(Some("topsecret"));
        let sig1 = s.sign(b"payload").unwrap();
        let sig2 = s.sign(b"payload").unwrap();
        assert_eq!(sig1, sig2);
        assert!(sig1.starts_with("sha256="));
        // 32-byte digest → 64 hex chars
        assert_eq!(sig1.len(), "sha256=".len() + 64);
    }

    #[test]
    fn signature_varies_with_payload_and_secret() {
        let s = sink(Some("topsecret"));
        assert_ne!(s.sign(b"a").unwrap(), s.sign(b"b").unwrap());
        assert_ne!(
            sink(Some("one")).sign(b"payload").unwrap(),
            sink(Some("two")).sign(b"payload").unwrap()
        );
    }
}
