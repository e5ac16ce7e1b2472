use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Provider-side intent status. `RequiresCapture` is the escrow state:
/// funds are held but not transferred until an explicit capture call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderIntentStatus {
    RequiresCapture,
    Succeeded,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderIntent {
    pub provider_ref: String, // Provider's ID (e.g., pi_123)
    pub order_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: ProviderIntentStatus,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderRefundStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRefund {
    pub provider_ref: String,
    pub amount: i64,
    pub status: ProviderRefundStatus,
    pub failure_reason: Option<String>,
}

/// Input to `PaymentProvider::create_authorization`. When
/// `vendor_account` is present the provider configures a split transfer:
/// capture auto-routes `vendor_amount` to the vendor, net of
/// `platform_fee`.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub order_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub vendor_account: Option<String>,
    pub platform_fee: i64,
    pub vendor_amount: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Refund rejected: {0}")]
    RefundRejected(String),

    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    #[error("Provider API error: {0}")]
    Api(String),
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unreachable(msg) => CoreError::Unavailable(msg),
            other => CoreError::Provider(other.to_string()),
        }
    }
}

/// Seam to the external payment provider. Implementations talk to the
/// real provider; tests substitute a recording mock. Every fund movement
/// in the system goes through one of these calls or a verified webhook.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a manual-capture intent so funds are held in escrow until
    /// delivery is confirmed.
    async fn create_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<ProviderIntent, ProviderError>;

    /// Capture a previously authorized intent, releasing held funds.
    async fn capture(&self, provider_ref: &str) -> Result<ProviderIntent, ProviderError>;

    /// Cancel a held authorization without capturing.
    async fn cancel(&self, provider_ref: &str) -> Result<ProviderIntent, ProviderError>;

    /// Refund a captured or authorized intent. `amount: None` refunds in
    /// full.
    async fn refund(
        &self,
        provider_ref: &str,
        amount: Option<i64>,
    ) -> Result<ProviderRefund, ProviderError>;

    /// Direct transfer to a vendor's connected account, used when payout
    /// was not configured as a split on the original intent.
    async fn create_transfer(
        &self,
        vendor_account: &str,
        amount: i64,
        order_ref: &str,
    ) -> Result<String, ProviderError>;
}

/// Event kinds the webhook endpoint accepts. Closed enum: payloads with
/// any other `type` value fail deserialization and are rejected with a
/// 400 instead of falling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentCaptured,
    PaymentFailed,
    TransferUpdated,
    AccountUpdated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookObject {
    pub provider_ref: String,
    pub order_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub failure_reason: Option<String>,
    pub vendor_account: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: WebhookEventKind,
    pub data: WebhookObject,
}

/// Shared-secret webhook signature scheme. The provider sends
/// `Vendra-Signature: t=<unix>,v1=<hex>` where the hex digest is
/// SHA-256 over `secret.timestamp.payload`. Payloads older than the
/// tolerance window are rejected to blunt replay.
pub struct WebhookVerifier {
    secret: String,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds: 300,
        }
    }

    pub fn with_tolerance(mut self, tolerance_seconds: i64) -> Self {
        self.tolerance_seconds = tolerance_seconds;
        self
    }

    fn digest(&self, timestamp: i64, payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b".");
        hasher.update(timestamp.to_string().as_bytes());
        hasher.update(b".");
        hasher.update(payload);
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Build a signature header for a payload. Used by tests and by the
    /// provider simulator.
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> String {
        format!("t={},v1={}", timestamp, self.digest(timestamp, payload))
    }

    /// Verify a header against a raw payload. Returns `Validation` on any
    /// mismatch so the endpoint maps it to a 400; the caller logs it as a
    /// potential security event.
    pub fn verify(&self, header: &str, payload: &[u8]) -> CoreResult<()> {
        let mut timestamp: Option<i64> = None;
        let mut signature: Option<&str> = None;

        for part in header.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signature = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| CoreError::Validation("missing signature timestamp".into()))?;
        let signature =
            signature.ok_or_else(|| CoreError::Validation("missing signature digest".into()))?;

        let age = (Utc::now().timestamp() - timestamp).abs();
        if age > self.tolerance_seconds {
            tracing::warn!(age_seconds = age, "webhook signature outside tolerance window");
            return Err(CoreError::Validation("signature timestamp expired".into()));
        }

        if self.digest(timestamp, payload) != signature {
            tracing::warn!("webhook signature mismatch");
            return Err(CoreError::Validation("signature mismatch".into()));
        }

        Ok(())
    }
}
