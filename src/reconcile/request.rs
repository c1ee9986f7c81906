//! Mobile Payment Requests
//!
//! The reconciler-owned record of one outbound payment request, keyed by
//! its unique reference number, plus the pure decision logic for inbound
//! webhook payloads. Keeping the decision pure makes the idempotency
//! boundary directly testable: the database layer only executes what
//! `decide_webhook` returns.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReconcileError;

/// Status of an outbound mobile payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobileRequestStatus {
    /// Persisted, not yet accepted by the gateway.
    Pending,
    /// Gateway accepted the request; awaiting the subscriber's
    /// confirmation.
    Processing,
    Completed,
    Failed,
    /// Expired by the TTL sweep without a webhook ever arriving.
    Cancelled,
}

impl MobileRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ReconcileError> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ReconcileError::InvalidStatusValue(other.to_string())),
        }
    }

    /// Terminal requests ignore any further webhook delivery.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for MobileRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One outbound payment request awaiting asynchronous confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobilePaymentRequest {
    /// Unique idempotency key, also sent to the gateway.
    pub reference_number: String,
    pub phone_number: String,
    pub amount: Decimal,
    /// Invoice the payment settles once confirmed.
    pub invoice_id: Uuid,
    /// Provider label, recorded for audit ("mpesa", ...).
    pub provider: String,
    pub status: MobileRequestStatus,
    /// Opaque gateway payload from the last update.
    pub provider_response: Option<serde_json::Value>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MobilePaymentRequest {
    /// Build a fresh pending request with a provider-prefixed unique
    /// reference.
    pub fn new(
        provider: &str,
        phone_number: String,
        amount: Decimal,
        invoice_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        let reference_number = format!(
            "{}-{}",
            provider.to_uppercase(),
            Uuid::new_v4().simple()
        );
        Self {
            reference_number,
            phone_number,
            amount,
            invoice_id,
            provider: provider.to_string(),
            status: MobileRequestStatus::Pending,
            provider_response: None,
            initiated_at: now,
            completed_at: None,
        }
    }
}

/// Inbound webhook body from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Some providers send this as `order_id`.
    #[serde(alias = "order_id")]
    pub reference_number: String,
    pub payment_status: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl WebhookPayload {
    /// Gateways spell success several ways; anything else is a failure
    /// outcome for the request.
    pub fn indicates_success(&self) -> bool {
        matches!(
            self.payment_status.to_ascii_lowercase().as_str(),
            "success" | "successful" | "completed" | "paid"
        )
    }
}

/// What the webhook handler should do for a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDecision {
    /// Mark the request completed and apply the payment to the ledger.
    ApplyPayment,
    /// Mark the request failed; no ledger mutation.
    MarkFailed,
    /// Reference not ours: log and discard, respond success so the
    /// gateway stops retrying.
    IgnoreUnknown,
    /// Request already terminal; a replayed delivery changes nothing.
    IgnoreAlreadySettled,
}

/// Decide how to handle one webhook delivery against the stored request
/// state. This is the idempotency boundary: only a non-terminal request
/// with a success payload ever reaches the ledger.
pub fn decide_webhook(
    request: Option<&MobilePaymentRequest>,
    payload: &WebhookPayload,
) -> WebhookDecision {
    match request {
        None => WebhookDecision::IgnoreUnknown,
        Some(req) if req.status.is_terminal() => WebhookDecision::IgnoreAlreadySettled,
        Some(_) if payload.indicates_success() => WebhookDecision::ApplyPayment,
        Some(_) => WebhookDecision::MarkFailed,
    }
}
