//! Mobile-Money Gateway Client
//!
//! Outbound side of the reconciliation protocol. The trait is the seam
//! the reconciler and the tests work against; `HttpGateway` is the real
//! client. A connect/send failure surfaces synchronously as
//! `GatewayUnreachable`, which is distinct from a later `failed` webhook
//! outcome.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::error::ReconcileError;

/// External mobile-money provider seam.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the provider to prompt the subscriber for payment. Returns the
    /// provider's acknowledgement payload; confirmation arrives later via
    /// webhook, never here.
    async fn request_payment(
        &self,
        reference: &str,
        phone_number: &str,
        amount: Decimal,
    ) -> Result<serde_json::Value, ReconcileError>;
}

#[derive(Serialize)]
struct InitiateBody<'a> {
    reference: &'a str,
    phone_number: &'a str,
    amount: Decimal,
}

/// HTTP client for the real gateway.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn request_payment(
        &self,
        reference: &str,
        phone_number: &str,
        amount: Decimal,
    ) -> Result<serde_json::Value, ReconcileError> {
        let url = format!("{}/payments/initiate", self.base_url);
        debug!(%reference, %amount, "sending payment request to gateway");

        let response = self
            .client
            .post(&url)
            .json(&InitiateBody {
                reference,
                phone_number,
                amount,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ReconcileError::GatewayRejected {
                reference: reference.to_string(),
                detail: format!("{status}: {detail}"),
            });
        }

        Ok(response.json().await?)
    }
}
