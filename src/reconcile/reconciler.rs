//! Reconciler
//!
//! Orchestrates the outbound initiation and the inbound webhook against
//! the stored request state. Webhook handling never blocks the visit
//! workflow and never applies a payment twice: the ledger's duplicate-
//! reference guard backs up the terminal-state check, so the payment is
//! applied before the request is marked completed without risking a
//! double application on retry.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::gateway::PaymentGateway;
use super::request::{
    decide_webhook, MobilePaymentRequest, MobileRequestStatus, WebhookDecision, WebhookPayload,
};
use crate::billing::{PaymentApplier, PaymentMethod};
use crate::config::AppConfig;
use crate::error::{LedgerError, ReconcileError};

/// Bridges external mobile-money confirmations into the payment applier.
pub struct Reconciler {
    requests: RequestRepository,
    applier: PaymentApplier,
    gateway: Arc<dyn PaymentGateway>,
    provider: String,
    pending_request_ttl_minutes: i64,
}

impl Reconciler {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, config: &AppConfig) -> Self {
        Self {
            requests: RequestRepository::new(pool.clone()),
            applier: PaymentApplier::new(pool, config.overpayment_tolerance),
            gateway,
            provider: config.gateway_provider.clone(),
            pending_request_ttl_minutes: config.pending_request_ttl_minutes,
        }
    }

    /// Issue a payment request to the gateway. Returns the reference
    /// immediately; the caller treats "payment initiated" as a pending
    /// state that resolves later via webhook, never as confirmation.
    pub async fn initiate(
        &self,
        phone_number: String,
        amount: Decimal,
        invoice_id: Uuid,
    ) -> Result<MobilePaymentRequest, ReconcileError> {
        let mut request = MobilePaymentRequest::new(
            &self.provider,
            phone_number,
            amount,
            invoice_id,
            Utc::now(),
        );
        self.requests.insert(&request).await?;

        match self
            .gateway
            .request_payment(&request.reference_number, &request.phone_number, amount)
            .await
        {
            Ok(ack) => {
                request.status = MobileRequestStatus::Processing;
                request.provider_response = Some(ack);
                self.requests.update(&request).await?;
                info!(reference = %request.reference_number, %amount, "mobile payment initiated");
                Ok(request)
            }
            Err(err) => {
                // Initiation failure is synchronous and final for this
                // request; a fresh initiate gets a fresh reference.
                request.status = MobileRequestStatus::Failed;
                request.completed_at = Some(Utc::now());
                self.requests.update(&request).await?;
                Err(err)
            }
        }
    }

    /// Handle one webhook delivery. Unknown references and replays of
    /// settled requests are discarded quietly so the gateway stops
    /// retrying; only genuine internal failures propagate.
    pub async fn handle_webhook(&self, payload: &WebhookPayload) -> Result<(), ReconcileError> {
        let Some(mut request) = self
            .requests
            .find_by_reference(&payload.reference_number)
            .await?
        else {
            warn!(
                reference = %payload.reference_number,
                "webhook for unknown reference discarded"
            );
            return Ok(());
        };

        match decide_webhook(Some(&request), payload) {
            // Unreachable once the reference resolved, kept for the match.
            WebhookDecision::IgnoreUnknown => Ok(()),
            WebhookDecision::IgnoreAlreadySettled => {
                info!(
                    reference = %payload.reference_number,
                    "webhook replay for settled request discarded"
                );
                Ok(())
            }
            WebhookDecision::MarkFailed => {
                request.status = MobileRequestStatus::Failed;
                request.completed_at = Some(Utc::now());
                request.provider_response = payload.metadata.clone();
                self.requests.update(&request).await?;
                info!(reference = %request.reference_number, "mobile payment failed at gateway");
                Ok(())
            }
            WebhookDecision::ApplyPayment => {
                match self
                    .applier
                    .apply(
                        request.invoice_id,
                        request.amount,
                        PaymentMethod::MobileMoney,
                        &request.reference_number,
                    )
                    .await
                {
                    Ok(_) => {}
                    // Already applied on a previous delivery that crashed
                    // before the request flipped: settle the request now.
                    Err(LedgerError::DuplicateReference(_)) => {
                        info!(
                            reference = %request.reference_number,
                            "payment already applied, settling request"
                        );
                    }
                    Err(err) => return Err(err.into()),
                }

                request.status = MobileRequestStatus::Completed;
                request.completed_at = Some(Utc::now());
                request.provider_response = payload.metadata.clone();
                self.requests.update(&request).await?;
                info!(reference = %request.reference_number, "mobile payment reconciled");
                Ok(())
            }
        }
    }

    /// Cancel requests still pending past the configured TTL. A TTL of
    /// zero disables the sweep. Returns the number of requests expired.
    pub async fn expire_stale_requests(&self, now: DateTime<Utc>) -> Result<u64, ReconcileError> {
        if self.pending_request_ttl_minutes <= 0 {
            return Ok(0);
        }
        let cutoff = now - Duration::minutes(self.pending_request_ttl_minutes);
        let expired = self.requests.cancel_stale(cutoff).await?;
        if expired > 0 {
            info!(count = expired, "expired stale mobile payment requests");
        }
        Ok(expired)
    }

    pub fn applier(&self) -> &PaymentApplier {
        &self.applier
    }
}

/// Persistence for mobile payment requests.
struct RequestRepository {
    pool: PgPool,
}

impl RequestRepository {
    fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, request: &MobilePaymentRequest) -> Result<(), ReconcileError> {
        sqlx::query(
            r#"
            INSERT INTO mobile_payment_requests
            (reference_number, phone_number, amount, invoice_id, provider,
             status, provider_response, initiated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&request.reference_number)
        .bind(&request.phone_number)
        .bind(request.amount)
        .bind(request.invoice_id)
        .bind(&request.provider)
        .bind(request.status.as_str())
        .bind(&request.provider_response)
        .bind(request.initiated_at)
        .bind(request.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, request: &MobilePaymentRequest) -> Result<(), ReconcileError> {
        sqlx::query(
            r#"
            UPDATE mobile_payment_requests
            SET status = $2, provider_response = $3, completed_at = $4
            WHERE reference_number = $1
            "#,
        )
        .bind(&request.reference_number)
        .bind(request.status.as_str())
        .bind(&request.provider_response)
        .bind(request.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<MobilePaymentRequest>, ReconcileError> {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT reference_number, phone_number, amount, invoice_id, provider,
                   status, provider_response, initiated_at, completed_at
            FROM mobile_payment_requests
            WHERE reference_number = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn cancel_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, ReconcileError> {
        let result = sqlx::query(
            r#"
            UPDATE mobile_payment_requests
            SET status = 'cancelled', completed_at = now()
            WHERE status IN ('pending', 'processing') AND initiated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    reference_number: String,
    phone_number: String,
    amount: Decimal,
    invoice_id: Uuid,
    provider: String,
    status: String,
    provider_response: Option<serde_json::Value>,
    initiated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RequestRow> for MobilePaymentRequest {
    type Error = ReconcileError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            reference_number: row.reference_number,
            phone_number: row.phone_number,
            amount: row.amount,
            invoice_id: row.invoice_id,
            provider: row.provider,
            status: MobileRequestStatus::parse(&row.status)?,
            provider_response: row.provider_response,
            initiated_at: row.initiated_at,
            completed_at: row.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unknown_stored_request_status_fails_decode() {
        let row = RequestRow {
            reference_number: "MPESA-ABC".into(),
            phone_number: "254700000000".into(),
            amount: dec!(100),
            invoice_id: Uuid::new_v4(),
            provider: "mpesa".into(),
            status: "archived".into(),
            provider_response: None,
            initiated_at: Utc::now(),
            completed_at: None,
        };

        assert!(matches!(
            MobilePaymentRequest::try_from(row),
            Err(ReconcileError::InvalidStatusValue(s)) if s == "archived"
        ));
    }
}
