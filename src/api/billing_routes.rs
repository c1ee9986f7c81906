//! Invoice and payment endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::{ledger_error_response, ApiResponse, AppState};
use crate::billing::{Invoice, LineItem, Payment, PaymentMethod};

#[derive(Deserialize)]
pub struct CreateInvoiceRequest {
    pub patient_id: Uuid,
    pub visit_id: Option<Uuid>,
    pub items: Vec<LineItem>,
}

#[derive(Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: String,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub invoice: Invoice,
    pub payment: Payment,
}

/// Ledger state plus the applied payments, for the billing dashboard.
#[derive(Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
}

pub async fn create_invoice(
    State(state): State<AppState>,
    Json(body): Json<CreateInvoiceRequest>,
) -> Result<Json<ApiResponse<Invoice>>, (StatusCode, Json<ApiResponse<Invoice>>)> {
    match state
        .applier
        .create_invoice(body.patient_id, body.visit_id, body.items)
        .await
    {
        Ok(invoice) => Ok(ApiResponse::ok(invoice)),
        Err(err) => {
            let (status, message) = ledger_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceDetail>>, (StatusCode, Json<ApiResponse<InvoiceDetail>>)> {
    let result = async {
        let invoice = state.applier.invoices().load(invoice_id).await?;
        let payments = state.applier.invoices().list_payments(invoice_id).await?;
        Ok(InvoiceDetail { invoice, payments })
    }
    .await;

    match result {
        Ok(detail) => Ok(ApiResponse::ok(detail)),
        Err(err) => {
            let (status, message) = ledger_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}

pub async fn list_patient_invoices(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Invoice>>>, (StatusCode, Json<ApiResponse<Vec<Invoice>>>)> {
    match state.applier.invoices().list_by_patient(patient_id).await {
        Ok(invoices) => Ok(ApiResponse::ok(invoices)),
        Err(err) => {
            let (status, message) = ledger_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}

pub async fn record_payment(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(body): Json<RecordPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentResponse>>, (StatusCode, Json<ApiResponse<PaymentResponse>>)> {
    match state
        .applier
        .apply(invoice_id, body.amount, body.method, &body.reference)
        .await
    {
        Ok((invoice, payment)) => Ok(ApiResponse::ok(PaymentResponse { invoice, payment })),
        Err(err) => {
            warn!(%invoice_id, amount = %body.amount, %err, "payment rejected");
            let (status, message) = ledger_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}
