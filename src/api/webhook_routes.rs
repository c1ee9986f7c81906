//! Mobile-money endpoints
//!
//! `initiate` returns the reference immediately; the UI shows a pending
//! state that resolves later. The webhook endpoint must be fast, make no
//! outbound calls, and return success even for duplicate or unknown
//! references so the gateway does not retry indefinitely.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use super::{reconcile_error_response, ApiResponse, AppState};
use crate::reconcile::WebhookPayload;

#[derive(Deserialize)]
pub struct InitiateMobilePaymentRequest {
    pub invoice_id: Uuid,
    pub phone_number: String,
    pub amount: Decimal,
}

#[derive(Serialize)]
pub struct InitiateMobilePaymentResponse {
    pub reference_number: String,
    pub status: String,
}

pub async fn initiate_mobile_payment(
    State(state): State<AppState>,
    Json(body): Json<InitiateMobilePaymentRequest>,
) -> Result<
    Json<ApiResponse<InitiateMobilePaymentResponse>>,
    (StatusCode, Json<ApiResponse<InitiateMobilePaymentResponse>>),
> {
    match state
        .reconciler
        .initiate(body.phone_number, body.amount, body.invoice_id)
        .await
    {
        Ok(request) => Ok(ApiResponse::ok(InitiateMobilePaymentResponse {
            reference_number: request.reference_number,
            status: request.status.to_string(),
        })),
        Err(err) => {
            warn!(invoice_id = %body.invoice_id, %err, "mobile payment initiation failed");
            let (status, message) = reconcile_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}

pub async fn mobile_money_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, Json<ApiResponse<String>>) {
    match state.reconciler.handle_webhook(&payload).await {
        Ok(()) => (StatusCode::OK, ApiResponse::ok("received".to_string())),
        Err(err) => {
            // Internal failure: let the gateway retry; the reference
            // guard makes the retry safe.
            error!(reference = %payload.reference_number, %err, "webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::err(err.to_string()),
            )
        }
    }
}
