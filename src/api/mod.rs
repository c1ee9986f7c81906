//! REST API
//!
//! HTTP surface consumed by the department dashboards and the mobile-money
//! gateway. Handlers translate domain errors into status codes; the
//! response envelope is `ApiResponse { success, data, error }` throughout.

mod billing_routes;
mod queue_routes;
mod visit_routes;
mod webhook_routes;

use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::billing::PaymentApplier;
use crate::error::{LedgerError, ReconcileError, WorkflowError};
use crate::reconcile::Reconciler;
use crate::workflow::{QueueRepository, TransitionEngine};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TransitionEngine>,
    pub queues: Arc<QueueRepository>,
    pub applier: Arc<PaymentApplier>,
    pub reconciler: Arc<Reconciler>,
}

/// Uniform response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub fn err(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.into()),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/visits", post(visit_routes::check_in))
        .route("/api/visits/:id", get(visit_routes::get_visit))
        .route("/api/visits/:id/actions", post(visit_routes::apply_action))
        .route("/api/queues/:stage", get(queue_routes::list_queue))
        .route("/api/invoices", post(billing_routes::create_invoice))
        .route("/api/invoices/:id", get(billing_routes::get_invoice))
        .route(
            "/api/invoices/:id/payments",
            post(billing_routes::record_payment),
        )
        .route(
            "/api/patients/:id/invoices",
            get(billing_routes::list_patient_invoices),
        )
        .route(
            "/api/payments/mobile/initiate",
            post(webhook_routes::initiate_mobile_payment),
        )
        .route(
            "/api/payments/mobile/webhook",
            post(webhook_routes::mobile_money_webhook),
        )
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

async fn health_check() -> Json<ApiResponse<String>> {
    ApiResponse::ok("OK".to_string())
}

/// A workflow error as (status code, user-visible message). Blocked
/// transitions carry the specific blocking condition; department staff
/// use that text to go fix the upstream step.
pub(crate) fn workflow_error_response(err: &WorkflowError) -> (StatusCode, String) {
    let status = match err {
        WorkflowError::VisitNotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::VisitNotActive { .. }
        | WorkflowError::ActiveVisitExists(_)
        | WorkflowError::ConcurrentModification(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

pub(crate) fn ledger_error_response(err: &LedgerError) -> (StatusCode, String) {
    let status = match err {
        LedgerError::InvoiceNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::DuplicateReference(_) => StatusCode::CONFLICT,
        LedgerError::OverpaymentRejected { .. }
        | LedgerError::InvalidAmount(_)
        | LedgerError::InvoiceCancelled(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Workflow(inner) => return workflow_error_response(inner),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

pub(crate) fn reconcile_error_response(err: &ReconcileError) -> (StatusCode, String) {
    let status = match err {
        ReconcileError::GatewayUnreachable(_) | ReconcileError::GatewayRejected { .. } => {
            StatusCode::BAD_GATEWAY
        }
        ReconcileError::RequestNotFound(_) => StatusCode::NOT_FOUND,
        ReconcileError::Ledger(inner) => return ledger_error_response(inner),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
