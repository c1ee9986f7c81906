//! Error types for the visit workflow, invoice ledger, and reconciler
//!
//! This module provides idiomatic Rust error types using thiserror for
//! better error messages and proper error chain handling. Transition and
//! ledger errors are surfaced synchronously to the calling department
//! action; webhook-processing errors for unknown or replayed references are
//! swallowed by the reconciler by design.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the stage transition engine.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Requested stage/status change is not legal from the current state.
    /// `blocked_on` names the specific upstream condition so department
    /// staff can go fix the actual blocking step.
    #[error("invalid transition from {from} to {to}: {blocked_on}")]
    InvalidTransition {
        from: String,
        to: String,
        blocked_on: String,
    },

    #[error("visit {0} not found")]
    VisitNotFound(Uuid),

    /// The visit is terminal (completed or cancelled); no further
    /// transitions are accepted.
    #[error("visit {visit_id} is {status} and accepts no further actions")]
    VisitNotActive { visit_id: Uuid, status: String },

    /// Patient already has an active visit in the workflow.
    #[error("patient {0} already has an active visit")]
    ActiveVisitExists(Uuid),

    /// Stored stage value not in the closed set. Raised at the storage
    /// decode boundary instead of silently defaulting.
    #[error("unrecognized stage value '{0}' in stored visit")]
    InvalidStage(String),

    /// Stored status value not in the closed set.
    #[error("unrecognized status value '{0}' in stored visit")]
    InvalidStatus(String),

    /// Optimistic version check failed; another department won the race.
    #[error("visit {0} was modified concurrently, retry the action")]
    ConcurrentModification(Uuid),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the invoice ledger / payment applier.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Payment reference already applied to this invoice. Direct API
    /// callers see this as a rejection; the reconciler treats it as
    /// already-applied success.
    #[error("payment reference '{0}' already applied to this invoice")]
    DuplicateReference(String),

    /// Payment would exceed the invoice total beyond the configured
    /// tolerance.
    #[error("payment of {amount} would overpay invoice: balance is {balance}")]
    OverpaymentRejected { amount: Decimal, balance: Decimal },

    #[error("payment amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("invoice {0} not found")]
    InvoiceNotFound(Uuid),

    /// Cancelled invoices accept no payments.
    #[error("invoice {0} is cancelled and accepts no payments")]
    InvoiceCancelled(Uuid),

    /// Stored status/method value not in the closed set. Raised at the
    /// storage decode boundary instead of silently defaulting.
    #[error("unrecognized billing value '{0}' in stored row")]
    InvalidStatusValue(String),

    /// Fully-paid billing completion could not advance the linked visit.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from the mobile-payment reconciler.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// `initiate()` could not reach the external mobile-money provider.
    /// Distinct from a later failed webhook outcome: the caller sees this
    /// synchronously as an initiation failure.
    #[error("mobile-money gateway unreachable: {0}")]
    GatewayUnreachable(String),

    /// Gateway rejected the initiation request outright.
    #[error("mobile-money gateway rejected request '{reference}': {detail}")]
    GatewayRejected { reference: String, detail: String },

    #[error("mobile payment request '{0}' not found")]
    RequestNotFound(String),

    /// Stored request status not in the closed set. Raised at the storage
    /// decode boundary instead of silently defaulting.
    #[error("unrecognized request status '{0}' in stored row")]
    InvalidStatusValue(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ReconcileError {
    fn from(err: reqwest::Error) -> Self {
        ReconcileError::GatewayUnreachable(err.to_string())
    }
}
