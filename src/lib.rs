//! visitflow - Patient-Visit Workflow & Billing Reconciliation Engine
//!
//! This crate implements the stateful core of a hospital administration
//! system: the stage state machine that routes a patient visit through
//! reception -> nurse -> doctor -> lab -> pharmacy -> billing, the invoice
//! ledger that keeps money bookkeeping consistent, and the reconciler that
//! applies asynchronous mobile-money confirmations exactly once.
//!
//! ## Architecture
//! All visit state changes flow through one path:
//! Department action -> `VisitAction` -> `apply_action` -> persisted visit
//!
//! Money enters the ledger either synchronously (cash/card at the billing
//! desk) or asynchronously via the mobile-money webhook, which is bridged
//! through [`reconcile`] with a reference-number idempotency key.
//!
//! ## Quick Start
//!
//! ```rust
//! use visitflow::workflow::{apply_action, Visit, VisitAction};
//! use chrono::Utc;
//! use uuid::Uuid;
//!
//! let mut visit = Visit::check_in(Uuid::new_v4(), Utc::now());
//! apply_action(&mut visit, VisitAction::CompleteCheckIn, Utc::now()).unwrap();
//! assert_eq!(visit.current_stage.as_str(), "nurse");
//! ```

// Core error handling
pub mod error;

// Configuration from environment
pub mod config;

// Visit state machine and queue projections
pub mod workflow;

// Invoice ledger and payment application
pub mod billing;

// Mobile-money reconciliation
pub mod reconcile;

// REST API surface (when enabled)
#[cfg(feature = "server")]
pub mod api;

// Public re-exports for the core flow
pub use billing::{Invoice, InvoiceStatus, LedgerOutcome, LineItem, Payment, PaymentMethod};
pub use config::AppConfig;
pub use error::{LedgerError, ReconcileError, WorkflowError};
pub use reconcile::{
    decide_webhook, MobilePaymentRequest, MobileRequestStatus, PaymentGateway, WebhookDecision,
    WebhookPayload,
};
pub use workflow::{
    apply_action, Applied, LabPriority, OverallStatus, QueueEntry, Stage, StageStatus, Visit,
    VisitAction,
};

// Database-backed services (when database feature is enabled)
#[cfg(feature = "database")]
pub use billing::PaymentApplier;
#[cfg(feature = "database")]
pub use reconcile::Reconciler;
#[cfg(feature = "database")]
pub use workflow::{QueueRepository, TransitionEngine, VisitRepository};
