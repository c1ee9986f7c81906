//! Mobile-Payment Reconciliation
//!
//! Bridges an external, asynchronous mobile-money confirmation into the
//! payment applier exactly once. `initiate` is fire-and-forget: it returns
//! the reference number immediately and the gateway pushes a webhook
//! later. The reference number is the idempotency key; a webhook replayed
//! by the gateway never applies a payment twice.

mod gateway;
mod request;

#[cfg(feature = "database")]
mod reconciler;

pub use gateway::{HttpGateway, PaymentGateway};
pub use request::{
    decide_webhook, MobilePaymentRequest, MobileRequestStatus, WebhookDecision, WebhookPayload,
};

#[cfg(feature = "database")]
pub use reconciler::Reconciler;
