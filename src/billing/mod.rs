//! Billing
//!
//! Invoice ledger and payment application. The ledger invariant
//! (`balance == total - paid`, both non-negative) holds after every
//! successful payment, and the persisted status is kept in lock-step with
//! it. Payments are append-only; corrections are new payments.

mod invoice;
mod ledger;

#[cfg(feature = "database")]
mod repository;

pub use invoice::{Invoice, InvoiceStatus, LineItem, Payment, PaymentMethod};
pub use ledger::{apply_payment, LedgerOutcome};

#[cfg(feature = "database")]
pub use repository::{InvoiceRepository, PaymentApplier};
