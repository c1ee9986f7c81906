//! Invoice and Payment Models
//!
//! Monetary amounts are `rust_decimal::Decimal` throughout; floats never
//! touch money. Line items are immutable once the invoice total is
//! computed; only the paid/balance/status fields move afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Invoice lifecycle status, derived from the ledger figures but persisted
/// for query efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "pending" => Ok(Self::Pending),
            "partially_paid" => Ok(Self::PartiallyPaid),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(LedgerError::InvalidStatusValue(other.to_string())),
        }
    }

    /// Whether an invoice in this status blocks completing the visit's
    /// billing stage. Only a fully paid invoice releases the visit.
    pub fn blocks_billing_completion(&self) -> bool {
        !matches!(self, Self::Paid)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    BankTransfer,
    Insurance,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::MobileMoney => "mobile_money",
            Self::BankTransfer => "bank_transfer",
            Self::Insurance => "insurance",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "mobile_money" => Ok(Self::MobileMoney),
            "bank_transfer" => Ok(Self::BankTransfer),
            "insurance" => Ok(Self::Insurance),
            other => Err(LedgerError::InvalidStatusValue(other.to_string())),
        }
    }
}

/// One billed service or medication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// The running total/paid/balance bookkeeping for one visit or quick
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// Absent for visit-independent invoices (quick services).
    pub visit_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Build an invoice from its line items. The total is computed once
    /// here; items are immutable afterwards.
    pub fn from_items(
        patient_id: Uuid,
        visit_id: Option<Uuid>,
        items: Vec<LineItem>,
        now: DateTime<Utc>,
    ) -> Self {
        let total: Decimal = items.iter().map(LineItem::subtotal).sum();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            visit_id,
            items,
            total_amount: total,
            paid_amount: Decimal::ZERO,
            balance: total,
            status: InvoiceStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the ledger invariant. Exposed so tests and the repository
    /// layer can assert it after every mutation.
    pub fn invariant_holds(&self) -> bool {
        self.balance == self.total_amount - self.paid_amount && self.balance >= Decimal::ZERO
    }
}

/// One received payment. Append-only: never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Unique per mobile-money transaction; the idempotency key for
    /// webhook replays.
    pub reference_number: String,
    pub payment_date: DateTime<Utc>,
}
