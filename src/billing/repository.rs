//! Billing Persistence
//!
//! Invoice and payment persistence plus the transactional payment applier.
//! `apply` serializes per invoice with a row lock: a cash payment at the
//! billing desk and a mobile-money webhook landing at the same moment
//! cannot both read the pre-payment balance. When a payment clears a
//! visit-linked invoice, the billing-completion transition is applied to
//! the visit inside the same transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::invoice::{Invoice, InvoiceStatus, LineItem, Payment, PaymentMethod};
use super::ledger::{apply_payment, LedgerOutcome};
use crate::error::LedgerError;
use crate::workflow::{apply_action, Applied, VisitAction, VisitRepository};

const SELECT_INVOICE: &str = r#"
    SELECT id, patient_id, visit_id, items, total_amount, paid_amount,
           balance, status, created_at, updated_at
    FROM invoices
"#;

/// Repository for invoice and payment persistence.
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a newly created invoice with its line items.
    pub async fn insert(&self, invoice: &Invoice) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO invoices
            (id, patient_id, visit_id, items, total_amount, paid_amount,
             balance, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.patient_id)
        .bind(invoice.visit_id)
        .bind(serde_json::to_value(&invoice.items)?)
        .bind(invoice.total_amount)
        .bind(invoice.paid_amount)
        .bind(invoice.balance)
        .bind(invoice.status.as_str())
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load an invoice by ID.
    pub async fn load(&self, invoice_id: Uuid) -> Result<Invoice, LedgerError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!("{SELECT_INVOICE} WHERE id = $1"))
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;

        row.try_into()
    }

    /// List a patient's invoices, newest first.
    pub async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Invoice>, LedgerError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{SELECT_INVOICE} WHERE patient_id = $1 ORDER BY created_at DESC"
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Find the invoice linked to a visit, if one exists.
    pub async fn find_by_visit(&self, visit_id: Uuid) -> Result<Option<Invoice>, LedgerError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{SELECT_INVOICE} WHERE visit_id = $1"
        ))
        .bind(visit_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Payments applied to an invoice, oldest first.
    pub async fn list_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, LedgerError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, invoice_id, amount, payment_method, reference_number, payment_date
            FROM payments
            WHERE invoice_id = $1
            ORDER BY payment_date ASC
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn load_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Invoice, LedgerError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{SELECT_INVOICE} WHERE id = $1 FOR UPDATE"
        ))
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;

        row.try_into()
    }

    async fn references_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Vec<String>, LedgerError> {
        let refs: Vec<(String,)> = sqlx::query_as(
            "SELECT reference_number FROM payments WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(refs.into_iter().map(|(r,)| r).collect())
    }

    async fn update_ledger_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice: &Invoice,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET paid_amount = $2, balance = $3, status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.paid_amount)
        .bind(invoice.balance)
        .bind(invoice.status.as_str())
        .bind(invoice.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_payment_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payment: &Payment,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO payments
            (id, invoice_id, amount, payment_method, reference_number, payment_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payment.id)
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .bind(payment.payment_method.as_str())
        .bind(&payment.reference_number)
        .bind(payment.payment_date)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

/// Transactional payment application: ledger update, payment insert, and
/// (when the invoice clears) the visit's billing completion, all in one
/// transaction.
pub struct PaymentApplier {
    invoices: InvoiceRepository,
    visits: VisitRepository,
    pool: PgPool,
    overpayment_tolerance: Decimal,
}

impl PaymentApplier {
    pub fn new(pool: PgPool, overpayment_tolerance: Decimal) -> Self {
        Self {
            invoices: InvoiceRepository::new(pool.clone()),
            visits: VisitRepository::new(pool.clone()),
            pool,
            overpayment_tolerance,
        }
    }

    pub fn invoices(&self) -> &InvoiceRepository {
        &self.invoices
    }

    /// Create an invoice from line items and persist it.
    pub async fn create_invoice(
        &self,
        patient_id: Uuid,
        visit_id: Option<Uuid>,
        items: Vec<LineItem>,
    ) -> Result<Invoice, LedgerError> {
        let invoice = Invoice::from_items(patient_id, visit_id, items, Utc::now());
        self.invoices.insert(&invoice).await?;
        info!(invoice_id = %invoice.id, total = %invoice.total_amount, "invoice created");
        Ok(invoice)
    }

    /// Apply one payment to an invoice.
    pub async fn apply(
        &self,
        invoice_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<(Invoice, Payment), LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut invoice = self.invoices.load_for_update(&mut tx, invoice_id).await?;
        let existing = self.invoices.references_in_tx(&mut tx, invoice_id).await?;

        let (payment, outcome) = apply_payment(
            &mut invoice,
            &existing,
            amount,
            method,
            reference,
            self.overpayment_tolerance,
            now,
        )?;

        self.invoices.insert_payment_in_tx(&mut tx, &payment).await?;
        self.invoices.update_ledger_in_tx(&mut tx, &invoice).await?;

        if outcome == LedgerOutcome::FullyPaid {
            if let Some(visit_id) = invoice.visit_id {
                self.complete_billing_in_tx(&mut tx, visit_id, now).await?;
            }
        }

        tx.commit().await?;
        info!(
            invoice_id = %invoice.id,
            amount = %amount,
            method = method.as_str(),
            status = invoice.status.as_str(),
            "payment applied"
        );
        Ok((invoice, payment))
    }

    /// Advance the linked visit out of billing, inside the payment's own
    /// transaction. An already-completed billing stage is a quiet no-op.
    async fn complete_billing_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        visit_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut visit = self.visits.load_for_update(tx, visit_id).await?;
        let expected_version = visit.version;

        match apply_action(&mut visit, VisitAction::CompleteBilling, now)? {
            Applied::AlreadyApplied => Ok(()),
            applied => {
                visit.version += 1;
                self.visits.update_in_tx(tx, &visit, expected_version).await?;
                if let Applied::Advanced { from, to } = applied {
                    self.visits
                        .log_transition(
                            tx,
                            visit.id,
                            VisitAction::CompleteBilling.as_str(),
                            from.as_str(),
                            to.as_str(),
                            now,
                        )
                        .await?;
                }
                Ok(())
            }
        }
    }
}

/// Database row for an invoice; line items ride in a jsonb column.
#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    patient_id: Uuid,
    visit_id: Option<Uuid>,
    items: serde_json::Value,
    total_amount: Decimal,
    paid_amount: Decimal,
    balance: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = LedgerError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            patient_id: row.patient_id,
            visit_id: row.visit_id,
            items: serde_json::from_value(row.items)?,
            total_amount: row.total_amount,
            paid_amount: row.paid_amount,
            balance: row.balance,
            status: InvoiceStatus::parse(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    invoice_id: Uuid,
    amount: Decimal,
    payment_method: String,
    reference_number: String,
    payment_date: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = LedgerError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            invoice_id: row.invoice_id,
            amount: row.amount,
            payment_method: PaymentMethod::parse(&row.payment_method)?,
            reference_number: row.reference_number,
            payment_date: row.payment_date,
        })
    }
}
