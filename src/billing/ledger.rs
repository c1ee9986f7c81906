//! Payment Application
//!
//! Pure ledger arithmetic: validate a payment against the invoice and the
//! set of already-applied references, then move total/paid/balance/status
//! in lock-step. Persistence and the billing-completion side effect live
//! in the repository layer; nothing here touches a database.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::invoice::{Invoice, InvoiceStatus, Payment, PaymentMethod};
use crate::error::LedgerError;

/// What a successful payment application means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// Balance remains; invoice is partially paid.
    PartiallyPaid,
    /// Balance cleared. If the invoice is linked to a visit, the caller
    /// fires the billing-completion transition.
    FullyPaid,
}

/// Apply one payment to an invoice.
///
/// `existing_references` are the reference numbers of payments already
/// applied to this invoice; a repeat is rejected as `DuplicateReference`
/// (mobile-money gateways retry webhooks). `tolerance` is the configurable
/// margin by which a payment may exceed the outstanding balance before it
/// is rejected as an overpayment; cash change is the caller's concern and
/// is never persisted.
///
/// On success the invoice fields are updated and the new `Payment` row is
/// returned for insertion. On error the invoice is untouched.
pub fn apply_payment(
    invoice: &mut Invoice,
    existing_references: &[String],
    amount: Decimal,
    method: PaymentMethod,
    reference: &str,
    tolerance: Decimal,
    now: DateTime<Utc>,
) -> Result<(Payment, LedgerOutcome), LedgerError> {
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(LedgerError::InvoiceCancelled(invoice.id));
    }
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    if existing_references.iter().any(|r| r == reference) {
        return Err(LedgerError::DuplicateReference(reference.to_string()));
    }
    if invoice.paid_amount + amount > invoice.total_amount + tolerance {
        return Err(LedgerError::OverpaymentRejected {
            amount,
            balance: invoice.balance,
        });
    }

    invoice.paid_amount += amount;
    // Balance never goes below zero even when tolerance admits a slight
    // overshoot.
    invoice.balance = (invoice.total_amount - invoice.paid_amount).max(Decimal::ZERO);
    invoice.status = if invoice.balance == Decimal::ZERO {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::PartiallyPaid
    };
    invoice.updated_at = now;

    let payment = Payment {
        id: Uuid::new_v4(),
        invoice_id: invoice.id,
        amount,
        payment_method: method,
        reference_number: reference.to_string(),
        payment_date: now,
    };

    let outcome = if invoice.status == InvoiceStatus::Paid {
        LedgerOutcome::FullyPaid
    } else {
        LedgerOutcome::PartiallyPaid
    };
    Ok((payment, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::LineItem;
    use rust_decimal_macros::dec;

    fn invoice_of(total: Decimal) -> Invoice {
        Invoice::from_items(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            vec![LineItem {
                description: "Services".into(),
                quantity: 1,
                unit_price: total,
            }],
            Utc::now(),
        )
    }

    #[test]
    fn test_exact_payment_fully_pays() {
        let mut invoice = invoice_of(dec!(9000));
        let (payment, outcome) = apply_payment(
            &mut invoice,
            &[],
            dec!(9000),
            PaymentMethod::Cash,
            "CASH-001",
            Decimal::ZERO,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome, LedgerOutcome::FullyPaid);
        assert_eq!(invoice.balance, Decimal::ZERO);
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(payment.amount, dec!(9000));
        assert!(invoice.invariant_holds());
    }

    #[test]
    fn test_overpayment_after_full_payment_rejected() {
        let mut invoice = invoice_of(dec!(9000));
        apply_payment(
            &mut invoice,
            &[],
            dec!(9000),
            PaymentMethod::Cash,
            "CASH-001",
            Decimal::ZERO,
            Utc::now(),
        )
        .unwrap();

        let refs = vec!["CASH-001".to_string()];
        let err = apply_payment(
            &mut invoice,
            &refs,
            dec!(1),
            PaymentMethod::Cash,
            "CASH-002",
            Decimal::ZERO,
            Utc::now(),
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::OverpaymentRejected { .. }));
        // Ledger untouched by the rejection.
        assert_eq!(invoice.paid_amount, dec!(9000));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.invariant_holds());
    }

    #[test]
    fn test_partial_payments_keep_invariant() {
        let mut invoice = invoice_of(dec!(5000));
        let amounts = [dec!(1200), dec!(800), dec!(3000)];

        for (i, amount) in amounts.iter().enumerate() {
            let refs: Vec<String> = (0..i).map(|n| format!("PAY-{n}")).collect();
            let (_, outcome) = apply_payment(
                &mut invoice,
                &refs,
                *amount,
                PaymentMethod::Card,
                &format!("PAY-{i}"),
                Decimal::ZERO,
                Utc::now(),
            )
            .unwrap();

            assert!(invoice.invariant_holds());
            if invoice.balance > Decimal::ZERO {
                assert_eq!(outcome, LedgerOutcome::PartiallyPaid);
                assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
            }
        }

        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.balance, Decimal::ZERO);
    }

    #[test]
    fn test_duplicate_reference_rejected() {
        let mut invoice = invoice_of(dec!(4000));
        apply_payment(
            &mut invoice,
            &[],
            dec!(1000),
            PaymentMethod::MobileMoney,
            "MM-R1",
            Decimal::ZERO,
            Utc::now(),
        )
        .unwrap();

        let refs = vec!["MM-R1".to_string()];
        let err = apply_payment(
            &mut invoice,
            &refs,
            dec!(1000),
            PaymentMethod::MobileMoney,
            "MM-R1",
            Decimal::ZERO,
            Utc::now(),
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::DuplicateReference(r) if r == "MM-R1"));
        assert_eq!(invoice.paid_amount, dec!(1000));
    }

    #[test]
    fn test_tolerance_admits_slight_overshoot() {
        let mut invoice = invoice_of(dec!(100));
        let (_, outcome) = apply_payment(
            &mut invoice,
            &[],
            dec!(100.50),
            PaymentMethod::MobileMoney,
            "MM-R2",
            dec!(1),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome, LedgerOutcome::FullyPaid);
        // Balance clamps at zero; the overshoot is not a negative debt.
        assert_eq!(invoice.balance, Decimal::ZERO);
    }

    #[test]
    fn test_zero_and_negative_amounts_rejected() {
        let mut invoice = invoice_of(dec!(100));
        for bad in [Decimal::ZERO, dec!(-5)] {
            let err = apply_payment(
                &mut invoice,
                &[],
                bad,
                PaymentMethod::Cash,
                "X",
                Decimal::ZERO,
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }
    }

    #[test]
    fn test_cancelled_invoice_rejects_payment() {
        let mut invoice = invoice_of(dec!(100));
        invoice.status = InvoiceStatus::Cancelled;
        let err = apply_payment(
            &mut invoice,
            &[],
            dec!(100),
            PaymentMethod::Cash,
            "X",
            Decimal::ZERO,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvoiceCancelled(_)));
    }
}
