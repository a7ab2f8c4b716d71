use crate::application::ledger::InstallmentLedger;
use crate::application::locks::KeyedLocks;
use crate::domain::installment::InstallmentId;
use crate::domain::money::{Amount, Balance};
use crate::domain::payment::{NewPayment, Payment, PaymentId, PaymentMedium};
use crate::domain::ports::{LedgerStore, SharedLedgerStore};
use crate::error::{BillingError, Result};
use std::sync::Arc;

/// Registers direct (offline) payments against installments.
///
/// Every write serializes on the installment id, so two overlapping attempts
/// cannot both pass the overpayment check against a stale saldo. The
/// registry is shared with the online orchestrator, which settles into the
/// same balances.
pub struct PaymentRecorder {
    ledger: InstallmentLedger,
    store: SharedLedgerStore,
    installment_locks: Arc<KeyedLocks<InstallmentId>>,
}

impl PaymentRecorder {
    pub fn new(
        store: SharedLedgerStore,
        installment_locks: Arc<KeyedLocks<InstallmentId>>,
    ) -> Self {
        Self {
            ledger: InstallmentLedger::new(store.clone()),
            store,
            installment_locks,
        }
    }

    /// Validates and appends one payment. Rejection paths leave no partial
    /// side effect: the payment either lands whole or not at all.
    ///
    /// Validation order: the installment exists and is active, the amount
    /// does not exceed the saldo (overpayment is rejected, never clamped),
    /// and the (medium, reference) pair is unused. Medium defaults to
    /// EFECTIVO.
    pub async fn record_payment(
        &self,
        installment_id: InstallmentId,
        amount: Amount,
        medium: Option<PaymentMedium>,
        reference: Option<String>,
    ) -> Result<Payment> {
        let medium = medium.unwrap_or_default();
        let _guard = self.installment_locks.acquire(installment_id).await;

        let row = self.ledger.balance_of(installment_id).await?;
        if !row.installment.is_active {
            return Err(BillingError::Validation(format!(
                "cuota {installment_id} is not active"
            )));
        }
        if Balance::from(amount) > row.saldo {
            return Err(BillingError::Validation(format!(
                "payment of {} exceeds the remaining saldo of {}",
                amount, row.saldo
            )));
        }
        if let Some(reference) = &reference
            && self.store.reference_in_use(medium, reference).await?
        {
            return Err(BillingError::Conflict(format!(
                "reference {reference} already used for medium {medium}"
            )));
        }

        let payment = self
            .store
            .insert_payment(NewPayment {
                installment: installment_id,
                amount,
                medium,
                reference,
            })
            .await?;
        tracing::info!(
            payment = payment.id,
            cuota = installment_id,
            monto = %payment.amount,
            medio = %payment.medium,
            "payment recorded"
        );
        Ok(payment)
    }

    /// Soft-invalidates an erroneous payment, restoring exactly its amount to
    /// the installment's saldo. Calling it on an already-invalid payment is a
    /// no-op.
    pub async fn invalidate_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let payment = self
            .store
            .payment(payment_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("pago {payment_id}")))?;
        if !payment.valid {
            return Ok(payment);
        }

        let _guard = self.installment_locks.acquire(payment.installment).await;
        let payment = self.store.set_payment_validity(payment_id, false).await?;
        tracing::info!(
            payment = payment.id,
            cuota = payment.installment,
            monto = %payment.amount,
            "payment invalidated"
        );
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::installment::Installment;
    use crate::domain::ports::LedgerStore;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    async fn recorder_with_cuota(total: rust_decimal::Decimal, active: bool) -> PaymentRecorder {
        let store: SharedLedgerStore = Arc::new(InMemoryLedgerStore::new());
        store
            .insert_installment(Installment {
                id: 1,
                unit: 1,
                period: "2025-08".to_string(),
                concept: "GASTO_COMUN".to_string(),
                due_date: NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
                total_due: Balance::new(total).unwrap(),
                is_active: active,
            })
            .await
            .unwrap();
        PaymentRecorder::new(store, Arc::new(KeyedLocks::new()))
    }

    fn amount(v: rust_decimal::Decimal) -> Amount {
        Amount::new(v).unwrap()
    }

    #[tokio::test]
    async fn test_partial_then_overpayment_rejected() {
        let recorder = recorder_with_cuota(dec!(100.00), true).await;

        let payment = recorder
            .record_payment(1, amount(dec!(60.00)), None, None)
            .await
            .unwrap();
        assert_eq!(payment.medium, PaymentMedium::Efectivo);

        let saldo = recorder.ledger.balance_of(1).await.unwrap().saldo;
        assert_eq!(saldo, Balance::new(dec!(40.00)).unwrap());

        let rejected = recorder
            .record_payment(1, amount(dec!(50.00)), None, None)
            .await;
        assert!(matches!(rejected, Err(BillingError::Validation(_))));
        // The rejected attempt left nothing behind.
        let row = recorder.ledger.balance_of(1).await.unwrap();
        assert_eq!(row.saldo, Balance::new(dec!(40.00)).unwrap());
        assert_eq!(row.paid, Balance::new(dec!(60.00)).unwrap());
    }

    #[tokio::test]
    async fn test_payment_on_inactive_cuota_rejected() {
        let recorder = recorder_with_cuota(dec!(100.00), false).await;
        let rejected = recorder
            .record_payment(1, amount(dec!(10.00)), None, None)
            .await;
        assert!(matches!(rejected, Err(BillingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_cuota_rejected() {
        let recorder = recorder_with_cuota(dec!(100.00), true).await;
        let rejected = recorder
            .record_payment(9, amount(dec!(10.00)), None, None)
            .await;
        assert!(matches!(rejected, Err(BillingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_reference_same_medium_conflicts() {
        let recorder = recorder_with_cuota(dec!(100.00), true).await;
        recorder
            .record_payment(
                1,
                amount(dec!(10.00)),
                Some(PaymentMedium::Transferencia),
                Some("OP-77".to_string()),
            )
            .await
            .unwrap();

        let rejected = recorder
            .record_payment(
                1,
                amount(dec!(10.00)),
                Some(PaymentMedium::Transferencia),
                Some("OP-77".to_string()),
            )
            .await;
        assert!(matches!(rejected, Err(BillingError::Conflict(_))));

        // The same reference under another medium is fine.
        recorder
            .record_payment(
                1,
                amount(dec!(10.00)),
                Some(PaymentMedium::Efectivo),
                Some("OP-77".to_string()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exact_saldo_payment_settles_cuota() {
        let recorder = recorder_with_cuota(dec!(25.50), true).await;
        recorder
            .record_payment(1, amount(dec!(25.50)), None, None)
            .await
            .unwrap();
        let row = recorder.ledger.balance_of(1).await.unwrap();
        assert_eq!(row.saldo, Balance::ZERO);
        assert!(!row.is_payable());
    }

    #[tokio::test]
    async fn test_invalidation_restores_saldo_and_is_idempotent() {
        let recorder = recorder_with_cuota(dec!(100.00), true).await;
        let payment = recorder
            .record_payment(1, amount(dec!(60.00)), None, None)
            .await
            .unwrap();

        let reverted = recorder.invalidate_payment(payment.id).await.unwrap();
        assert!(!reverted.valid);
        let saldo = recorder.ledger.balance_of(1).await.unwrap().saldo;
        assert_eq!(saldo, Balance::new(dec!(100.00)).unwrap());

        // Second invalidation changes nothing.
        let again = recorder.invalidate_payment(payment.id).await.unwrap();
        assert!(!again.valid);
        let saldo = recorder.ledger.balance_of(1).await.unwrap().saldo;
        assert_eq!(saldo, Balance::new(dec!(100.00)).unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_unknown_payment() {
        let recorder = recorder_with_cuota(dec!(100.00), true).await;
        assert!(matches!(
            recorder.invalidate_payment(42).await,
            Err(BillingError::NotFound(_))
        ));
    }
}
