use crate::application::ledger::InstallmentLedger;
use crate::application::locks::KeyedLocks;
use crate::domain::installment::InstallmentId;
use crate::domain::intent::{IntentStatus, NewIntent, OnlineIntent};
use crate::domain::money::{Amount, Balance};
use crate::domain::payment::{NewPayment, Payment, PaymentMedium};
use crate::domain::ports::{CardGateway, LedgerStore, SharedCardGateway, SharedLedgerStore};
use crate::error::{BillingError, Result};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// What the gateway (or its webhook) reports back for an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Succeeded,
    RequiresAction,
    Failed,
}

/// Result of a confirmation attempt that was accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// The intent settled into exactly this payment (possibly on a previous
    /// call; replays return the original payment unchanged).
    Settled(Payment),
    /// The intent moved to a non-settled status; no payment was created.
    Unsettled(OnlineIntent),
}

/// Returned by [`OnlinePaymentOrchestrator::initiate`].
#[derive(Debug, Clone, PartialEq)]
pub struct InitiatedPayment {
    /// The gateway's client-side confirmation secret.
    pub client_secret: String,
    pub intent: OnlineIntent,
}

/// Drives the card-payment intent lifecycle:
/// `CREATED → REQUIRES_ACTION → SUCCEEDED`, or `FAILED` / `CANCELED`.
///
/// Confirmations serialize per intent id, then take the installment lock
/// before settling, so one intent can never settle twice and a settlement can
/// never race a direct payment past the overpayment check.
pub struct OnlinePaymentOrchestrator {
    ledger: InstallmentLedger,
    store: SharedLedgerStore,
    gateway: SharedCardGateway,
    installment_locks: Arc<KeyedLocks<InstallmentId>>,
    intent_locks: KeyedLocks<String>,
    currency: String,
    gateway_timeout: Duration,
}

impl OnlinePaymentOrchestrator {
    pub fn new(
        store: SharedLedgerStore,
        gateway: SharedCardGateway,
        installment_locks: Arc<KeyedLocks<InstallmentId>>,
        currency: impl Into<String>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            ledger: InstallmentLedger::new(store.clone()),
            store,
            gateway,
            installment_locks,
            intent_locks: KeyedLocks::new(),
            currency: currency.into(),
            gateway_timeout,
        }
    }

    /// Creates an external intent and its provisional record.
    ///
    /// An omitted amount defaults to the full current saldo, resolved here
    /// against the authoritative ledger rather than any client-supplied
    /// figure. Gateway failures surface as GATEWAY errors and leave no
    /// provisional record behind.
    pub async fn initiate(
        &self,
        installment_id: InstallmentId,
        requested: Option<Amount>,
    ) -> Result<InitiatedPayment> {
        let row = self.ledger.balance_of(installment_id).await?;
        if !row.is_payable() {
            return Err(BillingError::Validation(format!(
                "cuota {installment_id} has no payable saldo"
            )));
        }
        let amount = match requested {
            Some(amount) => {
                if Balance::from(amount) > row.saldo {
                    return Err(BillingError::Validation(format!(
                        "requested amount {} exceeds the saldo of {}",
                        amount, row.saldo
                    )));
                }
                amount
            }
            None => Amount::new(row.saldo.value())?,
        };

        let created = self
            .with_gateway_timeout(
                self.gateway.create_intent(amount, &self.currency),
                "creating the intent",
            )
            .await?;
        let status = if created.requires_action {
            IntentStatus::RequiresAction
        } else {
            IntentStatus::Created
        };

        let intent = self
            .store
            .insert_intent(NewIntent {
                installment: installment_id,
                amount,
                currency: self.currency.clone(),
                external_id: created.external_id,
                status,
                metadata: serde_json::json!({
                    "unidad": row.installment.unit,
                    "periodo": row.installment.period,
                    "concepto": row.installment.concept,
                }),
            })
            .await?;
        tracing::info!(
            intent = %intent.external_id,
            cuota = installment_id,
            monto = %intent.amount,
            status = %intent.status,
            "online payment initiated"
        );
        Ok(InitiatedPayment {
            client_secret: created.client_secret,
            intent,
        })
    }

    /// Applies a gateway outcome to the intent identified by `external_id`.
    ///
    /// Replayed confirmations of a SUCCEEDED intent return the previously
    /// settled payment unchanged. GATEWAY and INTERNAL errors leave the
    /// intent in its prior status, so confirmation is always safe to retry.
    pub async fn confirm(
        &self,
        external_id: &str,
        outcome: ConfirmOutcome,
    ) -> Result<Confirmation> {
        let _intent_guard = self.intent_locks.acquire(external_id.to_string()).await;

        let intent = self
            .store
            .intent_by_external_id(external_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("intent {external_id}")))?;

        match intent.status {
            IntentStatus::Succeeded => {
                let payment_id = intent.payment.ok_or_else(|| {
                    BillingError::Internal(format!(
                        "succeeded intent {external_id} has no linked payment"
                    ))
                })?;
                let payment = self.store.payment(payment_id).await?.ok_or_else(|| {
                    BillingError::Internal(format!(
                        "payment {payment_id} linked by intent {external_id} is missing"
                    ))
                })?;
                tracing::info!(intent = external_id, payment = payment.id, "confirmation replayed");
                return Ok(Confirmation::Settled(payment));
            }
            IntentStatus::Failed | IntentStatus::Canceled => {
                return Err(BillingError::Conflict(format!(
                    "intent {external_id} is already terminal ({})",
                    intent.status
                )));
            }
            IntentStatus::Created | IntentStatus::RequiresAction => {}
        }

        match outcome {
            ConfirmOutcome::RequiresAction => {
                let updated = if intent.status == IntentStatus::RequiresAction {
                    intent
                } else {
                    self.store
                        .set_intent_status(intent.id, IntentStatus::RequiresAction)
                        .await?
                };
                Ok(Confirmation::Unsettled(updated))
            }
            ConfirmOutcome::Failed => {
                let updated = self
                    .store
                    .set_intent_status(intent.id, IntentStatus::Failed)
                    .await?;
                tracing::warn!(intent = external_id, "online payment failed");
                Ok(Confirmation::Unsettled(updated))
            }
            ConfirmOutcome::Succeeded => self.settle(intent).await,
        }
    }

    /// Marks a non-terminal intent CANCELED. A terminal intent is rejected;
    /// last-writer-wins is not acceptable for this state.
    pub async fn cancel(&self, external_id: &str) -> Result<OnlineIntent> {
        let _intent_guard = self.intent_locks.acquire(external_id.to_string()).await;

        let intent = self
            .store
            .intent_by_external_id(external_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("intent {external_id}")))?;
        if intent.status.is_terminal() {
            return Err(BillingError::Conflict(format!(
                "intent {external_id} is already terminal ({})",
                intent.status
            )));
        }
        let updated = self
            .store
            .set_intent_status(intent.id, IntentStatus::Canceled)
            .await?;
        tracing::info!(intent = external_id, "online payment canceled");
        Ok(updated)
    }

    /// Verifies the success with the gateway and commits the combined write.
    /// Caller holds the intent lock; the installment lock is taken here.
    async fn settle(&self, intent: OnlineIntent) -> Result<Confirmation> {
        let state = self
            .with_gateway_timeout(
                self.gateway.describe_intent(&intent.external_id),
                "verifying the intent",
            )
            .await?;
        if state.status != IntentStatus::Succeeded {
            return Err(BillingError::Gateway(format!(
                "gateway reports intent {} as {}, not SUCCEEDED",
                intent.external_id, state.status
            )));
        }
        if state.amount != intent.amount || state.currency != intent.currency {
            return Err(BillingError::Gateway(format!(
                "gateway reports {} {} for intent {}, expected {} {}",
                state.amount, state.currency, intent.external_id, intent.amount, intent.currency
            )));
        }

        let _cuota_guard = self.installment_locks.acquire(intent.installment).await;
        let row = self.ledger.balance_of(intent.installment).await?;
        if Balance::from(intent.amount) > row.saldo {
            // The cuota was paid down through another channel after the
            // intent was created. The intent keeps its prior status.
            return Err(BillingError::Validation(format!(
                "intent {} for {} exceeds the current saldo of {}",
                intent.external_id, intent.amount, row.saldo
            )));
        }

        let (settled, payment) = self
            .store
            .settle_intent(
                intent.id,
                NewPayment {
                    installment: intent.installment,
                    amount: intent.amount,
                    medium: PaymentMedium::OnlineTarjeta,
                    reference: Some(intent.external_id.clone()),
                },
            )
            .await?;
        tracing::info!(
            intent = %settled.external_id,
            payment = payment.id,
            cuota = payment.installment,
            monto = %payment.amount,
            "online payment settled"
        );
        Ok(Confirmation::Settled(payment))
    }

    async fn with_gateway_timeout<T>(
        &self,
        call: impl Future<Output = Result<T>>,
        doing: &str,
    ) -> Result<T> {
        match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BillingError::Gateway(format!(
                "card gateway timed out while {doing}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::installment::Installment;
    use crate::domain::ports::{
        CardGateway, CreatedIntent, GatewayIntentState, LedgerStore,
    };
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use crate::infrastructure::in_memory_gateway::InMemoryCardGateway;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: SharedLedgerStore,
        gateway: Arc<InMemoryCardGateway>,
        orchestrator: OnlinePaymentOrchestrator,
    }

    async fn fixture(total: rust_decimal::Decimal) -> Fixture {
        let store: SharedLedgerStore = Arc::new(InMemoryLedgerStore::new());
        store
            .insert_installment(Installment {
                id: 1,
                unit: 1,
                period: "2025-08".to_string(),
                concept: "GASTO_COMUN".to_string(),
                due_date: NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
                total_due: Balance::new(total).unwrap(),
                is_active: true,
            })
            .await
            .unwrap();
        let gateway = Arc::new(InMemoryCardGateway::new());
        let orchestrator = OnlinePaymentOrchestrator::new(
            store.clone(),
            gateway.clone(),
            Arc::new(KeyedLocks::new()),
            "USD",
            DEFAULT_GATEWAY_TIMEOUT,
        );
        Fixture {
            store,
            gateway,
            orchestrator,
        }
    }

    fn amount(v: rust_decimal::Decimal) -> Amount {
        Amount::new(v).unwrap()
    }

    #[tokio::test]
    async fn test_initiate_defaults_to_full_saldo() {
        let f = fixture(dec!(25.50)).await;
        let initiated = f.orchestrator.initiate(1, None).await.unwrap();

        assert_eq!(initiated.intent.amount, amount(dec!(25.50)));
        assert_eq!(initiated.intent.status, IntentStatus::Created);
        assert_eq!(initiated.intent.currency, "USD");
        assert!(!initiated.client_secret.is_empty());
    }

    #[tokio::test]
    async fn test_initiate_rejects_amount_above_saldo() {
        let f = fixture(dec!(25.50)).await;
        let rejected = f.orchestrator.initiate(1, Some(amount(dec!(30.00)))).await;
        assert!(matches!(rejected, Err(BillingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_initiate_rejects_unknown_cuota() {
        let f = fixture(dec!(25.50)).await;
        assert!(matches!(
            f.orchestrator.initiate(9, None).await,
            Err(BillingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle_settles_saldo_to_zero() {
        let f = fixture(dec!(25.50)).await;
        let initiated = f.orchestrator.initiate(1, None).await.unwrap();
        let external_id = initiated.intent.external_id.clone();

        f.gateway.settle(&external_id).await.unwrap();
        let confirmation = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await
            .unwrap();

        let Confirmation::Settled(payment) = confirmation else {
            panic!("expected a settled payment");
        };
        assert_eq!(payment.medium, PaymentMedium::OnlineTarjeta);
        assert_eq!(payment.amount, amount(dec!(25.50)));
        assert_eq!(payment.reference.as_deref(), Some(external_id.as_str()));

        let row = f.orchestrator.ledger.balance_of(1).await.unwrap();
        assert_eq!(row.saldo, Balance::ZERO);

        let stored = f
            .store
            .intent_by_external_id(&external_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, IntentStatus::Succeeded);
        assert_eq!(stored.payment, Some(payment.id));
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let f = fixture(dec!(25.50)).await;
        let initiated = f.orchestrator.initiate(1, None).await.unwrap();
        let external_id = initiated.intent.external_id.clone();
        f.gateway.settle(&external_id).await.unwrap();

        let first = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await
            .unwrap();
        let second = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await
            .unwrap();

        let (Confirmation::Settled(a), Confirmation::Settled(b)) = (first, second) else {
            panic!("expected settled payments");
        };
        assert_eq!(a, b);

        // Exactly one payment exists.
        let payments = f.store.payments_for(1).await.unwrap();
        assert_eq!(payments.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_outcome_creates_no_payment() {
        let f = fixture(dec!(25.50)).await;
        let initiated = f.orchestrator.initiate(1, None).await.unwrap();
        let external_id = initiated.intent.external_id.clone();

        let confirmation = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Failed)
            .await
            .unwrap();
        let Confirmation::Unsettled(intent) = confirmation else {
            panic!("expected an unsettled intent");
        };
        assert_eq!(intent.status, IntentStatus::Failed);
        assert!(f.store.payments_for(1).await.unwrap().is_empty());

        // Terminal now; a late success replay is rejected.
        let rejected = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await;
        assert!(matches!(rejected, Err(BillingError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_requires_action_is_not_terminal() {
        let f = fixture(dec!(25.50)).await;
        let initiated = f.orchestrator.initiate(1, None).await.unwrap();
        let external_id = initiated.intent.external_id.clone();

        let confirmation = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::RequiresAction)
            .await
            .unwrap();
        let Confirmation::Unsettled(intent) = confirmation else {
            panic!("expected an unsettled intent");
        };
        assert_eq!(intent.status, IntentStatus::RequiresAction);

        f.gateway.settle(&external_id).await.unwrap();
        let confirmation = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await
            .unwrap();
        assert!(matches!(confirmation, Confirmation::Settled(_)));
    }

    #[tokio::test]
    async fn test_cancel_blocks_settlement() {
        let f = fixture(dec!(25.50)).await;
        let initiated = f.orchestrator.initiate(1, None).await.unwrap();
        let external_id = initiated.intent.external_id.clone();

        let canceled = f.orchestrator.cancel(&external_id).await.unwrap();
        assert_eq!(canceled.status, IntentStatus::Canceled);

        let rejected = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await;
        assert!(matches!(rejected, Err(BillingError::Conflict(_))));

        // Cancel of a terminal intent is rejected too.
        assert!(matches!(
            f.orchestrator.cancel(&external_id).await,
            Err(BillingError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_unverified_success_leaves_intent_retryable() {
        let f = fixture(dec!(25.50)).await;
        let initiated = f.orchestrator.initiate(1, None).await.unwrap();
        let external_id = initiated.intent.external_id.clone();

        // The gateway never saw this intent succeed.
        let rejected = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await;
        assert!(matches!(rejected, Err(BillingError::Gateway(_))));

        let intent = f
            .store
            .intent_by_external_id(&external_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.status, IntentStatus::Created);

        // Once the gateway catches up, the retry settles.
        f.gateway.settle(&external_id).await.unwrap();
        let confirmation = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await
            .unwrap();
        assert!(matches!(confirmation, Confirmation::Settled(_)));
    }

    #[tokio::test]
    async fn test_stale_intent_amount_rejected_after_other_channel_payment() {
        let f = fixture(dec!(50.00)).await;
        let initiated = f
            .orchestrator
            .initiate(1, Some(amount(dec!(40.00))))
            .await
            .unwrap();
        let external_id = initiated.intent.external_id.clone();

        // A direct payment lands before the card confirmation arrives.
        f.store
            .insert_payment(NewPayment {
                installment: 1,
                amount: amount(dec!(20.00)),
                medium: PaymentMedium::Efectivo,
                reference: None,
            })
            .await
            .unwrap();

        f.gateway.settle(&external_id).await.unwrap();
        let rejected = f
            .orchestrator
            .confirm(&external_id, ConfirmOutcome::Succeeded)
            .await;
        assert!(matches!(rejected, Err(BillingError::Validation(_))));

        // Intent untouched, no second payment written.
        let intent = f
            .store
            .intent_by_external_id(&external_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.status, IntentStatus::Created);
        assert_eq!(f.store.payments_for(1).await.unwrap().len(), 1);
    }

    struct StalledGateway;

    #[async_trait]
    impl CardGateway for StalledGateway {
        async fn create_intent(&self, _amount: Amount, _currency: &str) -> Result<CreatedIntent> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }

        async fn describe_intent(&self, _external_id: &str) -> Result<GatewayIntentState> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_timeout_leaves_no_provisional_record() {
        let store: SharedLedgerStore = Arc::new(InMemoryLedgerStore::new());
        store
            .insert_installment(Installment {
                id: 1,
                unit: 1,
                period: "2025-08".to_string(),
                concept: "GASTO_COMUN".to_string(),
                due_date: NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
                total_due: Balance::new(dec!(25.50)).unwrap(),
                is_active: true,
            })
            .await
            .unwrap();
        let orchestrator = OnlinePaymentOrchestrator::new(
            store.clone(),
            Arc::new(StalledGateway),
            Arc::new(KeyedLocks::new()),
            "USD",
            Duration::from_millis(100),
        );

        let rejected = orchestrator.initiate(1, None).await;
        assert!(matches!(rejected, Err(BillingError::Gateway(_))));
    }
}
