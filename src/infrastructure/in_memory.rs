use crate::domain::installment::{Installment, InstallmentId, UnitId};
use crate::domain::intent::{IntentId, IntentStatus, NewIntent, OnlineIntent};
use crate::domain::payment::{NewPayment, Payment, PaymentId, PaymentMedium};
use crate::domain::ports::LedgerStore;
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    installments: HashMap<InstallmentId, Installment>,
    payments: BTreeMap<PaymentId, Payment>,
    intents: BTreeMap<IntentId, OnlineIntent>,
    next_payment_id: PaymentId,
    next_intent_id: IntentId,
}

impl State {
    fn reference_taken(&self, medium: PaymentMedium, reference: &str) -> bool {
        self.payments.values().any(|p| {
            p.valid && p.medium == medium && p.reference.as_deref() == Some(reference)
        })
    }

    fn append_payment(&mut self, new: NewPayment) -> Result<Payment> {
        if let Some(reference) = &new.reference
            && self.reference_taken(new.medium, reference)
        {
            return Err(BillingError::Conflict(format!(
                "reference {reference} already used for medium {}",
                new.medium
            )));
        }
        self.next_payment_id += 1;
        let payment = Payment {
            id: self.next_payment_id,
            installment: new.installment,
            amount: new.amount,
            medium: new.medium,
            reference: new.reference,
            valid: true,
            created_at: Utc::now(),
        };
        self.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }
}

/// Thread-safe in-memory ledger store.
///
/// A single `RwLock` over the whole state makes every method atomic and lets
/// [`LedgerStore::settle_intent`] commit its two writes under one write
/// guard, the way a relational adapter would use one transaction.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_installment(&self, installment: Installment) -> Result<()> {
        let mut state = self.state.write().await;
        if state.installments.contains_key(&installment.id) {
            return Err(BillingError::Conflict(format!(
                "cuota {} already exists",
                installment.id
            )));
        }
        state.installments.insert(installment.id, installment);
        Ok(())
    }

    async fn installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        let state = self.state.read().await;
        Ok(state.installments.get(&id).cloned())
    }

    async fn installments_for_unit(&self, unit: UnitId) -> Result<Vec<Installment>> {
        let state = self.state.read().await;
        Ok(state
            .installments
            .values()
            .filter(|i| i.unit == unit)
            .cloned()
            .collect())
    }

    async fn units(&self) -> Result<Vec<UnitId>> {
        let state = self.state.read().await;
        let units: BTreeSet<UnitId> = state.installments.values().map(|i| i.unit).collect();
        Ok(units.into_iter().collect())
    }

    async fn insert_payment(&self, new: NewPayment) -> Result<Payment> {
        let mut state = self.state.write().await;
        state.append_payment(new)
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(&id).cloned())
    }

    async fn payments_for(&self, installment: InstallmentId) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .filter(|p| p.installment == installment)
            .cloned()
            .collect())
    }

    async fn reference_in_use(&self, medium: PaymentMedium, reference: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.reference_taken(medium, reference))
    }

    async fn set_payment_validity(&self, id: PaymentId, valid: bool) -> Result<Payment> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| BillingError::NotFound(format!("pago {id}")))?;
        payment.valid = valid;
        Ok(payment.clone())
    }

    async fn insert_intent(&self, new: NewIntent) -> Result<OnlineIntent> {
        let mut state = self.state.write().await;
        if state
            .intents
            .values()
            .any(|i| i.external_id == new.external_id)
        {
            return Err(BillingError::Conflict(format!(
                "intent {} already recorded",
                new.external_id
            )));
        }
        state.next_intent_id += 1;
        let intent = OnlineIntent {
            id: state.next_intent_id,
            installment: new.installment,
            amount: new.amount,
            currency: new.currency,
            external_id: new.external_id,
            status: new.status,
            payment: None,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        state.intents.insert(intent.id, intent.clone());
        Ok(intent)
    }

    async fn intent_by_external_id(&self, external_id: &str) -> Result<Option<OnlineIntent>> {
        let state = self.state.read().await;
        Ok(state
            .intents
            .values()
            .find(|i| i.external_id == external_id)
            .cloned())
    }

    async fn set_intent_status(
        &self,
        id: IntentId,
        status: IntentStatus,
    ) -> Result<OnlineIntent> {
        let mut state = self.state.write().await;
        let intent = state
            .intents
            .get_mut(&id)
            .ok_or_else(|| BillingError::NotFound(format!("intent {id}")))?;
        intent.status = status;
        Ok(intent.clone())
    }

    async fn settle_intent(
        &self,
        id: IntentId,
        new_payment: NewPayment,
    ) -> Result<(OnlineIntent, Payment)> {
        let mut state = self.state.write().await;
        if !state.intents.contains_key(&id) {
            return Err(BillingError::NotFound(format!("intent {id}")));
        }
        // The payment insert validates first, so a conflict leaves the intent
        // untouched.
        let payment = state.append_payment(new_payment)?;
        let intent = state
            .intents
            .get_mut(&id)
            .ok_or_else(|| BillingError::Internal(format!("intent {id} vanished mid-commit")))?;
        intent.status = IntentStatus::Succeeded;
        intent.payment = Some(payment.id);
        Ok((intent.clone(), payment))
    }
}
