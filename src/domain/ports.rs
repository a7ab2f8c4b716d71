use crate::domain::installment::{Installment, InstallmentId, UnitId};
use crate::domain::intent::{IntentId, IntentStatus, NewIntent, OnlineIntent};
use crate::domain::money::Amount;
use crate::domain::payment::{NewPayment, Payment, PaymentId, PaymentMedium};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub type SharedLedgerStore = Arc<dyn LedgerStore>;
pub type SharedCardGateway = Arc<dyn CardGateway>;

/// Persistence port for installments, payments and online intents.
///
/// Implementations must make each method atomic on its own, and
/// [`LedgerStore::settle_intent`] atomic as a combined multi-row commit: the
/// payment insert, the SUCCEEDED transition and the payment link land together
/// or not at all.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_installment(&self, installment: Installment) -> Result<()>;
    async fn installment(&self, id: InstallmentId) -> Result<Option<Installment>>;
    async fn installments_for_unit(&self, unit: UnitId) -> Result<Vec<Installment>>;
    /// Units present in the store, ascending.
    async fn units(&self) -> Result<Vec<UnitId>>;

    /// Inserts a payment, enforcing the (medium, reference) uniqueness
    /// constraint when a reference is present.
    async fn insert_payment(&self, new: NewPayment) -> Result<Payment>;
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    /// All payments referencing the installment, valid or not, oldest first.
    async fn payments_for(&self, installment: InstallmentId) -> Result<Vec<Payment>>;
    async fn reference_in_use(&self, medium: PaymentMedium, reference: &str) -> Result<bool>;
    async fn set_payment_validity(&self, id: PaymentId, valid: bool) -> Result<Payment>;

    async fn insert_intent(&self, new: NewIntent) -> Result<OnlineIntent>;
    async fn intent_by_external_id(&self, external_id: &str) -> Result<Option<OnlineIntent>>;
    async fn set_intent_status(&self, id: IntentId, status: IntentStatus)
        -> Result<OnlineIntent>;
    /// Combined atomic commit for a confirmed intent: inserts the payment,
    /// marks the intent SUCCEEDED and links the payment id.
    async fn settle_intent(
        &self,
        id: IntentId,
        new_payment: NewPayment,
    ) -> Result<(OnlineIntent, Payment)>;
}

/// Response to [`CardGateway::create_intent`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedIntent {
    pub external_id: String,
    /// Handed to the client so it can complete card capture with the network.
    pub client_secret: String,
    /// Whether the network already wants further client action.
    pub requires_action: bool,
}

/// Snapshot of an intent as the gateway sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayIntentState {
    pub status: IntentStatus,
    pub amount: Amount,
    pub currency: String,
}

/// Port to the external card payment network. Card capture and tokenization
/// stay on the gateway's side; the core only creates and inspects intents.
#[async_trait]
pub trait CardGateway: Send + Sync {
    async fn create_intent(&self, amount: Amount, currency: &str) -> Result<CreatedIntent>;
    async fn describe_intent(&self, external_id: &str) -> Result<GatewayIntentState>;
}
