use crate::domain::installment::InstallmentId;
use crate::domain::money::Amount;
use crate::domain::payment::PaymentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type IntentId = u64;

/// Lifecycle state of an online payment intent.
///
/// `Created → RequiresAction → Succeeded` is the happy path; `Failed` and
/// `Canceled` are the other terminal states. No transition leaves a terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentStatus {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "REQUIRES_ACTION")]
    RequiresAction,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELED")]
    Canceled,
}

impl IntentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::RequiresAction => "REQUIRES_ACTION",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        };
        write!(f, "{name}")
    }
}

/// Provisional record of a card charge requested from the gateway, written
/// before the external confirmation step.
///
/// A `Succeeded` intent always links the payment it settled into; the two
/// writes commit as one unit in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlineIntent {
    pub id: IntentId,
    pub installment: InstallmentId,
    pub amount: Amount,
    pub currency: String,
    /// Identifier assigned by the card gateway, e.g. a Stripe intent id.
    pub external_id: String,
    pub status: IntentStatus,
    pub payment: Option<PaymentId>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Intent fields supplied by the orchestrator; the store assigns id and
/// timestamp.
#[derive(Debug, Clone)]
pub struct NewIntent {
    pub installment: InstallmentId,
    pub amount: Amount,
    pub currency: String,
    pub external_id: String,
    pub status: IntentStatus,
    pub metadata: serde_json::Value,
}
