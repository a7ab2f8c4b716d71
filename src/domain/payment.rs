use crate::domain::installment::InstallmentId;
use crate::domain::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PaymentId = u64;

/// The channel a payment came through. Closed enumeration; wire names follow
/// the billing API (`medio`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMedium {
    #[serde(rename = "EFECTIVO")]
    Efectivo,
    #[serde(rename = "TRANSFERENCIA")]
    Transferencia,
    #[serde(rename = "TARJETA")]
    Tarjeta,
    /// Settled through the card gateway by the online payment orchestrator.
    #[serde(rename = "ONLINE_TARJETA")]
    OnlineTarjeta,
    #[serde(rename = "OTRO")]
    Otro,
}

impl Default for PaymentMedium {
    fn default() -> Self {
        Self::Efectivo
    }
}

impl fmt::Display for PaymentMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Efectivo => "EFECTIVO",
            Self::Transferencia => "TRANSFERENCIA",
            Self::Tarjeta => "TARJETA",
            Self::OnlineTarjeta => "ONLINE_TARJETA",
            Self::Otro => "OTRO",
        };
        write!(f, "{name}")
    }
}

/// A recorded settlement (pago) against one installment.
///
/// Payments are append-only: an erroneous entry is soft-invalidated, never
/// deleted, so the ledger history stays intact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub installment: InstallmentId,
    pub amount: Amount,
    pub medium: PaymentMedium,
    /// Unique per (medium, reference) when present; the orchestrator stores
    /// the external intent id here.
    pub reference: Option<String>,
    pub valid: bool,
    pub created_at: DateTime<Utc>,
}

/// Payment fields supplied by the caller; the store assigns id, timestamp and
/// the initial `valid = true` flag.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub installment: InstallmentId,
    pub amount: Amount,
    pub medium: PaymentMedium,
    pub reference: Option<String>,
}
