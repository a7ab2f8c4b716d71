use crate::domain::money::Balance;
use chrono::NaiveDate;
use serde::Serialize;

pub type InstallmentId = u64;
pub type UnitId = u64;

/// A single billable charge (cuota) against a unit.
///
/// The aggregate paid amount is never stored here; it is always derived from
/// the valid payments referencing the installment, so one authority computes
/// every balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Installment {
    #[serde(rename = "cuota")]
    pub id: InstallmentId,
    #[serde(rename = "unidad")]
    pub unit: UnitId,
    /// Billing period label, `"YYYY-MM"`.
    #[serde(rename = "periodo")]
    pub period: String,
    #[serde(rename = "concepto")]
    pub concept: String,
    #[serde(rename = "vencimiento")]
    pub due_date: NaiveDate,
    #[serde(rename = "total_a_pagar")]
    pub total_due: Balance,
    /// Soft-delete flag; an inactive installment is never payable.
    #[serde(rename = "activa")]
    pub is_active: bool,
}

impl Installment {
    /// Whether the installment can receive payments given its current saldo.
    pub fn is_payable(&self, saldo: Balance) -> bool {
        self.is_active && saldo.is_positive()
    }
}

/// Derived installment state, recomputed on read and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstallmentStatus {
    #[serde(rename = "PENDIENTE")]
    Pendiente,
    #[serde(rename = "PARCIAL")]
    Parcial,
    #[serde(rename = "PAGADA")]
    Pagada,
    #[serde(rename = "VENCIDA")]
    Vencida,
    #[serde(rename = "ANULADA")]
    Anulada,
}

impl InstallmentStatus {
    /// Derives the state from the installment and its accumulated valid
    /// payments, as of `today`.
    pub fn derive(installment: &Installment, paid: Balance, today: NaiveDate) -> Self {
        if !installment.is_active {
            return Self::Anulada;
        }
        if installment.total_due.is_positive() && paid >= installment.total_due {
            return Self::Pagada;
        }
        if paid.is_positive() && paid < installment.total_due {
            return Self::Parcial;
        }
        if today > installment.due_date && installment.total_due.is_positive() {
            Self::Vencida
        } else {
            Self::Pendiente
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "PENDIENTE",
            Self::Parcial => "PARCIAL",
            Self::Pagada => "PAGADA",
            Self::Vencida => "VENCIDA",
            Self::Anulada => "ANULADA",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn installment(total: rust_decimal::Decimal, active: bool) -> Installment {
        Installment {
            id: 1,
            unit: 1,
            period: "2025-08".to_string(),
            concept: "GASTO_COMUN".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
            total_due: Balance::new(total).unwrap(),
            is_active: active,
        }
    }

    fn balance(v: rust_decimal::Decimal) -> Balance {
        Balance::new(v).unwrap()
    }

    #[test]
    fn test_payable_requires_active_and_positive_saldo() {
        let cuota = installment(dec!(100.00), true);
        assert!(cuota.is_payable(balance(dec!(40.00))));
        assert!(!cuota.is_payable(Balance::ZERO));

        let anulada = installment(dec!(100.00), false);
        assert!(!anulada.is_payable(balance(dec!(40.00))));
    }

    #[test]
    fn test_status_derivation() {
        let cuota = installment(dec!(100.00), true);
        let on_time = NaiveDate::from_ymd_opt(2025, 8, 10).unwrap();
        let late = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();

        assert_eq!(
            InstallmentStatus::derive(&cuota, Balance::ZERO, on_time),
            InstallmentStatus::Pendiente
        );
        assert_eq!(
            InstallmentStatus::derive(&cuota, balance(dec!(60.00)), on_time),
            InstallmentStatus::Parcial
        );
        assert_eq!(
            InstallmentStatus::derive(&cuota, balance(dec!(100.00)), on_time),
            InstallmentStatus::Pagada
        );
        assert_eq!(
            InstallmentStatus::derive(&cuota, Balance::ZERO, late),
            InstallmentStatus::Vencida
        );
    }

    #[test]
    fn test_partial_payment_past_due_stays_parcial() {
        let cuota = installment(dec!(100.00), true);
        let late = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        assert_eq!(
            InstallmentStatus::derive(&cuota, balance(dec!(10.00)), late),
            InstallmentStatus::Parcial
        );
    }

    #[test]
    fn test_inactive_is_anulada_regardless_of_payments() {
        let cuota = installment(dec!(100.00), false);
        let today = NaiveDate::from_ymd_opt(2025, 8, 10).unwrap();
        assert_eq!(
            InstallmentStatus::derive(&cuota, balance(dec!(100.00)), today),
            InstallmentStatus::Anulada
        );
    }
}
