use crate::domain::installment::{Installment, InstallmentId, InstallmentStatus, UnitId};
use crate::domain::money::Balance;
use crate::domain::payment::Payment;
use crate::domain::ports::{LedgerStore, SharedLedgerStore};
use crate::error::{BillingError, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;

/// An installment combined with its derived figures. Every consumer reads the
/// saldo from here; nothing else recomputes `total - paid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentBalance {
    #[serde(flatten)]
    pub installment: Installment,
    #[serde(rename = "pagado")]
    pub paid: Balance,
    pub saldo: Balance,
    #[serde(rename = "estado")]
    pub status: InstallmentStatus,
}

impl InstallmentBalance {
    pub fn is_payable(&self) -> bool {
        self.installment.is_payable(self.saldo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallmentOrder {
    #[default]
    DueDateAsc,
    DueDateDesc,
}

/// Listing filter; `period` and `active` narrow the result when present.
#[derive(Debug, Clone)]
pub struct InstallmentFilter {
    pub unit: UnitId,
    pub period: Option<String>,
    pub active: Option<bool>,
    pub order: InstallmentOrder,
}

impl InstallmentFilter {
    pub fn for_unit(unit: UnitId) -> Self {
        Self {
            unit,
            period: None,
            active: None,
            order: InstallmentOrder::default(),
        }
    }
}

/// The "estado de cuenta" figures for one unit, aggregated over valid
/// payments only.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    #[serde(rename = "unidad")]
    pub unit: UnitId,
    pub fecha_corte: NaiveDate,
    pub saldo_pendiente: Balance,
    pub cuotas_pendientes: usize,
    pub total_pagado_historico: Balance,
    pub total_cobrado_historico: Balance,
    pub ultimo_pago: Option<Payment>,
    pub cuotas: Vec<InstallmentBalance>,
}

/// Source of truth for how much is owed and what remains.
#[derive(Clone)]
pub struct InstallmentLedger {
    store: SharedLedgerStore,
}

impl InstallmentLedger {
    pub fn new(store: SharedLedgerStore) -> Self {
        Self { store }
    }

    /// Resolves one installment with its paid total, saldo and derived state.
    pub async fn balance_of(&self, id: InstallmentId) -> Result<InstallmentBalance> {
        let installment = self
            .store
            .installment(id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("cuota {id}")))?;
        let payments = self.store.payments_for(id).await?;
        Ok(self.resolve(installment, &payments, today()))
    }

    /// Installments of a unit with computed saldo, due date ascending unless
    /// the filter overrides the order.
    pub async fn list_installments(
        &self,
        filter: &InstallmentFilter,
    ) -> Result<Vec<InstallmentBalance>> {
        let installments = self.store.installments_for_unit(filter.unit).await?;
        let cut_off = today();
        let mut rows = Vec::with_capacity(installments.len());
        for installment in installments {
            if let Some(period) = &filter.period
                && installment.period != *period
            {
                continue;
            }
            if let Some(active) = filter.active
                && installment.is_active != active
            {
                continue;
            }
            let payments = self.store.payments_for(installment.id).await?;
            rows.push(self.resolve(installment, &payments, cut_off));
        }
        rows.sort_by(|a, b| {
            let ordering = a
                .installment
                .due_date
                .cmp(&b.installment.due_date)
                .then(a.installment.id.cmp(&b.installment.id));
            match filter.order {
                InstallmentOrder::DueDateAsc => ordering,
                InstallmentOrder::DueDateDesc => ordering.reverse(),
            }
        });
        Ok(rows)
    }

    /// First installment, due date ascending, with positive saldo on an
    /// active cuota. `None` when nothing qualifies; never an error.
    pub fn first_payable<'a>(rows: &'a [InstallmentBalance]) -> Option<&'a InstallmentBalance> {
        rows.iter().filter(|row| row.is_payable()).min_by(|a, b| {
            a.installment
                .due_date
                .cmp(&b.installment.due_date)
                .then(a.installment.id.cmp(&b.installment.id))
        })
    }

    /// Convenience for the "pay now" short-circuit when no specific cuota was
    /// chosen.
    pub async fn first_payable_for_unit(
        &self,
        unit: UnitId,
    ) -> Result<Option<InstallmentBalance>> {
        let rows = self
            .list_installments(&InstallmentFilter::for_unit(unit))
            .await?;
        Ok(Self::first_payable(&rows).cloned())
    }

    /// Builds the estado de cuenta for a unit. Invalidated payments are
    /// excluded from every aggregate.
    pub async fn account_summary(&self, unit: UnitId) -> Result<AccountSummary> {
        let cut_off = today();
        let installments = self.store.installments_for_unit(unit).await?;
        if installments.is_empty() {
            return Err(BillingError::NotFound(format!("unidad {unit}")));
        }

        let mut rows = Vec::with_capacity(installments.len());
        let mut saldo_pendiente = Balance::ZERO;
        let mut cuotas_pendientes = 0;
        let mut total_pagado = Balance::ZERO;
        let mut total_cobrado = Balance::ZERO;
        let mut ultimo_pago: Option<Payment> = None;

        for installment in installments {
            let payments = self.store.payments_for(installment.id).await?;
            for payment in payments.iter().filter(|p| p.valid) {
                total_pagado += Balance::from(payment.amount);
                let newer = match &ultimo_pago {
                    Some(latest) => {
                        (payment.created_at, payment.id) > (latest.created_at, latest.id)
                    }
                    None => true,
                };
                if newer {
                    ultimo_pago = Some(payment.clone());
                }
            }
            let row = self.resolve(installment, &payments, cut_off);
            if row.installment.is_active {
                total_cobrado += row.installment.total_due;
                saldo_pendiente += row.saldo;
                if row.saldo.is_positive() {
                    cuotas_pendientes += 1;
                }
            }
            rows.push(row);
        }
        rows.sort_by(|a, b| {
            a.installment
                .due_date
                .cmp(&b.installment.due_date)
                .then(a.installment.id.cmp(&b.installment.id))
        });

        Ok(AccountSummary {
            unit,
            fecha_corte: cut_off,
            saldo_pendiente,
            cuotas_pendientes,
            total_pagado_historico: total_pagado,
            total_cobrado_historico: total_cobrado,
            ultimo_pago,
            cuotas: rows,
        })
    }

    fn resolve(
        &self,
        installment: Installment,
        payments: &[Payment],
        cut_off: NaiveDate,
    ) -> InstallmentBalance {
        let paid = payments
            .iter()
            .filter(|p| p.valid)
            .fold(Balance::ZERO, |acc, p| acc.plus(p.amount));
        let saldo = installment.total_due.saturating_sub(paid);
        let status = InstallmentStatus::derive(&installment, paid, cut_off);
        InstallmentBalance {
            installment,
            paid,
            saldo,
            status,
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
