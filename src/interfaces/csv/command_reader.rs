use crate::application::orchestrator::ConfirmOutcome;
use crate::domain::payment::PaymentMedium;
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Direct payment registration.
    Pago,
    /// Initiate an online card payment.
    Init,
    /// Apply a gateway outcome to an intent.
    Confirm,
    /// Cancel a non-terminal intent.
    Cancel,
    /// Soft-invalidate a recorded payment.
    Revertir,
}

/// One row of the command CSV replayed against the core.
///
/// Header: `op, cuota, monto, medio, referencia, resultado`. Which columns a
/// row uses depends on the op: `confirm`/`cancel` carry the external intent
/// id in `referencia`, `revertir` carries the payment id there.
#[derive(Debug, Deserialize)]
pub struct Command {
    pub op: OpKind,
    pub cuota: Option<u64>,
    pub monto: Option<Decimal>,
    pub medio: Option<PaymentMedium>,
    pub referencia: Option<String>,
    pub resultado: Option<ConfirmOutcome>,
}

/// Streams ledger commands from a CSV source for the binary's replay loop.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|record| record.map_err(BillingError::from))
    }
}
