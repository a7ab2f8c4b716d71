use crate::application::ledger::InstallmentBalance;
use crate::domain::money::Balance;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct Row<'a> {
    cuota: u64,
    unidad: u64,
    periodo: &'a str,
    concepto: &'a str,
    vencimiento: NaiveDate,
    total_a_pagar: Balance,
    pagado: Balance,
    saldo: Balance,
    estado: &'static str,
}

/// Writes the printable estado de cuenta table, one row per installment with
/// its derived figures.
pub struct EstadoCuentaWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> EstadoCuentaWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_rows(&mut self, rows: &[InstallmentBalance]) -> Result<()> {
        for row in rows {
            self.writer.serialize(Row {
                cuota: row.installment.id,
                unidad: row.installment.unit,
                periodo: &row.installment.period,
                concepto: &row.installment.concept,
                vencimiento: row.installment.due_date,
                total_a_pagar: row.installment.total_due,
                pagado: row.paid,
                saldo: row.saldo,
                estado: row.status.as_str(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
