use crate::domain::installment::Installment;
use crate::domain::money::Balance;
use crate::error::{BillingError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct InstallmentRecord {
    cuota: u64,
    unidad: u64,
    periodo: String,
    concepto: String,
    vencimiento: NaiveDate,
    total: Decimal,
    activa: bool,
}

/// Reads the installment seed produced by the billing-generation process.
///
/// Expected header: `cuota, unidad, periodo, concepto, vencimiento, total, activa`.
pub struct InstallmentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> InstallmentReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and validates installments; a negative total is rejected
    /// here, before anything reaches the store.
    pub fn installments(self) -> impl Iterator<Item = Result<Installment>> {
        self.reader.into_deserialize().map(|record| {
            let record: InstallmentRecord = record.map_err(BillingError::from)?;
            Ok(Installment {
                id: record.cuota,
                unit: record.unidad,
                period: record.periodo,
                concept: record.concepto,
                due_date: record.vencimiento,
                total_due: Balance::new(record.total)?,
                is_active: record.activa,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reads_valid_seed() {
        let data = "cuota, unidad, periodo, concepto, vencimiento, total, activa\n\
                    1, 7, 2025-08, GASTO_COMUN, 2025-08-31, 100.00, true\n\
                    2, 7, 2025-09, GASTO_COMUN, 2025-09-30, 50.00, false";
        let rows: Vec<_> = InstallmentReader::new(data.as_bytes())
            .installments()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].total_due, Balance::new(dec!(100.00)).unwrap());
        assert!(!rows[1].is_active);
    }

    #[test]
    fn test_negative_total_rejected() {
        let data = "cuota, unidad, periodo, concepto, vencimiento, total, activa\n\
                    1, 7, 2025-08, GASTO_COMUN, 2025-08-31, -5.00, true";
        let rows: Vec<_> = InstallmentReader::new(data.as_bytes())
            .installments()
            .collect();
        assert!(matches!(rows[0], Err(BillingError::Validation(_))));
    }

    #[test]
    fn test_malformed_row_is_an_error() {
        let data = "cuota, unidad, periodo, concepto, vencimiento, total, activa\n\
                    1, 7, 2025-08, GASTO_COMUN, not-a-date, 5.00, true";
        let rows: Vec<_> = InstallmentReader::new(data.as_bytes())
            .installments()
            .collect();
        assert!(rows[0].is_err());
    }
}
