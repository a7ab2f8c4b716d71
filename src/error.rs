use thiserror::Error;

/// Errors surfaced by the reconciliation core.
///
/// The first five variants form the taxonomy exposed to callers; `Csv` and
/// `Io` only occur at the CSV interface layer of the binary.
#[derive(Error, Debug)]
pub enum BillingError {
    /// Bad amount, non-payable installment, overpayment attempt.
    #[error("validation error: {0}")]
    Validation(String),
    /// Duplicate (medium, reference) pair, or a transition attempted on a
    /// terminal intent.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Unknown installment, payment or intent id.
    #[error("not found: {0}")]
    NotFound(String),
    /// Card network failure, timeout or verification mismatch. Retryable.
    #[error("gateway error: {0}")]
    Gateway(String),
    /// Storage failure. State is left as it was.
    #[error("internal error: {0}")]
    Internal(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BillingError>;

impl BillingError {
    /// Whether a caller may safely retry the operation that produced this
    /// error without risking a duplicate side effect.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(_) | Self::Internal(_))
    }
}
