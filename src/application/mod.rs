//! Application layer: the installment ledger, the payment recorder and the
//! online payment orchestrator, plus the per-key serialization they share.

pub mod ledger;
pub mod locks;
pub mod orchestrator;
pub mod recorder;
