//! Domain model: money value objects, ledger entities and the two
//! collaborator ports (ledger store, card gateway).

pub mod installment;
pub mod intent;
pub mod money;
pub mod payment;
pub mod ports;
