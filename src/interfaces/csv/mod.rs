//! CSV interfaces for the binary: installment seeding, ledger commands and
//! the printable estado de cuenta.

pub mod command_reader;
pub mod installment_reader;
pub mod summary_writer;
