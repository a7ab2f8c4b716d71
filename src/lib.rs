//! Installment-payment reconciliation core for a managed property.
//!
//! Residents' billing state ("estado de cuenta") lives in an installment
//! ledger; direct payments and online card payments settle against it through
//! the [`application`] services, behind the [`domain::ports`] collaborators.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
