//! Adapters for the domain ports: an in-memory ledger store and a
//! deterministic in-memory card gateway.

pub mod in_memory;
pub mod in_memory_gateway;
