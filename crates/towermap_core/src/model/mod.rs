//! Domain model for the canonical marker store.

pub mod audit;
pub mod marker;
