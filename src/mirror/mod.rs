//! Destination-side mutation: initial migration and per-cycle reconciliation.

pub mod bootstrap;
pub mod reconcile;
