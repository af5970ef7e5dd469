//! Reconciliation logic for each resource kind
//!
//! Each reconciler receives the observed resource plus its collaborators and
//! drives the namespace towards the declared spec. All of them gate real work
//! on the last-applied marker so an unchanged spec reconciles to a no-op.

pub mod cluster;
pub mod dump;
pub mod restore;
