//! Canned query templates.
//!
//! # Responsibility
//! - Map symbolic rescue categories to fixed filter predicates.
//!
//! # Invariants
//! - Catalog entries are compile-time constants and never mutate.

pub mod rescue;
