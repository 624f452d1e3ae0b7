//! Repository façade over the shelter collection.
//!
//! # Responsibility
//! - Compose validation, normalization and the rescue catalog in front of a
//!   document store.
//! - Contain store faults behind uniform outcome values.
//!
//! # Invariants
//! - Writes must pass `validate_record()` or `normalize_update()` before any
//!   store call.
//! - CRUD operations never return `Err` or panic on store faults; only
//!   construction does.

pub mod shelter_repo;
