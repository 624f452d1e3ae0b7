//! Document-shaped domain model for shelter records.
//!
//! # Responsibility
//! - Define the document type shared by records, filters, updates and
//!   projections.
//! - Gate inserts behind required-field validation.
//! - Normalize update payloads into operator form.
//!
//! # Invariants
//! - A record missing any required field is never handed to a store.
//! - Update payloads reaching a store are always operator-wrapped.

pub mod record;
pub mod update;

/// JSON object used for records, filters, update payloads and projections.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Store-assigned identity of a persisted record.
pub type RecordId = String;

/// Field name under which stores keep the assigned record identity.
pub const ID_FIELD: &str = "_id";
