//! Update payload normalization.
//!
//! # Responsibility
//! - Turn flat field maps into partial-update instructions.
//!
//! # Invariants
//! - A `NormalizedUpdate` only holds operator keys (or is empty).
//! - Normalization is total; it never fails.

use super::Document;
use serde_json::Value;

/// Prefix reserved for update and query operators.
pub const OPERATOR_PREFIX: char = '$';

/// Operator used to wrap flat field maps.
pub const SET_OPERATOR: &str = "$set";

/// Update payload guaranteed to be expressed through update operators.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedUpdate(Document);

impl NormalizedUpdate {
    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

/// Returns whether `key` names an operator rather than a field.
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with(OPERATOR_PREFIX)
}

/// Normalizes an update payload into operator form.
///
/// Payloads whose keys are all operators pass through unchanged. Anything
/// else is wrapped whole under `$set`, so a flat field map updates only the
/// named fields instead of replacing the stored document.
pub fn normalize_update(payload: Document) -> NormalizedUpdate {
    if payload.keys().all(|key| is_operator_key(key)) {
        return NormalizedUpdate(payload);
    }

    let mut wrapped = Document::new();
    wrapped.insert(SET_OPERATOR.to_string(), Value::Object(payload));
    NormalizedUpdate(wrapped)
}
