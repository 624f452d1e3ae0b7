//! Animal record model and insert-time validation.
//!
//! # Responsibility
//! - Check that incoming records are mappings carrying every required field.
//! - Hand validated records to the repository without transforming them.
//!
//! # Invariants
//! - Validation performs no type coercion.
//! - `MissingFields` always names the full required set.

use super::Document;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Field holding the species, e.g. `Dog`.
pub const ANIMAL_TYPE_FIELD: &str = "animal_type";
/// Field holding the breed label.
pub const BREED_FIELD: &str = "breed";
/// Field holding the age at outcome, in weeks.
pub const AGE_FIELD: &str = "age_upon_outcome_in_weeks";
/// Field holding the sex/intact status at outcome.
pub const SEX_FIELD: &str = "sex_upon_outcome";

/// Fields every record must carry before it may be inserted.
pub const REQUIRED_FIELDS: [&str; 3] = [ANIMAL_TYPE_FIELD, BREED_FIELD, AGE_FIELD];

/// Reasons a record is rejected before insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input was not a non-empty JSON object.
    InvalidFormat,
    /// One or more required fields were absent.
    MissingFields {
        required: &'static [&'static str],
        missing: Vec<&'static str>,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "invalid data format: expected a non-empty mapping"),
            Self::MissingFields { required, missing } => write!(
                f,
                "missing required fields [{}]; required: [{}]",
                missing.join(", "),
                required.join(", ")
            ),
        }
    }
}

impl Error for ValidationError {}

/// A shelter record that passed insert validation.
///
/// Wraps the caller's document as-is; extra fields ride along untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnimalRecord(Document);

impl AnimalRecord {
    /// Borrows the underlying document.
    pub fn as_document(&self) -> &Document {
        &self.0
    }

    /// Returns the underlying document.
    pub fn into_document(self) -> Document {
        self.0
    }

    /// Species, when stored as text.
    pub fn animal_type(&self) -> Option<&str> {
        self.0.get(ANIMAL_TYPE_FIELD).and_then(Value::as_str)
    }

    /// Breed, when stored as text.
    pub fn breed(&self) -> Option<&str> {
        self.0.get(BREED_FIELD).and_then(Value::as_str)
    }
}

impl TryFrom<Document> for AnimalRecord {
    type Error = ValidationError;

    fn try_from(value: Document) -> Result<Self, Self::Error> {
        check_document(&value)?;
        Ok(Self(value))
    }
}

/// Validates a caller-supplied record before insertion.
///
/// # Errors
/// - `InvalidFormat` when `record` is not an object or is empty.
/// - `MissingFields` when any of [`REQUIRED_FIELDS`] is absent.
pub fn validate_record(record: &Value) -> Result<AnimalRecord, ValidationError> {
    match record {
        Value::Object(document) => AnimalRecord::try_from(document.clone()),
        _ => Err(ValidationError::InvalidFormat),
    }
}

fn check_document(document: &Document) -> Result<(), ValidationError> {
    if document.is_empty() {
        return Err(ValidationError::InvalidFormat);
    }

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !document.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields {
            required: &REQUIRED_FIELDS,
            missing,
        });
    }

    Ok(())
}
