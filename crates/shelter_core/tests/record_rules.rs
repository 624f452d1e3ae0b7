use serde_json::{json, Value};
use shelter_core::{normalize_update, validate_record, Document, ValidationError, REQUIRED_FIELDS};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

#[test]
fn valid_record_passes_through_unchanged() {
    let input = json!({
        "animal_type": "Dog",
        "breed": "Newfoundland",
        "age_upon_outcome_in_weeks": "52",
        "name": "Bear",
        "color": "Black"
    });

    let record = validate_record(&input).unwrap();
    assert_eq!(Value::Object(record.into_document()), input);
}

#[test]
fn every_single_missing_field_is_rejected() {
    for missing in REQUIRED_FIELDS {
        let mut record = doc(json!({
            "animal_type": "Dog",
            "breed": "Newfoundland",
            "age_upon_outcome_in_weeks": 52
        }));
        record.remove(missing);

        let err = validate_record(&Value::Object(record)).unwrap_err();
        match err {
            ValidationError::MissingFields { required, missing: gaps } => {
                assert_eq!(required.len(), 3);
                assert_eq!(gaps, vec![missing]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn non_mapping_and_empty_inputs_are_invalid_format() {
    for input in [
        json!(null),
        json!("Dog"),
        json!(42),
        json!(["animal_type", "breed"]),
        json!({}),
    ] {
        assert_eq!(
            validate_record(&input).unwrap_err(),
            ValidationError::InvalidFormat,
            "input {input} should be rejected"
        );
    }
}

#[test]
fn flat_payload_is_wrapped_in_set() {
    let normalized = normalize_update(doc(json!({
        "outcome_type": "Adoption",
        "age_upon_outcome_in_weeks": 60
    })));
    assert_eq!(
        Value::Object(normalized.into_document()),
        json!({ "$set": { "outcome_type": "Adoption", "age_upon_outcome_in_weeks": 60 } })
    );
}

#[test]
fn operator_payload_is_returned_unchanged() {
    let payload = doc(json!({
        "$set": { "outcome_type": "Transfer" },
        "$inc": { "age_upon_outcome_in_weeks": 1 }
    }));
    let normalized = normalize_update(payload.clone());
    assert_eq!(normalized.into_document(), payload);
}
