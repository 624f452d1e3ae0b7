//! In-process evaluation of filter, update, projection and group documents.
//!
//! # Responsibility
//! - Give embedded stores the same query vocabulary the repository sends to
//!   MongoDB.
//!
//! # Invariants
//! - Unknown operators are rejected, never ignored.
//! - Numbers compare by value regardless of integer/float representation.
//! - Missing fields compare equal to `null` and fail every range operator.
//! - Stored field names never start with `$`.

use super::{Accumulator, GroupStage, Projection, StoreError, StoreResult};
use crate::model::update::is_operator_key;
use crate::model::{Document, ID_FIELD};
use regex::RegexBuilder;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Returns whether `document` satisfies every condition in `filter`.
pub fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(document, key, condition)?,
            "$nor" => !any_clause(document, key, condition)?,
            op if is_operator_key(op) => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown top-level operator `{op}`"
                )));
            }
            path => field_matches(lookup_path(document, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_clause(document: &Document, op: &str, condition: &Value) -> StoreResult<bool> {
    for clause in clauses(op, condition)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn clauses<'a>(op: &str, condition: &'a Value) -> StoreResult<Vec<&'a Document>> {
    let items = condition
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| StoreError::InvalidQuery(format!("`{op}` expects a non-empty array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object().ok_or_else(|| {
                StoreError::InvalidQuery(format!("`{op}` entries must be documents"))
            })
        })
        .collect()
}

fn field_matches(value: Option<&Value>, condition: &Value) -> StoreResult<bool> {
    let operators = match condition {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|key| is_operator_key(key)) => ops,
        _ => return Ok(equals_or_contains(value, condition)),
    };

    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals_or_contains(value, operand),
            "$ne" => !equals_or_contains(value, operand),
            "$gt" => compares(value, operand, |ord| ord == Ordering::Greater),
            "$gte" => compares(value, operand, |ord| ord != Ordering::Less),
            "$lt" => compares(value, operand, |ord| ord == Ordering::Less),
            "$lte" => compares(value, operand, |ord| ord != Ordering::Greater),
            "$in" => in_set(value, op, operand)?,
            "$nin" => !in_set(value, op, operand)?,
            "$exists" => value.is_some() == is_truthy(operand),
            "$not" => !field_matches(value, operand)?,
            "$regex" => regex_matches(value, operand, operators.get("$options"))?,
            "$options" if operators.contains_key("$regex") => true,
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown query operator `{other}`"
                )));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals_or_contains(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(actual) => {
            values_equal(actual, expected)
                || actual
                    .as_array()
                    .is_some_and(|items| items.iter().any(|item| values_equal(item, expected)))
        }
    }
}

fn compares(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, operand).is_some_and(&accept)),
        Some(actual) => compare_values(actual, operand).is_some_and(accept),
    }
}

fn in_set(value: Option<&Value>, op: &str, operand: &Value) -> StoreResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("`{op}` expects an array")))?;
    Ok(candidates
        .iter()
        .any(|candidate| equals_or_contains(value, candidate)))
}

fn regex_matches(
    value: Option<&Value>,
    pattern: &Value,
    options: Option<&Value>,
) -> StoreResult<bool> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StoreError::InvalidQuery("`$regex` expects a string".to_string()))?;
    let options = options.and_then(Value::as_str).unwrap_or_default();
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|err| StoreError::InvalidQuery(format!("invalid `$regex` pattern: {err}")))?;

    Ok(match value {
        Some(Value::String(text)) => regex.is_match(text),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|text| regex.is_match(text)),
        _ => false,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => true,
    }
}

/// Equality with numeric values compared by magnitude.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_f64() == b.as_f64(),
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Resolves a dotted field path such as `intake.location`.
pub fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Applies an operator-wrapped update to `document` in place.
///
/// Supports `$set`, `$unset` and `$inc`. The identity field cannot change.
pub fn apply_update(document: &mut Document, update: &Document) -> StoreResult<()> {
    if update.is_empty() {
        return Err(StoreError::InvalidQuery(
            "update document must not be empty".to_string(),
        ));
    }

    for (op, fields) in update {
        let fields = fields.as_object().ok_or_else(|| {
            StoreError::InvalidQuery(format!("`{op}` expects a document of fields"))
        })?;
        for (path, operand) in fields {
            guard_identity(document, op, path, operand)?;
            match op.as_str() {
                "$set" => set_path(document, path, operand.clone())?,
                "$unset" => {
                    remove_path(document, path);
                }
                "$inc" => increment_path(document, path, operand)?,
                other => {
                    return Err(StoreError::InvalidQuery(format!(
                        "unsupported update operator `{other}`"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn guard_identity(document: &Document, op: &str, path: &str, operand: &Value) -> StoreResult<()> {
    if path != ID_FIELD {
        return Ok(());
    }
    let unchanged = op == "$set" && document.get(ID_FIELD) == Some(operand);
    if unchanged {
        return Ok(());
    }
    Err(StoreError::InvalidQuery(format!(
        "update would modify the immutable field `{ID_FIELD}`"
    )))
}

fn increment_path(document: &mut Document, path: &str, operand: &Value) -> StoreResult<()> {
    let delta = match operand {
        Value::Number(number) => number,
        _ => {
            return Err(StoreError::InvalidQuery(format!(
                "`$inc` on `{path}` expects a number"
            )));
        }
    };

    let next = match lookup_path(document, path) {
        None => Value::Number(delta.clone()),
        Some(Value::Number(current)) => add_numbers(current, delta)
            .ok_or_else(|| StoreError::InvalidQuery(format!("`$inc` overflow on `{path}`")))?,
        Some(_) => {
            return Err(StoreError::InvalidQuery(format!(
                "`$inc` on `{path}` targets a non-numeric value"
            )));
        }
    };
    set_path(document, path, next)
}

fn add_numbers(current: &Number, delta: &Number) -> Option<Value> {
    if let (Some(a), Some(b)) = (current.as_i64(), delta.as_i64()) {
        return a.checked_add(b).map(Value::from);
    }
    let sum = current.as_f64()? + delta.as_f64()?;
    Number::from_f64(sum).map(Value::Number)
}

/// Rejects `$`-prefixed field names anywhere inside `document`.
pub fn ensure_field_names(document: &Document) -> StoreResult<()> {
    for (key, value) in document {
        check_segment(key, key)?;
        ensure_nested_field_names(value)?;
    }
    Ok(())
}

fn ensure_nested_field_names(value: &Value) -> StoreResult<()> {
    match value {
        Value::Object(nested) => ensure_field_names(nested),
        Value::Array(items) => items.iter().try_for_each(ensure_nested_field_names),
        _ => Ok(()),
    }
}

fn check_segment(path: &str, segment: &str) -> StoreResult<()> {
    if is_operator_key(segment) {
        return Err(StoreError::InvalidQuery(format!(
            "field name `{segment}` in `{path}` must not start with `$`"
        )));
    }
    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    for segment in path.split('.') {
        check_segment(path, segment)?;
    }
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or(path);
    let mut current = document;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            StoreError::InvalidQuery(format!(
                "cannot create field in `{path}`: `{segment}` is not a document"
            ))
        })?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

fn remove_path(document: &mut Document, path: &str) -> Option<Value> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop()?;
    let mut current = document;
    for segment in segments {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    current.remove(last)
}

/// Applies a field inclusion/exclusion projection to one document.
pub fn apply_projection(document: Document, projection: &Projection) -> StoreResult<Document> {
    if projection.is_empty() {
        return Ok(document);
    }

    let mut include_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for (field, flag) in projection.as_document() {
        let keep = projection_flag(field, flag)?;
        if field == ID_FIELD {
            include_id = keep;
        } else if keep {
            included.push(field.as_str());
        } else {
            excluded.push(field.as_str());
        }
    }

    if !included.is_empty() && !excluded.is_empty() {
        return Err(StoreError::InvalidQuery(
            "projection cannot mix inclusion and exclusion".to_string(),
        ));
    }

    if included.is_empty() {
        let mut document = document;
        for field in excluded {
            remove_path(&mut document, field);
        }
        if !include_id {
            document.remove(ID_FIELD);
        }
        return Ok(document);
    }

    let mut projected = Document::new();
    if include_id {
        if let Some(id) = document.get(ID_FIELD) {
            projected.insert(ID_FIELD.to_string(), id.clone());
        }
    }
    for field in included {
        if let Some(value) = lookup_path(&document, field) {
            set_path(&mut projected, field, value.clone())?;
        }
    }
    Ok(projected)
}

fn projection_flag(field: &str, flag: &Value) -> StoreResult<bool> {
    match flag {
        Value::Bool(keep) => Ok(*keep),
        Value::Number(number) => Ok(number.as_f64().is_some_and(|n| n != 0.0)),
        _ => Err(StoreError::InvalidQuery(format!(
            "projection value for `{field}` must be a boolean or number"
        ))),
    }
}

/// Folds every document into a single group row.
///
/// Returns `None` for an empty input, mirroring a group stage that emits no
/// row over an empty collection.
pub fn group(documents: &[Document], stage: &GroupStage) -> Option<Document> {
    if documents.is_empty() {
        return None;
    }

    let mut row = Document::new();
    for (name, accumulator) in &stage.outputs {
        let value = match accumulator {
            Accumulator::Count => Value::from(documents.len() as u64),
            Accumulator::Average(field) => average(documents, field),
            Accumulator::DistinctValues(field) => distinct(documents, field),
        };
        row.insert(name.clone(), value);
    }
    Some(row)
}

fn average(documents: &[Document], field: &str) -> Value {
    let numbers: Vec<f64> = documents
        .iter()
        .filter_map(|document| lookup_path(document, field))
        .filter_map(Value::as_f64)
        .collect();
    if numbers.is_empty() {
        return Value::Null;
    }
    let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
    Number::from_f64(mean).map_or(Value::Null, Value::Number)
}

fn distinct(documents: &[Document], field: &str) -> Value {
    let mut seen: Vec<Value> = Vec::new();
    for value in documents
        .iter()
        .filter_map(|document| lookup_path(document, field))
    {
        if !seen.iter().any(|existing| values_equal(existing, value)) {
            seen.push(value.clone());
        }
    }
    Value::Array(seen)
}

#[cfg(test)]
mod tests {
    use super::{apply_projection, apply_update, ensure_field_names, group, matches};
    use crate::model::Document;
    use crate::store::{Accumulator, GroupStage, Projection, StoreError};
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().expect("fixture must be an object")
    }

    #[test]
    fn equality_treats_int_and_float_alike() {
        let record = doc(json!({ "age_upon_outcome_in_weeks": 52 }));
        assert!(matches(&record, &doc(json!({ "age_upon_outcome_in_weeks": 52.0 }))).unwrap());
    }

    #[test]
    fn range_bounds_are_inclusive_and_skip_missing_fields() {
        let filter = doc(json!({ "age": { "$gte": 26.0, "$lte": 156.0 } }));
        assert!(matches(&doc(json!({ "age": 26 })), &filter).unwrap());
        assert!(matches(&doc(json!({ "age": 156.0 })), &filter).unwrap());
        assert!(!matches(&doc(json!({ "age": 156.5 })), &filter).unwrap());
        assert!(!matches(&doc(json!({ "name": "Rex" })), &filter).unwrap());
    }

    #[test]
    fn null_equality_matches_missing_field() {
        let filter = doc(json!({ "outcome_type": null }));
        assert!(matches(&doc(json!({ "breed": "Beagle" })), &filter).unwrap());
    }

    #[test]
    fn array_fields_match_any_element() {
        let record = doc(json!({ "colors": ["Black", "Tan"] }));
        assert!(matches(&record, &doc(json!({ "colors": "Tan" }))).unwrap());
        assert!(matches(&record, &doc(json!({ "colors": { "$in": ["White", "Black"] } }))).unwrap());
    }

    #[test]
    fn logical_operators_compose() {
        let record = doc(json!({ "breed": "Bloodhound", "age": 30 }));
        let filter = doc(json!({
            "$or": [{ "breed": "Beagle" }, { "age": { "$lt": 40 } }],
            "$nor": [{ "breed": "Rottweiler" }]
        }));
        assert!(matches(&record, &filter).unwrap());
    }

    #[test]
    fn regex_honours_case_option() {
        let record = doc(json!({ "name": "Buddy" }));
        let filter = doc(json!({ "name": { "$regex": "^bud", "$options": "i" } }));
        assert!(matches(&record, &filter).unwrap());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = matches(
            &doc(json!({ "age": 1 })),
            &doc(json!({ "age": { "$near": 1 } })),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[test]
    fn set_creates_nested_fields_and_inc_adds() {
        let mut record = doc(json!({ "visits": 1 }));
        apply_update(
            &mut record,
            &doc(json!({ "$set": { "intake.location": "Austin" }, "$inc": { "visits": 2 } })),
        )
        .unwrap();
        assert_eq!(
            Value::Object(record),
            json!({ "visits": 3, "intake": { "location": "Austin" } })
        );
    }

    #[test]
    fn identity_field_is_immutable() {
        let mut record = doc(json!({ "_id": "a", "breed": "Beagle" }));
        let err = apply_update(&mut record, &doc(json!({ "$set": { "_id": "b" } }))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[test]
    fn operator_named_fields_are_never_written() {
        let mut record = doc(json!({ "breed": "Beagle" }));
        let mixed = doc(json!({ "$set": { "$inc": { "age": 1 }, "name": "Rex" } }));
        assert!(matches!(
            apply_update(&mut record, &mixed),
            Err(StoreError::InvalidQuery(_))
        ));
        let nested = doc(json!({ "$set": { "intake.$where": "x" } }));
        assert!(apply_update(&mut record, &nested).is_err());
        assert_eq!(Value::Object(record), json!({ "breed": "Beagle" }));

        assert!(ensure_field_names(&doc(json!({ "tags": [{ "kind": "x" }] }))).is_ok());
        assert!(ensure_field_names(&doc(json!({ "tags": [{ "$kind": "x" }] }))).is_err());
        assert!(ensure_field_names(&doc(json!({ "$where": "1" }))).is_err());
    }

    #[test]
    fn projection_modes() {
        let record = doc(json!({ "_id": "x", "breed": "Beagle", "name": "Rex" }));
        let excluded = apply_projection(record.clone(), &Projection::exclude_id()).unwrap();
        assert_eq!(Value::Object(excluded), json!({ "breed": "Beagle", "name": "Rex" }));

        let included = apply_projection(record, &Projection::new(doc(json!({ "name": 1 })))).unwrap();
        assert_eq!(Value::Object(included), json!({ "_id": "x", "name": "Rex" }));
    }

    #[test]
    fn group_averages_numeric_values_only() {
        let documents = vec![
            doc(json!({ "age": 10, "breed": "A" })),
            doc(json!({ "age": "unknown", "breed": "A" })),
            doc(json!({ "age": 20.0 })),
        ];
        let stage = GroupStage::new()
            .with("total", Accumulator::Count)
            .with("avg", Accumulator::Average("age".to_string()))
            .with("breeds", Accumulator::DistinctValues("breed".to_string()));
        let row = group(&documents, &stage).unwrap();
        assert_eq!(row["total"], json!(3));
        assert_eq!(row["avg"], json!(15.0));
        assert_eq!(row["breeds"], json!(["A"]));
        assert!(group(&[], &stage).is_none());
    }
}
