use serde_json::{json, Value};
use shelter_core::{
    open_store_in_memory, AnimalShelter, Document, MongoStore, Projection, ShelterError,
    SqliteDocumentStore,
};
use std::thread;

fn shelter() -> AnimalShelter<SqliteDocumentStore> {
    AnimalShelter::open(open_store_in_memory().unwrap(), "AAC").unwrap()
}

fn dog(name: &str, breed: &str, age: f64) -> Value {
    json!({
        "animal_type": "Dog",
        "name": name,
        "breed": breed,
        "age_upon_outcome_in_weeks": age,
        "sex_upon_outcome": "Intact Male"
    })
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

#[test]
fn create_then_read_all_hides_identity() {
    let shelter = shelter();
    let record = dog("Rex", "Bloodhound", 52.0);

    let outcome = shelter.create(&record);
    assert!(outcome.success());
    assert!(outcome.inserted_id.is_some());

    let all = shelter.read(None, None);
    assert_eq!(all.len(), 1);
    assert!(!all[0].contains_key("_id"));
    assert_eq!(Value::Object(all[0].clone()), record);
}

#[test]
fn repeated_create_inserts_independent_records() {
    let shelter = shelter();
    let record = dog("Rex", "Bloodhound", 52.0);

    let first = shelter.create(&record);
    let second = shelter.create(&record);
    assert!(first.success());
    assert!(second.success());
    assert_ne!(first.inserted_id, second.inserted_id);
    assert_eq!(shelter.read(None, None).len(), 2);
}

#[test]
fn create_with_missing_fields_persists_nothing() {
    let shelter = shelter();

    let outcome = shelter.create(&json!({ "animal_type": "Dog", "name": "Rex" }));
    assert!(!outcome.success());
    assert!(outcome.inserted_id.is_none());
    match outcome.error {
        Some(ShelterError::MissingFields { missing, .. }) => {
            assert_eq!(missing, vec!["breed", "age_upon_outcome_in_weeks"]);
        }
        other => panic!("unexpected outcome error: {other:?}"),
    }
    assert!(shelter.read(None, None).is_empty());
}

#[test]
fn create_with_non_mapping_is_invalid_format() {
    let shelter = shelter();
    let outcome = shelter.create(&json!("Rex the Bloodhound"));
    assert!(matches!(outcome.error, Some(ShelterError::InvalidFormat)));
}

#[test]
fn read_filters_and_projects() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));
    shelter.create(&dog("Max", "Rottweiler", 80.0));
    shelter.create(&dog("Duke", "Bloodhound", 120.0));

    let names = shelter.read(
        Some(&json!({ "breed": "Bloodhound" })),
        Some(&Projection::new(doc(json!({ "_id": 0, "name": 1 })))),
    );
    assert_eq!(
        names,
        vec![doc(json!({ "name": "Rex" })), doc(json!({ "name": "Duke" }))]
    );

    let with_ids = shelter.read(
        Some(&json!({ "age_upon_outcome_in_weeks": { "$gt": 100 } })),
        Some(&Projection::new(doc(json!({ "name": true })))),
    );
    assert_eq!(with_ids.len(), 1);
    assert!(with_ids[0].contains_key("_id"));
}

#[test]
fn read_with_non_mapping_criteria_returns_empty() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));

    assert!(shelter.read(Some(&json!(["breed"])), None).is_empty());
    let err = shelter.try_read(Some(&json!("breed")), None).unwrap_err();
    assert!(matches!(err, ShelterError::InvalidCriteria(_)));
}

#[test]
fn flat_update_changes_only_named_fields() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));

    let outcome = shelter.update(&json!({ "name": "Rex" }), &json!({ "outcome_type": "Adoption" }));
    assert_eq!(outcome.matched_count, 1);
    assert_eq!(outcome.modified_count, 1);
    assert!(outcome.success());

    let stored = shelter.read(Some(&json!({ "name": "Rex" })), None);
    assert_eq!(stored[0]["outcome_type"], json!("Adoption"));
    assert_eq!(stored[0]["breed"], json!("Bloodhound"));
}

#[test]
fn operator_update_is_applied_as_given() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));
    shelter.create(&dog("Max", "Bloodhound", 60.0));

    let outcome = shelter.update(
        &json!({ "breed": "Bloodhound" }),
        &json!({ "$inc": { "age_upon_outcome_in_weeks": 1 } }),
    );
    assert_eq!((outcome.matched_count, outcome.modified_count), (2, 2));

    let ages: Vec<f64> = shelter
        .read(None, None)
        .iter()
        .map(|record| record["age_upon_outcome_in_weeks"].as_f64().unwrap())
        .collect();
    assert_eq!(ages, vec![53.0, 61.0]);
}

#[test]
fn update_matching_nothing_is_not_successful() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));

    let outcome = shelter.update(&json!({ "name": "Ghost" }), &json!({ "outcome_type": "Adoption" }));
    assert_eq!(outcome.matched_count, 0);
    assert_eq!(outcome.modified_count, 0);
    assert!(!outcome.success());
    assert!(outcome.error.is_none());
}

#[test]
fn update_to_current_value_matches_but_is_not_successful() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));

    let outcome = shelter.update(&json!({ "name": "Rex" }), &json!({ "breed": "Bloodhound" }));
    assert_eq!(outcome.matched_count, 1);
    assert_eq!(outcome.modified_count, 0);
    assert!(!outcome.success());
    assert!(outcome.error.is_none());
}

#[test]
fn update_rejects_missing_or_malformed_arguments() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));

    for (criteria, update) in [
        (json!({}), json!({ "name": "Max" })),
        (json!({ "name": "Rex" }), json!({})),
        (json!(null), json!({ "name": "Max" })),
        (json!({ "name": "Rex" }), json!("Max")),
    ] {
        let outcome = shelter.update(&criteria, &update);
        assert!(!outcome.success());
        assert!(matches!(outcome.error, Some(ShelterError::InvalidArguments(_))));
    }
    assert_eq!(shelter.read(Some(&json!({ "name": "Rex" })), None).len(), 1);
}

#[test]
fn update_store_fault_becomes_failed_outcome() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));

    let outcome = shelter.update(
        &json!({ "name": "Rex" }),
        &json!({ "$rename": { "name": "call_name" } }),
    );
    assert!(!outcome.success());
    assert!(matches!(outcome.error, Some(ShelterError::StoreFailure(_))));
    assert!(outcome.error.unwrap().to_string().contains("$rename"));
}

#[test]
fn mixed_operator_and_field_update_fails_without_writing() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));
    let before = shelter.read(None, None);

    let outcome = shelter.update(
        &json!({ "name": "Rex" }),
        &json!({ "$inc": { "age_upon_outcome_in_weeks": 1 }, "outcome_type": "Adoption" }),
    );
    assert!(!outcome.success());
    assert!(matches!(outcome.error, Some(ShelterError::StoreFailure(_))));
    assert_eq!(shelter.read(None, None), before);
}

#[test]
fn create_with_operator_named_field_is_store_failure() {
    let shelter = shelter();
    let mut record = dog("Rex", "Bloodhound", 52.0);
    record["$where"] = json!("sleep(100)");

    let outcome = shelter.create(&record);
    assert!(!outcome.success());
    assert!(matches!(outcome.error, Some(ShelterError::StoreFailure(_))));
    assert!(shelter.read(None, None).is_empty());
}

#[test]
fn shelter_is_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AnimalShelter<MongoStore>>();
    assert_send_sync::<AnimalShelter<SqliteDocumentStore>>();

    let shelter = shelter();
    thread::scope(|scope| {
        for worker in 0..4 {
            let shelter = &shelter;
            scope.spawn(move || {
                for round in 0..10 {
                    let name = format!("dog-{worker}-{round}");
                    assert!(shelter.create(&dog(&name, "Beagle", 10.0)).success());
                    let outcome = shelter.update(
                        &json!({ "name": name }),
                        &json!({ "$inc": { "age_upon_outcome_in_weeks": 1 } }),
                    );
                    assert_eq!((outcome.matched_count, outcome.modified_count), (1, 1));
                }
            });
        }
    });

    let all = shelter.read(None, None);
    assert_eq!(all.len(), 40);
    assert!(all
        .iter()
        .all(|record| record["age_upon_outcome_in_weeks"] == json!(11.0)));
    assert_eq!(shelter.get_animal_statistics().unwrap().total_animals, 40);
}

#[test]
fn delete_removes_every_match() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));
    shelter.create(&dog("Max", "Rottweiler", 80.0));
    shelter.create(&dog("Duke", "Bloodhound", 120.0));

    let outcome = shelter.delete(&json!({ "breed": "Bloodhound" }));
    assert_eq!(outcome.deleted_count, 2);
    assert!(outcome.success());

    let remaining = shelter.read(None, None);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["name"], json!("Max"));

    let again = shelter.delete(&json!({ "breed": "Bloodhound" }));
    assert_eq!(again.deleted_count, 0);
    assert!(!again.success());
    assert!(again.error.is_none());
}

#[test]
fn delete_refuses_empty_or_malformed_criteria() {
    let shelter = shelter();
    shelter.create(&dog("Rex", "Bloodhound", 52.0));

    for criteria in [json!({}), json!(null), json!("Rex")] {
        let outcome = shelter.delete(&criteria);
        assert!(!outcome.success());
        assert!(matches!(outcome.error, Some(ShelterError::InvalidCriteria(_))));
    }
    assert_eq!(shelter.read(None, None).len(), 1);
}
