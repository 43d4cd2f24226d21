use serde_json::{json, Value};
use shelter_core::{
    AccessorError, ConnectionConfig, CrudAccessor, FindOptions, Projection, RepoError, SortKey,
    SqliteDocumentRepository,
};

fn accessor() -> CrudAccessor<SqliteDocumentRepository> {
    CrudAccessor::connect(&ConnectionConfig::in_memory()).unwrap()
}

fn read_all(
    accessor: &CrudAccessor<SqliteDocumentRepository>,
    filter: Value,
    options: FindOptions,
) -> Vec<Value> {
    accessor
        .read(&filter, options)
        .unwrap()
        .map(|record| record.unwrap().into_value())
        .collect()
}

fn seed_outcomes(accessor: &CrudAccessor<SqliteDocumentRepository>) {
    let rows = [
        json!({"_id": "A1", "name": "Rex", "animal_type": "Dog", "breed": "Labrador Retriever Mix", "age_upon_outcome_in_weeks": 52}),
        json!({"_id": "A2", "name": "Tom", "animal_type": "Cat", "breed": "Domestic Shorthair Mix", "age_upon_outcome_in_weeks": 10.5}),
        json!({"_id": "A3", "name": "Luna", "animal_type": "Dog", "breed": "German Shepherd", "age_upon_outcome_in_weeks": 104}),
        json!({"_id": "A4", "name": null, "animal_type": "Bird", "breed": "Parakeet", "age_upon_outcome_in_weeks": 30}),
    ];
    for row in rows {
        accessor.create(&row).unwrap();
    }
}

#[test]
fn create_then_read_by_id_roundtrips() {
    let accessor = accessor();
    let input = json!({
        "name": "Rex",
        "species": "dog",
        "age_upon_outcome_in_weeks": 52.5,
        "neutered": true,
        "outcome_subtype": null
    });

    let id = accessor.create(&input).unwrap();
    let found = read_all(&accessor, json!({"_id": id}), FindOptions::default());

    let mut expected = input.as_object().unwrap().clone();
    expected.insert("_id".to_string(), json!(id));
    assert_eq!(found, vec![Value::Object(expected)]);
}

#[test]
fn read_by_name_yields_input_plus_generated_id() {
    let accessor = accessor();
    accessor
        .create(&json!({"name": "Rex", "species": "dog"}))
        .unwrap();

    let found = read_all(&accessor, json!({"name": "Rex"}), FindOptions::default());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["name"], "Rex");
    assert_eq!(found[0]["species"], "dog");
    assert!(found[0]["_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(found[0].as_object().unwrap().len(), 3);
}

#[test]
fn update_changes_matching_record_and_read_reflects_it() {
    let accessor = accessor();
    accessor
        .create(&json!({"name": "Rex", "species": "dog"}))
        .unwrap();

    let modified = accessor
        .update(&json!({"name": "Rex"}), &json!({"species": "cat"}))
        .unwrap();
    assert_eq!(modified, 1);

    let found = read_all(&accessor, json!({"name": "Rex"}), FindOptions::default());
    assert_eq!(found[0]["species"], "cat");
}

#[test]
fn update_counts_only_records_that_changed() {
    let accessor = accessor();
    seed_outcomes(&accessor);

    let first = accessor
        .update(&json!({"animal_type": "Dog"}), &json!({"outcome_type": "Adoption"}))
        .unwrap();
    assert_eq!(first, 2);

    let second = accessor
        .update(&json!({"animal_type": "Dog"}), &json!({"outcome_type": "Adoption"}))
        .unwrap();
    assert_eq!(second, 0);
}

#[test]
fn update_one_touches_first_match_only() {
    let accessor = accessor();
    seed_outcomes(&accessor);

    let modified = accessor
        .update_one(&json!({"animal_type": "Dog"}), &json!({"outcome_type": "Transfer"}))
        .unwrap();
    assert_eq!(modified, 1);

    let transferred = read_all(
        &accessor,
        json!({"outcome_type": "Transfer"}),
        FindOptions::default(),
    );
    assert_eq!(transferred.len(), 1);
    assert_eq!(transferred[0]["_id"], "A1");
}

#[test]
fn delete_and_delete_one_report_removed_counts() {
    let accessor = accessor();
    seed_outcomes(&accessor);

    assert_eq!(accessor.delete_one(&json!({"animal_type": "Dog"})).unwrap(), 1);
    assert_eq!(accessor.delete(&json!({"animal_type": "Dog"})).unwrap(), 1);
    assert_eq!(accessor.delete(&json!({"animal_type": "Dog"})).unwrap(), 0);

    let remaining = read_all(&accessor, json!({}), FindOptions::default());
    assert_eq!(remaining.len(), 2);
}

#[test]
fn read_with_no_matches_is_empty_not_error() {
    let accessor = accessor();
    seed_outcomes(&accessor);

    let found = read_all(&accessor, json!({"animal_type": "Horse"}), FindOptions::default());
    assert!(found.is_empty());
}

#[test]
fn read_applies_sort_limit_and_projection() {
    let accessor = accessor();
    seed_outcomes(&accessor);

    let options = FindOptions::default()
        .with_sort(SortKey::descending("age_upon_outcome_in_weeks").unwrap())
        .with_limit(2)
        .with_projection(Projection::parse(&json!({"name": 1, "_id": 0})).unwrap());
    let found = read_all(&accessor, json!(null), options);

    assert_eq!(found, vec![json!({"name": "Luna"}), json!({"name": "Rex"})]);
}

#[test]
fn read_json_parses_projection_and_sort_documents() {
    let accessor = accessor();
    seed_outcomes(&accessor);

    let names: Vec<Value> = accessor
        .read_json(
            &json!({"animal_type": "Dog"}),
            Some(&json!({"name": 1})),
            Some(&json!([["name", 1]])),
            None,
        )
        .unwrap()
        .map(|record| record.unwrap().into_value())
        .collect();
    assert_eq!(
        names,
        vec![
            json!({"_id": "A3", "name": "Luna"}),
            json!({"_id": "A1", "name": "Rex"})
        ]
    );

    let bad_sort = accessor.read_json(&json!({}), None, Some(&json!([["name", 0]])), None);
    assert!(matches!(bad_sort, Err(AccessorError::Query(_))));
}

#[test]
fn cursor_fetches_in_batches_across_many_records() {
    let accessor = accessor().with_batch_size(3);
    for index in 0..10 {
        accessor
            .create(&json!({"name": format!("pet-{index}"), "rank": index}))
            .unwrap();
    }

    let ranks: Vec<i64> = accessor
        .read(&json!({}), FindOptions::default())
        .unwrap()
        .map(|record| record.unwrap().get("rank").and_then(Value::as_i64).unwrap())
        .collect();
    assert_eq!(ranks, (0..10).collect::<Vec<_>>());

    let limited = accessor
        .read(&json!({}), FindOptions::default().with_limit(7))
        .unwrap()
        .count();
    assert_eq!(limited, 7);
}

#[test]
fn updating_matches_during_iteration_visits_every_record_once() {
    let accessor = accessor().with_batch_size(100);
    for index in 0..250 {
        accessor
            .create(&json!({"_id": format!("A{index:03}"), "status": "new"}))
            .unwrap();
    }

    let mut seen = Vec::new();
    for record in accessor.read(&json!({"status": "new"}), FindOptions::default()).unwrap() {
        let id = record.unwrap().id().unwrap().to_string();
        let modified = accessor
            .update(&json!({"_id": id}), &json!({"status": "done"}))
            .unwrap();
        assert_eq!(modified, 1);
        seen.push(id);
    }

    let expected: Vec<String> = (0..250).map(|index| format!("A{index:03}")).collect();
    assert_eq!(seen, expected);
    assert!(read_all(&accessor, json!({"status": "new"}), FindOptions::default()).is_empty());
}

#[test]
fn records_deleted_during_iteration_are_skipped() {
    let accessor = accessor().with_batch_size(2);
    seed_outcomes(&accessor);

    let mut cursor = accessor.read(&json!({}), FindOptions::default()).unwrap();
    let first = cursor.next().unwrap().unwrap();
    assert_eq!(first.id(), Some("A1"));
    assert_eq!(accessor.delete(&json!({"_id": "A3"})).unwrap(), 1);

    let rest: Vec<String> = cursor
        .map(|record| record.unwrap().id().unwrap().to_string())
        .collect();
    assert_eq!(rest, vec!["A2".to_string(), "A4".to_string()]);
}

#[test]
fn reading_again_restarts_from_the_beginning() {
    let accessor = accessor();
    seed_outcomes(&accessor);

    let mut cursor = accessor.read(&json!({}), FindOptions::default()).unwrap();
    let first = cursor.next().unwrap().unwrap();
    assert_eq!(cursor.returned(), 1);
    drop(cursor);

    let again = accessor
        .read(&json!({}), FindOptions::default())
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(first, again);
}

#[test]
fn duplicate_id_is_a_driver_error() {
    let accessor = accessor();
    accessor
        .create(&json!({"_id": "A1", "name": "Rex"}))
        .unwrap();

    let err = accessor
        .create(&json!({"_id": "A1", "name": "Copy"}))
        .unwrap_err();
    assert!(matches!(
        err,
        AccessorError::Driver(RepoError::DuplicateId(ref id)) if id == "A1"
    ));
}

#[test]
fn collections_are_isolated_within_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aac.db");

    let animals = CrudAccessor::connect(&ConnectionConfig::file(&path)).unwrap();
    animals.create(&json!({"name": "Rex"})).unwrap();
    animals.close().unwrap();

    let outcomes =
        CrudAccessor::connect(&ConnectionConfig::file(&path).with_collection("outcomes")).unwrap();
    assert_eq!(outcomes.read(&json!({}), FindOptions::default()).unwrap().count(), 0);
    outcomes.create(&json!({"name": "Rex"})).unwrap();
    outcomes.close().unwrap();

    let reopened = CrudAccessor::connect(&ConnectionConfig::file(&path)).unwrap();
    assert_eq!(
        reopened.read(&json!({}), FindOptions::default()).unwrap().count(),
        1
    );
}

#[test]
fn default_indexes_are_idempotent() {
    let accessor = accessor();

    let first = accessor.create_default_indexes().unwrap();
    let second = accessor.create_default_indexes().unwrap();
    assert_eq!(first.len(), 9);
    assert_eq!(first, second);

    let index_count: i64 = accessor
        .repository()
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_documents_animals_%';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(index_count, 9);
}

#[test]
fn empty_index_key_list_is_a_query_error() {
    let accessor = accessor();
    assert!(matches!(
        accessor.create_index(&[]),
        Err(AccessorError::Query(_))
    ));
}

#[test]
fn ping_succeeds_on_open_store() {
    accessor().ping().unwrap();
}
