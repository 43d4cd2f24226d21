//! CLI integration tests
//!
//! These run the `shelter` binary against a temporary store and check the
//! JSON lines it prints.

use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn shelter(dir: &TempDir, db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shelter"))
        .current_dir(dir.path())
        .env_remove("SHELTER_DB_PATH")
        .env_remove("SHELTER_COLLECTION")
        .env_remove("SHELTER_USERNAME")
        .env_remove("SHELTER_PASSWORD")
        .env_remove("SHELTER_LOG_DIR")
        .arg("--db")
        .arg(db)
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn json_lines(output: &Output) -> Vec<Value> {
    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn create_read_update_delete_roundtrip() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("aac.db");

    let created = json_lines(&shelter(
        &dir,
        &db,
        &["create", r#"{"_id":"A1","name":"Rex","species":"dog"}"#],
    ));
    assert_eq!(created, vec![json!({"_id": "A1"})]);

    let updated = json_lines(&shelter(
        &dir,
        &db,
        &["update", r#"{"name":"Rex"}"#, r#"{"species":"cat"}"#],
    ));
    assert_eq!(updated, vec![json!({"modified": 1})]);

    let found = json_lines(&shelter(&dir, &db, &["read", r#"{"name":"Rex"}"#]));
    assert_eq!(
        found,
        vec![json!({"_id": "A1", "name": "Rex", "species": "cat"})]
    );

    let deleted = json_lines(&shelter(&dir, &db, &["delete", r#"{"_id":"A1"}"#, "--one"]));
    assert_eq!(deleted, vec![json!({"deleted": 1})]);
    assert!(json_lines(&shelter(&dir, &db, &["read"])).is_empty());
}

#[test]
fn read_applies_sort_limit_and_projection_flags() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("aac.db");
    for (name, weeks) in [("Rex", 52), ("Tom", 10), ("Luna", 104)] {
        let record = json!({"name": name, "age_upon_outcome_in_weeks": weeks}).to_string();
        json_lines(&shelter(&dir, &db, &["create", &record]));
    }

    let found = json_lines(&shelter(
        &dir,
        &db,
        &[
            "read",
            "--sort",
            "age_upon_outcome_in_weeks:desc",
            "--limit",
            "2",
            "--projection",
            r#"{"name":1,"_id":0}"#,
        ],
    ));
    assert_eq!(found, vec![json!({"name": "Luna"}), json!({"name": "Rex"})]);
}

#[test]
fn empty_filter_delete_fails_with_validation_error() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("aac.db");
    json_lines(&shelter(&dir, &db, &["create", r#"{"name":"Rex"}"#]));

    let output = shelter(&dir, &db, &["delete", "{}"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("validation error"));
    assert_eq!(json_lines(&shelter(&dir, &db, &["read"])).len(), 1);
}

#[test]
fn default_indexes_and_ping() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("aac.db");

    let indexes = json_lines(&shelter(&dir, &db, &["index", "--defaults"]));
    assert_eq!(indexes.len(), 9);

    let compound = json_lines(&shelter(&dir, &db, &["index", "animal_type", "breed:desc"]));
    assert_eq!(compound.len(), 1);

    assert_eq!(json_lines(&shelter(&dir, &db, &["ping"])), vec![json!({"ok": 1})]);
}

#[test]
fn registered_user_gates_later_commands() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("aac.db");

    let added = json_lines(&shelter(&dir, &db, &["user-add", "aacuser", "SNHU1234"]));
    assert_eq!(added, vec![json!({"user": "aacuser", "status": "created"})]);

    let anonymous = shelter(&dir, &db, &["ping"]);
    assert!(!anonymous.status.success());
    assert!(String::from_utf8_lossy(&anonymous.stderr).contains("authentication"));

    let authed = shelter(
        &dir,
        &db,
        &["--username", "aacuser", "--password", "SNHU1234", "ping"],
    );
    assert_eq!(json_lines(&authed), vec![json!({"ok": 1})]);
}
