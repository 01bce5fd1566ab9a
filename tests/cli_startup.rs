//! Binary-level startup behavior

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn autodrive() -> Command {
    Command::cargo_bin("autodrive").unwrap()
}

#[test]
fn run_without_a_store_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    autodrive()
        .args(["run", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no store"));
}

#[test]
fn ingest_rejects_fragmented_categories() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("features.json");
    std::fs::write(
        &file,
        r#"[
            {"id": 1, "name": "a1", "description": "", "category": "a"},
            {"id": 2, "name": "b1", "description": "", "category": "b"},
            {"id": 3, "name": "a2", "description": "", "category": "a"}
        ]"#,
    )
    .unwrap();

    autodrive()
        .args(["ingest", file.to_str().unwrap(), "-p", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not contiguous"));
}

#[test]
fn ingest_then_stats_round_trips() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("features.json");
    std::fs::write(
        &file,
        r#"[
            {"id": 1, "name": "login", "description": "login form", "category": "auth",
             "steps": ["submit valid credentials"]},
            {"id": 2, "name": "logout", "description": "logout button", "category": "auth"}
        ]"#,
    )
    .unwrap();

    autodrive()
        .args(["ingest", file.to_str().unwrap(), "-p", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingested 2 features"));

    autodrive()
        .args(["stats", "-p", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending: 2"));

    autodrive()
        .args(["stats", "-p", dir.path().to_str().unwrap(), "--by-category"])
        .assert()
        .success()
        .stdout(predicate::str::contains("auth:"));
}

#[test]
fn run_on_an_empty_backlog_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("features.json");
    std::fs::write(&file, "[]").unwrap();

    autodrive()
        .args(["ingest", file.to_str().unwrap(), "-p", dir.path().to_str().unwrap()])
        .assert()
        .success();

    autodrive()
        .args(["run", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("backlog is empty"));
}

#[test]
fn missing_project_directory_is_reported() {
    autodrive()
        .args(["stats", "-p", "/definitely/not/here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("directory not found"));
}
