use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn rejects_a_non_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("srd.pdf");
    fs::write(&file, b"%PDF-1.5").unwrap();

    Command::cargo_bin("ruleset-rag")
        .unwrap()
        .arg(&file)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("to identify a directory"));
}

#[test]
fn reports_a_missing_model() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("ruleset-rag")
        .unwrap()
        .arg(dir.path())
        .arg("--model-dir")
        .arg(dir.path().join("no-model"))
        .arg("--query")
        .arg("grapple")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to load the ColPali model"))
        .stderr(predicate::str::contains("model file not found"));
}
