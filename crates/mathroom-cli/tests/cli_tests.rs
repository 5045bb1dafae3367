//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn mathroom() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("mathroom").unwrap()
}

const TWO_QUESTION_BANK: &str = r#"
[bank]
id = "tiny"
name = "Tiny"
grade = 2

[[questions]]
id = "t1"
level = 1
type = "Arithmetic"
question = "What is 1 + 1?"
options = ["2", "3"]
correct_answer = "2"
ideal_solution = "One and one make two."

[questions.failure_modes]
"3" = "Count again."

[[questions]]
id = "t2"
level = 1
type = "Arithmetic"
question = "What is 2 + 2?"
options = ["4", "5"]
correct_answer = "4"
ideal_solution = "Two and two make four."

[questions.failure_modes]
"5" = "Count again."
"#;

/// Write a config using file stores inside `dir` and return its path.
fn write_config(dir: &Path, banks: &Path) -> std::path::PathBuf {
    let config = format!(
        "question_banks = '{}'\ndevice_storage = '{}'\n\n[store]\ntype = \"file\"\ndir = '{}'\n",
        banks.display(),
        dir.join("device.json").display(),
        dir.join("rooms").display(),
    );
    let path = dir.join("mathroom.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn last_room_code(dir: &Path) -> String {
    let raw = std::fs::read_to_string(dir.join("device.json")).unwrap();
    let items: serde_json::Value = serde_json::from_str(&raw).unwrap();
    items["math_challenge_room_code"].as_str().unwrap().to_string()
}

#[test]
fn validate_grade3_bank() {
    mathroom()
        .arg("validate")
        .arg("--bank")
        .arg("../../question-banks/grade3-basics.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("7 questions"))
        .stdout(predicate::str::contains("All question banks valid"));
}

#[test]
fn validate_directory() {
    mathroom()
        .arg("validate")
        .arg("--bank")
        .arg("../../question-banks")
        .assert()
        .success()
        .stdout(predicate::str::contains("Grade 3 Basics"))
        .stdout(predicate::str::contains("Grade 5 Fractions"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let bank = dir.path().join("bank.toml");
    std::fs::write(
        &bank,
        r#"
[bank]
id = "w"
name = "Warnings"
grade = 4

[[questions]]
id = "w1"
level = 1
type = "Logic"
question = "Pick one"
options = ["a"]
correct_answer = "b"
"#,
    )
    .unwrap();

    mathroom()
        .arg("validate")
        .arg("--bank")
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("[w1] WARNING"))
        .stdout(predicate::str::contains("warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    mathroom()
        .arg("validate")
        .arg("--bank")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    mathroom()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created mathroom.toml"))
        .stdout(predicate::str::contains("Created question-banks/example.toml"));

    assert!(dir.path().join("mathroom.toml").exists());
    assert!(dir.path().join("question-banks/example.toml").exists());

    mathroom()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--bank")
        .arg("question-banks")
        .assert()
        .success()
        .stdout(predicate::str::contains("All question banks valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    mathroom().current_dir(dir.path()).arg("init").assert().success();

    mathroom()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn play_quit_then_show() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), Path::new("../../question-banks"));

    mathroom()
        .arg("play")
        .arg("--grade")
        .arg("3")
        .arg("--new")
        .arg("--config")
        .arg(&config)
        .write_stdin("1\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Room code:"))
        .stdout(predicate::str::contains("Solution:"))
        .stdout(predicate::str::contains("Resume with: mathroom play --room"));

    let code = last_room_code(dir.path());
    mathroom()
        .arg("show")
        .arg("--room")
        .arg(&code)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(code.as_str()))
        .stdout(predicate::str::contains("Answers"));
}

#[test]
fn play_until_pool_completed() {
    let dir = TempDir::new().unwrap();
    let bank = dir.path().join("tiny.toml");
    std::fs::write(&bank, TWO_QUESTION_BANK).unwrap();
    let config = write_config(dir.path(), &bank);

    mathroom()
        .arg("play")
        .arg("--grade")
        .arg("2")
        .arg("--config")
        .arg(&config)
        .write_stdin("1\n1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Correct!").count(2))
        .stdout(predicate::str::contains("Session complete: all questions completed"))
        .stdout(predicate::str::contains("Score:       2/2"));
}

#[test]
fn play_continues_last_room() {
    let dir = TempDir::new().unwrap();
    let bank = dir.path().join("tiny.toml");
    std::fs::write(&bank, TWO_QUESTION_BANK).unwrap();
    let config = write_config(dir.path(), &bank);

    mathroom()
        .args(["play", "--grade", "2", "--config"])
        .arg(&config)
        .write_stdin("1\nquit\n")
        .assert()
        .success();
    let first = last_room_code(dir.path());

    mathroom()
        .args(["play", "--grade", "2", "--config"])
        .arg(&config)
        .write_stdin("1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Room code: {first}")))
        .stdout(predicate::str::contains("Score:       2/2"));
}

#[test]
fn play_unknown_room_suggests_fresh_start() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), Path::new("../../question-banks"));

    mathroom()
        .args(["play", "--room", "GONE-ROOM-10", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("room not found"))
        .stderr(predicate::str::contains("--new"));
}

#[test]
fn play_requires_grade_or_room() {
    mathroom()
        .arg("play")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--grade is required"));
}

#[test]
fn show_unknown_room() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), Path::new("../../question-banks"));

    mathroom()
        .args(["show", "--room", "NOPE-ROOM-11", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn help_output() {
    mathroom()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Adaptive math practice"));
}
