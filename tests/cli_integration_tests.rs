//! Drives the binary end to end through a JSON snapshot

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn planner(data: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ppmp-planner").unwrap();
    cmd.env("RUST_LOG", "error").arg("--data").arg(data);
    cmd
}

fn seed(data: &Path) {
    planner(data)
        .args(["school", "add", "Central ES"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created school #1 Central ES"));
    planner(data)
        .args(["user", "add", "Ana Supply", "ana@deped.gov.ph"])
        .args(["--type", "supply officer - school", "--school", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created user #1"));
    planner(data)
        .args(["user", "add", "Ben Head", "ben@deped.gov.ph"])
        .args(["--type", "school head", "--school", "1"])
        .assert()
        .success();
    planner(data)
        .args(["school", "set-head", "1", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("head set to user #2"));
}

#[test]
fn test_no_subcommand_shows_getting_started() {
    let dir = TempDir::new().unwrap();
    planner(&dir.path().join("planner.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("PPMP Planner"))
        .stdout(predicate::str::contains("--as <user-id>"));
}

#[test]
fn test_acting_commands_require_as() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("planner.json");
    seed(&data);

    planner(&data)
        .args(["ppmp", "create", "--fiscal-year", "2025", "--school", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--as <user-id>"));
}

#[test]
fn test_draft_to_submitted_through_the_cli() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("planner.json");
    seed(&data);

    planner(&data)
        .args(["--as", "1", "ppmp", "create", "--fiscal-year", "2025", "--school", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created PPMP #1 for FY2025 (Central ES)"));

    planner(&data)
        .args(["--as", "1", "ppmp", "create", "--fiscal-year", "2025", "--school", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    planner(&data)
        .args(["--as", "1", "transition", "1", "submit-to-unit-head"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Add at least one row"));

    planner(&data)
        .args(["--as", "1", "row", "add", "1", "--description", "ICT equipment"])
        .args(["--item", "Lot 1:Laptop:5:unit:50000", "--budget", "250000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added row #1 to PPMP #1"));

    planner(&data)
        .args(["--as", "1", "transition", "1", "submit-to-unit-head"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Draft → Submitted"));

    planner(&data)
        .args(["--as", "2", "ppmp", "submissions"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 PPMP(s) waiting on you"));

    planner(&data)
        .args(["--as", "2", "notifications", "--unread"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PPMP Submitted for Review"));

    planner(&data)
        .args(["--as", "2", "transition", "1", "return"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("remark is required"));

    planner(&data)
        .args(["history", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted to Unit Head"));
}
