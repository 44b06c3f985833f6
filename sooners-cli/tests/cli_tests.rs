//! Integration tests for the sooners CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get the sooners binary
#[allow(deprecated)]
fn sooners_cmd() -> Command {
    Command::cargo_bin("sooners").unwrap()
}

const CONFIG: &str = r#"
[[database]]
name = "test0"
kind = "sqlite"
path = "dbs/test0.sqlite3"
default_db = true

[[database]]
name = "test1"
kind = "sqlite"
path = "dbs/test1.sqlite3"

[[component]]
name = "sooners_core"
root = "components/sooners_core"
builtin = true

[[component]]
name = "sample1"
root = "components/sample1"

[milestones]
dir = "milestones"
"#;

const MODELS_V1: &str = r#"
[[table]]
name = "sample1_building"

[[table.column]]
name = "id"
type = "Integer"
primary_key = true

[[table.column]]
name = "label"
type = "String"
length = 32
"#;

const MILESTONE: &str = r#"
[[step]]
kind = "dbschema"

[step.versions]
sooners_core = 1
sample1 = 1

[step.params.sooners_configuration]
database_names = ["test0"]

[step.params.sooners_dbschema_version]
database_names = ["test0"]

[step.params.sooners_dbschema_operation]
database_names = ["test0", "test1"]

[step.params.sooners_shard_weight]
database_names = ["test0"]

[step.params.sample1_building]
database_names = ["test0"]
"#;

fn write_project(dir: &TempDir) {
    fs::write(dir.path().join("sooners.toml"), CONFIG).unwrap();
    fs::create_dir_all(dir.path().join("components/sample1")).unwrap();
    fs::create_dir_all(dir.path().join("components/sooners_core")).unwrap();
    fs::create_dir_all(dir.path().join("milestones")).unwrap();
    fs::write(
        dir.path().join("components/sample1/models.toml"),
        MODELS_V1,
    )
    .unwrap();
    fs::write(dir.path().join("milestones/20230626a.toml"), MILESTONE).unwrap();
}

fn table_exists(dir: &Path, database: &str, table: &str) -> bool {
    let path = dir.join(format!("dbs/{database}.sqlite3"));
    if !path.is_file() {
        return false;
    }
    let conn = rusqlite::Connection::open(path).unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .unwrap();
    count > 0
}

#[test]
fn test_help_command() {
    sooners_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("schema migrations"))
        .stdout(predicate::str::contains("msforward"))
        .stdout(predicate::str::contains("msbackward"))
        .stdout(predicate::str::contains("skcontinue"))
        .stdout(predicate::str::contains("skwithdraw"))
        .stdout(predicate::str::contains("makeversion"))
        .stdout(predicate::str::contains("makepatch"));
}

#[test]
fn test_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    sooners_cmd()
        .current_dir(dir.path())
        .args(["makeversion"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_makeversion_writes_history() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);

    sooners_cmd()
        .current_dir(dir.path())
        .args(["makeversion"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version.0001.xml"));

    assert!(
        dir.path()
            .join("components/sooners_core/history/version.0001.xml")
            .is_file()
    );
    assert!(
        dir.path()
            .join("components/sample1/history/version.0001.xml")
            .is_file()
    );
}

#[test]
fn test_makeversion_matches_unchanged_models() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);

    sooners_cmd()
        .current_dir(dir.path())
        .args(["makeversion", "sample1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("written for sample1"));

    // Re-running without model changes reports the match, writes nothing.
    sooners_cmd()
        .current_dir(dir.path())
        .args(["makeversion", "sample1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("matched for sample1"));
}

#[test]
fn test_milestone_show() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);

    sooners_cmd()
        .current_dir(dir.path())
        .args(["msforward", "20230626a", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dbss.00.fb"));
}

#[test]
fn test_msforward_then_msbackward() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);

    sooners_cmd()
        .current_dir(dir.path())
        .args(["makeversion"])
        .assert()
        .success();

    sooners_cmd()
        .current_dir(dir.path())
        .args(["msforward", "20230626a"])
        .assert()
        .success();
    assert!(table_exists(dir.path(), "test0", "sample1_building"));
    assert!(table_exists(dir.path(), "test0", "sooners_dbschema_version"));
    assert!(table_exists(dir.path(), "test1", "sooners_dbschema_operation"));

    // Backward from the first milestone step tears everything down.
    sooners_cmd()
        .current_dir(dir.path())
        .args(["msbackward", "20230626a"])
        .assert()
        .success();
    assert!(!table_exists(dir.path(), "test0", "sample1_building"));
    assert!(!table_exists(dir.path(), "test0", "sooners_configuration"));
}

#[test]
fn test_msforward_no_action_plans_only() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);

    sooners_cmd()
        .current_dir(dir.path())
        .args(["makeversion"])
        .assert()
        .success();

    sooners_cmd()
        .current_dir(dir.path())
        .args(["msforward", "20230626a", "--no-action"])
        .assert()
        .success();
    assert!(!table_exists(dir.path(), "test0", "sample1_building"));
}

#[test]
fn test_skcontinue_on_clean_migration_fails() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);

    sooners_cmd()
        .current_dir(dir.path())
        .args(["skcontinue"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("clean"));
}

#[test]
fn test_makepatch_between_versions() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);

    sooners_cmd()
        .current_dir(dir.path())
        .args(["makeversion", "sample1"])
        .assert()
        .success();

    // A second version with one more table; the diff cannot tell a create
    // from a rename, so the answer arrives on stdin.
    fs::write(
        dir.path().join("components/sample1/models.toml"),
        format!(
            "{MODELS_V1}\n[[table]]\nname = \"sample1_floor\"\n\n\
             [[table.column]]\nname = \"id\"\ntype = \"Integer\"\nprimary_key = true\n"
        ),
    )
    .unwrap();
    sooners_cmd()
        .current_dir(dir.path())
        .args(["makeversion", "sample1"])
        .write_stdin("unchanged sample1_building create sample1_floor\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("version.0002.xml"))
        .stdout(predicate::str::contains("patch.0001.0002.xml"));

    // makepatch regenerates the same file on demand.
    sooners_cmd()
        .current_dir(dir.path())
        .args(["makepatch", "sample1", "1", "2"])
        .write_stdin("unchanged sample1_building create sample1_floor\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("patch.0001.0002.xml"));
    assert!(
        dir.path()
            .join("components/sample1/history/patch.0001.0002.xml")
            .is_file()
    );
}
