//! End-to-end migration runs over file-backed SQLite databases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use smol_str::SmolStr;

use sooners_migrate::bookkeeping::{
    CONFIGURATION_TABLE, OPERATION_TABLE, SHARD_WEIGHT_TABLE, VERSION_TABLE, core_models,
};
use sooners_migrate::diff::{DenyPrompt, ScriptedPrompt, make_patch};
use sooners_migrate::dialect::SqlDialect;
use sooners_migrate::error::MigrationError;
use sooners_migrate::migration::{Migration, run_delayed};
use sooners_migrate::store::{DatabaseSession, EngineConfig, MigrationContext};
use sooners_schema::model::{ColumnDef, TableDef};
use sooners_schema::params::{SchemaParams, TableParams};
use sooners_schema::snapshot::SchemaSnapshot;
use sooners_schema::types::ColumnType;
use sooners_schema::version::VersionDocument;
use sooners_schema::{Component, SOURCE_TAG};
use sooners_sqlite::SqliteSession;

const DBS: [&str; 3] = ["test0", "test1", "test2"];

fn db_path(dir: &Path, database: &str) -> PathBuf {
    dir.join(format!("{database}.sqlite3"))
}

fn engine_config(dir: &Path) -> EngineConfig {
    let mut components = IndexMap::new();
    let core = Component::new("sooners_core", dir.join("sooners_core"), true);
    if core.version_numbers().unwrap().is_empty() {
        let mut doc = VersionDocument::from_models("sooners_core", &core_models()).unwrap();
        core.version_write(&mut doc, 1, SOURCE_TAG).unwrap();
    }
    components.insert(SmolStr::new("sooners_core"), core);
    components.insert(
        SmolStr::new("sample1"),
        Component::new("sample1", dir.join("sample1"), true),
    );
    EngineConfig {
        default_database: "test0".to_string(),
        databases: DBS
            .iter()
            .map(|name| (name.to_string(), SqlDialect::Sqlite))
            .collect(),
        components,
        milestones_dir: dir.join("milestones"),
    }
}

fn open_sessions(dir: &Path) -> BTreeMap<String, Box<dyn DatabaseSession>> {
    DBS.iter()
        .map(|name| {
            let session: Box<dyn DatabaseSession> =
                Box::new(SqliteSession::open(db_path(dir, name)).unwrap());
            (name.to_string(), session)
        })
        .collect()
}

/// Params carrying the bookkeeping tables: operation log everywhere, the
/// rest on the default database.
fn base_params() -> SchemaParams {
    SchemaParams::new()
        .with(CONFIGURATION_TABLE, TableParams::plain(["test0"]))
        .with(VERSION_TABLE, TableParams::plain(["test0"]))
        .with(OPERATION_TABLE, TableParams::plain(DBS))
        .with(SHARD_WEIGHT_TABLE, TableParams::plain(["test0"]))
}

fn target(
    config: &EngineConfig,
    params: SchemaParams,
    versions: &[(&str, u32)],
) -> SchemaSnapshot {
    let mut snapshot = SchemaSnapshot::new(config.default_database.clone(), params);
    for (name, version) in versions {
        let component = config.component(name).unwrap();
        snapshot
            .add_component(component.version_parse(*version).unwrap())
            .unwrap();
    }
    snapshot
}

/// Run one full migration to the given target, draining deferred drops.
fn migrate_to(
    config: &EngineConfig,
    dir: &Path,
    params: SchemaParams,
    versions: &[(&str, u32)],
) -> Result<(), MigrationError> {
    let snapshot = target(config, params, versions);
    let mut ctx = MigrationContext::new(config, open_sessions(dir))?;
    let mut migration = Migration::load(&mut ctx)?;
    migration.set_target(&mut ctx, Some(snapshot))?;
    let delayed = migration.run(&mut ctx, None)?;
    run_delayed(&mut ctx, &delayed)?;
    Ok(())
}

fn table_exists(dir: &Path, database: &str, table: &str) -> bool {
    let conn = rusqlite::Connection::open(db_path(dir, database)).unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .unwrap();
    count > 0
}

fn column_names(dir: &Path, database: &str, table: &str) -> Vec<String> {
    let conn = rusqlite::Connection::open(db_path(dir, database)).unwrap();
    let mut statement = conn
        .prepare(&format!("PRAGMA table_info(\"{table}\")"))
        .unwrap();
    let names = statement
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    names
}

fn operation_log_len(dir: &Path, database: &str) -> i64 {
    let conn = rusqlite::Connection::open(db_path(dir, database)).unwrap();
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {OPERATION_TABLE}"),
        [],
        |row| row.get(0),
    )
    .unwrap()
}

fn version_row(dir: &Path, component: &str) -> (Option<i64>, Option<i64>) {
    let conn = rusqlite::Connection::open(db_path(dir, "test0")).unwrap();
    conn.query_row(
        &format!("SELECT version0, version1 FROM {VERSION_TABLE} WHERE component_name = ?1"),
        [component],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .unwrap()
}

fn sample_v1() -> Vec<TableDef> {
    vec![
        TableDef::new("t0").column(ColumnDef::new("id", ColumnType::Integer).primary_key()),
    ]
}

fn sample_v2() -> Vec<TableDef> {
    vec![
        TableDef::new("t0")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .column(ColumnDef::new(
                "name",
                ColumnType::String {
                    length: 32,
                    collation: None,
                },
            )),
    ]
}

/// Write a sample1 version and, past version 1, the adjacent patch.
fn write_sample_version(
    config: &EngineConfig,
    models: &[TableDef],
    version: u32,
    answers: &[&str],
) {
    let component = config.component("sample1").unwrap();
    let mut doc = VersionDocument::from_models("sample1", models).unwrap();
    component.version_write(&mut doc, version, SOURCE_TAG).unwrap();
    if version > 1 {
        let previous = component.version_parse(version - 1).unwrap();
        let current = component.version_parse(version).unwrap();
        let patch = if answers.is_empty() {
            make_patch(&previous, &current, &mut DenyPrompt).unwrap()
        } else {
            make_patch(
                &previous,
                &current,
                &mut ScriptedPrompt::new(answers.iter().copied()),
            )
            .unwrap()
        };
        let mut node = patch.to_node();
        component
            .patch_write(&mut node, version - 1, version, SOURCE_TAG)
            .unwrap();
    }
}

fn install_v1(config: &EngineConfig, dir: &Path, extra: SchemaParams) {
    write_sample_version(config, &sample_v1(), 1, &[]);
    let mut params = base_params();
    for (table, table_params) in extra.iter() {
        params.insert(table.clone(), table_params.clone());
    }
    migrate_to(config, dir, params, &[("sooners_core", 1), ("sample1", 1)]).unwrap();
}

#[test]
fn test_first_install() {
    let dir = tempfile::tempdir().unwrap();
    let config = engine_config(dir.path());
    install_v1(&config, dir.path(), SchemaParams::new());

    assert!(table_exists(dir.path(), "test0", "t0"));
    assert!(table_exists(dir.path(), "test0", CONFIGURATION_TABLE));
    assert!(table_exists(dir.path(), "test0", VERSION_TABLE));
    for database in DBS {
        assert!(table_exists(dir.path(), database, OPERATION_TABLE));
        assert_eq!(operation_log_len(dir.path(), database), 0);
    }
    assert_eq!(version_row(dir.path(), "sample1"), (Some(1), Some(1)));
    assert_eq!(version_row(dir.path(), "sooners_core"), (Some(1), Some(1)));
}

#[test]
fn test_completed_migration_replans_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = engine_config(dir.path());
    install_v1(&config, dir.path(), SchemaParams::new());

    let snapshot = target(&config, base_params(), &[("sooners_core", 1), ("sample1", 1)]);
    let mut ctx = MigrationContext::new(&config, open_sessions(dir.path())).unwrap();
    let mut migration = Migration::load(&mut ctx).unwrap();
    assert!(migration.is_clean());
    migration.set_target(&mut ctx, Some(snapshot)).unwrap();
    assert!(migration.is_clean());
    assert_eq!(migration.direction(), (false, false));
    for component in ["sooners_core", "sample1"] {
        assert!(migration.component_operations(component).unwrap().is_empty());
    }
}

#[test]
fn test_add_column_then_backward() {
    let dir = tempfile::tempdir().unwrap();
    let config = engine_config(dir.path());
    install_v1(&config, dir.path(), SchemaParams::new());

    write_sample_version(&config, &sample_v2(), 2, &["unchanged id create name"]);
    migrate_to(
        &config,
        dir.path(),
        base_params(),
        &[("sooners_core", 1), ("sample1", 2)],
    )
    .unwrap();

    assert!(column_names(dir.path(), "test0", "t0").contains(&"name".to_string()));
    assert_eq!(version_row(dir.path(), "sample1"), (Some(2), Some(2)));
    assert_eq!(operation_log_len(dir.path(), "test0"), 0);

    // Backward to version 1 drops the column and restores the row.
    migrate_to(
        &config,
        dir.path(),
        base_params(),
        &[("sooners_core", 1), ("sample1", 1)],
    )
    .unwrap();
    assert!(!column_names(dir.path(), "test0", "t0").contains(&"name".to_string()));
    assert_eq!(version_row(dir.path(), "sample1"), (Some(1), Some(1)));
}

#[test]
fn test_rename_column_via_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let config = engine_config(dir.path());
    write_sample_version(
        &config,
        &[TableDef::new("t0")
            .column(ColumnDef::new("a", ColumnType::Integer))
            .column(ColumnDef::new("b", ColumnType::Integer))],
        1,
        &[],
    );
    let mut params = base_params();
    params.insert("t0", TableParams::plain(["test0"]));
    migrate_to(
        &config,
        dir.path(),
        params.clone(),
        &[("sooners_core", 1), ("sample1", 1)],
    )
    .unwrap();

    write_sample_version(
        &config,
        &[TableDef::new("t0")
            .column(ColumnDef::new("a", ColumnType::Integer))
            .column(ColumnDef::new("c", ColumnType::Integer))],
        2,
        &["unchanged a rename b/c"],
    );
    migrate_to(
        &config,
        dir.path(),
        params,
        &[("sooners_core", 1), ("sample1", 2)],
    )
    .unwrap();

    let columns = column_names(dir.path(), "test0", "t0");
    assert!(columns.contains(&"c".to_string()));
    assert!(!columns.contains(&"b".to_string()));
}

#[test]
fn test_sharded_split() {
    let dir = tempfile::tempdir().unwrap();
    let config = engine_config(dir.path());
    write_sample_version(
        &config,
        &[TableDef::new("t").column(ColumnDef::new("id", ColumnType::Integer).primary_key())],
        1,
        &[],
    );
    let mut params = base_params();
    params.insert("t", TableParams::plain(["test1"]));
    migrate_to(
        &config,
        dir.path(),
        params,
        &[("sooners_core", 1), ("sample1", 1)],
    )
    .unwrap();
    assert!(table_exists(dir.path(), "test1", "t"));

    // Version 2 shards the table across test1 and test2.
    write_sample_version(
        &config,
        &[TableDef::new("t")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .sharded()],
        2,
        &[],
    );
    let mut params = base_params();
    params.insert(
        "t",
        TableParams::sharded([("test1", vec!["000"]), ("test2", vec!["001", "002"])]),
    );
    migrate_to(
        &config,
        dir.path(),
        params,
        &[("sooners_core", 1), ("sample1", 2)],
    )
    .unwrap();

    assert!(table_exists(dir.path(), "test1", "t_000"));
    assert!(table_exists(dir.path(), "test2", "t_001"));
    assert!(table_exists(dir.path(), "test2", "t_002"));
    assert!(!table_exists(dir.path(), "test1", "t"));
}

#[test]
fn test_broken_run_then_continue() {
    let dir = tempfile::tempdir().unwrap();
    let config = engine_config(dir.path());
    write_sample_version(
        &config,
        &[
            TableDef::new("t0").column(ColumnDef::new("id", ColumnType::Integer).primary_key()),
            TableDef::new("t1").column(ColumnDef::new("id", ColumnType::Integer).primary_key()),
        ],
        1,
        &[],
    );

    // A conflicting table makes the last create fail mid-run.
    {
        let conn = rusqlite::Connection::open(db_path(dir.path(), "test0")).unwrap();
        conn.execute_batch("CREATE TABLE t1 (blocker INTEGER);")
            .unwrap();
    }

    let result = migrate_to(
        &config,
        dir.path(),
        base_params(),
        &[("sooners_core", 1), ("sample1", 1)],
    );
    assert!(matches!(result, Err(MigrationError::DdlFailure { .. })));

    // Applied operations stayed logged; t0 exists, the run is dirty.
    assert!(table_exists(dir.path(), "test0", "t0"));
    assert!(operation_log_len(dir.path(), "test0") > 0);
    assert_eq!(version_row(dir.path(), "sample1"), (None, Some(1)));

    // Remove the blocker and continue: only the unapplied suffix runs.
    {
        let conn = rusqlite::Connection::open(db_path(dir.path(), "test0")).unwrap();
        conn.execute_batch("DROP TABLE t1;").unwrap();
    }
    let mut ctx = MigrationContext::new(&config, open_sessions(dir.path())).unwrap();
    let mut migration = Migration::load(&mut ctx).unwrap();
    assert!(!migration.is_clean());
    let delayed = migration.run_continue(&mut ctx, None).unwrap();
    run_delayed(&mut ctx, &delayed).unwrap();

    assert!(table_exists(dir.path(), "test0", "t1"));
    assert_eq!(version_row(dir.path(), "sample1"), (Some(1), Some(1)));
    assert_eq!(operation_log_len(dir.path(), "test0"), 0);
}

#[test]
fn test_broken_run_then_withdraw() {
    let dir = tempfile::tempdir().unwrap();
    let config = engine_config(dir.path());
    write_sample_version(
        &config,
        &[
            TableDef::new("t0").column(ColumnDef::new("id", ColumnType::Integer).primary_key()),
            TableDef::new("t1").column(ColumnDef::new("id", ColumnType::Integer).primary_key()),
        ],
        1,
        &[],
    );

    {
        let conn = rusqlite::Connection::open(db_path(dir.path(), "test0")).unwrap();
        conn.execute_batch("CREATE TABLE t1 (blocker INTEGER);")
            .unwrap();
    }
    let result = migrate_to(
        &config,
        dir.path(),
        base_params(),
        &[("sooners_core", 1), ("sample1", 1)],
    );
    assert!(result.is_err());

    // Withdraw unwinds everything that applied, bookkeeping last.
    {
        let conn = rusqlite::Connection::open(db_path(dir.path(), "test0")).unwrap();
        conn.execute_batch("DROP TABLE t1;").unwrap();
    }
    let mut ctx = MigrationContext::new(&config, open_sessions(dir.path())).unwrap();
    let mut migration = Migration::load(&mut ctx).unwrap();
    let delayed = migration.run_withdraw(&mut ctx, None).unwrap();
    run_delayed(&mut ctx, &delayed).unwrap();

    assert!(!table_exists(dir.path(), "test0", "t0"));
    assert!(!table_exists(dir.path(), "test0", CONFIGURATION_TABLE));
    assert!(!table_exists(dir.path(), "test0", VERSION_TABLE));
    assert!(!table_exists(dir.path(), "test0", OPERATION_TABLE));
}

#[test]
fn test_deterministic_plan_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = engine_config(dir.path());
    install_v1(&config, dir.path(), SchemaParams::new());

    write_sample_version(&config, &sample_v2(), 2, &["unchanged id create name"]);

    let mut plans = Vec::new();
    for _ in 0..2 {
        let snapshot = target(&config, base_params(), &[("sooners_core", 1), ("sample1", 2)]);
        let mut ctx = MigrationContext::new(&config, open_sessions(dir.path())).unwrap();
        let mut migration = Migration::load(&mut ctx).unwrap();
        migration.set_target(&mut ctx, Some(snapshot)).unwrap();
        let described: Vec<String> = migration
            .component_operations("sample1")
            .unwrap()
            .iter()
            .map(|operation| operation.describe())
            .collect();
        // Leave the bookkeeping dirty but unexecuted; reset the target so
        // the next round starts identically.
        migration
            .set_target(
                &mut ctx,
                Some(target(
                    &config,
                    base_params(),
                    &[("sooners_core", 1), ("sample1", 1)],
                )),
            )
            .unwrap();
        plans.push(described);
    }
    assert_eq!(plans[0], plans[1]);
    assert_eq!(plans[0], vec!["add_column@test0(t0.name)".to_string()]);
}
