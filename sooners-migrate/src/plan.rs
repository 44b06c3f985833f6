//! Operation planning: turning snapshots and patch documents into ordered
//! operation lists.
//!
//! Ordering is contractual: operations preserve patch document order;
//! databases are visited ascending for forward/create work and descending
//! for backward/drop work; shard entities expand ascending
//! `(database, suffix)` and unwind descending.

use std::collections::BTreeMap;

use smol_str::SmolStr;

use sooners_schema::model::{ColumnDef, ConstraintDef, IndexDef};
use sooners_schema::snapshot::{PhysicalTable, SchemaSnapshot};
use sooners_schema::version::VersionDocument;

use crate::error::{MigrateResult, MigrationError};
use crate::operations::Operation;
use crate::patch::{EntityKind, PatchAction, PatchDocument, PatchEntry};

/// Create every table of a component, creation order, databases ascending.
pub fn plan_create_component(snapshot: &SchemaSnapshot, component: &str) -> Vec<Operation> {
    let mut operations = Vec::new();
    for table in snapshot.component_tables(component) {
        for database in &table.database_names {
            operations.push(Operation::CreateTable {
                database: database.clone(),
                table: table.clone(),
            });
        }
    }
    operations
}

/// Drop every table of a component, reverse creation order, databases
/// descending.
pub fn plan_drop_component(snapshot: &SchemaSnapshot, component: &str) -> Vec<Operation> {
    let mut operations = Vec::new();
    for table in snapshot.component_tables(component).into_iter().rev() {
        for database in table.database_names.iter().rev() {
            operations.push(Operation::DropTable {
                database: database.clone(),
                table: table.clone(),
            });
        }
    }
    operations
}

/// Apply a patch forward: `older` is what the databases reflect, `newer`
/// the target.
pub fn plan_forward(
    patch: &PatchDocument,
    older: &SchemaSnapshot,
    newer: &SchemaSnapshot,
) -> MigrateResult<Vec<Operation>> {
    let mut operations = Vec::new();
    for entry in &patch.entries {
        forward_entry(entry, older, newer, &mut operations)?;
    }
    Ok(operations)
}

/// Unwind a patch: `newer` is what the databases reflect, `older` the
/// target. Entries replay in reverse document order.
pub fn plan_backward(
    patch: &PatchDocument,
    newer: &SchemaSnapshot,
    older: &SchemaSnapshot,
) -> MigrateResult<Vec<Operation>> {
    let mut operations = Vec::new();
    for entry in patch.entries.iter().rev() {
        backward_entry(entry, newer, older, &mut operations)?;
    }
    Ok(operations)
}

/// Equal versions with changed params: per-database adds/drops and
/// shard-suffix re-maps, walking the shared version document.
pub fn plan_params_update(
    document: &VersionDocument,
    older: &SchemaSnapshot,
    newer: &SchemaSnapshot,
) -> MigrateResult<Vec<Operation>> {
    let mut operations = Vec::new();
    for table in &document.tables {
        if !table.sharded {
            let table0 = require_table(older, &table.name)?;
            let table1 = require_table(newer, &table.name)?;
            for database in union_databases(table0, table1) {
                if !table0.database_names.contains(&database) {
                    operations.push(Operation::CreateTable {
                        database,
                        table: table1.clone(),
                    });
                } else if !table1.database_names.contains(&database) {
                    operations.push(Operation::DropTable {
                        database,
                        table: table0.clone(),
                    });
                }
            }
        } else {
            shard_pairs(older, newer, &table.name, &table.name, &mut operations, |_, _, _| Ok(()))?;
        }
    }
    Ok(operations)
}

fn forward_entry(
    entry: &PatchEntry,
    older: &SchemaSnapshot,
    newer: &SchemaSnapshot,
    operations: &mut Vec<Operation>,
) -> MigrateResult<()> {
    match (entry.kind, entry.action) {
        (EntityKind::Table, PatchAction::Create) => {
            let table = require_table(newer, entry.target_name()?)?;
            for database in &table.database_names {
                operations.push(Operation::CreateTable {
                    database: database.clone(),
                    table: table.clone(),
                });
            }
        }
        (EntityKind::Table, PatchAction::Drop) => {
            let table = require_table(older, entry.source_name()?)?;
            for database in table.database_names.iter().rev() {
                operations.push(Operation::DropTable {
                    database: database.clone(),
                    table: table.clone(),
                });
            }
        }
        (EntityKind::Table, PatchAction::Unchanged | PatchAction::Rename) => {
            let table0 = require_table(older, entry.source_name()?)?;
            let table1 = require_table(newer, entry.target_name()?)?;
            for database in union_databases(table0, table1) {
                if !table0.database_names.contains(&database) {
                    operations.push(Operation::CreateTable {
                        database,
                        table: table1.clone(),
                    });
                } else if !table1.database_names.contains(&database) {
                    operations.push(Operation::DropTable {
                        database,
                        table: table0.clone(),
                    });
                } else {
                    if entry.action == PatchAction::Rename {
                        operations.push(Operation::RenameTable {
                            database: database.clone(),
                            table0: table0.clone(),
                            table1: table1.clone(),
                        });
                    }
                    children_forward(&entry.children, table0, table1, &database, operations)?;
                }
            }
        }
        (EntityKind::ShardTable, PatchAction::Create) => {
            for table in newer.shard_tables(entry.target_name()?) {
                operations.push(Operation::CreateTable {
                    database: table.single_database()?.to_string(),
                    table: table.clone(),
                });
            }
        }
        (EntityKind::ShardTable, PatchAction::Drop) => {
            for table in older.shard_tables(entry.source_name()?).into_iter().rev() {
                operations.push(Operation::DropTable {
                    database: table.single_database()?.to_string(),
                    table: table.clone(),
                });
            }
        }
        (EntityKind::ShardTable, PatchAction::Unchanged | PatchAction::Rename) => {
            let name0 = entry.source_name()?;
            let name1 = entry.target_name()?;
            let rename = entry.action == PatchAction::Rename;
            shard_pairs(
                older,
                newer,
                name0,
                name1,
                operations,
                |table0, table1, operations| {
                    let database = table1.single_database()?.to_string();
                    if rename {
                        operations.push(Operation::RenameTable {
                            database: database.clone(),
                            table0: table0.clone(),
                            table1: table1.clone(),
                        });
                    }
                    children_forward(&entry.children, table0, table1, &database, operations)
                },
            )?;
        }
        (kind, _) => {
            return Err(MigrationError::invalid_patch(format!(
                "{} entries cannot appear at the document level",
                kind.base_name()
            )));
        }
    }
    Ok(())
}

fn backward_entry(
    entry: &PatchEntry,
    newer: &SchemaSnapshot,
    older: &SchemaSnapshot,
    operations: &mut Vec<Operation>,
) -> MigrateResult<()> {
    match (entry.kind, entry.action) {
        (EntityKind::Table, PatchAction::Create) => {
            let table = require_table(newer, entry.target_name()?)?;
            for database in table.database_names.iter().rev() {
                operations.push(Operation::DropTable {
                    database: database.clone(),
                    table: table.clone(),
                });
            }
        }
        (EntityKind::Table, PatchAction::Drop) => {
            let table = require_table(older, entry.source_name()?)?;
            for database in &table.database_names {
                operations.push(Operation::CreateTable {
                    database: database.clone(),
                    table: table.clone(),
                });
            }
        }
        (EntityKind::Table, PatchAction::Unchanged | PatchAction::Rename) => {
            let table1 = require_table(newer, entry.target_name()?)?;
            let table0 = require_table(older, entry.source_name()?)?;
            for database in union_databases(table0, table1) {
                if !table1.database_names.contains(&database) {
                    operations.push(Operation::CreateTable {
                        database,
                        table: table0.clone(),
                    });
                } else if !table0.database_names.contains(&database) {
                    operations.push(Operation::DropTable {
                        database,
                        table: table1.clone(),
                    });
                } else {
                    children_backward(&entry.children, table1, table0, &database, operations)?;
                    if entry.action == PatchAction::Rename {
                        operations.push(Operation::RenameTable {
                            database: database.clone(),
                            table0: table1.clone(),
                            table1: table0.clone(),
                        });
                    }
                }
            }
        }
        (EntityKind::ShardTable, PatchAction::Create) => {
            for table in newer.shard_tables(entry.target_name()?).into_iter().rev() {
                operations.push(Operation::DropTable {
                    database: table.single_database()?.to_string(),
                    table: table.clone(),
                });
            }
        }
        (EntityKind::ShardTable, PatchAction::Drop) => {
            for table in older.shard_tables(entry.source_name()?) {
                operations.push(Operation::CreateTable {
                    database: table.single_database()?.to_string(),
                    table: table.clone(),
                });
            }
        }
        (EntityKind::ShardTable, PatchAction::Unchanged | PatchAction::Rename) => {
            let name0 = entry.source_name()?;
            let name1 = entry.target_name()?;
            let rename = entry.action == PatchAction::Rename;
            // Walking backward: the "current" side is newer, the target is
            // older, so pair from newer to older.
            shard_pairs(
                newer,
                older,
                name1,
                name0,
                operations,
                |table1, table0, operations| {
                    let database = table1.single_database()?.to_string();
                    children_backward(&entry.children, table1, table0, &database, operations)?;
                    if rename {
                        operations.push(Operation::RenameTable {
                            database,
                            table0: table1.clone(),
                            table1: table0.clone(),
                        });
                    }
                    Ok(())
                },
            )?;
        }
        (kind, _) => {
            return Err(MigrationError::invalid_patch(format!(
                "{} entries cannot appear at the document level",
                kind.base_name()
            )));
        }
    }
    Ok(())
}

/// Pair the entities of a shard across two snapshots by suffix, in
/// ascending suffix order: one-sided suffixes create or drop, moved
/// suffixes re-create on the new database, stable suffixes get the
/// `both` callback.
fn shard_pairs<F>(
    from: &SchemaSnapshot,
    to: &SchemaSnapshot,
    name_from: &str,
    name_to: &str,
    operations: &mut Vec<Operation>,
    mut both: F,
) -> MigrateResult<()>
where
    F: FnMut(&PhysicalTable, &PhysicalTable, &mut Vec<Operation>) -> MigrateResult<()>,
{
    let tables_from: BTreeMap<SmolStr, &PhysicalTable> = from
        .shard_tables(name_from)
        .into_iter()
        .filter_map(|table| table.shard.as_ref().map(|shard| (shard.suffix.clone(), table)))
        .collect();
    let tables_to: BTreeMap<SmolStr, &PhysicalTable> = to
        .shard_tables(name_to)
        .into_iter()
        .filter_map(|table| table.shard.as_ref().map(|shard| (shard.suffix.clone(), table)))
        .collect();

    let mut suffixes: Vec<&SmolStr> = tables_from.keys().chain(tables_to.keys()).collect();
    suffixes.sort();
    suffixes.dedup();

    for suffix in suffixes {
        match (tables_from.get(suffix), tables_to.get(suffix)) {
            (None, Some(table_to)) => operations.push(Operation::CreateTable {
                database: table_to.single_database()?.to_string(),
                table: (*table_to).clone(),
            }),
            (Some(table_from), None) => operations.push(Operation::DropTable {
                database: table_from.single_database()?.to_string(),
                table: (*table_from).clone(),
            }),
            (Some(table_from), Some(table_to)) => {
                let database_from = table_from.single_database()?;
                let database_to = table_to.single_database()?;
                if database_from == database_to {
                    both(table_from, table_to, operations)?;
                } else {
                    operations.push(Operation::CreateTable {
                        database: database_to.to_string(),
                        table: (*table_to).clone(),
                    });
                    operations.push(Operation::DropTable {
                        database: database_from.to_string(),
                        table: (*table_from).clone(),
                    });
                }
            }
            (None, None) => unreachable!(),
        }
    }
    Ok(())
}

fn children_forward(
    children: &[PatchEntry],
    table0: &PhysicalTable,
    table1: &PhysicalTable,
    database: &str,
    operations: &mut Vec<Operation>,
) -> MigrateResult<()> {
    // A forward rename has already renamed the table, so child operations
    // address the new name.
    let table_name = table1.name.clone();
    for child in children {
        child_operations(child, &table0.def, &table1.def, &table_name, database, false, operations)?;
    }
    Ok(())
}

fn children_backward(
    children: &[PatchEntry],
    table1: &PhysicalTable,
    table0: &PhysicalTable,
    database: &str,
    operations: &mut Vec<Operation>,
) -> MigrateResult<()> {
    // A backward rename happens after the children, so child operations
    // still address the new-side name.
    let table_name = table1.name.clone();
    for child in children.iter().rev() {
        child_operations(child, &table0.def, &table1.def, &table_name, database, true, operations)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn child_operations(
    entry: &PatchEntry,
    def0: &sooners_schema::model::TableDef,
    def1: &sooners_schema::model::TableDef,
    table_name: &SmolStr,
    database: &str,
    backward: bool,
    operations: &mut Vec<Operation>,
) -> MigrateResult<()> {
    let database = database.to_string();
    match entry.kind {
        EntityKind::Column => match (entry.action, backward) {
            (PatchAction::Create, false) => {
                let column = require_column(def1, entry.target_name()?)?;
                operations.push(Operation::AddColumn {
                    database,
                    table: table_name.clone(),
                    column: column.clone(),
                });
            }
            (PatchAction::Drop, true) => {
                let column = require_column(def0, entry.source_name()?)?;
                operations.push(Operation::AddColumn {
                    database,
                    table: table_name.clone(),
                    column: column.clone(),
                });
            }
            (PatchAction::Create, true) => {
                let column = require_column(def1, entry.target_name()?)?;
                operations.push(Operation::DropColumn {
                    database,
                    table: table_name.clone(),
                    column: column.clone(),
                });
            }
            (PatchAction::Drop, false) => {
                let column = require_column(def0, entry.source_name()?)?;
                operations.push(Operation::DropColumn {
                    database,
                    table: table_name.clone(),
                    column: column.clone(),
                });
            }
            (PatchAction::Unchanged | PatchAction::Rename, _) => {
                let column0 = require_column(def0, entry.source_name()?)?;
                let column1 = require_column(def1, entry.target_name()?)?;
                let (before, after) = if backward {
                    (column1, column0)
                } else {
                    (column0, column1)
                };
                let operation = Operation::AlterColumn {
                    database,
                    table: table_name.clone(),
                    column0: before.clone(),
                    column1: after.clone(),
                };
                if !operation.is_noop() {
                    operations.push(operation);
                }
            }
        },
        EntityKind::Index => {
            let index0 = entry
                .name0
                .as_ref()
                .map(|name| require_index(def0, name))
                .transpose()?;
            let index1 = entry
                .name1
                .as_ref()
                .map(|name| require_index(def1, name))
                .transpose()?;
            push_drop_create(
                entry.action,
                backward,
                index0.cloned(),
                index1.cloned(),
                operations,
                |index| Operation::CreateIndex {
                    database: database.clone(),
                    table: table_name.clone(),
                    index,
                },
                |index| Operation::DropIndex {
                    database: database.clone(),
                    table: table_name.clone(),
                    index,
                },
                |a, b| a == b,
            )?;
        }
        EntityKind::PrimaryKeyConstraint
        | EntityKind::ForeignKeyConstraint
        | EntityKind::UniqueConstraint
        | EntityKind::CheckConstraint => {
            let constraint0 = entry
                .name0
                .as_ref()
                .map(|name| require_constraint(def0, name))
                .transpose()?;
            let constraint1 = entry
                .name1
                .as_ref()
                .map(|name| require_constraint(def1, name))
                .transpose()?;
            push_drop_create(
                entry.action,
                backward,
                constraint0.cloned(),
                constraint1.cloned(),
                operations,
                |constraint| Operation::CreateConstraint {
                    database: database.clone(),
                    table: table_name.clone(),
                    constraint,
                },
                |constraint| Operation::DropConstraint {
                    database: database.clone(),
                    table: table_name.clone(),
                    constraint,
                },
                |a, b| a == b,
            )?;
        }
        EntityKind::Table | EntityKind::ShardTable => {
            return Err(MigrationError::invalid_patch(
                "table entries cannot nest inside a table".to_string(),
            ));
        }
    }
    Ok(())
}

/// Drop-then-create dance shared by indexes and constraints: creates and
/// drops mirror under direction; changed (or renamed) definitions replace
/// the old with the new.
#[allow(clippy::too_many_arguments)]
fn push_drop_create<T, C, D, E>(
    action: PatchAction,
    backward: bool,
    item0: Option<T>,
    item1: Option<T>,
    operations: &mut Vec<Operation>,
    make_create: C,
    make_drop: D,
    equal: E,
) -> MigrateResult<()>
where
    C: Fn(T) -> Operation,
    D: Fn(T) -> Operation,
    E: Fn(&T, &T) -> bool,
    T: Clone,
{
    let missing =
        || MigrationError::invalid_patch("patch entry is missing one of its sides".to_string());
    let (before, after) = if backward { (item1, item0) } else { (item0, item1) };
    match action {
        PatchAction::Create if !backward => {
            operations.push(make_create(after.ok_or_else(missing)?));
        }
        PatchAction::Create => {
            operations.push(make_drop(before.ok_or_else(missing)?));
        }
        PatchAction::Drop if !backward => {
            operations.push(make_drop(before.ok_or_else(missing)?));
        }
        PatchAction::Drop => {
            operations.push(make_create(after.ok_or_else(missing)?));
        }
        PatchAction::Unchanged | PatchAction::Rename => {
            let before = before.ok_or_else(missing)?;
            let after = after.ok_or_else(missing)?;
            if action == PatchAction::Rename || !equal(&before, &after) {
                operations.push(make_drop(before));
                operations.push(make_create(after));
            }
        }
    }
    Ok(())
}

fn union_databases(table0: &PhysicalTable, table1: &PhysicalTable) -> Vec<String> {
    let mut names: Vec<String> = table0
        .database_names
        .union(&table1.database_names)
        .cloned()
        .collect();
    names.sort();
    names
}

fn require_table<'a>(
    snapshot: &'a SchemaSnapshot,
    name: &str,
) -> MigrateResult<&'a PhysicalTable> {
    snapshot
        .table(name)
        .ok_or_else(|| MigrationError::invalid_patch(format!("snapshot has no table '{name}'")))
}

fn require_column<'a>(
    def: &'a sooners_schema::model::TableDef,
    name: &str,
) -> MigrateResult<&'a ColumnDef> {
    def.find_column(name).ok_or_else(|| {
        MigrationError::invalid_patch(format!("table '{}' has no column '{name}'", def.name))
    })
}

fn require_index<'a>(
    def: &'a sooners_schema::model::TableDef,
    name: &str,
) -> MigrateResult<&'a IndexDef> {
    def.find_index(name).ok_or_else(|| {
        MigrationError::invalid_patch(format!("table '{}' has no index '{name}'", def.name))
    })
}

fn require_constraint<'a>(
    def: &'a sooners_schema::model::TableDef,
    name: &str,
) -> MigrateResult<&'a ConstraintDef> {
    def.find_constraint(name).ok_or_else(|| {
        MigrationError::invalid_patch(format!("table '{}' has no constraint '{name}'", def.name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{ScriptedPrompt, make_patch};
    use sooners_schema::model::TableDef;
    use sooners_schema::params::{SchemaParams, TableParams};
    use sooners_schema::types::ColumnType;
    use std::rc::Rc;

    fn snapshot(params: SchemaParams, models: Vec<TableDef>, version: u32) -> SchemaSnapshot {
        let mut doc = VersionDocument::from_models("sample1", &models).unwrap();
        doc.version = version;
        let mut snapshot = SchemaSnapshot::new("test0", params);
        snapshot.add_component(Rc::new(doc)).unwrap();
        snapshot
    }

    fn keys(operations: &[Operation]) -> Vec<String> {
        operations
            .iter()
            .map(|operation| operation.describe())
            .collect()
    }

    #[test]
    fn test_create_component_order() {
        let params = SchemaParams::new().with("t0", TableParams::plain(["test0", "test1"]));
        let snapshot = snapshot(
            params,
            vec![TableDef::new("t0").column(ColumnDef::new("id", ColumnType::Integer).primary_key())],
            1,
        );
        assert_eq!(
            keys(&plan_create_component(&snapshot, "sample1")),
            vec!["create_table@test0(t0)", "create_table@test1(t0)"]
        );
        assert_eq!(
            keys(&plan_drop_component(&snapshot, "sample1")),
            vec!["drop_table@test1(t0)", "drop_table@test0(t0)"]
        );
    }

    #[test]
    fn test_add_column_plan() {
        let models0 = vec![
            TableDef::new("t0").column(ColumnDef::new("id", ColumnType::Integer).primary_key()),
        ];
        let models1 = vec![
            TableDef::new("t0")
                .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDef::new(
                    "name",
                    ColumnType::String {
                        length: 32,
                        collation: None,
                    },
                )),
        ];
        let older = snapshot(SchemaParams::new(), models0, 1);
        let newer = snapshot(SchemaParams::new(), models1, 2);
        // A new name beside surviving ones is ambiguous; the answer settles
        // it as a plain create.
        let mut prompt = ScriptedPrompt::new(["unchanged id create name"]);
        let patch = make_patch(
            &older.components["sample1"].document,
            &newer.components["sample1"].document,
            &mut prompt,
        )
        .unwrap();

        let forward = plan_forward(&patch, &older, &newer).unwrap();
        assert_eq!(keys(&forward), vec!["add_column@test0(t0.name)"]);

        let backward = plan_backward(&patch, &newer, &older).unwrap();
        assert_eq!(keys(&backward), vec!["drop_column@test0(t0.name)"]);
    }

    #[test]
    fn test_rename_column_plan() {
        let models0 = vec![TableDef::new("t0")
            .column(ColumnDef::new("a", ColumnType::Integer))
            .column(ColumnDef::new("b", ColumnType::Integer))];
        let models1 = vec![TableDef::new("t0")
            .column(ColumnDef::new("a", ColumnType::Integer))
            .column(ColumnDef::new("c", ColumnType::Integer))];
        let older = snapshot(SchemaParams::new(), models0, 1);
        let newer = snapshot(SchemaParams::new(), models1, 2);
        let mut prompt = ScriptedPrompt::new(["unchanged a rename b/c"]);
        let patch = make_patch(
            &older.components["sample1"].document,
            &newer.components["sample1"].document,
            &mut prompt,
        )
        .unwrap();

        let forward = plan_forward(&patch, &older, &newer).unwrap();
        assert_eq!(keys(&forward), vec!["alter_column@test0(t0.b->c)"]);

        let backward = plan_backward(&patch, &newer, &older).unwrap();
        assert_eq!(keys(&backward), vec!["alter_column@test0(t0.c->b)"]);
    }

    #[test]
    fn test_sharded_split_plan() {
        // A plain table becomes sharded across two databases.
        let models0 = vec![TableDef::new("t")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())];
        let models1 = vec![TableDef::new("t")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .sharded()];
        let params0 = SchemaParams::new().with("t", TableParams::plain(["test1"]));
        let params1 = SchemaParams::new().with(
            "t",
            TableParams::sharded([("db0", vec!["000"]), ("db1", vec!["001", "002"])]),
        );
        let older = snapshot(params0, models0, 1);
        let newer = snapshot(params1, models1, 2);
        let patch = make_patch(
            &older.components["sample1"].document,
            &newer.components["sample1"].document,
            &mut ScriptedPrompt::default(),
        )
        .unwrap();

        let forward = plan_forward(&patch, &older, &newer).unwrap();
        assert_eq!(
            keys(&forward),
            vec![
                "create_table@db0(t_000)",
                "create_table@db1(t_001)",
                "create_table@db1(t_002)",
                "drop_table@test1(t)",
            ]
        );
    }

    #[test]
    fn test_params_update_plain_move() {
        let models = vec![TableDef::new("t0")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())];
        let params0 = SchemaParams::new().with("t0", TableParams::plain(["test0"]));
        let params1 = SchemaParams::new().with("t0", TableParams::plain(["test0", "test1"]));
        let older = snapshot(params0, models.clone(), 1);
        let newer = snapshot(params1, models, 1);
        let document = older.components["sample1"].document.clone();

        let operations = plan_params_update(&document, &older, &newer).unwrap();
        assert_eq!(keys(&operations), vec!["create_table@test1(t0)"]);
    }

    #[test]
    fn test_params_update_shard_move() {
        let models = vec![TableDef::new("p")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .sharded()];
        let params0 = SchemaParams::new().with(
            "p",
            TableParams::sharded([("test0", vec!["000", "001"])]),
        );
        let params1 = SchemaParams::new().with(
            "p",
            TableParams::sharded([("test0", vec!["000"]), ("test1", vec!["001", "002"])]),
        );
        let older = snapshot(params0, models.clone(), 1);
        let newer = snapshot(params1, models, 1);
        let document = older.components["sample1"].document.clone();

        let operations = plan_params_update(&document, &older, &newer).unwrap();
        assert_eq!(
            keys(&operations),
            vec![
                // 001 moves from test0 to test1: create new, drop old.
                "create_table@test1(p_001)",
                "drop_table@test0(p_001)",
                // 002 is new.
                "create_table@test1(p_002)",
            ]
        );
    }

    #[test]
    fn test_index_change_replaces() {
        let models0 = vec![TableDef::new("t0")
            .column(ColumnDef::new("a", ColumnType::Integer))
            .index(IndexDef::new("i", vec![SmolStr::new("a")]))];
        let models1 = vec![TableDef::new("t0")
            .column(ColumnDef::new("a", ColumnType::Integer))
            .index(IndexDef::new("i", vec![SmolStr::new("a")]).unique())];
        let older = snapshot(SchemaParams::new(), models0, 1);
        let newer = snapshot(SchemaParams::new(), models1, 2);
        let patch = make_patch(
            &older.components["sample1"].document,
            &newer.components["sample1"].document,
            &mut ScriptedPrompt::default(),
        )
        .unwrap();
        let forward = plan_forward(&patch, &older, &newer).unwrap();
        assert_eq!(
            keys(&forward),
            vec!["drop_index@test0(t0.i)", "create_index@test0(t0.i)"]
        );

        // An unchanged index plans nothing at all.
        let rerun = plan_forward(&patch, &older, &older).unwrap();
        assert!(rerun.is_empty());
    }

    #[test]
    fn test_table_rename_orders_rename_first_forward_last_backward() {
        let models0 = vec![TableDef::new("old")
            .column(ColumnDef::new("a", ColumnType::Integer))
            .column(ColumnDef::new("b", ColumnType::Integer))];
        let models1 = vec![TableDef::new("new")
            .column(ColumnDef::new("a", ColumnType::Integer))
            .column(ColumnDef::new("c", ColumnType::Integer))];
        let older = snapshot(SchemaParams::new(), models0, 1);
        let newer = snapshot(SchemaParams::new(), models1, 2);
        let mut prompt = ScriptedPrompt::new(["rename old/new", "unchanged a rename b/c"]);
        let patch = make_patch(
            &older.components["sample1"].document,
            &newer.components["sample1"].document,
            &mut prompt,
        )
        .unwrap();

        let forward = plan_forward(&patch, &older, &newer).unwrap();
        assert_eq!(
            keys(&forward),
            vec![
                "rename_table@test0(old->new)",
                "alter_column@test0(new.b->c)",
            ]
        );

        let backward = plan_backward(&patch, &newer, &older).unwrap();
        assert_eq!(
            keys(&backward),
            vec![
                "alter_column@test0(new.c->b)",
                "rename_table@test0(new->old)",
            ]
        );
    }
}
