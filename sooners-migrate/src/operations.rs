//! Typed, serializable DDL primitives.
//!
//! Every operation carries a stable numeric typeid (1–16) and a key
//! `(typeid, table, name0, name1)` that is globally unique per database
//! within one migration run. The key is what the operation log stores, and
//! what the idempotence boundary compares.

use smol_str::SmolStr;

use sooners_schema::model::{ColumnDef, ConstraintDef, IndexDef};
use sooners_schema::snapshot::PhysicalTable;

/// The log identity of an operation.
pub type OperationKey = (u8, Option<SmolStr>, Option<SmolStr>, Option<SmolStr>);

/// A single DDL primitive targeted at one database.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a physical table with all its columns, constraints and
    /// indexes. Typeid 1.
    CreateTable {
        database: String,
        table: PhysicalTable,
    },
    /// Rename a physical table. Typeid 2.
    RenameTable {
        database: String,
        table0: PhysicalTable,
        table1: PhysicalTable,
    },
    /// Drop a physical table. Typeid 3.
    DropTable {
        database: String,
        table: PhysicalTable,
    },
    /// Add a column. Typeid 4.
    AddColumn {
        database: String,
        table: SmolStr,
        column: ColumnDef,
    },
    /// Alter a column from its before to its after shape (covers renames).
    /// Typeid 5.
    AlterColumn {
        database: String,
        table: SmolStr,
        column0: ColumnDef,
        column1: ColumnDef,
    },
    /// Drop a column. Typeid 6.
    DropColumn {
        database: String,
        table: SmolStr,
        column: ColumnDef,
    },
    /// Add a named table constraint. Typeids 7 (primary key), 9 (foreign
    /// key), 11 (unique), 13 (check).
    CreateConstraint {
        database: String,
        table: SmolStr,
        constraint: ConstraintDef,
    },
    /// Drop a named table constraint. Typeids 8, 10, 12, 14.
    DropConstraint {
        database: String,
        table: SmolStr,
        constraint: ConstraintDef,
    },
    /// Create an index. Typeid 15.
    CreateIndex {
        database: String,
        table: SmolStr,
        index: IndexDef,
    },
    /// Drop an index. Typeid 16.
    DropIndex {
        database: String,
        table: SmolStr,
        index: IndexDef,
    },
}

impl Operation {
    /// The stable numeric typeid.
    pub fn typeid(&self) -> u8 {
        match self {
            Self::CreateTable { .. } => 1,
            Self::RenameTable { .. } => 2,
            Self::DropTable { .. } => 3,
            Self::AddColumn { .. } => 4,
            Self::AlterColumn { .. } => 5,
            Self::DropColumn { .. } => 6,
            Self::CreateConstraint { constraint, .. } => match constraint {
                ConstraintDef::PrimaryKey { .. } => 7,
                ConstraintDef::ForeignKey { .. } => 9,
                ConstraintDef::Unique { .. } => 11,
                ConstraintDef::Check { .. } => 13,
            },
            Self::DropConstraint { constraint, .. } => match constraint {
                ConstraintDef::PrimaryKey { .. } => 8,
                ConstraintDef::ForeignKey { .. } => 10,
                ConstraintDef::Unique { .. } => 12,
                ConstraintDef::Check { .. } => 14,
            },
            Self::CreateIndex { .. } => 15,
            Self::DropIndex { .. } => 16,
        }
    }

    /// Wire name of the primitive, as logged.
    pub fn oper_name(&self) -> &'static str {
        match self.typeid() {
            1 => "create_table",
            2 => "rename_table",
            3 => "drop_table",
            4 => "add_column",
            5 => "alter_column",
            6 => "drop_column",
            7 => "create_primary_key_constraint",
            8 => "drop_primary_key_constraint",
            9 => "create_foreign_key_constraint",
            10 => "drop_foreign_key_constraint",
            11 => "create_unique_constraint",
            12 => "drop_unique_constraint",
            13 => "create_check_constraint",
            14 => "drop_check_constraint",
            15 => "create_index",
            16 => "drop_index",
            _ => unreachable!(),
        }
    }

    /// The database this operation targets.
    pub fn database(&self) -> &str {
        match self {
            Self::CreateTable { database, .. }
            | Self::RenameTable { database, .. }
            | Self::DropTable { database, .. }
            | Self::AddColumn { database, .. }
            | Self::AlterColumn { database, .. }
            | Self::DropColumn { database, .. }
            | Self::CreateConstraint { database, .. }
            | Self::DropConstraint { database, .. }
            | Self::CreateIndex { database, .. }
            | Self::DropIndex { database, .. } => database,
        }
    }

    /// The enclosing table name. Table-level operations carry their target
    /// in [`Operation::names`] instead.
    pub fn table_name(&self) -> Option<&SmolStr> {
        match self {
            Self::CreateTable { .. } | Self::RenameTable { .. } | Self::DropTable { .. } => None,
            Self::AddColumn { table, .. }
            | Self::AlterColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::CreateConstraint { table, .. }
            | Self::DropConstraint { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::DropIndex { table, .. } => Some(table),
        }
    }

    /// The one or two entity names this operation touches.
    pub fn names(&self) -> (Option<SmolStr>, Option<SmolStr>) {
        match self {
            Self::CreateTable { table, .. } | Self::DropTable { table, .. } => {
                (Some(table.name.clone()), None)
            }
            Self::RenameTable { table0, table1, .. } => {
                (Some(table0.name.clone()), Some(table1.name.clone()))
            }
            Self::AddColumn { column, .. } | Self::DropColumn { column, .. } => {
                (Some(column.name.clone()), None)
            }
            Self::AlterColumn {
                column0, column1, ..
            } => (Some(column0.name.clone()), Some(column1.name.clone())),
            Self::CreateConstraint { constraint, .. }
            | Self::DropConstraint { constraint, .. } => (Some(constraint.name().clone()), None),
            Self::CreateIndex { index, .. } | Self::DropIndex { index, .. } => {
                (Some(index.name.clone()), None)
            }
        }
    }

    /// The log key: `(typeid, table, name0, name1)`.
    pub fn key(&self) -> OperationKey {
        let (name0, name1) = self.names();
        (self.typeid(), self.table_name().cloned(), name0, name1)
    }

    /// An `AlterColumn` whose compared attributes (name, type, nullability,
    /// default, comment) are all equal does nothing.
    pub fn is_noop(&self) -> bool {
        match self {
            Self::AlterColumn {
                column0, column1, ..
            } => {
                column0.name == column1.name
                    && column0.column_type == column1.column_type
                    && column0.nullable == column1.nullable
                    && column0.default == column1.default
                    && column0.comment == column1.comment
            }
            _ => false,
        }
    }

    /// The operation undoing this one, used by the withdraw resolver.
    pub fn inverse(&self) -> Operation {
        match self.clone() {
            Self::CreateTable { database, table } => Self::DropTable { database, table },
            Self::DropTable { database, table } => Self::CreateTable { database, table },
            Self::RenameTable {
                database,
                table0,
                table1,
            } => Self::RenameTable {
                database,
                table0: table1,
                table1: table0,
            },
            Self::AddColumn {
                database,
                table,
                column,
            } => Self::DropColumn {
                database,
                table,
                column,
            },
            Self::DropColumn {
                database,
                table,
                column,
            } => Self::AddColumn {
                database,
                table,
                column,
            },
            Self::AlterColumn {
                database,
                table,
                column0,
                column1,
            } => Self::AlterColumn {
                database,
                table,
                column0: column1,
                column1: column0,
            },
            Self::CreateConstraint {
                database,
                table,
                constraint,
            } => Self::DropConstraint {
                database,
                table,
                constraint,
            },
            Self::DropConstraint {
                database,
                table,
                constraint,
            } => Self::CreateConstraint {
                database,
                table,
                constraint,
            },
            Self::CreateIndex {
                database,
                table,
                index,
            } => Self::DropIndex {
                database,
                table,
                index,
            },
            Self::DropIndex {
                database,
                table,
                index,
            } => Self::CreateIndex {
                database,
                table,
                index,
            },
        }
    }

    /// Display form used in logs and failure reports.
    pub fn describe(&self) -> String {
        let (name0, name1) = self.names();
        let target = match (self.table_name(), name0, name1) {
            (Some(table), Some(name0), Some(name1)) => format!("{table}.{name0}->{name1}"),
            (Some(table), Some(name0), None) => format!("{table}.{name0}"),
            (None, Some(name0), Some(name1)) => format!("{name0}->{name1}"),
            (None, Some(name0), None) => name0.to_string(),
            _ => String::new(),
        };
        format!("{}@{}({})", self.oper_name(), self.database(), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sooners_schema::model::{ColumnDef, TableDef};
    use sooners_schema::snapshot::PhysicalTable;
    use sooners_schema::types::ColumnType;
    use std::collections::BTreeSet;

    fn physical(name: &str) -> PhysicalTable {
        PhysicalTable {
            name: SmolStr::new(name),
            component: SmolStr::new("c"),
            def: TableDef::new(name),
            database_names: BTreeSet::from(["test0".to_string()]),
            shard: None,
        }
    }

    #[test]
    fn test_typeids_stable() {
        let create = Operation::CreateTable {
            database: "test0".to_string(),
            table: physical("t0"),
        };
        assert_eq!(create.typeid(), 1);
        assert_eq!(create.key(), (1, None, Some(SmolStr::new("t0")), None));

        let add = Operation::AddColumn {
            database: "test0".to_string(),
            table: SmolStr::new("t0"),
            column: ColumnDef::new("name", ColumnType::Integer),
        };
        assert_eq!(add.typeid(), 4);
        assert_eq!(
            add.key(),
            (
                4,
                Some(SmolStr::new("t0")),
                Some(SmolStr::new("name")),
                None
            )
        );
    }

    #[test]
    fn test_constraint_typeids() {
        let unique = ConstraintDef::Unique {
            name: SmolStr::new("uq"),
            columns: vec![SmolStr::new("a")],
        };
        let create = Operation::CreateConstraint {
            database: "test0".to_string(),
            table: SmolStr::new("t0"),
            constraint: unique.clone(),
        };
        assert_eq!(create.typeid(), 11);
        assert_eq!(create.inverse().typeid(), 12);
    }

    #[test]
    fn test_alter_column_noop() {
        let column = ColumnDef::new("a", ColumnType::Integer);
        let same = Operation::AlterColumn {
            database: "test0".to_string(),
            table: SmolStr::new("t0"),
            column0: column.clone(),
            column1: column.clone(),
        };
        assert!(same.is_noop());

        let renamed = Operation::AlterColumn {
            database: "test0".to_string(),
            table: SmolStr::new("t0"),
            column0: column.clone(),
            column1: ColumnDef::new("b", ColumnType::Integer),
        };
        assert!(!renamed.is_noop());
    }

    #[test]
    fn test_inverse_round_trip() {
        let op = Operation::RenameTable {
            database: "test0".to_string(),
            table0: physical("a"),
            table1: physical("b"),
        };
        assert_eq!(op.inverse().inverse(), op);
        assert_eq!(op.inverse().names().0, Some(SmolStr::new("b")));
    }

    #[test]
    fn test_describe() {
        let op = Operation::DropColumn {
            database: "test1".to_string(),
            table: SmolStr::new("t0"),
            column: ColumnDef::new("name", ColumnType::Integer),
        };
        assert_eq!(op.describe(), "drop_column@test1(t0.name)");
    }
}
