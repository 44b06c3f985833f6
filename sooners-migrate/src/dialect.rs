//! Dialect-specific DDL emission.
//!
//! This is the only place that knows SQLite from MySQL from PostgreSQL.
//! Each operation renders to a list of statements plus post-operation
//! statements (PostgreSQL drops orphaned enum types after a table or enum
//! column goes away). Execution happens elsewhere, through the abstract
//! executor.

use std::collections::BTreeSet;

use sooners_schema::model::{ColumnDef, ConstraintDef, IndexDef};
use sooners_schema::snapshot::PhysicalTable;
use sooners_schema::types::ColumnType;

use crate::operations::Operation;

/// The SQL dialects the adapter can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    MySql,
    Postgres,
}

impl SqlDialect {
    /// Parse a dialect name from configuration.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mysql" => Some(Self::MySql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Quote an identifier.
    fn quote(&self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{ident}`"),
            _ => format!("\"{ident}\""),
        }
    }

    /// The SQL type of a column type.
    pub fn sql_type(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Boolean { .. } => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime { timezone } => match self {
                Self::Postgres if *timezone => "TIMESTAMP WITH TIME ZONE".to_string(),
                Self::Postgres => "TIMESTAMP WITHOUT TIME ZONE".to_string(),
                Self::MySql => "DATETIME".to_string(),
                Self::Sqlite => "TIMESTAMP".to_string(),
            },
            ColumnType::Enum { enum_name, members } => match self {
                Self::Postgres => self.quote(enum_name),
                Self::MySql => {
                    let mut sorted: Vec<_> = members.iter().collect();
                    sorted.sort_by_key(|member| member.value);
                    let values: Vec<String> = sorted
                        .iter()
                        .map(|member| format!("'{}'", escape(&member.name)))
                        .collect();
                    format!("ENUM({})", values.join(", "))
                }
                Self::Sqlite => "TEXT".to_string(),
            },
            ColumnType::Float { .. } => match self {
                Self::Postgres => "DOUBLE PRECISION".to_string(),
                Self::MySql => "DOUBLE".to_string(),
                Self::Sqlite => "FLOAT".to_string(),
            },
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Interval { .. } => match self {
                Self::Postgres => "INTERVAL".to_string(),
                _ => "BIGINT".to_string(),
            },
            ColumnType::LargeBinary { .. } => match self {
                Self::Postgres => "BYTEA".to_string(),
                _ => "BLOB".to_string(),
            },
            ColumnType::Numeric {
                precision, scale, ..
            } => match (precision, scale) {
                (Some(precision), Some(scale)) => format!("NUMERIC({precision}, {scale})"),
                (Some(precision), None) => format!("NUMERIC({precision})"),
                _ => "NUMERIC".to_string(),
            },
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::String { length, .. } | ColumnType::Unicode { length } => {
                format!("VARCHAR({length})")
            }
            ColumnType::Text { .. } | ColumnType::UnicodeText { .. } => "TEXT".to_string(),
            ColumnType::Time { timezone } => match self {
                Self::Postgres if *timezone => "TIME WITH TIME ZONE".to_string(),
                _ => "TIME".to_string(),
            },
        }
    }

    fn default_literal(&self, column: &ColumnDef) -> Option<String> {
        let default = column.default.as_ref()?;
        if column.column_type.is_textual() {
            Some(format!("'{}'", escape(default)))
        } else {
            Some(default.clone())
        }
    }

    /// Full column clause for CREATE TABLE / ADD COLUMN.
    fn column_sql(&self, column: &ColumnDef) -> String {
        let mut parts = vec![
            self.quote(&column.name),
            self.sql_type(&column.column_type),
        ];
        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
        } else {
            if !column.nullable {
                parts.push("NOT NULL".to_string());
            }
            if column.unique {
                parts.push("UNIQUE".to_string());
            }
        }
        if let Some(literal) = self.default_literal(column) {
            parts.push(format!("DEFAULT {literal}"));
        }
        if let (Self::MySql, Some(comment)) = (self, &column.comment) {
            parts.push(format!("COMMENT '{}'", escape(comment)));
        }
        for foreign_key in &column.foreign_keys {
            let mut clause = format!(
                "REFERENCES {} ({})",
                self.quote(foreign_key.target_table()),
                self.quote(foreign_key.target_column())
            );
            if let Some(onupdate) = &foreign_key.onupdate {
                clause.push_str(&format!(" ON UPDATE {onupdate}"));
            }
            if let Some(ondelete) = &foreign_key.ondelete {
                clause.push_str(&format!(" ON DELETE {ondelete}"));
            }
            parts.push(clause);
        }
        parts.join(" ")
    }

    /// MySQL column body for MODIFY/CHANGE, restating the full definition.
    fn mysql_column_body(&self, column: &ColumnDef) -> String {
        let mut parts = vec![self.sql_type(&column.column_type)];
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(literal) = self.default_literal(column) {
            parts.push(format!("DEFAULT {literal}"));
        }
        if let Some(comment) = &column.comment {
            parts.push(format!("COMMENT '{}'", escape(comment)));
        }
        parts.join(" ")
    }

    fn constraint_sql(&self, constraint: &ConstraintDef) -> String {
        let body = match constraint {
            ConstraintDef::PrimaryKey { columns, .. } => {
                format!("PRIMARY KEY ({})", self.column_list(columns))
            }
            ConstraintDef::ForeignKey {
                columns,
                ref_table,
                ref_columns,
                onupdate,
                ondelete,
                ..
            } => {
                let mut clause = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.column_list(columns),
                    self.quote(ref_table),
                    self.column_list(ref_columns)
                );
                if let Some(onupdate) = onupdate {
                    clause.push_str(&format!(" ON UPDATE {onupdate}"));
                }
                if let Some(ondelete) = ondelete {
                    clause.push_str(&format!(" ON DELETE {ondelete}"));
                }
                clause
            }
            ConstraintDef::Unique { columns, .. } => {
                format!("UNIQUE ({})", self.column_list(columns))
            }
            ConstraintDef::Check { expression, .. } => format!("CHECK ({expression})"),
        };
        format!("CONSTRAINT {} {}", self.quote(constraint.name()), body)
    }

    fn column_list(&self, columns: &[smol_str::SmolStr]) -> String {
        columns
            .iter()
            .map(|column| self.quote(column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn create_index_sql(&self, table: &str, index: &IndexDef) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {unique}INDEX {} ON {} ({});",
            self.quote(&index.name),
            self.quote(table),
            self.column_list(&index.columns)
        )
    }

    fn drop_index_sql(&self, table: &str, index: &IndexDef) -> String {
        match self {
            Self::MySql => format!(
                "DROP INDEX {} ON {};",
                self.quote(&index.name),
                self.quote(table)
            ),
            _ => format!("DROP INDEX {};", self.quote(&index.name)),
        }
    }

    fn create_table_sql(&self, table: &PhysicalTable) -> Vec<String> {
        let mut statements = Vec::new();

        if *self == Self::Postgres {
            for enum_name in enum_types(table) {
                let members = table
                    .def
                    .columns
                    .iter()
                    .find_map(|column| match &column.column_type {
                        ColumnType::Enum {
                            enum_name: name,
                            members,
                        } if *name == enum_name => Some(members),
                        _ => None,
                    })
                    .cloned()
                    .unwrap_or_default();
                let mut sorted = members;
                sorted.sort_by_key(|member| member.value);
                let values: Vec<String> = sorted
                    .iter()
                    .map(|member| format!("'{}'", escape(&member.name)))
                    .collect();
                statements.push(format!(
                    "CREATE TYPE {} AS ENUM ({});",
                    self.quote(&enum_name),
                    values.join(", ")
                ));
            }
        }

        let mut clauses: Vec<String> = table
            .def
            .columns
            .iter()
            .map(|column| self.column_sql(column))
            .collect();
        let mut constraints: Vec<&ConstraintDef> = table.def.constraints.iter().collect();
        constraints.sort_by_key(|constraint| (constraint.type_priority(), constraint.name().clone()));
        for constraint in constraints {
            clauses.push(self.constraint_sql(constraint));
        }
        statements.push(format!(
            "CREATE TABLE {} (\n    {}\n);",
            self.quote(&table.name),
            clauses.join(",\n    ")
        ));

        for index in &table.def.indexes {
            statements.push(self.create_index_sql(&table.name, index));
        }
        statements
    }

    fn alter_column_sql(&self, table: &str, column0: &ColumnDef, column1: &ColumnDef) -> Vec<String> {
        let mut statements = Vec::new();
        let renamed = column0.name != column1.name;
        let type_changed = column0.column_type != column1.column_type;
        let nullable_changed = column0.nullable != column1.nullable;
        let default_changed = column0.default != column1.default;
        let comment_changed = column0.comment != column1.comment;

        match self {
            // SQLite can rename a column; type, nullability and default
            // changes have no direct ALTER form and emit nothing.
            Self::Sqlite => {
                if renamed {
                    statements.push(format!(
                        "ALTER TABLE {} RENAME COLUMN {} TO {};",
                        self.quote(table),
                        self.quote(&column0.name),
                        self.quote(&column1.name)
                    ));
                }
            }
            // MySQL restates the full definition; CHANGE renames, MODIFY
            // keeps the name.
            Self::MySql => {
                if renamed {
                    statements.push(format!(
                        "ALTER TABLE {} CHANGE COLUMN {} {} {};",
                        self.quote(table),
                        self.quote(&column0.name),
                        self.quote(&column1.name),
                        self.mysql_column_body(column1)
                    ));
                } else if type_changed || nullable_changed || default_changed || comment_changed {
                    statements.push(format!(
                        "ALTER TABLE {} MODIFY COLUMN {} {};",
                        self.quote(table),
                        self.quote(&column1.name),
                        self.mysql_column_body(column1)
                    ));
                }
            }
            Self::Postgres => {
                if renamed {
                    statements.push(format!(
                        "ALTER TABLE {} RENAME COLUMN {} TO {};",
                        self.quote(table),
                        self.quote(&column0.name),
                        self.quote(&column1.name)
                    ));
                }
                let name = self.quote(&column1.name);
                if type_changed {
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {};",
                        self.quote(table),
                        name,
                        self.sql_type(&column1.column_type)
                    ));
                }
                if nullable_changed {
                    let action = if column1.nullable {
                        "DROP NOT NULL"
                    } else {
                        "SET NOT NULL"
                    };
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} {};",
                        self.quote(table),
                        name,
                        action
                    ));
                }
                if default_changed {
                    match self.default_literal(column1) {
                        Some(literal) => statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                            self.quote(table),
                            name,
                            literal
                        )),
                        None => statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                            self.quote(table),
                            name
                        )),
                    }
                }
                if comment_changed {
                    let comment = match &column1.comment {
                        Some(comment) => format!("'{}'", escape(comment)),
                        None => "NULL".to_string(),
                    };
                    statements.push(format!(
                        "COMMENT ON COLUMN {}.{} IS {};",
                        self.quote(table),
                        name,
                        comment
                    ));
                }
            }
        }
        statements
    }

    /// Render an operation to its DDL statements.
    pub fn render(&self, operation: &Operation) -> Vec<String> {
        match operation {
            Operation::CreateTable { table, .. } => self.create_table_sql(table),
            Operation::RenameTable { table0, table1, .. } => match self {
                Self::MySql => vec![format!(
                    "RENAME TABLE {} TO {};",
                    self.quote(&table0.name),
                    self.quote(&table1.name)
                )],
                _ => vec![format!(
                    "ALTER TABLE {} RENAME TO {};",
                    self.quote(&table0.name),
                    self.quote(&table1.name)
                )],
            },
            Operation::DropTable { table, .. } => {
                vec![format!("DROP TABLE {};", self.quote(&table.name))]
            }
            Operation::AddColumn { table, column, .. } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {};",
                self.quote(table),
                self.column_sql(column)
            )],
            Operation::AlterColumn {
                table,
                column0,
                column1,
                ..
            } => self.alter_column_sql(table, column0, column1),
            Operation::DropColumn { table, column, .. } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {};",
                self.quote(table),
                self.quote(&column.name)
            )],
            Operation::CreateConstraint {
                table, constraint, ..
            } => match self {
                // SQLite cannot add constraints after table creation.
                Self::Sqlite => Vec::new(),
                _ => vec![format!(
                    "ALTER TABLE {} ADD {};",
                    self.quote(table),
                    self.constraint_sql(constraint)
                )],
            },
            Operation::DropConstraint {
                table, constraint, ..
            } => match self {
                Self::Sqlite => Vec::new(),
                Self::MySql => {
                    let clause = match constraint {
                        ConstraintDef::PrimaryKey { .. } => "DROP PRIMARY KEY".to_string(),
                        ConstraintDef::ForeignKey { name, .. } => {
                            format!("DROP FOREIGN KEY {}", self.quote(name))
                        }
                        ConstraintDef::Unique { name, .. } => {
                            format!("DROP INDEX {}", self.quote(name))
                        }
                        ConstraintDef::Check { name, .. } => {
                            format!("DROP CHECK {}", self.quote(name))
                        }
                    };
                    vec![format!("ALTER TABLE {} {};", self.quote(table), clause)]
                }
                Self::Postgres => vec![format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    self.quote(table),
                    self.quote(constraint.name())
                )],
            },
            Operation::CreateIndex { table, index, .. } => {
                vec![self.create_index_sql(table, index)]
            }
            Operation::DropIndex { table, index, .. } => {
                vec![self.drop_index_sql(table, index)]
            }
        }
    }

    /// Post-operation statements. PostgreSQL drops enum types orphaned by a
    /// dropped table or enum column.
    pub fn post_statements(&self, operation: &Operation) -> Vec<String> {
        if *self != Self::Postgres {
            return Vec::new();
        }
        match operation {
            Operation::DropTable { table, .. } => enum_types(table)
                .into_iter()
                .map(|enum_name| format!("DROP TYPE IF EXISTS {};", self.quote(&enum_name)))
                .collect(),
            Operation::DropColumn { column, .. } => column
                .column_type
                .enum_name()
                .map(|enum_name| vec![format!("DROP TYPE IF EXISTS {};", self.quote(enum_name))])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

fn enum_types(table: &PhysicalTable) -> BTreeSet<smol_str::SmolStr> {
    table
        .def
        .columns
        .iter()
        .filter_map(|column| column.column_type.enum_name().cloned())
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;
    use sooners_schema::model::TableDef;
    use sooners_schema::types::EnumMember;
    use std::collections::BTreeSet as Set;

    fn physical(def: TableDef) -> PhysicalTable {
        PhysicalTable {
            name: def.name.clone(),
            component: SmolStr::new("c"),
            def,
            database_names: Set::from(["test0".to_string()]),
            shard: None,
        }
    }

    fn t0() -> PhysicalTable {
        physical(
            TableDef::new("t0")
                .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                .column(
                    ColumnDef::new(
                        "name",
                        ColumnType::String {
                            length: 32,
                            collation: None,
                        },
                    )
                    .not_null(),
                )
                .index(IndexDef::new("t0_name_idx", vec![SmolStr::new("name")])),
        )
    }

    #[test]
    fn test_create_table_sqlite() {
        let op = Operation::CreateTable {
            database: "test0".to_string(),
            table: t0(),
        };
        let statements = SqlDialect::Sqlite.render(&op);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE \"t0\""));
        assert!(statements[0].contains("\"id\" INTEGER PRIMARY KEY"));
        assert!(statements[0].contains("\"name\" VARCHAR(32) NOT NULL"));
        assert!(statements[1].starts_with("CREATE INDEX \"t0_name_idx\""));
    }

    #[test]
    fn test_create_table_postgres_enum() {
        let table = physical(TableDef::new("jobs").column(ColumnDef::new(
            "state",
            ColumnType::Enum {
                enum_name: SmolStr::new("job_state"),
                members: vec![
                    EnumMember {
                        name: SmolStr::new("done"),
                        value: 1,
                    },
                    EnumMember {
                        name: SmolStr::new("new"),
                        value: 0,
                    },
                ],
            },
        )));
        let op = Operation::CreateTable {
            database: "test0".to_string(),
            table,
        };
        let statements = SqlDialect::Postgres.render(&op);
        assert_eq!(
            statements[0],
            "CREATE TYPE \"job_state\" AS ENUM ('new', 'done');"
        );
        assert!(statements[1].contains("\"state\" \"job_state\""));
    }

    #[test]
    fn test_drop_table_postgres_drops_enum_type() {
        let table = physical(TableDef::new("jobs").column(ColumnDef::new(
            "state",
            ColumnType::Enum {
                enum_name: SmolStr::new("job_state"),
                members: vec![],
            },
        )));
        let op = Operation::DropTable {
            database: "test0".to_string(),
            table,
        };
        assert_eq!(
            SqlDialect::Postgres.post_statements(&op),
            vec!["DROP TYPE IF EXISTS \"job_state\";".to_string()]
        );
        assert!(SqlDialect::Sqlite.post_statements(&op).is_empty());
    }

    #[test]
    fn test_alter_column_rename_per_dialect() {
        let column0 = ColumnDef::new("b", ColumnType::Integer);
        let column1 = ColumnDef::new("c", ColumnType::Integer);
        let op = Operation::AlterColumn {
            database: "test0".to_string(),
            table: SmolStr::new("t0"),
            column0,
            column1,
        };
        let sqlite = SqlDialect::Sqlite.render(&op);
        assert_eq!(
            sqlite,
            vec!["ALTER TABLE \"t0\" RENAME COLUMN \"b\" TO \"c\";".to_string()]
        );
        let mysql = SqlDialect::MySql.render(&op);
        assert_eq!(
            mysql,
            vec!["ALTER TABLE `t0` CHANGE COLUMN `b` `c` INTEGER;".to_string()]
        );
        let postgres = SqlDialect::Postgres.render(&op);
        assert_eq!(
            postgres,
            vec!["ALTER TABLE \"t0\" RENAME COLUMN \"b\" TO \"c\";".to_string()]
        );
    }

    #[test]
    fn test_alter_column_nullability() {
        let column0 = ColumnDef::new("n", ColumnType::Integer);
        let column1 = ColumnDef::new("n", ColumnType::Integer).not_null();
        let op = Operation::AlterColumn {
            database: "test0".to_string(),
            table: SmolStr::new("t0"),
            column0,
            column1,
        };
        // MySQL restates the whole definition.
        assert_eq!(
            SqlDialect::MySql.render(&op),
            vec!["ALTER TABLE `t0` MODIFY COLUMN `n` INTEGER NOT NULL;".to_string()]
        );
        assert_eq!(
            SqlDialect::Postgres.render(&op),
            vec!["ALTER TABLE \"t0\" ALTER COLUMN \"n\" SET NOT NULL;".to_string()]
        );
        // SQLite has no direct form.
        assert!(SqlDialect::Sqlite.render(&op).is_empty());
    }

    #[test]
    fn test_default_quoting() {
        let column = ColumnDef::new(
            "label",
            ColumnType::String {
                length: 8,
                collation: None,
            },
        )
        .default_value("it's");
        let op = Operation::AddColumn {
            database: "test0".to_string(),
            table: SmolStr::new("t0"),
            column,
        };
        let statements = SqlDialect::Postgres.render(&op);
        assert!(statements[0].contains("DEFAULT 'it''s'"));
    }

    #[test]
    fn test_drop_constraint_mysql_forms() {
        for (constraint, expected) in [
            (
                ConstraintDef::PrimaryKey {
                    name: SmolStr::new("pk"),
                    columns: vec![SmolStr::new("a")],
                },
                "ALTER TABLE `t0` DROP PRIMARY KEY;",
            ),
            (
                ConstraintDef::Unique {
                    name: SmolStr::new("uq"),
                    columns: vec![SmolStr::new("a")],
                },
                "ALTER TABLE `t0` DROP INDEX `uq`;",
            ),
        ] {
            let op = Operation::DropConstraint {
                database: "test0".to_string(),
                table: SmolStr::new("t0"),
                constraint,
            };
            assert_eq!(SqlDialect::MySql.render(&op), vec![expected.to_string()]);
        }
    }

    #[test]
    fn test_foreign_key_inline() {
        let column = ColumnDef::new("owner_id", ColumnType::Integer).foreign_key(
            sooners_schema::model::ForeignKeyRef::new("owner.id").ondelete("CASCADE"),
        );
        let table = physical(TableDef::new("pets").column(column));
        let op = Operation::CreateTable {
            database: "test0".to_string(),
            table,
        };
        let statements = SqlDialect::Sqlite.render(&op);
        assert!(statements[0].contains("REFERENCES \"owner\" (\"id\") ON DELETE CASCADE"));
    }
}
