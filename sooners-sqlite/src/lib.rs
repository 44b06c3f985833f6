//! # sooners-sqlite
//!
//! SQLite implementation of the migration engine's three database
//! capabilities: schema introspection, DDL execution and bookkeeping row
//! access, all on one [`rusqlite`] connection per database.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use smol_str::SmolStr;

use sooners_migrate::bookkeeping::{
    CONFIGURATION_TABLE, ConfType, OPERATION_TABLE, OperationRecord, VERSION_TABLE, VersionRecord,
};
use sooners_migrate::error::{MigrateResult, MigrationError};
use sooners_migrate::store::{OperationExecutor, SchemaIntrospector, SessionStore};

fn db_err(err: rusqlite::Error) -> MigrationError {
    MigrationError::database(err.to_string())
}

/// One open SQLite database session.
pub struct SqliteSession {
    conn: Connection,
}

impl SqliteSession {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        Ok(Self { conn })
    }

    /// Open a fresh in-memory database.
    pub fn open_in_memory() -> MigrateResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Ok(Self { conn })
    }

    /// Raw connection access, for callers that need to query application
    /// tables.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SchemaIntrospector for SqliteSession {
    fn has_table(&mut self, table: &str) -> MigrateResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }
}

impl OperationExecutor for SqliteSession {
    fn execute_ddl(&mut self, statement: &str) -> MigrateResult<()> {
        self.conn.execute_batch(statement).map_err(db_err)
    }
}

impl SessionStore for SqliteSession {
    fn commit(&mut self) -> MigrateResult<()> {
        // The connection runs in autocommit mode; every row write above
        // has already landed.
        Ok(())
    }

    fn load_operations(&mut self, component: &str) -> MigrateResult<Vec<OperationRecord>> {
        let mut statement = self
            .conn
            .prepare(&format!(
                "SELECT component_name, typeid, \"table\", name0, name1 \
                 FROM {OPERATION_TABLE} WHERE component_name = ?1 ORDER BY id"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![component], |row| {
                Ok(OperationRecord {
                    component_name: SmolStr::new(row.get::<_, String>(0)?),
                    typeid: row.get::<_, i64>(1)? as u8,
                    table: row.get::<_, Option<String>>(2)?.map(SmolStr::new),
                    name0: row.get::<_, Option<String>>(3)?.map(SmolStr::new),
                    name1: row.get::<_, Option<String>>(4)?.map(SmolStr::new),
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn insert_operation(&mut self, record: &OperationRecord) -> MigrateResult<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {OPERATION_TABLE} \
                     (component_name, typeid, \"table\", name0, name1) \
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    record.component_name.as_str(),
                    record.typeid as i64,
                    record.table.as_deref(),
                    record.name0.as_deref(),
                    record.name1.as_deref(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn delete_operation(&mut self, record: &OperationRecord) -> MigrateResult<()> {
        self.conn
            .execute(
                &format!(
                    "DELETE FROM {OPERATION_TABLE} \
                     WHERE component_name = ?1 AND typeid = ?2 \
                     AND \"table\" IS ?3 AND name0 IS ?4 AND name1 IS ?5"
                ),
                params![
                    record.component_name.as_str(),
                    record.typeid as i64,
                    record.table.as_deref(),
                    record.name0.as_deref(),
                    record.name1.as_deref(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn clear_operations(&mut self, component: &str) -> MigrateResult<()> {
        self.conn
            .execute(
                &format!("DELETE FROM {OPERATION_TABLE} WHERE component_name = ?1"),
                params![component],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn load_configuration_parts(
        &mut self,
        conf_type: ConfType,
    ) -> MigrateResult<Vec<(u32, String)>> {
        let mut statement = self
            .conn
            .prepare(&format!(
                "SELECT conf_part_order, conf_part FROM {CONFIGURATION_TABLE} \
                 WHERE conf_type = ?1 ORDER BY conf_part_order"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![conf_type.as_str()], |row| {
                Ok((row.get::<_, i64>(0)? as u32, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn upsert_configuration_part(
        &mut self,
        conf_type: ConfType,
        order: u32,
        part: &str,
    ) -> MigrateResult<()> {
        let updated = self
            .conn
            .execute(
                &format!(
                    "UPDATE {CONFIGURATION_TABLE} SET conf_part = ?3 \
                     WHERE conf_type = ?1 AND conf_part_order = ?2"
                ),
                params![conf_type.as_str(), order as i64, part],
            )
            .map_err(db_err)?;
        if updated == 0 {
            self.conn
                .execute(
                    &format!(
                        "INSERT INTO {CONFIGURATION_TABLE} \
                         (conf_type, conf_part_order, conf_part) VALUES (?1, ?2, ?3)"
                    ),
                    params![conf_type.as_str(), order as i64, part],
                )
                .map_err(db_err)?;
        }
        Ok(())
    }

    fn delete_configuration_parts_from(
        &mut self,
        conf_type: ConfType,
        order: u32,
    ) -> MigrateResult<()> {
        self.conn
            .execute(
                &format!(
                    "DELETE FROM {CONFIGURATION_TABLE} \
                     WHERE conf_type = ?1 AND conf_part_order >= ?2"
                ),
                params![conf_type.as_str(), order as i64],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn load_version_rows(&mut self) -> MigrateResult<Vec<VersionRecord>> {
        let mut statement = self
            .conn
            .prepare(&format!(
                "SELECT component_name, index0, version0, checksum0, \
                 index1, version1, checksum1 FROM {VERSION_TABLE}"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map([], |row| {
                Ok(VersionRecord {
                    component_name: SmolStr::new(row.get::<_, String>(0)?),
                    index0: row.get::<_, i64>(1)? as u32,
                    version0: row.get::<_, Option<i64>>(2)?.map(|version| version as u32),
                    checksum0: row.get(3)?,
                    index1: row.get::<_, i64>(4)? as u32,
                    version1: row.get::<_, Option<i64>>(5)?.map(|version| version as u32),
                    checksum1: row.get(6)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn upsert_version_row(&mut self, record: &VersionRecord) -> MigrateResult<()> {
        let updated = self
            .conn
            .execute(
                &format!(
                    "UPDATE {VERSION_TABLE} SET index0 = ?2, version0 = ?3, checksum0 = ?4, \
                     index1 = ?5, version1 = ?6, checksum1 = ?7 WHERE component_name = ?1"
                ),
                params![
                    record.component_name.as_str(),
                    record.index0 as i64,
                    record.version0.map(|version| version as i64),
                    record.checksum0.as_deref(),
                    record.index1 as i64,
                    record.version1.map(|version| version as i64),
                    record.checksum1.as_deref(),
                ],
            )
            .map_err(db_err)?;
        if updated == 0 {
            self.conn
                .execute(
                    &format!(
                        "INSERT INTO {VERSION_TABLE} \
                         (component_name, index0, version0, checksum0, \
                          index1, version1, checksum1) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                    ),
                    params![
                        record.component_name.as_str(),
                        record.index0 as i64,
                        record.version0.map(|version| version as i64),
                        record.checksum0.as_deref(),
                        record.index1 as i64,
                        record.version1.map(|version| version as i64),
                        record.checksum1.as_deref(),
                    ],
                )
                .map_err(db_err)?;
        }
        Ok(())
    }
}
