//! The engine's own persisted state.
//!
//! Three tables: `sooners_configuration` (schema params text, sliced into
//! 64-character parts), `sooners_dbschema_version` (before/after version
//! pair per component) and `sooners_dbschema_operation` (the append-only
//! applied-operation log, present on every database). The first two live on
//! the default database only.
//!
//! Early in a first migration none of these tables exist yet; every access
//! degrades gracefully and the in-memory state is written back once the
//! plan itself has created the storage.

use indexmap::IndexMap;
use smol_str::SmolStr;

use sooners_schema::model::{ColumnDef, TableDef};
use sooners_schema::snapshot::ComponentVersion;
use sooners_schema::types::{ColumnType, EnumMember};
use sooners_schema::version::CHECKSUM_LEN;

use crate::error::MigrateResult;
use crate::operations::{Operation, OperationKey};
use crate::store::DatabaseSession;

/// Maximum characters per configuration part row.
pub const MAX_CONFIGURATION_PART: usize = 64;
/// Maximum component name length.
pub const MAX_COMPONENT_NAME: usize = 64;
/// Maximum table name length in the operation log.
pub const MAX_TABLE_NAME: usize = 64;
/// Maximum operated-entity name length in the operation log.
pub const MAX_OPERATED_NAME: usize = 64;
/// Maximum shard suffix length.
pub const MAX_SHARD_SUFFIX: usize = 32;

/// Configuration table name.
pub const CONFIGURATION_TABLE: &str = "sooners_configuration";
/// Version table name.
pub const VERSION_TABLE: &str = "sooners_dbschema_version";
/// Operation log table name.
pub const OPERATION_TABLE: &str = "sooners_dbschema_operation";
/// Shard weight table name.
pub const SHARD_WEIGHT_TABLE: &str = "sooners_shard_weight";

/// The tables whose drops must be deferred past accounting.
pub const BOOKKEEPING_TABLES: [&str; 3] = [CONFIGURATION_TABLE, VERSION_TABLE, OPERATION_TABLE];

/// The two well-known configuration slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfType {
    /// Params the databases currently reflect.
    SchemaParams0 = 0,
    /// Target params.
    SchemaParams1 = 1,
}

impl ConfType {
    /// The enum member name stored in the `conf_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaParams0 => "SCHEMA_PARAMS_0",
            Self::SchemaParams1 => "SCHEMA_PARAMS_1",
        }
    }
}

/// Load a configuration text, reassembled from its parts. `None` when the
/// table does not exist yet or holds no parts for this type.
pub fn load_configuration(
    session: &mut dyn DatabaseSession,
    conf_type: ConfType,
) -> MigrateResult<Option<String>> {
    if !session.has_table(CONFIGURATION_TABLE)? {
        return Ok(None);
    }
    let mut parts = session.load_configuration_parts(conf_type)?;
    if parts.is_empty() {
        return Ok(None);
    }
    parts.sort_by_key(|(order, _)| *order);
    Ok(Some(
        parts.into_iter().map(|(_, part)| part).collect::<String>(),
    ))
}

/// Save a configuration text, slicing it into parts: rows in range update
/// in place, rows beyond the new length are deleted, missing rows are
/// inserted. Returns `false` (and preserves nothing on disk) while the
/// table does not exist.
pub fn save_configuration(
    session: &mut dyn DatabaseSession,
    conf_type: ConfType,
    text: Option<&str>,
) -> MigrateResult<bool> {
    if !session.has_table(CONFIGURATION_TABLE)? {
        return Ok(false);
    }
    let text = text.unwrap_or_default();
    let chars: Vec<char> = text.chars().collect();
    let mut order = 0u32;
    for chunk in chars.chunks(MAX_CONFIGURATION_PART) {
        let part: String = chunk.iter().collect();
        session.upsert_configuration_part(conf_type, order, &part)?;
        order += 1;
    }
    session.delete_configuration_parts_from(conf_type, order)?;
    Ok(true)
}

/// One component's before/after version bookkeeping row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    /// Component name (primary key).
    pub component_name: SmolStr,
    /// Component position at version0.
    pub index0: u32,
    /// Version the databases currently reflect.
    pub version0: Option<u32>,
    /// Checksum at version0.
    pub checksum0: Option<String>,
    /// Component position at version1.
    pub index1: u32,
    /// Target version.
    pub version1: Option<u32>,
    /// Checksum at version1.
    pub checksum1: Option<String>,
}

impl VersionRecord {
    /// A transient row for a component with no persisted state yet.
    pub fn new(component_name: impl Into<SmolStr>) -> Self {
        Self {
            component_name: component_name.into(),
            index0: 0,
            version0: None,
            checksum0: None,
            index1: 0,
            version1: None,
            checksum1: None,
        }
    }

    /// Before and after sides agree.
    pub fn is_same(&self) -> bool {
        self.version0 == self.version1 && self.checksum0 == self.checksum1
    }

    /// Both sides are present and disagree: a patch document is required.
    pub fn need_patch(&self) -> bool {
        self.version0.is_some() && self.version1.is_some() && !self.is_same()
    }

    /// Pin the before side to a component version.
    pub fn save0(&mut self, index: u32, component: &ComponentVersion) {
        self.index0 = index;
        self.version0 = Some(component.version);
        self.checksum0 = Some(component.checksum.clone());
    }

    /// Clear the before side.
    pub fn save0_none(&mut self) {
        self.index0 = 0;
        self.version0 = None;
        self.checksum0 = None;
    }

    /// Pin the after side to a component version.
    pub fn save1(&mut self, index: u32, component: &ComponentVersion) {
        self.index1 = index;
        self.version1 = Some(component.version);
        self.checksum1 = Some(component.checksum.clone());
    }

    /// Clear the after side.
    pub fn save1_none(&mut self) {
        self.index1 = 0;
        self.version1 = None;
        self.checksum1 = None;
    }

    /// Promote the after side into the before side.
    pub fn promote(&mut self) {
        self.index0 = self.index1;
        self.version0 = self.version1;
        self.checksum0 = self.checksum1.clone();
    }
}

/// The version rows keyed by component, auto-materializing transient rows
/// for absent names.
#[derive(Debug, Default)]
pub struct VersionRecords {
    records: IndexMap<SmolStr, VersionRecord>,
}

impl VersionRecords {
    /// Load all rows from the default database. Empty when the table does
    /// not exist yet.
    pub fn load(session: &mut dyn DatabaseSession) -> MigrateResult<Self> {
        let mut records = IndexMap::new();
        if session.has_table(VERSION_TABLE)? {
            for record in session.load_version_rows()? {
                records.insert(record.component_name.clone(), record);
            }
        }
        Ok(Self { records })
    }

    /// Write every row back. Returns `false` while the table does not
    /// exist; the caller re-saves after the table is created.
    pub fn save(&self, session: &mut dyn DatabaseSession) -> MigrateResult<bool> {
        if !session.has_table(VERSION_TABLE)? {
            return Ok(false);
        }
        for record in self.records.values() {
            session.upsert_version_row(record)?;
        }
        Ok(true)
    }

    /// The row of a component, materializing a transient one when absent.
    pub fn entry(&mut self, component: &str) -> &mut VersionRecord {
        self.records
            .entry(SmolStr::new(component))
            .or_insert_with(|| VersionRecord::new(component))
    }

    /// Look up a row without materializing.
    pub fn get(&self, component: &str) -> Option<&VersionRecord> {
        self.records.get(component)
    }

    /// Iterate rows.
    pub fn iter(&self) -> impl Iterator<Item = &VersionRecord> {
        self.records.values()
    }

    /// Iterate rows mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VersionRecord> {
        self.records.values_mut()
    }

    /// Component names sorted by one of the index columns.
    pub fn names_by<F>(&self, key: F) -> Vec<SmolStr>
    where
        F: Fn(&VersionRecord) -> u32,
    {
        let mut rows: Vec<&VersionRecord> = self.records.values().collect();
        rows.sort_by_key(|record| key(record));
        rows.iter().map(|record| record.component_name.clone()).collect()
    }
}

/// One applied-operation log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    /// Owning component.
    pub component_name: SmolStr,
    /// Operation typeid.
    pub typeid: u8,
    /// Enclosing table for column/constraint/index operations.
    pub table: Option<SmolStr>,
    /// First operated name.
    pub name0: Option<SmolStr>,
    /// Second operated name (renames, alters).
    pub name1: Option<SmolStr>,
}

impl OperationRecord {
    /// The log row of an operation.
    pub fn from_operation(component: &str, operation: &Operation) -> Self {
        let (name0, name1) = operation.names();
        Self {
            component_name: SmolStr::new(component),
            typeid: operation.typeid(),
            table: operation.table_name().cloned(),
            name0,
            name1,
        }
    }

    /// The key this row stands for.
    pub fn key(&self) -> OperationKey {
        (
            self.typeid,
            self.table.clone(),
            self.name0.clone(),
            self.name1.clone(),
        )
    }
}

/// The bookkeeping tables as table declarations of the core component.
/// They migrate like any other tables; their drops are deferred past
/// accounting.
pub fn core_models() -> Vec<TableDef> {
    let conf_type = ColumnType::Enum {
        enum_name: SmolStr::new("sooners_conf_type"),
        members: vec![
            EnumMember {
                name: SmolStr::new("SCHEMA_PARAMS_0"),
                value: 0,
            },
            EnumMember {
                name: SmolStr::new("SCHEMA_PARAMS_1"),
                value: 1,
            },
        ],
    };
    vec![
        TableDef::new(CONFIGURATION_TABLE)
            .priority("sooners.0001")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .column(ColumnDef::new("conf_type", conf_type).not_null())
            .column(ColumnDef::new("conf_part_order", ColumnType::Integer).not_null())
            .column(
                ColumnDef::new(
                    "conf_part",
                    ColumnType::String {
                        length: MAX_CONFIGURATION_PART as u32,
                        collation: None,
                    },
                )
                .not_null(),
            ),
        TableDef::new(VERSION_TABLE)
            .priority("sooners.0002")
            .column(
                ColumnDef::new(
                    "component_name",
                    ColumnType::String {
                        length: MAX_COMPONENT_NAME as u32,
                        collation: None,
                    },
                )
                .primary_key(),
            )
            .column(
                ColumnDef::new("index0", ColumnType::Integer)
                    .not_null()
                    .default_value("0"),
            )
            .column(ColumnDef::new("version0", ColumnType::Integer))
            .column(ColumnDef::new(
                "checksum0",
                ColumnType::String {
                    length: CHECKSUM_LEN as u32,
                    collation: None,
                },
            ))
            .column(
                ColumnDef::new("index1", ColumnType::Integer)
                    .not_null()
                    .default_value("0"),
            )
            .column(ColumnDef::new("version1", ColumnType::Integer))
            .column(ColumnDef::new(
                "checksum1",
                ColumnType::String {
                    length: CHECKSUM_LEN as u32,
                    collation: None,
                },
            )),
        TableDef::new(OPERATION_TABLE)
            .priority("sooners.0003")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .column(
                ColumnDef::new(
                    "component_name",
                    ColumnType::String {
                        length: MAX_COMPONENT_NAME as u32,
                        collation: None,
                    },
                )
                .not_null(),
            )
            .column(ColumnDef::new("typeid", ColumnType::Integer).not_null())
            .column(ColumnDef::new(
                "table",
                ColumnType::String {
                    length: MAX_TABLE_NAME as u32,
                    collation: None,
                },
            ))
            .column(ColumnDef::new(
                "name0",
                ColumnType::String {
                    length: MAX_OPERATED_NAME as u32,
                    collation: None,
                },
            ))
            .column(ColumnDef::new(
                "name1",
                ColumnType::String {
                    length: MAX_OPERATED_NAME as u32,
                    collation: None,
                },
            )),
        TableDef::new(SHARD_WEIGHT_TABLE)
            .priority("sooners.0004")
            .column(
                ColumnDef::new(
                    "name",
                    ColumnType::String {
                        length: MAX_OPERATED_NAME as u32,
                        collation: None,
                    },
                )
                .not_null(),
            )
            .column(
                ColumnDef::new(
                    "suffix",
                    ColumnType::String {
                        length: MAX_SHARD_SUFFIX as u32,
                        collation: None,
                    },
                )
                .not_null(),
            )
            .column(ColumnDef::new("count", ColumnType::BigInteger).not_null())
            .constraint(sooners_schema::model::ConstraintDef::PrimaryKey {
                name: SmolStr::new("shard_weight_pk"),
                columns: vec![SmolStr::new("name"), SmolStr::new("suffix")],
            }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_record_same_and_patch() {
        let mut record = VersionRecord::new("core");
        assert!(record.is_same());
        assert!(!record.need_patch());

        record.version1 = Some(2);
        record.checksum1 = Some("x".to_string());
        assert!(!record.is_same());
        // version0 is still absent, so no patch applies.
        assert!(!record.need_patch());

        record.version0 = Some(1);
        record.checksum0 = Some("y".to_string());
        assert!(record.need_patch());

        record.promote();
        assert!(record.is_same());
    }

    #[test]
    fn test_records_materialize_transient_rows() {
        let mut records = VersionRecords::default();
        assert!(records.get("fresh").is_none());
        records.entry("fresh").index1 = 3;
        assert_eq!(records.get("fresh").unwrap().index1, 3);
    }

    #[test]
    fn test_names_by_index_order() {
        let mut records = VersionRecords::default();
        records.entry("b").index1 = 1;
        records.entry("a").index1 = 0;
        assert_eq!(
            records.names_by(|record| record.index1),
            vec![SmolStr::new("a"), SmolStr::new("b")]
        );
    }

    #[test]
    fn test_core_models_priorities() {
        let models = core_models();
        let priorities: Vec<&str> = models
            .iter()
            .map(|table| table.priority.as_deref().unwrap())
            .collect();
        assert_eq!(
            priorities,
            [
                "sooners.0001",
                "sooners.0002",
                "sooners.0003",
                "sooners.0004"
            ]
        );
        assert!(
            models
                .iter()
                .any(|table| table.name == OPERATION_TABLE)
        );
    }
}
