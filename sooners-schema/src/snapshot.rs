//! Materialized schema snapshots.
//!
//! A snapshot binds a set of component version documents to deployment
//! params, expanding every logical table into its physical entity tables:
//! plain tables keep their name and carry a set of databases; sharded
//! tables expand to one entity per `(database, suffix)` map entry, each
//! living on exactly one database.

use std::collections::BTreeSet;
use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::params::SchemaParams;
use crate::version::VersionDocument;

/// Shard identity of a physical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    /// Logical shard table name.
    pub shard_name: SmolStr,
    /// Suffix of this entity.
    pub suffix: SmolStr,
}

/// One physical table of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalTable {
    /// Physical name (`{logical}_{suffix}` for shard entities).
    pub name: SmolStr,
    /// Owning component.
    pub component: SmolStr,
    /// The logical declaration this entity was expanded from.
    pub def: crate::model::TableDef,
    /// Databases carrying this table. Shard entities have exactly one.
    pub database_names: BTreeSet<String>,
    /// Shard identity, when expanded from a sharded declaration.
    pub shard: Option<ShardInfo>,
}

impl PhysicalTable {
    /// The single database of a shard entity.
    pub fn single_database(&self) -> SchemaResult<&str> {
        let mut names = self.database_names.iter();
        match (names.next(), names.next()) {
            (Some(name), None) => Ok(name.as_str()),
            _ => Err(SchemaError::params(format!(
                "table '{}' must live on exactly one database",
                self.name
            ))),
        }
    }
}

/// One component's pinned version inside a snapshot.
#[derive(Debug, Clone)]
pub struct ComponentVersion {
    /// Component name.
    pub name: SmolStr,
    /// Pinned version number.
    pub version: u32,
    /// Document checksum.
    pub checksum: String,
    /// The parsed document.
    pub document: Rc<VersionDocument>,
}

/// A set of component versions materialized against deployment params.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    /// The database bookkeeping lives on; also the params fallback.
    pub default_database: String,
    /// Deployment params for every table.
    pub params: SchemaParams,
    /// Components in index order.
    pub components: IndexMap<SmolStr, ComponentVersion>,
    /// Physical tables keyed by physical name, in expansion order.
    pub tables: IndexMap<SmolStr, PhysicalTable>,
}

impl SchemaSnapshot {
    /// An empty snapshot.
    pub fn new(default_database: impl Into<String>, params: SchemaParams) -> Self {
        Self {
            default_database: default_database.into(),
            params,
            components: IndexMap::new(),
            tables: IndexMap::new(),
        }
    }

    /// Add a component document, expanding its tables. Components must be
    /// added in index order.
    pub fn add_component(&mut self, document: Rc<VersionDocument>) -> SchemaResult<()> {
        let component = document.component.clone();
        for table in &document.tables {
            if !table.sharded {
                let database_names = self
                    .params
                    .plain_databases(&table.name, &self.default_database)?;
                self.insert_table(PhysicalTable {
                    name: table.name.clone(),
                    component: component.clone(),
                    def: table.clone(),
                    database_names,
                    shard: None,
                })?;
                continue;
            }

            let shard_map = self.params.shard_map(&table.name)?;
            let mut pairs: Vec<(String, SmolStr)> = Vec::new();
            for (database, suffixes) in shard_map {
                for suffix in suffixes {
                    pairs.push((database.clone(), SmolStr::new(suffix)));
                }
            }
            // Expansion order is ascending (database, suffix); every suffix
            // maps to exactly one database.
            pairs.sort();
            let mut seen = BTreeSet::new();
            for (database, suffix) in &pairs {
                if !seen.insert(suffix.clone()) {
                    return Err(SchemaError::params(format!(
                        "shard table '{}' maps suffix '{}' to more than one database",
                        table.name, suffix
                    )));
                }
                self.insert_table(PhysicalTable {
                    name: SmolStr::new(format!("{}_{}", table.name, suffix)),
                    component: component.clone(),
                    def: table.clone(),
                    database_names: BTreeSet::from([database.clone()]),
                    shard: Some(ShardInfo {
                        shard_name: table.name.clone(),
                        suffix: suffix.clone(),
                    }),
                })?;
            }
        }
        self.components.insert(
            component.clone(),
            ComponentVersion {
                name: component,
                version: document.version,
                checksum: document.checksum.clone(),
                document,
            },
        );
        Ok(())
    }

    fn insert_table(&mut self, table: PhysicalTable) -> SchemaResult<()> {
        if self.tables.contains_key(&table.name) {
            return Err(SchemaError::params(format!(
                "duplicate physical table '{}'",
                table.name
            )));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Look up a physical table.
    pub fn table(&self, name: &str) -> Option<&PhysicalTable> {
        self.tables.get(name)
    }

    /// A component's physical tables in expansion (creation) order.
    pub fn component_tables(&self, component: &str) -> Vec<&PhysicalTable> {
        self.tables
            .values()
            .filter(|table| table.component == component)
            .collect()
    }

    /// The entity tables of a shard, ascending `(database, suffix)`.
    pub fn shard_tables(&self, shard_name: &str) -> Vec<&PhysicalTable> {
        self.tables
            .values()
            .filter(|table| {
                table
                    .shard
                    .as_ref()
                    .is_some_and(|shard| shard.shard_name == shard_name)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, TableDef};
    use crate::params::TableParams;
    use crate::types::ColumnType;

    fn doc() -> Rc<VersionDocument> {
        Rc::new(
            VersionDocument::from_models(
                "sample1",
                &[
                    TableDef::new("building")
                        .column(ColumnDef::new("id", ColumnType::Integer).primary_key()),
                    TableDef::new("point")
                        .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                        .sharded(),
                ],
            )
            .unwrap(),
        )
    }

    fn params() -> SchemaParams {
        SchemaParams::new()
            .with("building", TableParams::plain(["test0"]))
            .with(
                "point",
                TableParams::sharded([
                    ("test0", vec!["000"]),
                    ("test1", vec!["001", "002"]),
                ]),
            )
    }

    #[test]
    fn test_shard_expansion() {
        let mut snapshot = SchemaSnapshot::new("test0", params());
        snapshot.add_component(doc()).unwrap();

        let entities = snapshot.shard_tables("point");
        let names: Vec<&str> = entities.iter().map(|table| table.name.as_str()).collect();
        assert_eq!(names, ["point_000", "point_001", "point_002"]);
        assert_eq!(entities[0].single_database().unwrap(), "test0");
        assert_eq!(entities[1].single_database().unwrap(), "test1");
        assert_eq!(entities[2].single_database().unwrap(), "test1");
    }

    #[test]
    fn test_plain_default_database_fallback() {
        let mut snapshot = SchemaSnapshot::new("test0", SchemaParams::new());
        let doc = Rc::new(
            VersionDocument::from_models(
                "c",
                &[TableDef::new("t0")
                    .column(ColumnDef::new("id", ColumnType::Integer).primary_key())],
            )
            .unwrap(),
        );
        snapshot.add_component(doc).unwrap();
        let table = snapshot.table("t0").unwrap();
        assert_eq!(
            table.database_names,
            BTreeSet::from(["test0".to_string()])
        );
    }

    #[test]
    fn test_duplicate_suffix_rejected() {
        let params = SchemaParams::new()
            .with("building", TableParams::plain(["test0"]))
            .with(
                "point",
                TableParams::sharded([
                    ("test0", vec!["000"]),
                    ("test1", vec!["000"]),
                ]),
            );
        let mut snapshot = SchemaSnapshot::new("test0", params);
        assert!(snapshot.add_component(doc()).is_err());
    }

    #[test]
    fn test_component_tables_in_expansion_order() {
        let mut snapshot = SchemaSnapshot::new("test0", params());
        snapshot.add_component(doc()).unwrap();
        let names: Vec<&str> = snapshot
            .component_tables("sample1")
            .iter()
            .map(|table| table.name.as_str())
            .collect();
        assert_eq!(names, ["building", "point_000", "point_001", "point_002"]);
    }
}
