//! Per-table deployment params.
//!
//! Params say *where* each table lives: a plain table names the set of
//! databases carrying a full copy; a sharded table maps each database to the
//! ordered list of shard suffixes it hosts. The text form is canonical JSON
//! (sorted keys), compared byte-wise by the migration cleanliness check.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

/// Deployment metadata for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableParams {
    /// Full copy on every named database.
    Plain {
        /// Databases carrying the table.
        database_names: BTreeSet<String>,
    },
    /// Sharded: each database hosts an ordered list of shard suffixes.
    Sharded {
        /// Database name to shard suffixes.
        database_names: BTreeMap<String, Vec<String>>,
    },
}

impl TableParams {
    /// Plain params over the given databases.
    pub fn plain<I, S>(databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Plain {
            database_names: databases.into_iter().map(Into::into).collect(),
        }
    }

    /// Sharded params from `(database, suffixes)` pairs.
    pub fn sharded<I, S, T>(map: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<T>)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self::Sharded {
            database_names: map
                .into_iter()
                .map(|(db, suffixes)| {
                    (db.into(), suffixes.into_iter().map(Into::into).collect())
                })
                .collect(),
        }
    }
}

/// Mapping from table name to its deployment params.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaParams {
    tables: BTreeMap<String, TableParams>,
}

impl SchemaParams {
    /// Empty params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a table's params.
    pub fn get(&self, table: &str) -> Option<&TableParams> {
        self.tables.get(table)
    }

    /// Set a table's params.
    pub fn insert(&mut self, table: impl Into<String>, params: TableParams) {
        self.tables.insert(table.into(), params);
    }

    /// Builder-style insert.
    pub fn with(mut self, table: impl Into<String>, params: TableParams) -> Self {
        self.insert(table, params);
        self
    }

    /// Number of table entries.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// No entries at all.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterate entries in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TableParams)> {
        self.tables.iter()
    }

    /// The databases a plain table deploys to; absent entries fall back to
    /// the default database.
    pub fn plain_databases(
        &self,
        table: &str,
        default_database: &str,
    ) -> SchemaResult<BTreeSet<String>> {
        match self.tables.get(table) {
            None => Ok(BTreeSet::from([default_database.to_string()])),
            Some(TableParams::Plain { database_names }) => Ok(database_names.clone()),
            Some(TableParams::Sharded { .. }) => Err(SchemaError::params(format!(
                "table '{table}' has a shard map but is declared plain"
            ))),
        }
    }

    /// The shard map of a sharded table. A sharded table must have an
    /// explicit entry.
    pub fn shard_map(&self, table: &str) -> SchemaResult<&BTreeMap<String, Vec<String>>> {
        match self.tables.get(table) {
            Some(TableParams::Sharded { database_names }) => Ok(database_names),
            Some(TableParams::Plain { .. }) => Err(SchemaError::params(format!(
                "table '{table}' is declared sharded but has plain params"
            ))),
            None => Err(SchemaError::params(format!(
                "sharded table '{table}' has no params entry"
            ))),
        }
    }

    /// Canonical JSON text form.
    pub fn to_text(&self) -> SchemaResult<String> {
        serde_json::to_string(&self).map_err(|e| SchemaError::params(e.to_string()))
    }

    /// Parse the JSON text form.
    pub fn from_text(text: &str) -> SchemaResult<Self> {
        serde_json::from_str(text).map_err(|e| SchemaError::params(e.to_string()))
    }
}

impl FromIterator<(String, TableParams)> for SchemaParams {
    fn from_iter<T: IntoIterator<Item = (String, TableParams)>>(iter: T) -> Self {
        Self {
            tables: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaParams {
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
    fn test_text_round_trip() {
        let params = sample();
        let text = params.to_text().unwrap();
        assert_eq!(SchemaParams::from_text(&text).unwrap(), params);
    }

    #[test]
    fn test_text_is_canonical() {
        // Insertion order must not leak into the text form.
        let mut reordered = SchemaParams::new();
        reordered.insert(
            "point",
            TableParams::sharded([("test1", vec!["001", "002"]), ("test0", vec!["000"])]),
        );
        reordered.insert("building", TableParams::plain(["test0"]));
        assert_eq!(
            sample().to_text().unwrap(),
            reordered.to_text().unwrap()
        );
    }

    #[test]
    fn test_plain_default_fallback() {
        let params = SchemaParams::new();
        let databases = params.plain_databases("anything", "test0").unwrap();
        assert_eq!(databases, BTreeSet::from(["test0".to_string()]));
    }

    #[test]
    fn test_shard_map_requires_entry() {
        let params = SchemaParams::new();
        assert!(params.shard_map("point").is_err());
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let params = sample();
        assert!(params.plain_databases("point", "test0").is_err());
        assert!(params.shard_map("building").is_err());
    }
}
